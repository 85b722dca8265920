//! # Connectivity Monitor
//!
//! Tracks whether the client can reach the remote server. The state lives in a
//! `tokio::sync::watch` channel so the sync engine can react to transitions.

use crate::remote::RemoteApi;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    /// Creates a monitor seeded with the platform's current reachability.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Records the current reachability. Subscribers are notified only when the
    /// value changes; returns whether it did.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed.");
        }
        changed
    }

    /// A receiver that observes every transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Checks the server's health endpoint and records the outcome.
    pub async fn check_reachability(&self, remote: &dyn RemoteApi) -> bool {
        let online = match remote.health().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Reachability check failed.");
                false
            }
        };
        self.set_online(online);
        online
    }
}
