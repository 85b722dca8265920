//! # Offline Client
//!
//! Wires the services of one running client together. Each service is
//! constructed explicitly and shares the same store, remote API and
//! connectivity monitor; the application owns the `OfflineClient` for its
//! whole lifecycle.

use crate::ai_cache::AiResponseCache;
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::downloader::ContentDownloader;
use crate::errors::{ClearError, RemoteError};
use crate::media::MediaCache;
use crate::remote::{HttpRemoteApi, RemoteApi};
use crate::store::LocalStore;
use crate::sync::SyncEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug)]
pub struct OfflineClient {
    pub store: LocalStore,
    pub connectivity: ConnectivityMonitor,
    pub downloader: ContentDownloader,
    pub ai: AiResponseCache,
    pub sync: Arc<SyncEngine>,
    media: MediaCache,
    remote: Box<dyn RemoteApi>,
    background_interval: Option<Duration>,
}

/// Background tasks of a started client. Dropping the handle stops them.
#[derive(Debug)]
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl OfflineClient {
    /// Builds a client from configuration. The store falls back to an inert
    /// instance when the database cannot be opened.
    pub async fn from_config(config: &SyncConfig) -> Result<Self, RemoteError> {
        let remote = HttpRemoteApi::new(&config.api_base_url, config.request_timeout())?;
        let store = LocalStore::open_or_inert(&config.db_path).await;
        let connectivity = ConnectivityMonitor::new(config.start_online);
        Ok(Self::with_parts(store, Box::new(remote), connectivity, config))
    }

    /// Builds a client around existing parts.
    pub fn with_parts(
        store: LocalStore,
        remote: Box<dyn RemoteApi>,
        connectivity: ConnectivityMonitor,
        config: &SyncConfig,
    ) -> Self {
        let media = MediaCache::new(&config.media_dir, remote.clone());
        let downloader =
            ContentDownloader::new(store.clone(), remote.clone()).with_media_cache(media.clone());
        let ai = AiResponseCache::new(
            store.clone(),
            remote.clone(),
            connectivity.clone(),
            config.ai_cache_capacity,
        );
        let sync = Arc::new(SyncEngine::new(
            store.clone(),
            remote.clone(),
            connectivity.clone(),
            ai.clone(),
        ));
        Self {
            store,
            connectivity,
            downloader,
            ai,
            sync,
            media,
            remote,
            background_interval: config.background_sync_interval(),
        }
    }

    /// Starts the reconnect listener and, when configured, the periodic drain.
    pub fn start(&self) -> BackgroundTasks {
        let mut handles = vec![self.sync.spawn_reconnect_listener()];
        handles.extend(self.sync.spawn_background_sync(self.background_interval));
        info!(tasks = handles.len(), "Offline client started.");
        BackgroundTasks { handles }
    }

    /// Checks the server and updates the connectivity state.
    pub async fn refresh_connectivity(&self) -> bool {
        self.connectivity.check_reachability(&*self.remote).await
    }

    /// Wipes every cached row, the outbox and the media cache.
    pub async fn clear_cache(&self) -> Result<(), ClearError> {
        self.store.clear().await?;
        self.media.clear().await?;
        Ok(())
    }
}
