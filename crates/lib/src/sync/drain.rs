use super::SyncEngine;
use crate::constants::MAX_SYNC_RETRIES;
use crate::errors::SyncError;
use crate::remote::{AiTutorPayload, ForumPostPayload, ProgressPayload, QuizSubmitPayload};
use crate::types::{AiCacheKey, ForumPostRecord, OutboxItem, OutboxKind, ProgressRecord, QuizAttemptRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Called with each outbox item dropped after exhausting its retries.
pub type PermanentFailureHook = Arc<dyn Fn(&OutboxItem) + Send + Sync>;

/// The outcome of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub synced: usize,
    /// Failed and kept for another attempt.
    pub retried: usize,
    /// Failed for the last time and removed from the outbox.
    pub abandoned: usize,
    /// The drain did not run: offline, or another drain was in flight.
    pub skipped: bool,
}

impl DrainReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Clears the in-flight flag however the drain exits.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncEngine {
    /// Replays every queued mutation in insertion order.
    ///
    /// Only one drain runs at a time and nothing is replayed while offline. A
    /// replayed item is removed on success; on failure its retry count grows and
    /// it is dropped for good once it reaches `MAX_SYNC_RETRIES`. The local
    /// record of a dropped mutation keeps `synced = false`.
    #[instrument(skip(self))]
    pub async fn sync_pending_data(&self) -> Result<DrainReport, SyncError> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("A drain is already running.");
            return Ok(DrainReport::skipped());
        }
        let _in_flight = InFlight(&self.draining);

        if !self.connectivity.is_online() {
            debug!("Offline, drain postponed.");
            return Ok(DrainReport::skipped());
        }

        let items = self.store.outbox_items().await?;
        if items.is_empty() {
            return Ok(DrainReport::default());
        }
        info!(pending = items.len(), "Draining outbox.");

        let mut report = DrainReport::default();
        for item in items {
            report.attempted += 1;
            match self.replay(&item).await {
                Ok(()) => {
                    self.store.delete_outbox_item(item.seq).await?;
                    report.synced += 1;
                }
                Err(e) => {
                    let retry_count = item.retry_count + 1;
                    if retry_count >= MAX_SYNC_RETRIES {
                        self.store.delete_outbox_item(item.seq).await?;
                        report.abandoned += 1;
                        error!(
                            id = %item.id,
                            kind = %item.kind,
                            error = %e,
                            "Giving up on queued mutation after {retry_count} attempts."
                        );
                        if let Some(hook) = &self.on_permanent_failure {
                            hook(&OutboxItem {
                                retry_count,
                                ..item.clone()
                            });
                        }
                    } else {
                        self.store
                            .set_outbox_retry_count(item.seq, retry_count)
                            .await?;
                        report.retried += 1;
                        warn!(id = %item.id, kind = %item.kind, retry_count, error = %e, "Replay failed.");
                    }
                }
            }
        }

        info!(
            synced = report.synced,
            retried = report.retried,
            abandoned = report.abandoned,
            "Outbox drain finished."
        );
        Ok(report)
    }

    /// Sends one queued mutation and records the acknowledgement locally.
    async fn replay(&self, item: &OutboxItem) -> Result<(), SyncError> {
        match item.kind {
            OutboxKind::Progress => {
                let queued: ProgressRecord = serde_json::from_value(item.payload.clone())?;
                self.remote
                    .post_progress(&ProgressPayload::from(&queued))
                    .await?;
                // A newer local save has its own outbox item and stays unsynced until it replays.
                if let Some(mut current) = self.store.get::<ProgressRecord>(&queued.id).await? {
                    if current.same_state(&queued) && !current.synced {
                        current.synced = true;
                        self.store.put(&current).await?;
                    }
                }
            }
            OutboxKind::Quiz => {
                let queued: QuizAttemptRecord = serde_json::from_value(item.payload.clone())?;
                self.remote
                    .submit_quiz(&QuizSubmitPayload::from(&queued))
                    .await?;
                if let Some(mut current) = self.store.get::<QuizAttemptRecord>(&queued.id).await? {
                    current.synced = true;
                    self.store.put(&current).await?;
                }
            }
            OutboxKind::Forum => {
                let queued: ForumPostRecord = serde_json::from_value(item.payload.clone())?;
                let server_id = self
                    .remote
                    .create_forum_post(&ForumPostPayload::from(&queued))
                    .await?;
                let current = self
                    .store
                    .get::<ForumPostRecord>(&queued.id)
                    .await?
                    .unwrap_or(queued);
                self.adopt_server_id(current, &server_id).await?;
            }
            OutboxKind::AiQuery => {
                let payload: AiTutorPayload = serde_json::from_value(item.payload.clone())?;
                let response = self.remote.ask_ai_tutor(&payload).await?;
                let key = AiCacheKey {
                    query: payload.query,
                    course_id: payload.course_id,
                    lesson_id: payload.lesson_id,
                };
                self.ai_cache.remember(key, &response).await?;
            }
        }
        Ok(())
    }

    /// Spawns the task that drains the outbox on every offline to online transition.
    pub fn spawn_reconnect_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut rx = self.connectivity.subscribe();
        // Read before spawning so a transition racing the task start is not lost.
        let mut was_online = *rx.borrow_and_update();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if online && !was_online {
                    info!("Back online, draining outbox.");
                    if let Err(e) = engine.sync_pending_data().await {
                        error!(error = %e, "Drain after reconnect failed.");
                    }
                }
                was_online = online;
            }
        })
    }

    /// Spawns a periodic drain while online.
    ///
    /// Without an interval there is no background replay and draining happens
    /// only in the foreground (reconnects and explicit calls).
    pub fn spawn_background_sync(self: &Arc<Self>, interval: Option<Duration>) -> Option<JoinHandle<()>> {
        let Some(period) = interval else {
            info!("Background sync not configured, draining in the foreground only.");
            return None;
        };
        let engine = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !engine.connectivity.is_online() {
                    continue;
                }
                match engine.store.outbox_len().await {
                    Ok(0) => {}
                    Ok(_) => {
                        if let Err(e) = engine.sync_pending_data().await {
                            error!(error = %e, "Background drain failed.");
                        }
                    }
                    Err(e) => warn!(error = %e, "Could not read the outbox."),
                }
            }
        }))
    }
}
