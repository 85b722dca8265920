//! # AI-Response Cache
//!
//! A memo over (query, course, lesson) consulted before every AI-tutor call. It
//! keeps at most `capacity` responses, evicting the least recently used, and
//! answers with a fixed fallback message when it can neither hit nor reach the tutor.

use crate::connectivity::ConnectivityMonitor;
use crate::constants::{OFFLINE_AI_RESPONSE, TUTOR_UNAVAILABLE_AI_RESPONSE};
use crate::errors::StoreError;
use crate::remote::{AiTutorPayload, RemoteApi};
use crate::store::LocalStore;
use crate::types::{AiCacheEntry, AiCacheKey, OutboxKind};
use chrono::Utc;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct AiResponseCache {
    store: LocalStore,
    remote: Box<dyn RemoteApi>,
    connectivity: ConnectivityMonitor,
    capacity: usize,
}

impl AiResponseCache {
    pub fn new(
        store: LocalStore,
        remote: Box<dyn RemoteApi>,
        connectivity: ConnectivityMonitor,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            capacity: capacity.max(1),
        }
    }

    /// Answers a tutor query. Never fails: a cache hit, a fresh answer, or a
    /// fallback message (offline, or tutor unreachable) once the query is queued.
    pub async fn query(&self, query: &str, course_id: Option<&str>, lesson_id: Option<&str>) -> String {
        let key = AiCacheKey::new(query, course_id, lesson_id);
        match self.store.ai_cache_lookup(&key).await {
            Ok(Some(entry)) => {
                debug!(query = %query, "AI cache hit.");
                return entry.response;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "AI cache lookup failed, treating as a miss."),
        }

        let payload = AiTutorPayload {
            query: key.query.clone(),
            course_id: key.course_id.clone(),
            lesson_id: key.lesson_id.clone(),
        };

        let fallback = if self.connectivity.is_online() {
            match self.remote.ask_ai_tutor(&payload).await {
                Ok(response) => {
                    if let Err(e) = self.remember(key, &response).await {
                        warn!(error = %e, "Failed to cache AI response.");
                    }
                    return response;
                }
                Err(e) => {
                    warn!(error = %e, "AI tutor request failed.");
                    TUTOR_UNAVAILABLE_AI_RESPONSE
                }
            }
        } else {
            OFFLINE_AI_RESPONSE
        };

        if let Err(e) = self.defer(&payload).await {
            warn!(error = %e, "Failed to queue AI query for later.");
        }
        fallback.to_string()
    }

    /// Stores a response and applies the LRU bound.
    pub async fn remember(&self, key: AiCacheKey, response: &str) -> Result<(), StoreError> {
        let entry = AiCacheEntry {
            key,
            response: response.to_string(),
            created_at: Utc::now(),
        };
        let evicted = self.store.ai_cache_insert(&entry, self.capacity).await?;
        if evicted > 0 {
            debug!(evicted, "AI cache over capacity.");
        }
        Ok(())
    }

    /// Queues the query so a later drain can fetch and cache the answer.
    /// An identical query already waiting is not queued twice.
    async fn defer(&self, payload: &AiTutorPayload) -> Result<(), StoreError> {
        let value = serde_json::to_value(payload)?;
        let already_queued = self
            .store
            .outbox_items()
            .await?
            .iter()
            .any(|item| item.kind == OutboxKind::AiQuery && item.payload == value);
        if !already_queued {
            self.store.enqueue_outbox(OutboxKind::AiQuery, &value).await?;
            info!(query = %payload.query, "AI query queued until back online.");
        }
        Ok(())
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        self.store.ai_cache_len().await
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}
