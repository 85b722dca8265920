//! # Mutation Outbox & Sync Engine
//!
//! Every write is committed to the local store first. When online the engine
//! also tries the remote call right away; when that fails, or when offline, the
//! mutation goes into the outbox and is replayed by a later drain.
//!
//! A logical write is in one of three states:
//! - `local-only`: stored locally, remote call pending or in flight,
//! - `synced`: acknowledged by the server,
//! - `queued`: waiting in the outbox for a drain.

mod drain;

pub use drain::{DrainReport, PermanentFailureHook};

use crate::ai_cache::AiResponseCache;
use crate::connectivity::ConnectivityMonitor;
use crate::constants::LOCAL_ID_PREFIX;
use crate::errors::SyncError;
use crate::remote::{ForumPostPayload, ProgressPayload, QuizSubmitPayload, RemoteApi};
use crate::store::LocalStore;
use crate::types::{
    ForumPostOutcome, ForumPostRecord, ForumReplyRecord, NewForumPost, NewForumReply, OutboxItem,
    OutboxKind, ProgressRecord, ProgressUpdate, QuizAttemptRecord, QuizSubmission,
};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Owns the local-first write path and the outbox drain.
pub struct SyncEngine {
    store: LocalStore,
    remote: Box<dyn RemoteApi>,
    connectivity: ConnectivityMonitor,
    ai_cache: AiResponseCache,
    draining: AtomicBool,
    on_permanent_failure: Option<PermanentFailureHook>,
}

impl SyncEngine {
    pub fn new(
        store: LocalStore,
        remote: Box<dyn RemoteApi>,
        connectivity: ConnectivityMonitor,
        ai_cache: AiResponseCache,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            ai_cache,
            draining: AtomicBool::new(false),
            on_permanent_failure: None,
        }
    }

    /// Registers a callback invoked with every outbox item that is given up on.
    pub fn with_permanent_failure_hook(mut self, hook: PermanentFailureHook) -> Self {
        self.on_permanent_failure = Some(hook);
        self
    }

    // --- Writes ---

    /// Records lesson or course progress. Saving the same (user, course, lesson)
    /// again overwrites the previous row.
    #[instrument(skip(self, update), fields(user = %update.user_id, course = %update.course_id))]
    pub async fn save_progress(&self, update: ProgressUpdate) -> Result<ProgressRecord, SyncError> {
        ensure_finite("percent", update.percent)?;
        let online = self.connectivity.is_online();
        let mut record = ProgressRecord {
            id: ProgressRecord::key_for(
                &update.user_id,
                &update.course_id,
                update.lesson_id.as_deref(),
            ),
            user_id: update.user_id,
            course_id: update.course_id,
            lesson_id: update.lesson_id,
            completed: update.completed,
            percent: update.percent.clamp(0.0, 100.0),
            time_spent: update.time_spent,
            last_accessed: Utc::now(),
            synced: online,
        };
        self.store.put(&record).await?;

        if online {
            match self.remote.post_progress(&ProgressPayload::from(&record)).await {
                Ok(()) => {
                    debug!(id = %record.id, "Progress synced.");
                    return Ok(record);
                }
                Err(e) => {
                    warn!(error = %e, "Progress sync failed, queueing.");
                    record.synced = false;
                    self.store.put(&record).await?;
                }
            }
        }
        self.enqueue(OutboxKind::Progress, &record).await?;
        Ok(record)
    }

    /// Stores a quiz attempt. Every call creates a new attempt.
    #[instrument(skip(self, submission), fields(user = %submission.user_id, quiz = %submission.quiz_id))]
    pub async fn submit_quiz_attempt(
        &self,
        submission: QuizSubmission,
    ) -> Result<QuizAttemptRecord, SyncError> {
        ensure_finite("score", submission.score)?;
        let online = self.connectivity.is_online();
        let completed_at = Utc::now();
        let mut record = QuizAttemptRecord {
            id: QuizAttemptRecord::key_for(&submission.user_id, &submission.quiz_id, completed_at),
            user_id: submission.user_id,
            quiz_id: submission.quiz_id,
            answers: submission.answers,
            score: submission.score,
            completed_at,
            synced: online,
        };
        self.store.put(&record).await?;

        if online {
            match self.remote.submit_quiz(&QuizSubmitPayload::from(&record)).await {
                Ok(()) => {
                    debug!(id = %record.id, "Quiz attempt synced.");
                    return Ok(record);
                }
                Err(e) => {
                    warn!(error = %e, "Quiz submission failed, queueing.");
                    record.synced = false;
                    self.store.put(&record).await?;
                }
            }
        }
        self.enqueue(OutboxKind::Quiz, &record).await?;
        Ok(record)
    }

    /// Creates a forum post, unless an unsynced post with the same title, author
    /// and course already exists.
    #[instrument(skip(self, post), fields(user = %post.user_id, title = %post.title))]
    pub async fn create_forum_post(&self, post: NewForumPost) -> Result<ForumPostOutcome, SyncError> {
        let existing: Vec<ForumPostRecord> =
            self.store.scan_by_index("user_id", &post.user_id).await?;
        if let Some(duplicate) = existing
            .into_iter()
            .find(|p| p.duplicates(&post.user_id, post.course_id.as_deref(), &post.title))
        {
            info!(id = %duplicate.id, "Duplicate forum post ignored.");
            return Ok(ForumPostOutcome::Duplicate(duplicate));
        }

        let online = self.connectivity.is_online();
        let mut record = ForumPostRecord {
            id: format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()),
            user_id: post.user_id,
            course_id: post.course_id,
            title: post.title,
            content: post.content,
            replies: Vec::new(),
            created_at: Utc::now(),
            synced: online,
        };
        self.store.put(&record).await?;

        if online {
            match self.remote.create_forum_post(&ForumPostPayload::from(&record)).await {
                Ok(server_id) => {
                    let synced = self.adopt_server_id(record, &server_id).await?;
                    return Ok(ForumPostOutcome::Created(synced));
                }
                Err(e) => {
                    warn!(error = %e, "Forum post failed, queueing.");
                    record.synced = false;
                    self.store.put(&record).await?;
                }
            }
        }
        self.enqueue(OutboxKind::Forum, &record).await?;
        Ok(ForumPostOutcome::Created(record))
    }

    /// Caches a reply to a forum post locally.
    pub async fn add_forum_reply(&self, reply: NewForumReply) -> Result<ForumReplyRecord, SyncError> {
        let record = ForumReplyRecord {
            id: Uuid::new_v4().to_string(),
            post_id: reply.post_id,
            user_id: reply.user_id,
            content: reply.content,
            created_at: Utc::now(),
        };
        self.store.put(&record).await?;
        Ok(record)
    }

    /// Re-keys a locally created post to the id the server assigned, moving its replies along.
    async fn adopt_server_id(
        &self,
        mut post: ForumPostRecord,
        server_id: &str,
    ) -> Result<ForumPostRecord, SyncError> {
        let local_id = std::mem::replace(&mut post.id, server_id.to_string());
        post.synced = true;
        self.store.put(&post).await?;
        if local_id != post.id {
            self.store.delete::<ForumPostRecord>(&local_id).await?;
            let replies: Vec<ForumReplyRecord> =
                self.store.scan_by_index("post_id", &local_id).await?;
            for mut reply in replies {
                reply.post_id = post.id.clone();
                self.store.put(&reply).await?;
            }
        }
        debug!(local_id = %local_id, server_id = %post.id, "Forum post synced.");
        Ok(post)
    }

    async fn enqueue<T: Serialize>(&self, kind: OutboxKind, record: &T) -> Result<OutboxItem, SyncError> {
        let payload = serde_json::to_value(record)?;
        Ok(self.store.enqueue_outbox(kind, &payload).await?)
    }

    // --- Reads ---

    /// Progress rows of a user within a course.
    pub async fn get_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Vec<ProgressRecord>, SyncError> {
        let rows: Vec<ProgressRecord> = self.store.scan_by_index("user_id", user_id).await?;
        Ok(rows.into_iter().filter(|p| p.course_id == course_id).collect())
    }

    /// Attempts of a user at a quiz, oldest first.
    pub async fn get_quiz_attempts(
        &self,
        user_id: &str,
        quiz_id: &str,
    ) -> Result<Vec<QuizAttemptRecord>, SyncError> {
        let rows: Vec<QuizAttemptRecord> = self.store.scan_by_index("quiz_id", quiz_id).await?;
        let mut attempts: Vec<_> = rows.into_iter().filter(|a| a.user_id == user_id).collect();
        attempts.sort_by_key(|a| a.completed_at);
        Ok(attempts)
    }

    /// Forum posts, newest first, with their cached replies embedded.
    pub async fn get_forum_posts(
        &self,
        course_id: Option<&str>,
    ) -> Result<Vec<ForumPostRecord>, SyncError> {
        let mut posts: Vec<ForumPostRecord> = match course_id {
            Some(course_id) => self.store.scan_by_index("course_id", course_id).await?,
            None => self.store.scan_all().await?,
        };
        for post in &mut posts {
            let mut replies: Vec<ForumReplyRecord> =
                self.store.scan_by_index("post_id", &post.id).await?;
            replies.sort_by_key(|r| r.created_at);
            post.replies = replies;
        }
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    pub async fn pending_count(&self) -> Result<usize, SyncError> {
        Ok(self.store.outbox_len().await?)
    }

    pub async fn outbox_items(&self) -> Result<Vec<OutboxItem>, SyncError> {
        Ok(self.store.outbox_items().await?)
    }
}

/// NaN would be stored as JSON `null` and make the row unreadable.
fn ensure_finite(field: &'static str, value: f64) -> Result<(), SyncError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SyncError::NonFinite { field, value })
    }
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("store", &self.store)
            .field("online", &self.connectivity.is_online())
            .finish_non_exhaustive()
    }
}
