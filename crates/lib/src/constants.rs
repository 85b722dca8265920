//! # Shared Constants
//!
//! This module provides a centralized location for constants that are shared across
//! the `coursesync` workspace, so the library, the CLI and the tests agree on
//! defaults and limits.

/// Retry ceiling for outbox items. An item is discarded once its retry count reaches it.
pub const MAX_SYNC_RETRIES: u32 = 5;

/// Default number of AI-tutor responses kept in the local cache.
pub const DEFAULT_AI_CACHE_CAPACITY: usize = 500;

/// Default deadline applied to every remote call.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// The default path for the local offline database.
pub const DEFAULT_DB_FILE: &str = "db/coursesync.db";

/// The default directory for cached lesson media.
pub const DEFAULT_MEDIA_DIR: &str = "db/media";

/// The default base URL of the learning platform.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";

/// The answer returned by the AI tutor cache when offline with no cached response.
pub const OFFLINE_AI_RESPONSE: &str = "You are currently offline. Your question has been saved and the AI tutor will answer it once you are back online.";

/// The answer returned when online but the AI tutor could not be reached.
pub const TUTOR_UNAVAILABLE_AI_RESPONSE: &str = "The AI tutor is unavailable right now. Your question has been saved and will be answered on the next sync.";

/// Prefix of locally generated forum post ids, replaced by the server id once synced.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Prefix of the id of the quiz synthesized for courses without published quizzes.
pub const PLACEHOLDER_QUIZ_PREFIX: &str = "placeholder-";
