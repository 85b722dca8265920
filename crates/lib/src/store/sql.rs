//! # Local Store SQL
//!
//! This module centralizes the schema of the offline database. Migrations are
//! additive: each version only creates tables and indexes, never drops or
//! rewrites existing rows.

/// The schema version this build of the store understands.
pub const SCHEMA_VERSION: u32 = 3;

pub const CREATE_SCHEMA_META_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS schema_meta (key TEXT PRIMARY KEY, value INTEGER NOT NULL)";

pub const SELECT_SCHEMA_VERSION: &str = "SELECT value FROM schema_meta WHERE key = 'version'";

pub const UPSERT_SCHEMA_VERSION: &str = "INSERT INTO schema_meta (key, value) VALUES ('version', ?)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value";

/// One additive schema step.
pub struct Migration {
    pub version: u32,
    pub statements: &'static [&'static str],
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        statements: &[
            "CREATE TABLE IF NOT EXISTS courses (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS lessons (
                id TEXT PRIMARY KEY,
                course_id TEXT,
                data TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_lessons_course_id ON lessons (course_id)",
            "CREATE TABLE IF NOT EXISTS quizzes (
                id TEXT PRIMARY KEY,
                course_id TEXT,
                lesson_id TEXT,
                data TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_quizzes_course_id ON quizzes (course_id)",
            "CREATE TABLE IF NOT EXISTS progress (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                course_id TEXT,
                data TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_progress_user_id ON progress (user_id)",
            "CREATE INDEX IF NOT EXISTS idx_progress_course_id ON progress (course_id)",
            "CREATE TABLE IF NOT EXISTS quiz_attempts (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                quiz_id TEXT,
                data TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_quiz_attempts_user_id ON quiz_attempts (user_id)",
            "CREATE TABLE IF NOT EXISTS forum_posts (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                course_id TEXT,
                data TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_forum_posts_user_id ON forum_posts (user_id)",
            "CREATE TABLE IF NOT EXISTS ai_cache (
                id INTEGER PRIMARY KEY,
                query TEXT NOT NULL,
                course_id TEXT NOT NULL DEFAULT '',
                lesson_id TEXT NOT NULL DEFAULT '',
                response TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_accessed INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS outbox (
                seq INTEGER PRIMARY KEY,
                id TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0
            )",
        ],
    },
    Migration {
        version: 2,
        statements: &[
            "CREATE TABLE IF NOT EXISTS forum_replies (
                id TEXT PRIMARY KEY,
                post_id TEXT,
                data TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_forum_replies_post_id ON forum_replies (post_id)",
            "CREATE INDEX IF NOT EXISTS idx_quiz_attempts_quiz_id ON quiz_attempts (quiz_id)",
            "CREATE INDEX IF NOT EXISTS idx_forum_posts_course_id ON forum_posts (course_id)",
        ],
    },
    Migration {
        version: 3,
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_quizzes_lesson_id ON quizzes (lesson_id)",
            "CREATE INDEX IF NOT EXISTS idx_ai_cache_key ON ai_cache (query, course_id, lesson_id)",
            "CREATE INDEX IF NOT EXISTS idx_ai_cache_last_accessed ON ai_cache (last_accessed)",
            "CREATE INDEX IF NOT EXISTS idx_outbox_id ON outbox (id)",
        ],
    },
];

/// Tables wiped by an explicit cache clear.
pub const ALL_TABLES: &[&str] = &[
    "courses",
    "lessons",
    "quizzes",
    "progress",
    "quiz_attempts",
    "forum_posts",
    "forum_replies",
    "ai_cache",
    "outbox",
];
