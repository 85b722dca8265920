//! # Offline Data Model
//!
//! Plain records cached by the local store. Field names are camelCase on the wire
//! so the same JSON travels between the store, the outbox and the remote API.

use crate::constants::LOCAL_ID_PREFIX;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A course cached for offline use, with its lessons and quizzes embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedCourse {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub lessons: Vec<CachedLesson>,
    #[serde(default)]
    pub quizzes: Vec<CachedQuiz>,
    pub last_synced: DateTime<Utc>,
    pub is_downloaded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedLesson {
    pub id: String,
    pub course_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub order: i64,
    pub last_synced: DateTime<Utc>,
}

impl CachedLesson {
    /// `true` if the lesson carries something to study offline.
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
            || self.video_url.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// Media URLs referenced by the lesson.
    pub fn media_urls(&self) -> impl Iterator<Item = &str> {
        self.video_url
            .iter()
            .chain(self.pdf_url.iter())
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    #[serde(alias = "question")]
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(alias = "correctAnswer", default)]
    pub correct_option: usize,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedQuiz {
    pub id: String,
    pub course_id: String,
    #[serde(default)]
    pub lesson_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
    /// Time limit in seconds.
    #[serde(default)]
    pub time_limit: Option<u32>,
    pub last_synced: DateTime<Utc>,
}

/// Per-user progress through a course or one of its lessons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    #[serde(default)]
    pub lesson_id: Option<String>,
    pub completed: bool,
    pub percent: f64,
    /// Cumulative time spent, in seconds.
    pub time_spent: u64,
    pub last_accessed: DateTime<Utc>,
    pub synced: bool,
}

impl ProgressRecord {
    /// The deterministic key shared by every save of the same (user, course, lesson).
    pub fn key_for(user_id: &str, course_id: &str, lesson_id: Option<&str>) -> String {
        format!("{user_id}:{course_id}:{}", lesson_id.unwrap_or("course"))
    }

    /// Compares two records ignoring the synced flag.
    pub(crate) fn same_state(&self, other: &ProgressRecord) -> bool {
        self.id == other.id
            && self.completed == other.completed
            && self.percent == other.percent
            && self.time_spent == other.time_spent
            && self.last_accessed == other.last_accessed
    }
}

/// A caller's progress write.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressUpdate {
    pub user_id: String,
    pub course_id: String,
    pub lesson_id: Option<String>,
    pub completed: bool,
    pub percent: f64,
    pub time_spent: u64,
}

/// One attempt at a quiz. Several attempts per quiz are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttemptRecord {
    pub id: String,
    pub user_id: String,
    pub quiz_id: String,
    /// Question id to selected option index.
    pub answers: BTreeMap<String, usize>,
    pub score: f64,
    pub completed_at: DateTime<Utc>,
    pub synced: bool,
}

impl QuizAttemptRecord {
    pub fn key_for(user_id: &str, quiz_id: &str, completed_at: DateTime<Utc>) -> String {
        format!("{user_id}:{quiz_id}:{}", completed_at.timestamp_micros())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuizSubmission {
    pub user_id: String,
    pub quiz_id: String,
    pub answers: BTreeMap<String, usize>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumReplyRecord {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumPostRecord {
    /// Temporary `local-` id until the server assigns one.
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub course_id: Option<String>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub replies: Vec<ForumReplyRecord>,
    pub created_at: DateTime<Utc>,
    pub synced: bool,
}

impl ForumPostRecord {
    pub fn has_local_id(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }

    /// `true` if `other` would be a duplicate submission of this unsynced post.
    pub(crate) fn duplicates(&self, user_id: &str, course_id: Option<&str>, title: &str) -> bool {
        !self.synced
            && self.user_id == user_id
            && self.course_id.as_deref() == course_id
            && self.title == title
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewForumPost {
    pub user_id: String,
    pub course_id: Option<String>,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewForumReply {
    pub post_id: String,
    pub user_id: String,
    pub content: String,
}

/// The result of creating a forum post.
#[derive(Debug, Clone, PartialEq)]
pub enum ForumPostOutcome {
    Created(ForumPostRecord),
    /// An unsynced post with the same title, author and course already exists.
    Duplicate(ForumPostRecord),
}

impl ForumPostOutcome {
    pub fn post(&self) -> &ForumPostRecord {
        match self {
            ForumPostOutcome::Created(post) | ForumPostOutcome::Duplicate(post) => post,
        }
    }
}

/// The composite key of an AI-tutor response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AiCacheKey {
    pub query: String,
    pub course_id: Option<String>,
    pub lesson_id: Option<String>,
}

impl AiCacheKey {
    pub fn new(query: &str, course_id: Option<&str>, lesson_id: Option<&str>) -> Self {
        Self {
            query: query.to_string(),
            course_id: course_id.map(String::from),
            lesson_id: lesson_id.map(String::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiCacheEntry {
    pub key: AiCacheKey,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// The kind of mutation carried by an outbox item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutboxKind {
    #[serde(rename = "progress")]
    Progress,
    #[serde(rename = "quiz")]
    Quiz,
    #[serde(rename = "forum")]
    Forum,
    #[serde(rename = "ai-query")]
    AiQuery,
}

impl OutboxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxKind::Progress => "progress",
            OutboxKind::Quiz => "quiz",
            OutboxKind::Forum => "forum",
            OutboxKind::AiQuery => "ai-query",
        }
    }
}

impl fmt::Display for OutboxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "progress" => Ok(OutboxKind::Progress),
            "quiz" => Ok(OutboxKind::Quiz),
            "forum" => Ok(OutboxKind::Forum),
            "ai-query" => Ok(OutboxKind::AiQuery),
            other => Err(format!("unknown outbox kind '{other}'")),
        }
    }
}

/// A mutation the remote server has not acknowledged yet.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxItem {
    /// Insertion sequence; replay follows it.
    pub seq: i64,
    pub id: String,
    pub kind: OutboxKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
}
