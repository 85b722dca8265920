pub mod http;

pub use http::HttpRemoteApi;

use crate::errors::RemoteError;
use crate::types::{ForumPostRecord, ProgressRecord, QuizAttemptRecord, QuizQuestion};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

// --- Response bodies ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCourse {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "thumbnailUrl")]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub lessons: Vec<RemoteLesson>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLesson {
    pub id: String,
    #[serde(default)]
    pub course_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteQuiz {
    pub id: String,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub lesson_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
    #[serde(default)]
    pub time_limit: Option<u32>,
}

// --- Request bodies ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub user_id: String,
    pub course_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<String>,
    pub completed: bool,
    pub percent: f64,
    pub time_spent: u64,
    pub last_accessed: DateTime<Utc>,
}

impl From<&ProgressRecord> for ProgressPayload {
    fn from(record: &ProgressRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            course_id: record.course_id.clone(),
            lesson_id: record.lesson_id.clone(),
            completed: record.completed,
            percent: record.percent,
            time_spent: record.time_spent,
            last_accessed: record.last_accessed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSubmitPayload {
    pub user_id: String,
    pub quiz_id: String,
    pub answers: BTreeMap<String, usize>,
    pub score: f64,
    pub completed_at: DateTime<Utc>,
}

impl From<&QuizAttemptRecord> for QuizSubmitPayload {
    fn from(record: &QuizAttemptRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            quiz_id: record.quiz_id.clone(),
            answers: record.answers.clone(),
            score: record.score,
            completed_at: record.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumPostPayload {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    pub title: String,
    pub content: String,
}

impl From<&ForumPostRecord> for ForumPostPayload {
    fn from(record: &ForumPostRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            course_id: record.course_id.clone(),
            title: record.title.clone(),
            content: record.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiTutorPayload {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<String>,
}

/// A trait for talking to the remote learning platform.
///
/// The remote server is the system of record. Every method maps to one HTTP
/// endpoint; any failure, including a non-2xx answer or a timeout, is an error
/// the caller treats as "not acknowledged".
#[async_trait]
pub trait RemoteApi: Send + Sync + Debug + DynClone {
    /// `GET /api/courses/{id}`
    async fn fetch_course(&self, course_id: &str) -> Result<RemoteCourse, RemoteError>;

    /// `GET /api/lessons?courseId={id}`
    async fn fetch_lessons(&self, course_id: &str) -> Result<Vec<RemoteLesson>, RemoteError>;

    /// `GET /api/quiz/public`
    async fn fetch_public_quizzes(&self) -> Result<Vec<RemoteQuiz>, RemoteError>;

    /// `POST /api/progress`
    async fn post_progress(&self, payload: &ProgressPayload) -> Result<(), RemoteError>;

    /// `POST /api/quiz/submit`
    async fn submit_quiz(&self, payload: &QuizSubmitPayload) -> Result<(), RemoteError>;

    /// `POST /api/forum/posts`, returning the server-assigned post id.
    async fn create_forum_post(&self, payload: &ForumPostPayload) -> Result<String, RemoteError>;

    /// `POST /api/ai-tutor`, returning the tutor's answer.
    async fn ask_ai_tutor(&self, payload: &AiTutorPayload) -> Result<String, RemoteError>;

    /// Downloads a media asset referenced by a lesson.
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, RemoteError>;

    /// `GET /api/health`, used as the reachability signal.
    async fn health(&self) -> Result<(), RemoteError>;
}

dyn_clone::clone_trait_object!(RemoteApi);
