use super::{
    AiTutorPayload, ForumPostPayload, ProgressPayload, QuizSubmitPayload, RemoteApi, RemoteCourse,
    RemoteLesson, RemoteQuiz,
};
use crate::errors::RemoteError;
use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// The HTTP client for the learning platform's API.
///
/// Every request carries the configured timeout; an expired deadline surfaces
/// as `RemoteError::Timeout` and is handled like any other network failure.
#[derive(Clone, Debug)]
pub struct HttpRemoteApi {
    client: ReqwestClient,
    base_url: String,
}

impl HttpRemoteApi {
    /// Creates a new `HttpRemoteApi`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(RemoteError::ClientBuild)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, RemoteError> {
        let url = self.url(path);
        debug!(url = %url, "--> GET");
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(RemoteError::from_send)?;
        read_json(ensure_success(response).await?).await
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, RemoteError> {
        let url = self.url(path);
        debug!(url = %url, "--> POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(RemoteError::from_send)?;
        let response = ensure_success(response).await?;
        let text = response.text().await.map_err(RemoteError::from_send)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| RemoteError::Deserialization(e.to_string()))
    }
}

async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status { status, body })
}

async fn read_json(response: Response) -> Result<Value, RemoteError> {
    response
        .json()
        .await
        .map_err(|e| RemoteError::Deserialization(e.to_string()))
}

/// Accepts both a bare body and one wrapped under `key` (e.g. `{"course": {...}}`).
fn unwrap_envelope<T: DeserializeOwned>(mut value: Value, key: &str) -> Result<T, RemoteError> {
    if let Some(inner) = value.get_mut(key) {
        value = inner.take();
    }
    serde_json::from_value(value).map_err(|e| RemoteError::Deserialization(e.to_string()))
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn fetch_course(&self, course_id: &str) -> Result<RemoteCourse, RemoteError> {
        let value = self
            .get_json(&format!("/api/courses/{course_id}"), &[])
            .await?;
        unwrap_envelope(value, "course")
    }

    async fn fetch_lessons(&self, course_id: &str) -> Result<Vec<RemoteLesson>, RemoteError> {
        let value = self
            .get_json("/api/lessons", &[("courseId", course_id)])
            .await?;
        unwrap_envelope(value, "lessons")
    }

    async fn fetch_public_quizzes(&self) -> Result<Vec<RemoteQuiz>, RemoteError> {
        let value = self.get_json("/api/quiz/public", &[]).await?;
        unwrap_envelope(value, "quizzes")
    }

    async fn post_progress(&self, payload: &ProgressPayload) -> Result<(), RemoteError> {
        self.post_json("/api/progress", payload).await.map(|_| ())
    }

    async fn submit_quiz(&self, payload: &QuizSubmitPayload) -> Result<(), RemoteError> {
        self.post_json("/api/quiz/submit", payload).await.map(|_| ())
    }

    async fn create_forum_post(&self, payload: &ForumPostPayload) -> Result<String, RemoteError> {
        let value = self.post_json("/api/forum/posts", payload).await?;
        let id = value
            .get("id")
            .or_else(|| value.get("post").and_then(|post| post.get("id")))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        id.ok_or_else(|| {
            RemoteError::Deserialization("forum post response carries no id".to_string())
        })
    }

    async fn ask_ai_tutor(&self, payload: &AiTutorPayload) -> Result<String, RemoteError> {
        let value = self.post_json("/api/ai-tutor", payload).await?;
        value
            .get("response")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                RemoteError::Deserialization("AI tutor response carries no text".to_string())
            })
    }

    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        let url = if url.starts_with('/') {
            self.url(url)
        } else {
            url.to_string()
        };
        debug!(url = %url, "--> GET media");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(RemoteError::from_send)?;
        let bytes = ensure_success(response)
            .await?
            .bytes()
            .await
            .map_err(RemoteError::from_send)?;
        Ok(bytes.to_vec())
    }

    async fn health(&self) -> Result<(), RemoteError> {
        let url = self.url("/api/health");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(RemoteError::from_send)?;
        ensure_success(response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_envelope_accepts_wrapped_and_bare_bodies() {
        let wrapped = json!({ "lessons": [{ "id": "l1", "title": "One" }] });
        let bare = json!([{ "id": "l1", "title": "One" }]);

        let a: Vec<RemoteLesson> = unwrap_envelope(wrapped, "lessons").unwrap();
        let b: Vec<RemoteLesson> = unwrap_envelope(bare, "lessons").unwrap();

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a[0].id, b[0].id);
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let api = HttpRemoteApi::new("http://localhost:3000/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.url("/api/health"), "http://localhost:3000/api/health");
    }
}
