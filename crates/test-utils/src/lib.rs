//! # Shared Test Utilities
//!
//! Helpers shared by the `coursesync` test suites: an isolated client wired to a
//! wiremock server and an in-memory store, JSON fixtures for the remote API, and
//! request counters for asserting how often the network was used.

use anyhow::Result;
use coursesync::{ConnectivityMonitor, HttpRemoteApi, LocalStore, OfflineClient, SyncConfig};
use serde_json::{json, Value};
use std::sync::Once;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

/// Initializes tracing once per test binary.
pub fn setup_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

// --- Test Setup ---

/// An offline client backed by a fresh in-memory store and a mock remote server.
pub struct TestSetup {
    pub server: MockServer,
    pub store: LocalStore,
    pub connectivity: ConnectivityMonitor,
    pub client: OfflineClient,
    pub config: SyncConfig,
    /// Keeps the media directory alive for the duration of the test.
    pub media_dir: TempDir,
}

impl TestSetup {
    pub async fn new(online: bool) -> Result<Self> {
        Self::with_ai_capacity(online, coursesync::constants::DEFAULT_AI_CACHE_CAPACITY).await
    }

    pub async fn with_ai_capacity(online: bool, ai_cache_capacity: usize) -> Result<Self> {
        setup_tracing();
        let server = MockServer::start().await;
        let media_dir = tempfile::tempdir()?;
        let config = SyncConfig {
            api_base_url: server.uri(),
            db_path: ":memory:".to_string(),
            media_dir: media_dir.path().join("media").to_string_lossy().into_owned(),
            request_timeout_secs: 5,
            ai_cache_capacity,
            background_sync_interval_secs: None,
            start_online: online,
        };

        let store = LocalStore::open(&config.db_path).await?;
        let remote = HttpRemoteApi::new(&config.api_base_url, config.request_timeout())?;
        let connectivity = ConnectivityMonitor::new(online);
        let client =
            OfflineClient::with_parts(store.clone(), Box::new(remote), connectivity.clone(), &config);

        Ok(Self {
            server,
            store,
            connectivity,
            client,
            config,
            media_dir,
        })
    }

    /// A standalone HTTP client pointed at the mock server.
    pub fn remote(&self) -> HttpRemoteApi {
        HttpRemoteApi::new(&self.server.uri(), Duration::from_secs(5))
            .expect("Failed to build remote client")
    }

    /// Number of requests received for `method` and `path`.
    pub async fn requests_to(&self, http_method: &str, url_path: &str) -> usize {
        requests_to(&self.server, http_method, url_path).await
    }

    /// Number of requests the mock server received in total.
    pub async fn total_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}

pub async fn requests_to(server: &MockServer, http_method: &str, url_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == url_path)
        .count()
}

// --- Fixtures ---

pub fn lesson_json(id: &str, course_id: &str, order: i64, content: &str) -> Value {
    json!({
        "id": id,
        "courseId": course_id,
        "title": format!("Lesson {id}"),
        "content": content,
        "order": order
    })
}

pub fn course_json(id: &str, embedded_lessons: Value) -> Value {
    json!({
        "id": id,
        "title": format!("Course {id}"),
        "description": "A course for offline study.",
        "lessons": embedded_lessons
    })
}

pub fn quiz_json(id: &str, course_id: &str) -> Value {
    json!({
        "id": id,
        "courseId": course_id,
        "title": format!("Quiz {id}"),
        "questions": [{
            "id": format!("{id}-q1"),
            "question": "What does the borrow checker enforce?",
            "options": ["Aliasing XOR mutation", "Garbage collection"],
            "correctAnswer": 0
        }]
    })
}

// --- Mock endpoints ---

pub async fn mount_course(server: &MockServer, course: &Value) {
    let id = course["id"].as_str().unwrap_or_default();
    Mock::given(method("GET"))
        .and(path(format!("/api/courses/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(course))
        .mount(server)
        .await;
}

pub async fn mount_lessons(server: &MockServer, course_id: &str, lessons: &Value) {
    Mock::given(method("GET"))
        .and(path("/api/lessons"))
        .and(query_param("courseId", course_id))
        .respond_with(ResponseTemplate::new(200).set_body_json(lessons))
        .mount(server)
        .await;
}

pub async fn mount_public_quizzes(server: &MockServer, quizzes: &Value) {
    Mock::given(method("GET"))
        .and(path("/api/quiz/public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(quizzes))
        .mount(server)
        .await;
}

/// Answers `method path` with `status` and a JSON body.
pub async fn mount_json(server: &MockServer, http_method: &str, url_path: &str, status: u16, body: Value) {
    Mock::given(method(http_method))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// Makes every write endpoint succeed.
pub async fn mount_write_endpoints(server: &MockServer) {
    mount_json(server, "POST", "/api/progress", 200, json!({ "ok": true })).await;
    mount_json(server, "POST", "/api/quiz/submit", 200, json!({ "ok": true })).await;
    mount_json(server, "POST", "/api/forum/posts", 201, json!({ "id": "post-100" })).await;
    mount_json(
        server,
        "POST",
        "/api/ai-tutor",
        200,
        json!({ "response": "Ownership means each value has a single owner." }),
    )
    .await;
}

/// Makes every write endpoint fail with a server error.
pub async fn mount_failing_write_endpoints(server: &MockServer) {
    for url_path in ["/api/progress", "/api/quiz/submit", "/api/forum/posts", "/api/ai-tutor"] {
        mount_json(server, "POST", url_path, 500, json!({ "error": "unavailable" })).await;
    }
}
