//! # Content Downloader
//!
//! Materializes a course's lessons and quizzes, plus referenced media, into the
//! local store for offline use.
//!
//! A download is a multi-step, non-transactional sequence. Only the initial
//! metadata fetch is fatal; later steps are best-effort and anything that went
//! wrong is recorded in the returned `DownloadReport`. Rows already written stay
//! written, and `verify_course_download` tells the caller how usable the result is.

use crate::constants::PLACEHOLDER_QUIZ_PREFIX;
use crate::errors::{DownloadError, StoreError};
use crate::media::MediaCache;
use crate::remote::{RemoteApi, RemoteCourse, RemoteLesson, RemoteQuiz};
use crate::store::LocalStore;
use crate::types::{CachedCourse, CachedLesson, CachedQuiz, QuizQuestion};
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

/// What a download managed to cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadReport {
    pub course_id: String,
    pub lessons_cached: usize,
    pub quizzes_cached: usize,
    /// Lessons came from the course metadata because the lesson endpoint had none.
    pub used_embedded_lessons: bool,
    pub placeholder_quiz: bool,
    pub media_cached: usize,
    pub media_failed: usize,
    /// Non-fatal step failures, in the order they happened.
    pub warnings: Vec<String>,
}

impl DownloadReport {
    /// `true` if every step succeeded.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty() && self.media_failed == 0
    }
}

/// The read-only completeness check of a cached course.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseVerification {
    pub exists: bool,
    pub is_downloaded: bool,
    pub lessons_count: usize,
    pub quizzes_count: usize,
    /// At least one lesson has a body or a video.
    pub has_content: bool,
}

impl CourseVerification {
    /// Distinguishes "fully usable offline" from "metadata only".
    pub fn is_fully_usable(&self) -> bool {
        self.exists && self.is_downloaded && self.lessons_count > 0 && self.has_content
    }
}

#[derive(Clone, Debug)]
pub struct ContentDownloader {
    store: LocalStore,
    remote: Box<dyn RemoteApi>,
    media: Option<MediaCache>,
}

impl ContentDownloader {
    pub fn new(store: LocalStore, remote: Box<dyn RemoteApi>) -> Self {
        Self {
            store,
            remote,
            media: None,
        }
    }

    /// Enables best-effort caching of lesson media.
    pub fn with_media_cache(mut self, media: MediaCache) -> Self {
        self.media = Some(media);
        self
    }

    /// Downloads a course for offline use.
    ///
    /// Fails only if the course metadata cannot be fetched (nothing is written in
    /// that case) or the course row cannot be stored.
    #[instrument(skip(self))]
    pub async fn download_course(&self, course_id: &str) -> Result<DownloadReport, DownloadError> {
        let course = self
            .remote
            .fetch_course(course_id)
            .await
            .map_err(|source| DownloadError::Metadata {
                course_id: course_id.to_string(),
                source,
            })?;
        let now = Utc::now();
        let mut report = DownloadReport {
            course_id: course_id.to_string(),
            ..Default::default()
        };

        // 1. Lessons, falling back to the ones embedded in the metadata.
        let remote_lessons = match self.remote.fetch_lessons(course_id).await {
            Ok(lessons) if !lessons.is_empty() => lessons,
            Ok(_) => {
                report.used_embedded_lessons = true;
                course.lessons.clone()
            }
            Err(e) => {
                warn!(error = %e, "Lesson endpoint unavailable, using embedded lessons.");
                report.used_embedded_lessons = true;
                course.lessons.clone()
            }
        };
        let mut lessons: Vec<CachedLesson> = remote_lessons
            .into_iter()
            .enumerate()
            .map(|(i, lesson)| to_cached_lesson(lesson, course_id, i, now))
            .collect();
        lessons.sort_by_key(|lesson| lesson.order);

        let mut cached = to_cached_course(&course, lessons.clone(), now);
        self.store
            .put(&cached)
            .await
            .map_err(|source| store_error(course_id, source))?;
        match self.replace_lessons(course_id, &lessons).await {
            Ok(()) => report.lessons_cached = lessons.len(),
            Err(e) => {
                warn!(error = %e, "Failed to cache lessons.");
                report.warnings.push(format!("lessons: {e}"));
            }
        }

        // 2. Quizzes. The offline quiz UI always gets at least one.
        let mut quizzes: Vec<CachedQuiz> = match self.remote.fetch_public_quizzes().await {
            Ok(all) => all
                .into_iter()
                .filter(|quiz| quiz.course_id.as_deref() == Some(course_id))
                .map(|quiz| to_cached_quiz(quiz, course_id, now))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to fetch quizzes.");
                report.warnings.push(format!("quizzes: {e}"));
                Vec::new()
            }
        };
        if quizzes.is_empty() {
            info!("No quizzes published for the course, synthesizing a placeholder.");
            quizzes.push(placeholder_quiz(&course, now));
            report.placeholder_quiz = true;
        }
        match self.replace_quizzes(course_id, &quizzes).await {
            Ok(()) => report.quizzes_cached = quizzes.len(),
            Err(e) => {
                warn!(error = %e, "Failed to cache quizzes.");
                report.warnings.push(format!("quizzes: {e}"));
            }
        }

        cached.quizzes = quizzes;
        if let Err(e) = self.store.put(&cached).await {
            warn!(error = %e, "Failed to embed quizzes into the course row.");
            report.warnings.push(format!("course: {e}"));
        }

        // 3. Media, one asset at a time.
        if let Some(media) = &self.media {
            for url in lessons.iter().flat_map(CachedLesson::media_urls) {
                match media.cache_url(url).await {
                    Ok(_) => report.media_cached += 1,
                    Err(e) => {
                        warn!(url = %url, error = %e, "Skipping media asset.");
                        report.media_failed += 1;
                    }
                }
            }
        }

        info!(
            lessons = report.lessons_cached,
            quizzes = report.quizzes_cached,
            complete = report.is_complete(),
            "Course download finished."
        );
        Ok(report)
    }

    async fn replace_lessons(
        &self,
        course_id: &str,
        lessons: &[CachedLesson],
    ) -> Result<(), StoreError> {
        self.store
            .delete_by_index::<CachedLesson>("course_id", course_id)
            .await?;
        for lesson in lessons {
            self.store.put(lesson).await?;
        }
        Ok(())
    }

    async fn replace_quizzes(&self, course_id: &str, quizzes: &[CachedQuiz]) -> Result<(), StoreError> {
        self.store
            .delete_by_index::<CachedQuiz>("course_id", course_id)
            .await?;
        for quiz in quizzes {
            self.store.put(quiz).await?;
        }
        Ok(())
    }

    /// Reports how much of a course is cached.
    pub async fn verify_course_download(
        &self,
        course_id: &str,
    ) -> Result<CourseVerification, StoreError> {
        let course = self.store.get::<CachedCourse>(course_id).await?;
        let lessons = self.cached_lessons(course_id).await?;
        let quizzes = self.cached_quizzes(course_id).await?;
        Ok(CourseVerification {
            exists: course.is_some(),
            is_downloaded: course.is_some_and(|c| c.is_downloaded),
            lessons_count: lessons.len(),
            quizzes_count: quizzes.len(),
            has_content: lessons.iter().any(CachedLesson::has_content),
        })
    }

    pub async fn cached_course(&self, course_id: &str) -> Result<Option<CachedCourse>, StoreError> {
        self.store.get(course_id).await
    }

    /// Cached lessons of a course in display order.
    pub async fn cached_lessons(&self, course_id: &str) -> Result<Vec<CachedLesson>, StoreError> {
        let mut lessons: Vec<CachedLesson> =
            self.store.scan_by_index("course_id", course_id).await?;
        lessons.sort_by_key(|lesson| lesson.order);
        Ok(lessons)
    }

    pub async fn cached_quizzes(&self, course_id: &str) -> Result<Vec<CachedQuiz>, StoreError> {
        self.store.scan_by_index("course_id", course_id).await
    }

    pub async fn downloaded_courses(&self) -> Result<Vec<CachedCourse>, StoreError> {
        let courses: Vec<CachedCourse> = self.store.scan_all().await?;
        Ok(courses.into_iter().filter(|c| c.is_downloaded).collect())
    }

    /// Drops a course and everything cached for it.
    pub async fn remove_course(&self, course_id: &str) -> Result<(), StoreError> {
        self.store
            .delete_by_index::<CachedLesson>("course_id", course_id)
            .await?;
        self.store
            .delete_by_index::<CachedQuiz>("course_id", course_id)
            .await?;
        self.store.delete::<CachedCourse>(course_id).await?;
        info!(course_id = %course_id, "Removed downloaded course.");
        Ok(())
    }
}

fn store_error(course_id: &str, source: StoreError) -> DownloadError {
    DownloadError::Store {
        course_id: course_id.to_string(),
        source,
    }
}

fn to_cached_lesson(
    lesson: RemoteLesson,
    course_id: &str,
    position: usize,
    now: DateTime<Utc>,
) -> CachedLesson {
    CachedLesson {
        id: lesson.id,
        course_id: lesson.course_id.unwrap_or_else(|| course_id.to_string()),
        title: lesson.title,
        content: lesson.content.unwrap_or_default(),
        video_url: lesson.video_url,
        pdf_url: lesson.pdf_url,
        order: lesson
            .order
            .unwrap_or_else(|| i64::try_from(position + 1).unwrap_or(i64::MAX)),
        last_synced: now,
    }
}

fn to_cached_quiz(quiz: RemoteQuiz, course_id: &str, now: DateTime<Utc>) -> CachedQuiz {
    CachedQuiz {
        id: quiz.id,
        course_id: course_id.to_string(),
        lesson_id: quiz.lesson_id,
        title: quiz.title,
        questions: quiz.questions,
        time_limit: quiz.time_limit,
        last_synced: now,
    }
}

fn to_cached_course(
    course: &RemoteCourse,
    lessons: Vec<CachedLesson>,
    now: DateTime<Utc>,
) -> CachedCourse {
    CachedCourse {
        id: course.id.clone(),
        title: course.title.clone(),
        description: course.description.clone().unwrap_or_default(),
        thumbnail: course.thumbnail.clone(),
        lessons,
        quizzes: Vec::new(),
        last_synced: now,
        is_downloaded: true,
    }
}

/// A trivial quiz with a stable id, so re-downloads overwrite rather than duplicate it.
fn placeholder_quiz(course: &RemoteCourse, now: DateTime<Utc>) -> CachedQuiz {
    CachedQuiz {
        id: format!("{PLACEHOLDER_QUIZ_PREFIX}{}", course.id),
        course_id: course.id.clone(),
        lesson_id: None,
        title: format!("{}: Practice Quiz", course.title),
        questions: vec![QuizQuestion {
            id: format!("{PLACEHOLDER_QUIZ_PREFIX}{}-q1", course.id),
            prompt: format!("Have you finished reviewing the lessons of \"{}\"?", course.title),
            options: vec!["Yes".to_string(), "Not yet".to_string()],
            correct_option: 0,
            explanation: Some(
                "Practice question available offline until the course quizzes are published."
                    .to_string(),
            ),
        }],
        time_limit: None,
        last_synced: now,
    }
}
