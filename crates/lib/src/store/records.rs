//! Table descriptors and the `Record` trait mapping each cached entity to its table.

use crate::types::{
    CachedCourse, CachedLesson, CachedQuiz, ForumPostRecord, ForumReplyRecord, ProgressRecord,
    QuizAttemptRecord,
};
use serde::{de::DeserializeOwned, Serialize};

/// A keyed table of JSON documents with declared secondary indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Courses,
    Lessons,
    Quizzes,
    Progress,
    QuizAttempts,
    ForumPosts,
    ForumReplies,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Courses => "courses",
            Table::Lessons => "lessons",
            Table::Quizzes => "quizzes",
            Table::Progress => "progress",
            Table::QuizAttempts => "quiz_attempts",
            Table::ForumPosts => "forum_posts",
            Table::ForumReplies => "forum_replies",
        }
    }

    /// Indexed columns, in the order `Record::index_values` fills them.
    pub fn index_columns(self) -> &'static [&'static str] {
        match self {
            Table::Courses => &[],
            Table::Lessons => &["course_id"],
            Table::Quizzes => &["course_id", "lesson_id"],
            Table::Progress => &["user_id", "course_id"],
            Table::QuizAttempts => &["user_id", "quiz_id"],
            Table::ForumPosts => &["user_id", "course_id"],
            Table::ForumReplies => &["post_id"],
        }
    }

    pub(crate) fn has_index(self, column: &str) -> bool {
        self.index_columns().contains(&column)
    }
}

/// An entity stored in one of the keyed tables.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const TABLE: Table;

    fn key(&self) -> &str;

    /// Values for `TABLE.index_columns()`, same order.
    fn index_values(&self) -> Vec<Option<String>>;
}

impl Record for CachedCourse {
    const TABLE: Table = Table::Courses;

    fn key(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<Option<String>> {
        Vec::new()
    }
}

impl Record for CachedLesson {
    const TABLE: Table = Table::Lessons;

    fn key(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<Option<String>> {
        vec![Some(self.course_id.clone())]
    }
}

impl Record for CachedQuiz {
    const TABLE: Table = Table::Quizzes;

    fn key(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<Option<String>> {
        vec![Some(self.course_id.clone()), self.lesson_id.clone()]
    }
}

impl Record for ProgressRecord {
    const TABLE: Table = Table::Progress;

    fn key(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<Option<String>> {
        vec![Some(self.user_id.clone()), Some(self.course_id.clone())]
    }
}

impl Record for QuizAttemptRecord {
    const TABLE: Table = Table::QuizAttempts;

    fn key(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<Option<String>> {
        vec![Some(self.user_id.clone()), Some(self.quiz_id.clone())]
    }
}

impl Record for ForumPostRecord {
    const TABLE: Table = Table::ForumPosts;

    fn key(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<Option<String>> {
        vec![Some(self.user_id.clone()), self.course_id.clone()]
    }
}

impl Record for ForumReplyRecord {
    const TABLE: Table = Table::ForumReplies;

    fn key(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<Option<String>> {
        vec![Some(self.post_id.clone())]
    }
}
