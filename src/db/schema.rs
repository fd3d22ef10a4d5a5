//! Database schema and types

pub use crate::state_machine::state::{BotState, Session, SessionContext};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS sessions (
    user_id INTEGER PRIMARY KEY,
    state TEXT NOT NULL DEFAULT 'main_menu',
    context TEXT NOT NULL DEFAULT '{}',
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS admins (
    user_id INTEGER PRIMARY KEY,
    granted_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS courses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_courses_title ON courses(title);

CREATE TABLE IF NOT EXISTS sections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    order_index INTEGER NOT NULL,

    FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sections_course ON sections(course_id, order_index);

CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    section_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    order_index INTEGER NOT NULL,

    FOREIGN KEY (section_id) REFERENCES sections(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_topics_section ON topics(section_id, order_index);

CREATE TABLE IF NOT EXISTS blocks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id INTEGER NOT NULL,
    text_content TEXT NOT NULL,
    order_index INTEGER NOT NULL,

    FOREIGN KEY (topic_id) REFERENCES topics(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_blocks_topic ON blocks(topic_id, order_index);

CREATE TABLE IF NOT EXISTS block_images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    block_id INTEGER NOT NULL,
    file_path TEXT,
    description TEXT NOT NULL DEFAULT '',
    order_index INTEGER NOT NULL,

    FOREIGN KEY (block_id) REFERENCES blocks(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    block_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    explanation TEXT NOT NULL,
    order_index INTEGER NOT NULL,

    FOREIGN KEY (block_id) REFERENCES blocks(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_questions_block ON questions(block_id, order_index);

CREATE TABLE IF NOT EXISTS question_images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    question_id INTEGER NOT NULL,
    file_path TEXT,
    description TEXT NOT NULL DEFAULT '',
    order_index INTEGER NOT NULL,

    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS answer_options (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    question_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    is_correct BOOLEAN NOT NULL,
    order_index INTEGER NOT NULL,

    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS progress (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    question_id INTEGER NOT NULL,
    mode TEXT NOT NULL,
    correct BOOLEAN NOT NULL,
    answered_at TEXT NOT NULL,

    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_progress_user_question ON progress(user_id, question_id, mode, answered_at DESC);

CREATE TABLE IF NOT EXISTS mistakes (
    user_id INTEGER NOT NULL,
    question_id INTEGER NOT NULL,
    last_mistake_at TEXT NOT NULL,

    PRIMARY KEY (user_id, question_id),
    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS test_results (
    user_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    target_id INTEGER NOT NULL,
    correct INTEGER NOT NULL,
    wrong INTEGER NOT NULL,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (user_id, kind, target_id)
);

CREATE TABLE IF NOT EXISTS access_log (
    user_id INTEGER NOT NULL,
    level TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    last_accessed_at TEXT NOT NULL,

    PRIMARY KEY (user_id, level, entity_id)
);

CREATE INDEX IF NOT EXISTS idx_access_recent ON access_log(user_id, level, last_accessed_at DESC);

CREATE TABLE IF NOT EXISTS study_time (
    user_id INTEGER NOT NULL,
    topic_id INTEGER NOT NULL,
    total_seconds INTEGER NOT NULL DEFAULT 0,
    last_action_at TEXT NOT NULL,

    PRIMARY KEY (user_id, topic_id),
    FOREIGN KEY (topic_id) REFERENCES topics(id) ON DELETE CASCADE
);
";

/// Messaging-platform user id
pub type UserId = i64;

// ============================================================================
// Content
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub section_id: i64,
    pub title: String,
    pub description: String,
}

/// Image attached to a block or question; `file_path` is unset until uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub id: i64,
    pub file_path: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: i64,
    pub topic_id: i64,
    pub text: String,
    pub images: Vec<StoredImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: i64,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub block_id: i64,
    pub text: String,
    pub explanation: String,
    pub options: Vec<AnswerOption>,
    pub images: Vec<StoredImage>,
}

impl Question {
    pub fn option(&self, option_id: i64) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.id == option_id)
    }
}

/// Which kind of content row an image placeholder belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOwner {
    Block,
    Question,
}

/// Image placeholder still waiting for an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingImage {
    pub owner: ImageOwner,
    /// Row id in `block_images` or `question_images`
    pub image_id: i64,
    pub description: String,
}

/// Old and new values of a renamed course or section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    /// The course itself, or the section's parent course
    pub course_id: i64,
    pub old_title: String,
    pub old_description: String,
    pub new_title: String,
    pub new_description: String,
}

/// Outcome of a committed import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedTree {
    pub root_id: i64,
    pub title: String,
    pub pending_images: Vec<PendingImage>,
}

// ============================================================================
// Learner records
// ============================================================================

/// Mode an answer was given in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    Learning,
    Test,
}

impl AnswerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerMode::Learning => "learning",
            AnswerMode::Test => "test",
        }
    }
}

/// Kind of quiz attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Topic,
    Section,
    Course,
    Mistakes,
}

impl TestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TestKind::Topic => "topic",
            TestKind::Section => "section",
            TestKind::Course => "course",
            TestKind::Mistakes => "mistakes",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity level tracked in the access log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Course,
    Section,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Course => "course",
            AccessLevel::Section => "section",
        }
    }
}

/// Stored aggregate of a finished attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestScore {
    pub correct: u32,
    pub wrong: u32,
}

/// Learning-mode answer counts for one topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LearningCounts {
    pub total: u32,
    pub answered: u32,
    pub correct: u32,
}

/// Per-course progress line for the statistics screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseProgress {
    pub course_id: i64,
    pub title: String,
    pub total_questions: u32,
    /// Distinct questions answered in any mode
    pub answered_questions: u32,
}

impl CourseProgress {
    pub fn is_completed(&self) -> bool {
        self.total_questions > 0 && self.answered_questions >= self.total_questions
    }

    pub fn percent(&self) -> u32 {
        if self.total_questions == 0 {
            return 0;
        }
        self.answered_questions.min(self.total_questions) * 100 / self.total_questions
    }
}

/// Course with the highest share of wrong answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardestCourse {
    pub title: String,
    pub error_percent: u32,
}

/// Figures for the statistics screen
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserStatistics {
    pub study_seconds: i64,
    /// Courses with at least one recorded answer
    pub courses: Vec<CourseProgress>,
    pub hardest_course: Option<HardestCourse>,
}

impl UserStatistics {
    pub fn started_courses(&self) -> usize {
        self.courses.len()
    }

    pub fn completed_courses(&self) -> usize {
        self.courses.iter().filter(|c| c.is_completed()).count()
    }
}
