//! Read-only view of course content and learner records
//!
//! Transitions stay pure by reading through this trait and emitting
//! writes as effects. Missing entities come back as `None`; `Err` is
//! reserved for storage failures.

use crate::db::{
    AccessLevel, Block, Course, LearningCounts, Question, Section, TestKind, TestScore, Topic,
    UserId, UserStatistics,
};
use crate::pagination::Page;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

pub type CatalogResult<T> = Result<T, String>;

pub trait Catalog: Send + Sync {
    // Course lists
    fn all_courses(&self, page: usize) -> CatalogResult<Page<Course>>;
    /// Courses the user has entered, most recent first
    fn my_courses(&self, user_id: UserId, page: usize) -> CatalogResult<Page<Course>>;
    fn search_courses(&self, query: &str, page: usize) -> CatalogResult<Page<Course>>;

    // Drill-down lists
    fn sections(&self, course_id: i64, page: usize) -> CatalogResult<Page<Section>>;
    fn topics(&self, section_id: i64, page: usize) -> CatalogResult<Page<Topic>>;

    // Lookups
    fn course(&self, id: i64) -> CatalogResult<Option<Course>>;
    fn section(&self, id: i64) -> CatalogResult<Option<Section>>;
    fn topic(&self, id: i64) -> CatalogResult<Option<Topic>>;
    fn block(&self, id: i64) -> CatalogResult<Option<Block>>;
    fn question(&self, id: i64) -> CatalogResult<Option<Question>>;

    // Ordered id lists
    fn block_ids(&self, topic_id: i64) -> CatalogResult<Vec<i64>>;
    fn question_ids(&self, block_id: i64) -> CatalogResult<Vec<i64>>;
    fn topic_question_ids(&self, topic_id: i64) -> CatalogResult<Vec<i64>>;
    /// One group of question ids per block of the section
    fn section_question_groups(&self, section_id: i64) -> CatalogResult<Vec<Vec<i64>>>;
    /// One group of question ids per topic of the course
    fn course_question_groups(&self, course_id: i64) -> CatalogResult<Vec<Vec<i64>>>;
    fn section_topic_ids(&self, section_id: i64) -> CatalogResult<Vec<i64>>;
    fn course_section_ids(&self, course_id: i64) -> CatalogResult<Vec<i64>>;

    // Learner records
    fn mistake_question_ids(&self, user_id: UserId) -> CatalogResult<Vec<i64>>;
    fn last_accessed(
        &self,
        user_id: UserId,
        level: AccessLevel,
        entity_id: i64,
    ) -> CatalogResult<Option<DateTime<Utc>>>;
    fn test_score(
        &self,
        user_id: UserId,
        kind: TestKind,
        target_id: i64,
    ) -> CatalogResult<Option<TestScore>>;
    /// Latest learning-mode answer per question of the topic
    fn learning_counts(&self, user_id: UserId, topic_id: i64) -> CatalogResult<LearningCounts>;
    fn statistics(&self, user_id: UserId) -> CatalogResult<UserStatistics>;
}

/// Reduce a search query to letters, digits and single spaces
pub fn sanitize_query(raw: &str) -> String {
    static DISALLOWED: OnceLock<Regex> = OnceLock::new();
    let re = DISALLOWED.get_or_init(|| Regex::new(r"[^\p{L}\p{N}\s]").expect("valid regex"));
    re.replace_all(raw, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Every query word appears in the title or description, ignoring case
pub fn matches_query(course: &Course, query: &str) -> bool {
    let haystack = format!("{} {}", course.title, course.description).to_lowercase();
    query
        .to_lowercase()
        .split_whitespace()
        .all(|word| haystack.contains(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_query() {
        assert_eq!(sanitize_query("  Rust; DROP--TABLE  "), "Rust DROP TABLE");
        assert_eq!(sanitize_query("%%%"), "");
        assert_eq!(sanitize_query("Ünïcode 101"), "Ünïcode 101");
    }

    #[test]
    fn test_matches_every_word() {
        let course = Course {
            id: 1,
            title: "Rust Basics".to_string(),
            description: "Ownership and borrowing".to_string(),
        };
        assert!(matches_query(&course, "rust borrowing"));
        assert!(!matches_query(&course, "rust python"));
        assert!(matches_query(&course, ""));
    }
}
