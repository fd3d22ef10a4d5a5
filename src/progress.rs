//! Progress markers and human-readable progress figures

use crate::catalog::{Catalog, CatalogResult};
use crate::db::{LearningCounts, TestKind, TestScore, UserId};
use chrono::{DateTime, Utc};
use std::fmt;

/// Marker shown in front of list entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl Status {
    pub fn emoji(self) -> &'static str {
        match self {
            Status::NotStarted => "⚪",
            Status::InProgress => "🟡",
            Status::Completed => "🟢",
            Status::Failed => "🔴",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.emoji())
    }
}

/// Learning status from the latest learning answer per question
pub fn learning_status(counts: LearningCounts) -> Status {
    if counts.total == 0 || counts.answered == 0 {
        Status::NotStarted
    } else if counts.answered < counts.total || counts.correct < counts.total {
        Status::InProgress
    } else {
        Status::Completed
    }
}

/// Test status from the stored result of the last attempt
pub fn test_status(score: Option<TestScore>) -> Status {
    let Some(score) = score else {
        return Status::NotStarted;
    };
    let total = score.correct + score.wrong;
    if total == 0 {
        return Status::NotStarted;
    }
    if score.correct == total {
        Status::Completed
    } else if score.correct * 2 >= total {
        Status::InProgress
    } else {
        Status::Failed
    }
}

/// Combine child learning statuses with the parent's own test status.
///
/// `None` children have no questions and are ignored.
pub fn aggregate(children: &[Option<Status>], test: Status) -> Status {
    let counted: Vec<Status> = children.iter().flatten().copied().collect();
    let untouched = counted.iter().all(|s| *s == Status::NotStarted);
    if untouched && test == Status::NotStarted {
        return Status::NotStarted;
    }
    let all_done = !counted.is_empty() && counted.iter().all(|s| *s == Status::Completed);
    if all_done && test == Status::Completed {
        Status::Completed
    } else {
        Status::InProgress
    }
}

/// Topic learning status, or `None` when the topic has no questions
fn topic_learning(catalog: &dyn Catalog, user_id: UserId, topic_id: i64) -> CatalogResult<Option<Status>> {
    let counts = catalog.learning_counts(user_id, topic_id)?;
    if counts.total == 0 {
        return Ok(None);
    }
    Ok(Some(learning_status(counts)))
}

pub fn topic_status(catalog: &dyn Catalog, user_id: UserId, topic_id: i64) -> CatalogResult<Status> {
    Ok(topic_learning(catalog, user_id, topic_id)?.unwrap_or(Status::NotStarted))
}

fn section_learning(catalog: &dyn Catalog, user_id: UserId, section_id: i64) -> CatalogResult<Option<Status>> {
    let children = catalog
        .section_topic_ids(section_id)?
        .into_iter()
        .map(|topic_id| topic_learning(catalog, user_id, topic_id))
        .collect::<CatalogResult<Vec<_>>>()?;
    if children.iter().all(Option::is_none) {
        return Ok(None);
    }
    let test = test_status(catalog.test_score(user_id, TestKind::Section, section_id)?);
    Ok(Some(aggregate(&children, test)))
}

pub fn section_status(catalog: &dyn Catalog, user_id: UserId, section_id: i64) -> CatalogResult<Status> {
    Ok(section_learning(catalog, user_id, section_id)?.unwrap_or(Status::NotStarted))
}

pub fn course_status(catalog: &dyn Catalog, user_id: UserId, course_id: i64) -> CatalogResult<Status> {
    let children = catalog
        .course_section_ids(course_id)?
        .into_iter()
        .map(|section_id| section_learning(catalog, user_id, section_id))
        .collect::<CatalogResult<Vec<_>>>()?;
    let test = test_status(catalog.test_score(user_id, TestKind::Course, course_id)?);
    Ok(aggregate(&children, test))
}

/// "just now", "5 min ago", "3 h ago", "2 d ago" or "never"
pub fn relative_time(then: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(then) = then else {
        return "never".to_string();
    };
    let minutes = (now - then).num_minutes().max(0);
    match minutes {
        0 => "just now".to_string(),
        1..=59 => format!("{minutes} min ago"),
        60..=1439 => format!("{} h ago", minutes / 60),
        _ => format!("{} d ago", minutes / 1440),
    }
}

/// Study time as "1 h 05 min", "12 min" or "less than a minute"
pub fn format_study_time(seconds: i64) -> String {
    let minutes = seconds.max(0) / 60;
    match (minutes / 60, minutes % 60) {
        (0, 0) => "less than a minute".to_string(),
        (0, m) => format!("{m} min"),
        (h, m) => format!("{h} h {m:02} min"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AnswerMode, Database};
    use crate::import::fixtures::{block, course, question, topic};
    use chrono::Duration;

    fn counts(total: u32, answered: u32, correct: u32) -> LearningCounts {
        LearningCounts {
            total,
            answered,
            correct,
        }
    }

    fn score(correct: u32, wrong: u32) -> Option<TestScore> {
        Some(TestScore { correct, wrong })
    }

    #[test]
    fn test_learning_status() {
        assert_eq!(learning_status(counts(4, 0, 0)), Status::NotStarted);
        assert_eq!(learning_status(counts(4, 2, 2)), Status::InProgress);
        assert_eq!(learning_status(counts(4, 4, 3)), Status::InProgress);
        assert_eq!(learning_status(counts(4, 4, 4)), Status::Completed);
        assert_eq!(learning_status(counts(0, 0, 0)), Status::NotStarted);
    }

    #[test]
    fn test_test_status_thresholds() {
        assert_eq!(test_status(None), Status::NotStarted);
        assert_eq!(test_status(score(5, 0)), Status::Completed);
        assert_eq!(test_status(score(2, 2)), Status::InProgress);
        assert_eq!(test_status(score(1, 3)), Status::Failed);
    }

    #[test]
    fn test_aggregate() {
        use Status::*;
        assert_eq!(aggregate(&[Some(NotStarted), None], NotStarted), NotStarted);
        assert_eq!(aggregate(&[Some(Completed), None], Completed), Completed);
        assert_eq!(aggregate(&[Some(Completed), Some(Completed)], InProgress), InProgress);
        assert_eq!(aggregate(&[Some(NotStarted)], Failed), InProgress);
        assert_eq!(aggregate(&[None], Completed), InProgress);
    }

    #[test]
    fn test_course_status_through_catalog() {
        let db = Database::open_in_memory().unwrap();
        let tree = db
            .import_course(&course(
                "Rust",
                vec![topic("Only", vec![block("b", vec![question("q", 0)])])],
            ))
            .unwrap();
        let course_id = tree.root_id;
        assert_eq!(course_status(&db, 1, course_id).unwrap(), Status::NotStarted);

        let question_id = db.course_question_groups(course_id).unwrap()[0][0];
        db.record_answer(1, question_id, AnswerMode::Learning, true)
            .unwrap();
        assert_eq!(course_status(&db, 1, course_id).unwrap(), Status::InProgress);

        let section_id = db.course_section_ids(course_id).unwrap()[0];
        let one = TestScore { correct: 1, wrong: 0 };
        db.upsert_test_result(1, TestKind::Section, section_id, one).unwrap();
        assert_eq!(section_status(&db, 1, section_id).unwrap(), Status::Completed);
        db.upsert_test_result(1, TestKind::Course, course_id, one).unwrap();
        assert_eq!(course_status(&db, 1, course_id).unwrap(), Status::Completed);

        let topic_id = db.section_topic_ids(section_id).unwrap()[0];
        assert_eq!(topic_status(&db, 1, topic_id).unwrap(), Status::Completed);
    }

    #[test]
    fn test_relative_time() {
        let now = Utc::now();
        assert_eq!(relative_time(None, now), "never");
        assert_eq!(relative_time(Some(now), now), "just now");
        assert_eq!(relative_time(Some(now - Duration::minutes(5)), now), "5 min ago");
        assert_eq!(relative_time(Some(now - Duration::hours(3)), now), "3 h ago");
        assert_eq!(relative_time(Some(now - Duration::days(2)), now), "2 d ago");
    }

    #[test]
    fn test_format_study_time() {
        assert_eq!(format_study_time(30), "less than a minute");
        assert_eq!(format_study_time(12 * 60), "12 min");
        assert_eq!(format_study_time(65 * 60), "1 h 05 min");
    }
}
