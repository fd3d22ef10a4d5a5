//! Database module for the learning bot
//!
//! Provides persistence for sessions, course content and learner records.

mod content;
mod schema;

pub use schema::*;

use crate::import::{BlockImport, CourseImport, NameDescImport, TopicImport};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Gaps between study actions shorter than this count as study time
pub const STUDY_GAP_SECONDS: i64 = 300;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Connection guard; a panic while holding the lock leaves SQLite consistent
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run raw SQL, for tests that need a broken schema
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) {
        self.conn().execute_batch(sql).unwrap();
    }

    // ==================== Session Operations ====================

    /// Load a user's session, falling back to the main menu for anything
    /// missing or undecodable
    pub fn load_session(&self, user_id: UserId) -> DbResult<Session> {
        let row: Option<(String, String)> = self
            .conn()
            .query_row(
                "SELECT state, context FROM sessions WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((state_tag, context_json)) = row else {
            return Ok(Session::default());
        };

        let state = state_tag.parse::<BotState>().unwrap_or_else(|e| {
            tracing::warn!(user_id, tag = %e.0, "Unknown session state, resetting to main menu");
            BotState::MainMenu
        });
        let context = serde_json::from_str::<SessionContext>(&context_json).unwrap_or_else(|e| {
            tracing::warn!(user_id, error = %e, "Undecodable session context, using defaults");
            SessionContext::default()
        });
        Ok(Session::new(state, context))
    }

    /// Persist a user's session, overwriting any previous one
    pub fn save_session(&self, user_id: UserId, session: &Session) -> DbResult<()> {
        let context = serde_json::to_string(&session.context)?;
        self.conn().execute(
            "INSERT INTO sessions (user_id, state, context, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET state = ?2, context = ?3, updated_at = ?4",
            params![
                user_id,
                session.state.as_str(),
                context,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    // ==================== Admin Operations ====================

    pub fn is_admin(&self, user_id: UserId) -> DbResult<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT user_id FROM admins WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn grant_admin(&self, user_id: UserId) -> DbResult<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO admins (user_id, granted_at) VALUES (?1, ?2)",
            params![user_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ==================== Learner Records ====================

    /// Append one answer to the progress log
    pub fn record_answer(
        &self,
        user_id: UserId,
        question_id: i64,
        mode: AnswerMode,
        correct: bool,
    ) -> DbResult<()> {
        self.conn().execute(
            "INSERT INTO progress (user_id, question_id, mode, correct, answered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                question_id,
                mode.as_str(),
                correct,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn record_mistake(&self, user_id: UserId, question_id: i64) -> DbResult<()> {
        self.conn().execute(
            "INSERT INTO mistakes (user_id, question_id, last_mistake_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, question_id) DO UPDATE SET last_mistake_at = ?3",
            params![user_id, question_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn clear_mistake(&self, user_id: UserId, question_id: i64) -> DbResult<()> {
        self.conn().execute(
            "DELETE FROM mistakes WHERE user_id = ?1 AND question_id = ?2",
            params![user_id, question_id],
        )?;
        Ok(())
    }

    /// Store the aggregate of a finished attempt, replacing earlier ones
    pub fn upsert_test_result(
        &self,
        user_id: UserId,
        kind: TestKind,
        target_id: i64,
        score: TestScore,
    ) -> DbResult<()> {
        self.conn().execute(
            "INSERT INTO test_results (user_id, kind, target_id, correct, wrong, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id, kind, target_id)
             DO UPDATE SET correct = ?4, wrong = ?5, updated_at = ?6",
            params![
                user_id,
                kind.as_str(),
                target_id,
                score.correct,
                score.wrong,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn touch_access(&self, user_id: UserId, level: AccessLevel, entity_id: i64) -> DbResult<()> {
        self.conn().execute(
            "INSERT INTO access_log (user_id, level, entity_id, last_accessed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, level, entity_id) DO UPDATE SET last_accessed_at = ?4",
            params![user_id, level.as_str(), entity_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Register a study action; short gaps since the previous one accumulate
    pub fn record_study_action(
        &self,
        user_id: UserId,
        topic_id: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let conn = self.conn();
        let last: Option<String> = conn
            .query_row(
                "SELECT last_action_at FROM study_time WHERE user_id = ?1 AND topic_id = ?2",
                params![user_id, topic_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(last) = last else {
            conn.execute(
                "INSERT INTO study_time (user_id, topic_id, total_seconds, last_action_at)
                 VALUES (?1, ?2, 0, ?3)",
                params![user_id, topic_id, now.to_rfc3339()],
            )?;
            return Ok(());
        };

        let gap = (now - parse_datetime(&last)).num_seconds();
        let added = if (0..STUDY_GAP_SECONDS).contains(&gap) {
            gap
        } else {
            0
        };
        conn.execute(
            "UPDATE study_time SET total_seconds = total_seconds + ?3, last_action_at = ?4
             WHERE user_id = ?1 AND topic_id = ?2",
            params![user_id, topic_id, added, now.to_rfc3339()],
        )?;
        Ok(())
    }

    // ==================== Content Administration ====================

    /// Import a whole course tree in one transaction
    pub fn import_course(&self, course: &CourseImport) -> DbResult<ImportedTree> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO courses (title, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![course.title.trim(), course.description.trim(), now],
        )?;
        let course_id = tx.last_insert_rowid();
        let mut pending_images = Vec::new();

        for (s_idx, section) in course.sections.iter().enumerate() {
            tx.execute(
                "INSERT INTO sections (course_id, title, description, order_index) VALUES (?1, ?2, ?3, ?4)",
                params![
                    course_id,
                    section.title.trim(),
                    section.description.trim(),
                    order(s_idx)
                ],
            )?;
            let section_id = tx.last_insert_rowid();

            for (t_idx, topic) in section.topics.iter().enumerate() {
                tx.execute(
                    "INSERT INTO topics (section_id, title, description, order_index) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        section_id,
                        topic.title.trim(),
                        topic.description.trim(),
                        order(t_idx)
                    ],
                )?;
                let topic_id = tx.last_insert_rowid();
                insert_blocks(&tx, topic_id, &topic.blocks, &mut pending_images)?;
            }
        }

        tx.commit()?;
        Ok(ImportedTree {
            root_id: course_id,
            title: course.title.trim().to_string(),
            pending_images,
        })
    }

    /// Replace an existing topic's title, description and blocks; keeps its
    /// id and position within the section
    pub fn import_topic(&self, topic_id: i64, topic: &TopicImport) -> DbResult<ImportedTree> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE topics SET title = ?2, description = ?3 WHERE id = ?1",
            params![topic_id, topic.title.trim(), topic.description.trim()],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound {
                entity: "Topic",
                id: topic_id,
            });
        }
        tx.execute("DELETE FROM blocks WHERE topic_id = ?1", params![topic_id])?;

        let mut pending_images = Vec::new();
        insert_blocks(&tx, topic_id, &topic.blocks, &mut pending_images)?;

        tx.commit()?;
        Ok(ImportedTree {
            root_id: topic_id,
            title: topic.title.trim().to_string(),
            pending_images,
        })
    }

    /// Replace a course's title and description
    pub fn rename_course(&self, course_id: i64, update: &NameDescImport) -> DbResult<Renamed> {
        let conn = self.conn();
        let (old_title, old_description): (String, String) = conn
            .query_row(
                "SELECT title, description FROM courses WHERE id = ?1",
                params![course_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| not_found(e, "Course", course_id))?;
        conn.execute(
            "UPDATE courses SET title = ?2, description = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                course_id,
                update.title.trim(),
                update.description.trim(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(Renamed {
            course_id,
            old_title,
            old_description,
            new_title: update.title.trim().to_string(),
            new_description: update.description.trim().to_string(),
        })
    }

    /// Replace a section's title and description
    pub fn rename_section(&self, section_id: i64, update: &NameDescImport) -> DbResult<Renamed> {
        let conn = self.conn();
        let (course_id, old_title, old_description): (i64, String, String) = conn
            .query_row(
                "SELECT course_id, title, description FROM sections WHERE id = ?1",
                params![section_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(|e| not_found(e, "Section", section_id))?;
        conn.execute(
            "UPDATE sections SET title = ?2, description = ?3 WHERE id = ?1",
            params![section_id, update.title.trim(), update.description.trim()],
        )?;
        Ok(Renamed {
            course_id,
            old_title,
            old_description,
            new_title: update.title.trim().to_string(),
            new_description: update.description.trim().to_string(),
        })
    }

    /// Delete a course with all content and learner records hanging off it
    pub fn delete_course(&self, course_id: i64) -> DbResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM test_results WHERE
                (kind = 'course' AND target_id = ?1)
             OR (kind = 'section' AND target_id IN (SELECT id FROM sections WHERE course_id = ?1))
             OR (kind = 'topic' AND target_id IN (
                    SELECT t.id FROM topics t JOIN sections s ON t.section_id = s.id
                    WHERE s.course_id = ?1))",
            params![course_id],
        )?;
        tx.execute(
            "DELETE FROM access_log WHERE
                (level = 'course' AND entity_id = ?1)
             OR (level = 'section' AND entity_id IN (SELECT id FROM sections WHERE course_id = ?1))",
            params![course_id],
        )?;
        let deleted = tx.execute("DELETE FROM courses WHERE id = ?1", params![course_id])?;
        if deleted == 0 {
            return Err(DbError::NotFound {
                entity: "Course",
                id: course_id,
            });
        }
        tx.commit()?;
        Ok(())
    }

    /// Attach an uploaded file to an image placeholder
    pub fn set_image_path(&self, owner: ImageOwner, image_id: i64, file_path: &str) -> DbResult<()> {
        let sql = match owner {
            ImageOwner::Block => "UPDATE block_images SET file_path = ?2 WHERE id = ?1",
            ImageOwner::Question => "UPDATE question_images SET file_path = ?2 WHERE id = ?1",
        };
        let updated = self.conn().execute(sql, params![image_id, file_path])?;
        if updated == 0 {
            return Err(DbError::NotFound {
                entity: "Image",
                id: image_id,
            });
        }
        Ok(())
    }
}

/// Insert blocks with their questions, collecting image placeholders in
/// tree order (block images, then each question's images)
fn insert_blocks(
    conn: &Connection,
    topic_id: i64,
    blocks: &[BlockImport],
    pending: &mut Vec<PendingImage>,
) -> DbResult<()> {
    for (b_idx, block) in blocks.iter().enumerate() {
        conn.execute(
            "INSERT INTO blocks (topic_id, text_content, order_index) VALUES (?1, ?2, ?3)",
            params![topic_id, block.text, order(b_idx)],
        )?;
        let block_id = conn.last_insert_rowid();

        for (i_idx, description) in block.images.iter().enumerate() {
            conn.execute(
                "INSERT INTO block_images (block_id, description, order_index) VALUES (?1, ?2, ?3)",
                params![block_id, description, order(i_idx)],
            )?;
            pending.push(PendingImage {
                owner: ImageOwner::Block,
                image_id: conn.last_insert_rowid(),
                description: description.clone(),
            });
        }

        for (q_idx, question) in block.questions.iter().enumerate() {
            conn.execute(
                "INSERT INTO questions (block_id, text, explanation, order_index) VALUES (?1, ?2, ?3, ?4)",
                params![block_id, question.text, question.explanation, order(q_idx)],
            )?;
            let question_id = conn.last_insert_rowid();

            for (o_idx, option) in question.options.iter().enumerate() {
                let is_correct = usize::try_from(question.correct_index).ok() == Some(o_idx);
                conn.execute(
                    "INSERT INTO answer_options (question_id, text, is_correct, order_index)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![question_id, option, is_correct, order(o_idx)],
                )?;
            }

            for (i_idx, description) in question.images.iter().enumerate() {
                conn.execute(
                    "INSERT INTO question_images (question_id, description, order_index) VALUES (?1, ?2, ?3)",
                    params![question_id, description, order(i_idx)],
                )?;
                pending.push(PendingImage {
                    owner: ImageOwner::Question,
                    image_id: conn.last_insert_rowid(),
                    description: description.clone(),
                });
            }
        }
    }
    Ok(())
}

fn order(index: usize) -> i64 {
    i64::try_from(index).unwrap_or(i64::MAX)
}

fn not_found(e: rusqlite::Error, entity: &'static str, id: i64) -> DbError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound { entity, id },
        other => DbError::Sqlite(other),
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::fixtures::{block, course, question, topic};
    use crate::state_machine::state::{BrowseList, Mode};

    fn sample_course() -> CourseImport {
        let mut first = block("Intro", vec![question("q1", 0), question("q2", 1)]);
        first.images = vec!["diagram".to_string()];
        let mut q3 = question("q3", 2);
        q3.images = vec!["chart".to_string()];
        course(
            "Rust",
            vec![
                topic("Ownership", vec![first, block("Borrowing", vec![q3])]),
                topic("Traits", vec![block("Impl", vec![question("q4", 0)])]),
            ],
        )
    }

    #[test]
    fn test_missing_session_defaults_to_main_menu() {
        let db = Database::open_in_memory().unwrap();
        let session = db.load_session(42).unwrap();
        assert_eq!(session.state, BotState::MainMenu);
        assert_eq!(session.context, SessionContext::default());
    }

    #[test]
    fn test_session_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let mut session = Session::default();
        session.state = BotState::CourseSections;
        session.context.display_name = Some("Ada".to_string());
        session.context.path.course_id = Some(3);
        session.context.mode = Mode::Browse(BrowseList { page: 2 });

        db.save_session(7, &session).unwrap();
        assert_eq!(db.load_session(7).unwrap(), session);

        session.state = BotState::MainMenu;
        db.save_session(7, &session).unwrap();
        assert_eq!(db.load_session(7).unwrap().state, BotState::MainMenu);
    }

    #[test]
    fn test_corrupt_session_falls_back() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO sessions (user_id, state, context, updated_at) VALUES (1, 'bogus', '{oops', ?1)",
                params![Utc::now().to_rfc3339()],
            )
            .unwrap();
        let session = db.load_session(1).unwrap();
        assert_eq!(session.state, BotState::MainMenu);
        assert_eq!(session.context, SessionContext::default());
    }

    #[test]
    fn test_admin_grant() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.is_admin(5).unwrap());
        db.grant_admin(5).unwrap();
        db.grant_admin(5).unwrap();
        assert!(db.is_admin(5).unwrap());
    }

    #[test]
    fn test_import_collects_pending_images_in_tree_order() {
        let db = Database::open_in_memory().unwrap();
        let tree = db.import_course(&sample_course()).unwrap();
        assert_eq!(tree.title, "Rust");
        let descriptions: Vec<_> = tree
            .pending_images
            .iter()
            .map(|p| (p.owner, p.description.as_str()))
            .collect();
        assert_eq!(
            descriptions,
            vec![(ImageOwner::Block, "diagram"), (ImageOwner::Question, "chart")]
        );
    }

    #[test]
    fn test_failed_import_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "CREATE TRIGGER fail_options BEFORE INSERT ON answer_options
                 BEGIN SELECT RAISE(ABORT, 'boom'); END;",
            )
            .unwrap();
        assert!(db.import_course(&sample_course()).is_err());
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM courses", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_import_topic_replaces_blocks() {
        let db = Database::open_in_memory().unwrap();
        db.import_course(&sample_course()).unwrap();
        let topic_id: i64 = db
            .conn()
            .query_row("SELECT id FROM topics WHERE title = 'Ownership'", [], |r| r.get(0))
            .unwrap();

        let tree = db
            .import_topic(
                topic_id,
                &topic("Ownership 2", vec![block("Only", vec![question("n1", 1)])]),
            )
            .unwrap();
        assert_eq!(tree.root_id, topic_id);
        assert!(tree.pending_images.is_empty());

        let blocks: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM blocks WHERE topic_id = ?1",
                params![topic_id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(blocks, 1);

        assert!(matches!(
            db.import_topic(9999, &topic("x", vec![])),
            Err(DbError::NotFound { .. })
        ));
    }

    #[test]
    fn test_mistakes_and_results_upsert() {
        let db = Database::open_in_memory().unwrap();
        db.import_course(&sample_course()).unwrap();
        db.record_mistake(1, 1).unwrap();
        db.record_mistake(1, 1).unwrap();
        db.record_mistake(1, 2).unwrap();
        db.clear_mistake(1, 1).unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM mistakes WHERE user_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let score = |correct, wrong| TestScore { correct, wrong };
        db.upsert_test_result(1, TestKind::Topic, 1, score(1, 2)).unwrap();
        db.upsert_test_result(1, TestKind::Topic, 1, score(3, 0)).unwrap();
        let stored: (u32, u32) = db
            .conn()
            .query_row("SELECT correct, wrong FROM test_results", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(stored, (3, 0));
    }

    #[test]
    fn test_study_time_only_counts_short_gaps() {
        let db = Database::open_in_memory().unwrap();
        db.import_course(&sample_course()).unwrap();
        let start = Utc::now();
        db.record_study_action(1, 1, start).unwrap();
        db.record_study_action(1, 1, start + chrono::Duration::seconds(120))
            .unwrap();
        db.record_study_action(1, 1, start + chrono::Duration::seconds(1000))
            .unwrap();
        let total: i64 = db
            .conn()
            .query_row("SELECT total_seconds FROM study_time", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 120);
    }

    #[test]
    fn test_delete_course_cascades() {
        let db = Database::open_in_memory().unwrap();
        let tree = db.import_course(&sample_course()).unwrap();
        db.record_answer(1, 1, AnswerMode::Learning, true).unwrap();
        db.upsert_test_result(1, TestKind::Course, tree.root_id, TestScore { correct: 1, wrong: 0 })
            .unwrap();
        db.delete_course(tree.root_id).unwrap();

        for table in ["sections", "topics", "blocks", "questions", "progress", "test_results"] {
            let count: i64 = db
                .conn()
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
                .unwrap();
            assert_eq!(count, 0, "{table} should be empty");
        }
        assert!(matches!(
            db.delete_course(tree.root_id),
            Err(DbError::NotFound { .. })
        ));
    }

    #[test]
    fn test_rename_reports_old_values() {
        let db = Database::open_in_memory().unwrap();
        let tree = db.import_course(&sample_course()).unwrap();
        let renamed = db
            .rename_course(
                tree.root_id,
                &NameDescImport {
                    title: "Rust 2".to_string(),
                    description: "Updated".to_string(),
                },
            )
            .unwrap();
        assert_eq!(renamed.old_title, "Rust");
        assert_eq!(renamed.new_title, "Rust 2");
        assert!(db
            .rename_section(777, &NameDescImport::default())
            .is_err());
    }

    #[test]
    fn test_set_image_path() {
        let db = Database::open_in_memory().unwrap();
        let tree = db.import_course(&sample_course()).unwrap();
        let first = &tree.pending_images[0];
        db.set_image_path(first.owner, first.image_id, "uploads/a.jpg")
            .unwrap();
        assert!(db.set_image_path(ImageOwner::Question, 999, "x").is_err());
    }
}
