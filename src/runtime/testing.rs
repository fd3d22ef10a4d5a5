//! Mock implementations for testing
//!
//! These mocks enable runtime tests without a network or a session table.

use super::traits::*;
use crate::db::{
    AccessLevel, AnswerMode, Database, ImageOwner, ImportedTree, Renamed, TestKind, TestScore,
    UserId,
};
use crate::import::{CourseImport, NameDescImport, TopicImport};
use crate::state_machine::effect::Keyboard;
use crate::state_machine::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

// ============================================================================
// Recording Transport
// ============================================================================

/// One outbound call as the transport saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message {
        message_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edit {
        message_id: i64,
        text: String,
    },
    Delete {
        message_id: i64,
    },
    Media {
        message_ids: Vec<i64>,
        paths: Vec<String>,
    },
}

/// Transport that records every call and hands out increasing message ids
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    fetched: Mutex<Vec<String>>,
    next_id: AtomicI64,
    fail_edits: AtomicBool,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            files: Mutex::new(HashMap::new()),
            fetched: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(100),
            fail_edits: AtomicBool::new(false),
        }
    }

    /// Make every edit fail, as for a message that is too old to edit
    pub fn fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    /// Register a downloadable file
    pub fn add_file(&self, file_id: impl Into<String>, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(file_id.into(), bytes);
    }

    /// File ids requested through `fetch_file`, in call order
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Id of the most recently sent message
    pub fn last_message_id(&self) -> i64 {
        self.next_id.load(Ordering::SeqCst) - 1
    }

    /// Text of the last message sent or edited
    pub fn last_text(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|s| match s {
                Sent::Message { text, .. } | Sent::Edit { text, .. } => Some(text.clone()),
                _ => None,
            })
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(
        &self,
        _chat_id: UserId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64, String> {
        let message_id = self.next_id();
        self.sent.lock().unwrap().push(Sent::Message {
            message_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        _chat_id: UserId,
        message_id: i64,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<(), String> {
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err("message can't be edited".to_string());
        }
        self.sent.lock().unwrap().push(Sent::Edit {
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, _chat_id: UserId, message_id: i64) -> Result<(), String> {
        self.sent.lock().unwrap().push(Sent::Delete { message_id });
        Ok(())
    }

    async fn send_media_group(
        &self,
        _chat_id: UserId,
        paths: &[String],
    ) -> Result<Vec<i64>, String> {
        let message_ids: Vec<i64> = paths.iter().map(|_| self.next_id()).collect();
        self.sent.lock().unwrap().push(Sent::Media {
            message_ids: message_ids.clone(),
            paths: paths.to_vec(),
        });
        Ok(message_ids)
    }

    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>, String> {
        self.fetched.lock().unwrap().push(file_id.to_string());
        self.files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| format!("file not found: {file_id}"))
    }

    async fn answer_callback(&self, _callback_id: &str) -> Result<(), String> {
        Ok(())
    }
}

// ============================================================================
// In-Memory Session Store
// ============================================================================

pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<UserId, Session>>,
    admins: Mutex<HashSet<UserId>>,
}

#[allow(dead_code)]
impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            admins: Mutex::new(HashSet::new()),
        }
    }

    pub fn grant_admin(&self, user_id: UserId) {
        self.admins.lock().unwrap().insert(user_id);
    }

    /// The committed session, if one was ever saved
    pub fn session(&self, user_id: UserId) -> Option<Session> {
        self.sessions.lock().unwrap().get(&user_id).cloned()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load_session(&self, user_id: UserId) -> Result<Session, String> {
        Ok(self.session(user_id).unwrap_or_default())
    }

    async fn save_session(&self, user_id: UserId, session: &Session) -> Result<(), String> {
        self.sessions
            .lock()
            .unwrap()
            .insert(user_id, session.clone());
        Ok(())
    }

    async fn is_admin(&self, user_id: UserId) -> Result<bool, String> {
        Ok(self.admins.lock().unwrap().contains(&user_id))
    }
}

// ============================================================================
// Flaky Writer
// ============================================================================

/// Writes through to a database unless told to fail
pub struct FlakyWriter {
    db: Database,
    fail: AtomicBool,
}

impl FlakyWriter {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn db(&self) -> Result<&Database, String> {
        if self.fail.load(Ordering::SeqCst) {
            Err("disk I/O error".to_string())
        } else {
            Ok(&self.db)
        }
    }
}

#[async_trait]
impl RecordWriter for FlakyWriter {
    async fn record_answer(
        &self,
        user_id: UserId,
        question_id: i64,
        mode: AnswerMode,
        correct: bool,
    ) -> Result<(), String> {
        RecordWriter::record_answer(self.db()?, user_id, question_id, mode, correct).await
    }

    async fn record_mistake(&self, user_id: UserId, question_id: i64) -> Result<(), String> {
        RecordWriter::record_mistake(self.db()?, user_id, question_id).await
    }

    async fn clear_mistake(&self, user_id: UserId, question_id: i64) -> Result<(), String> {
        RecordWriter::clear_mistake(self.db()?, user_id, question_id).await
    }

    async fn save_test_result(
        &self,
        user_id: UserId,
        kind: TestKind,
        target_id: i64,
        score: TestScore,
    ) -> Result<(), String> {
        RecordWriter::save_test_result(self.db()?, user_id, kind, target_id, score).await
    }

    async fn touch_access(
        &self,
        user_id: UserId,
        level: AccessLevel,
        entity_id: i64,
    ) -> Result<(), String> {
        RecordWriter::touch_access(self.db()?, user_id, level, entity_id).await
    }

    async fn record_study_action(
        &self,
        user_id: UserId,
        topic_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        RecordWriter::record_study_action(self.db()?, user_id, topic_id, now).await
    }

    async fn import_course(&self, course: &CourseImport) -> Result<ImportedTree, String> {
        RecordWriter::import_course(self.db()?, course).await
    }

    async fn import_topic(
        &self,
        topic_id: i64,
        topic: &TopicImport,
    ) -> Result<ImportedTree, String> {
        RecordWriter::import_topic(self.db()?, topic_id, topic).await
    }

    async fn rename_course(
        &self,
        course_id: i64,
        update: &NameDescImport,
    ) -> Result<Renamed, String> {
        RecordWriter::rename_course(self.db()?, course_id, update).await
    }

    async fn rename_section(
        &self,
        section_id: i64,
        update: &NameDescImport,
    ) -> Result<Renamed, String> {
        RecordWriter::rename_section(self.db()?, section_id, update).await
    }

    async fn delete_course(&self, course_id: i64) -> Result<(), String> {
        RecordWriter::delete_course(self.db()?, course_id).await
    }

    async fn set_image_path(
        &self,
        owner: ImageOwner,
        image_id: i64,
        file_path: &str,
    ) -> Result<(), String> {
        RecordWriter::set_image_path(self.db()?, owner, image_id, file_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::action::Action;
    use crate::state_machine::state::BotState;

    #[tokio::test]
    async fn test_recording_transport_ids_increase() {
        let transport = RecordingTransport::new();
        let keyboard = Keyboard::new().button("Menu", Action::MainMenu);
        let first = transport.send_message(1, "hi", Some(&keyboard)).await.unwrap();
        let second = transport.send_message(1, "again", None).await.unwrap();
        assert_eq!(second, first + 1);
        assert_eq!(transport.last_message_id(), second);
        assert_eq!(transport.last_text().as_deref(), Some("again"));

        transport.fail_edits(true);
        assert!(transport.edit_message(1, first, "x", None).await.is_err());
        assert!(transport.fetch_file("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_store_defaults() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.load_session(5).await.unwrap(), Session::default());
        assert!(!store.is_admin(5).await.unwrap());

        let mut session = Session::default();
        session.state = BotState::AllCourses;
        store.save_session(5, &session).await.unwrap();
        store.grant_admin(5);
        assert_eq!(store.load_session(5).await.unwrap().state, BotState::AllCourses);
        assert!(store.is_admin(5).await.unwrap());
    }

    #[tokio::test]
    async fn test_flaky_writer_toggles() {
        let writer = FlakyWriter::new(Database::open_in_memory().unwrap());
        writer.fail(true);
        assert!(writer.delete_course(1).await.is_err());
        writer.fail(false);
        // Real database now answers: nothing to delete
        let err = writer.delete_course(1).await.unwrap_err();
        assert!(err.contains("not found"));
    }
}
