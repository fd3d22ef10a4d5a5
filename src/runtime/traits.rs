//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::db::{
    AccessLevel, AnswerMode, Database, ImageOwner, ImportedTree, Renamed, TestKind, TestScore,
    UserId,
};
use crate::import::{CourseImport, NameDescImport, TopicImport};
use crate::state_machine::effect::Keyboard;
use crate::state_machine::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outbound messaging channel
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message, returning its id
    async fn send_message(
        &self,
        chat_id: UserId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64, String>;

    async fn edit_message(
        &self,
        chat_id: UserId,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String>;

    async fn delete_message(&self, chat_id: UserId, message_id: i64) -> Result<(), String>;

    /// Send local image files as one album, returning the message ids
    async fn send_media_group(&self, chat_id: UserId, paths: &[String])
        -> Result<Vec<i64>, String>;

    /// Download an uploaded file
    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>, String>;

    /// Stop the client-side spinner on a pressed button
    async fn answer_callback(&self, callback_id: &str) -> Result<(), String>;
}

/// Storage for per-user sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_session(&self, user_id: UserId) -> Result<Session, String>;

    async fn save_session(&self, user_id: UserId, session: &Session) -> Result<(), String>;

    async fn is_admin(&self, user_id: UserId) -> Result<bool, String>;
}

/// Durable writes requested by transitions
#[async_trait]
pub trait RecordWriter: Send + Sync {
    async fn record_answer(
        &self,
        user_id: UserId,
        question_id: i64,
        mode: AnswerMode,
        correct: bool,
    ) -> Result<(), String>;

    async fn record_mistake(&self, user_id: UserId, question_id: i64) -> Result<(), String>;

    async fn clear_mistake(&self, user_id: UserId, question_id: i64) -> Result<(), String>;

    async fn save_test_result(
        &self,
        user_id: UserId,
        kind: TestKind,
        target_id: i64,
        score: TestScore,
    ) -> Result<(), String>;

    async fn touch_access(
        &self,
        user_id: UserId,
        level: AccessLevel,
        entity_id: i64,
    ) -> Result<(), String>;

    async fn record_study_action(
        &self,
        user_id: UserId,
        topic_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), String>;

    async fn import_course(&self, course: &CourseImport) -> Result<ImportedTree, String>;

    async fn import_topic(&self, topic_id: i64, topic: &TopicImport)
        -> Result<ImportedTree, String>;

    async fn rename_course(&self, course_id: i64, update: &NameDescImport)
        -> Result<Renamed, String>;

    async fn rename_section(
        &self,
        section_id: i64,
        update: &NameDescImport,
    ) -> Result<Renamed, String>;

    async fn delete_course(&self, course_id: i64) -> Result<(), String>;

    async fn set_image_path(
        &self,
        owner: ImageOwner,
        image_id: i64,
        file_path: &str,
    ) -> Result<(), String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send_message(
        &self,
        chat_id: UserId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64, String> {
        (**self).send_message(chat_id, text, keyboard).await
    }

    async fn edit_message(
        &self,
        chat_id: UserId,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String> {
        (**self).edit_message(chat_id, message_id, text, keyboard).await
    }

    async fn delete_message(&self, chat_id: UserId, message_id: i64) -> Result<(), String> {
        (**self).delete_message(chat_id, message_id).await
    }

    async fn send_media_group(
        &self,
        chat_id: UserId,
        paths: &[String],
    ) -> Result<Vec<i64>, String> {
        (**self).send_media_group(chat_id, paths).await
    }

    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>, String> {
        (**self).fetch_file(file_id).await
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), String> {
        (**self).answer_callback(callback_id).await
    }
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn load_session(&self, user_id: UserId) -> Result<Session, String> {
        (**self).load_session(user_id).await
    }

    async fn save_session(&self, user_id: UserId, session: &Session) -> Result<(), String> {
        (**self).save_session(user_id, session).await
    }

    async fn is_admin(&self, user_id: UserId) -> Result<bool, String> {
        (**self).is_admin(user_id).await
    }
}

#[async_trait]
impl<T: RecordWriter + ?Sized> RecordWriter for Arc<T> {
    async fn record_answer(
        &self,
        user_id: UserId,
        question_id: i64,
        mode: AnswerMode,
        correct: bool,
    ) -> Result<(), String> {
        (**self)
            .record_answer(user_id, question_id, mode, correct)
            .await
    }

    async fn record_mistake(&self, user_id: UserId, question_id: i64) -> Result<(), String> {
        (**self).record_mistake(user_id, question_id).await
    }

    async fn clear_mistake(&self, user_id: UserId, question_id: i64) -> Result<(), String> {
        (**self).clear_mistake(user_id, question_id).await
    }

    async fn save_test_result(
        &self,
        user_id: UserId,
        kind: TestKind,
        target_id: i64,
        score: TestScore,
    ) -> Result<(), String> {
        (**self)
            .save_test_result(user_id, kind, target_id, score)
            .await
    }

    async fn touch_access(
        &self,
        user_id: UserId,
        level: AccessLevel,
        entity_id: i64,
    ) -> Result<(), String> {
        (**self).touch_access(user_id, level, entity_id).await
    }

    async fn record_study_action(
        &self,
        user_id: UserId,
        topic_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        (**self).record_study_action(user_id, topic_id, now).await
    }

    async fn import_course(&self, course: &CourseImport) -> Result<ImportedTree, String> {
        (**self).import_course(course).await
    }

    async fn import_topic(
        &self,
        topic_id: i64,
        topic: &TopicImport,
    ) -> Result<ImportedTree, String> {
        (**self).import_topic(topic_id, topic).await
    }

    async fn rename_course(
        &self,
        course_id: i64,
        update: &NameDescImport,
    ) -> Result<Renamed, String> {
        (**self).rename_course(course_id, update).await
    }

    async fn rename_section(
        &self,
        section_id: i64,
        update: &NameDescImport,
    ) -> Result<Renamed, String> {
        (**self).rename_section(section_id, update).await
    }

    async fn delete_course(&self, course_id: i64) -> Result<(), String> {
        (**self).delete_course(course_id).await
    }

    async fn set_image_path(
        &self,
        owner: ImageOwner,
        image_id: i64,
        file_path: &str,
    ) -> Result<(), String> {
        (**self).set_image_path(owner, image_id, file_path).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

#[async_trait]
impl SessionStore for Database {
    async fn load_session(&self, user_id: UserId) -> Result<Session, String> {
        Database::load_session(self, user_id).map_err(|e| e.to_string())
    }

    async fn save_session(&self, user_id: UserId, session: &Session) -> Result<(), String> {
        Database::save_session(self, user_id, session).map_err(|e| e.to_string())
    }

    async fn is_admin(&self, user_id: UserId) -> Result<bool, String> {
        Database::is_admin(self, user_id).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl RecordWriter for Database {
    async fn record_answer(
        &self,
        user_id: UserId,
        question_id: i64,
        mode: AnswerMode,
        correct: bool,
    ) -> Result<(), String> {
        Database::record_answer(self, user_id, question_id, mode, correct)
            .map_err(|e| e.to_string())
    }

    async fn record_mistake(&self, user_id: UserId, question_id: i64) -> Result<(), String> {
        Database::record_mistake(self, user_id, question_id).map_err(|e| e.to_string())
    }

    async fn clear_mistake(&self, user_id: UserId, question_id: i64) -> Result<(), String> {
        Database::clear_mistake(self, user_id, question_id).map_err(|e| e.to_string())
    }

    async fn save_test_result(
        &self,
        user_id: UserId,
        kind: TestKind,
        target_id: i64,
        score: TestScore,
    ) -> Result<(), String> {
        self.upsert_test_result(user_id, kind, target_id, score)
            .map_err(|e| e.to_string())
    }

    async fn touch_access(
        &self,
        user_id: UserId,
        level: AccessLevel,
        entity_id: i64,
    ) -> Result<(), String> {
        Database::touch_access(self, user_id, level, entity_id).map_err(|e| e.to_string())
    }

    async fn record_study_action(
        &self,
        user_id: UserId,
        topic_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        Database::record_study_action(self, user_id, topic_id, now).map_err(|e| e.to_string())
    }

    async fn import_course(&self, course: &CourseImport) -> Result<ImportedTree, String> {
        Database::import_course(self, course).map_err(|e| e.to_string())
    }

    async fn import_topic(
        &self,
        topic_id: i64,
        topic: &TopicImport,
    ) -> Result<ImportedTree, String> {
        Database::import_topic(self, topic_id, topic).map_err(|e| e.to_string())
    }

    async fn rename_course(
        &self,
        course_id: i64,
        update: &NameDescImport,
    ) -> Result<Renamed, String> {
        Database::rename_course(self, course_id, update).map_err(|e| e.to_string())
    }

    async fn rename_section(
        &self,
        section_id: i64,
        update: &NameDescImport,
    ) -> Result<Renamed, String> {
        Database::rename_section(self, section_id, update).map_err(|e| e.to_string())
    }

    async fn delete_course(&self, course_id: i64) -> Result<(), String> {
        Database::delete_course(self, course_id).map_err(|e| e.to_string())
    }

    async fn set_image_path(
        &self,
        owner: ImageOwner,
        image_id: i64,
        file_path: &str,
    ) -> Result<(), String> {
        Database::set_image_path(self, owner, image_id, file_path).map_err(|e| e.to_string())
    }
}
