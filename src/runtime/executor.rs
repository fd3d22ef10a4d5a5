//! Per-user session runtime executor

use super::traits::{RecordWriter, SessionStore, Transport};

use crate::catalog::Catalog;
use crate::db::{PendingImage, UserId};
use crate::state_machine::effect::{Keyboard, ShowTarget};
use crate::state_machine::event::{ImportScope, RenameLevel};
use crate::state_machine::{
    transition, DispatchContext, Effect, Event, Session, TransitionError, TransitionResult,
    MSG_STORAGE_ERROR,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Single consumer of one user's events; owns that user's session
pub struct SessionRuntime<S, W, T>
where
    S: SessionStore + 'static,
    W: RecordWriter + 'static,
    T: Transport + 'static,
{
    user_id: UserId,
    /// Last committed session plus presentation bookkeeping
    session: Session,
    store: S,
    writer: W,
    transport: T,
    catalog: Arc<dyn Catalog>,
    upload_dir: PathBuf,
    rng: StdRng,
    event_rx: mpsc::Receiver<Event>,
}

impl<S, W, T> SessionRuntime<S, W, T>
where
    S: SessionStore + 'static,
    W: RecordWriter + 'static,
    T: Transport + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        session: Session,
        store: S,
        writer: W,
        transport: T,
        catalog: Arc<dyn Catalog>,
        upload_dir: PathBuf,
        event_rx: mpsc::Receiver<Event>,
    ) -> Self {
        Self {
            user_id,
            session,
            store,
            writer,
            transport,
            catalog,
            upload_dir,
            rng: StdRng::from_entropy(),
            event_rx,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(user_id = self.user_id, state = %self.session.state, "Starting session runtime");

        loop {
            tokio::select! {
                Some(event) = self.event_rx.recv() => {
                    if let Err(e) = self.process_event(event).await {
                        tracing::error!(user_id = self.user_id, error = %e, "Error handling event");
                    }
                }
                else => break,
            }
        }

        tracing::info!(user_id = self.user_id, "Session runtime stopped");
    }

    /// Run one inbound event to completion, including any result events
    /// its writes produce
    async fn process_event(&mut self, event: Event) -> Result<(), String> {
        let is_admin = self.store.is_admin(self.user_id).await?;
        let ctx = DispatchContext::new(self.user_id, is_admin);

        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let kind = current_event.kind();
            let result = transition(
                &self.session,
                &ctx,
                current_event,
                self.catalog.as_ref(),
                &mut self.rng,
            );
            let TransitionResult {
                session: next,
                mut effects,
            } = match result {
                Ok(r) => r,
                Err(TransitionError::Catalog(e)) => {
                    self.send_notice(MSG_STORAGE_ERROR).await;
                    return Err(format!("Content lookup failed: {e}"));
                }
                Err(e @ TransitionError::Stale(_)) => {
                    tracing::debug!(user_id = self.user_id, event = kind, error = %e, "Ignoring stale event");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(user_id = self.user_id, event = kind, state = %self.session.state, error = %e, "Event rejected");
                    return Ok(());
                }
            };

            tracing::debug!(
                user_id = self.user_id,
                event = kind,
                from = %self.session.state,
                to = %next.state,
                effects = effects.len(),
                "Transition"
            );

            // Writes, then the commit, then presentation
            effects.sort_by_key(Effect::phase);
            let bookkeeping = self.bookkeeping();
            for effect in effects {
                match self.execute_effect(&ctx, &next, effect).await {
                    Ok(Some(generated_event)) => events_to_process.push(generated_event),
                    Ok(None) => {}
                    Err(e) => {
                        self.send_notice(MSG_STORAGE_ERROR).await;
                        return Err(e);
                    }
                }
            }

            if self.bookkeeping() != bookkeeping {
                if let Err(e) = self.store.save_session(self.user_id, &self.session).await {
                    tracing::warn!(user_id = self.user_id, error = %e, "Failed to save message bookkeeping");
                }
            }
        }

        Ok(())
    }

    fn bookkeeping(&self) -> (Option<i64>, Vec<i64>) {
        (
            self.session.context.last_interactive_message_id,
            self.session.context.last_media_message_ids.clone(),
        )
    }

    /// Execute an effect and optionally return a generated event.
    /// Errors abort the turn; presentation failures are logged instead.
    async fn execute_effect(
        &mut self,
        ctx: &DispatchContext,
        next: &Session,
        effect: Effect,
    ) -> Result<Option<Event>, String> {
        let user_id = self.user_id;
        match effect {
            // Learner records
            Effect::RecordAnswer {
                question_id,
                mode,
                correct,
            } => {
                self.writer
                    .record_answer(user_id, question_id, mode, correct)
                    .await?;
                Ok(None)
            }
            Effect::RecordMistake { question_id } => {
                self.writer.record_mistake(user_id, question_id).await?;
                Ok(None)
            }
            Effect::ClearMistake { question_id } => {
                self.writer.clear_mistake(user_id, question_id).await?;
                Ok(None)
            }
            Effect::SaveTestResult {
                kind,
                target_id,
                score,
            } => {
                self.writer
                    .save_test_result(user_id, kind, target_id, score)
                    .await?;
                Ok(None)
            }
            Effect::TouchAccess { level, entity_id } => {
                self.writer.touch_access(user_id, level, entity_id).await?;
                Ok(None)
            }
            Effect::RecordStudyAction { topic_id } => {
                self.writer
                    .record_study_action(user_id, topic_id, ctx.now)
                    .await?;
                Ok(None)
            }

            // Content administration reports back through result events
            Effect::ImportCourse { course } => {
                let result = self.writer.import_course(&course).await;
                Ok(Some(Event::ImportFinished {
                    scope: ImportScope::Course,
                    result,
                }))
            }
            Effect::ImportTopic { topic_id, topic } => {
                let result = self.writer.import_topic(topic_id, &topic).await;
                Ok(Some(Event::ImportFinished {
                    scope: ImportScope::Topic { topic_id },
                    result,
                }))
            }
            Effect::RenameCourse { course_id, update } => {
                let result = self.writer.rename_course(course_id, &update).await;
                Ok(Some(Event::RenameFinished {
                    level: RenameLevel::Course,
                    result,
                }))
            }
            Effect::RenameSection { section_id, update } => {
                let result = self.writer.rename_section(section_id, &update).await;
                Ok(Some(Event::RenameFinished {
                    level: RenameLevel::Section,
                    result,
                }))
            }
            Effect::DeleteCourse { course_id } => {
                let result = self.writer.delete_course(course_id).await;
                Ok(Some(Event::CourseDeleted { course_id, result }))
            }
            Effect::StoreImage { file_id, image } => {
                let result = self.store_image(&file_id, &image).await;
                Ok(Some(Event::ImageStored {
                    image_id: image.image_id,
                    result,
                }))
            }

            Effect::PersistSession => {
                // Bookkeeping belongs to the runtime, not the transition
                let mut committed = next.clone();
                committed.context.last_interactive_message_id =
                    self.session.context.last_interactive_message_id;
                committed.context.last_media_message_ids =
                    self.session.context.last_media_message_ids.clone();
                self.store.save_session(user_id, &committed).await?;
                self.session = committed;
                Ok(None)
            }

            // Presentation
            Effect::ShowMessage {
                text,
                keyboard,
                target,
            } => {
                self.show_message(&text, keyboard.as_ref(), target).await;
                Ok(None)
            }
            Effect::Notice { text } => {
                self.send_notice(&text).await;
                Ok(None)
            }
            Effect::ShowMedia { paths } => {
                self.clear_media().await;
                match self.transport.send_media_group(user_id, &paths).await {
                    Ok(ids) => self.session.context.last_media_message_ids = ids,
                    Err(e) => {
                        tracing::warn!(user_id, images = paths.len(), error = %e, "Failed to send media group");
                    }
                }
                Ok(None)
            }
            Effect::ClearMedia => {
                self.clear_media().await;
                Ok(None)
            }
        }
    }

    /// Download an uploaded photo into the upload directory and attach it
    async fn store_image(&self, file_id: &str, image: &PendingImage) -> Result<(), String> {
        let bytes = self.transport.fetch_file(file_id).await?;
        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| format!("Failed to create upload directory: {e}"))?;
        let path = self
            .upload_dir
            .join(format!("{}.jpg", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
        tracing::info!(
            user_id = self.user_id,
            image_id = image.image_id,
            bytes = bytes.len(),
            path = %path.display(),
            "Stored uploaded image"
        );
        self.writer
            .set_image_path(image.owner, image.image_id, &path.to_string_lossy())
            .await
    }

    async fn show_message(&mut self, text: &str, keyboard: Option<&Keyboard>, target: ShowTarget) {
        let user_id = self.user_id;
        if let ShowTarget::Replace(message_id) = target {
            match self
                .transport
                .edit_message(user_id, message_id, text, keyboard)
                .await
            {
                Ok(()) => {
                    self.session.context.last_interactive_message_id = Some(message_id);
                    return;
                }
                Err(e) => {
                    tracing::warn!(user_id, message_id, error = %e, "Edit failed, sending a new message");
                }
            }
        }

        match self.transport.send_message(user_id, text, keyboard).await {
            Ok(message_id) => {
                let previous = self
                    .session
                    .context
                    .last_interactive_message_id
                    .replace(message_id);
                if let Some(previous) = previous.filter(|&p| p != message_id) {
                    self.delete_quietly(previous).await;
                }
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to send message");
            }
        }
    }

    async fn send_notice(&self, text: &str) {
        if let Err(e) = self.transport.send_message(self.user_id, text, None).await {
            tracing::warn!(user_id = self.user_id, error = %e, "Failed to send notice");
        }
    }

    async fn clear_media(&mut self) {
        for message_id in std::mem::take(&mut self.session.context.last_media_message_ids) {
            self.delete_quietly(message_id).await;
        }
    }

    /// Deletion is best-effort; the message may be gone or too old
    async fn delete_quietly(&self, message_id: i64) {
        if let Err(e) = self.transport.delete_message(self.user_id, message_id).await {
            tracing::debug!(user_id = self.user_id, message_id, error = %e, "Delete failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::import::fixtures::{block, course, question, topic};
    use crate::runtime::testing::{FlakyWriter, InMemorySessionStore, RecordingTransport, Sent};
    use crate::state_machine::action::Action;
    use crate::state_machine::state::Mode;
    use crate::state_machine::transition::test_support::{seeded_db, USER};
    use crate::state_machine::state::BotState;

    type TestRuntime =
        SessionRuntime<Arc<InMemorySessionStore>, Arc<FlakyWriter>, Arc<RecordingTransport>>;

    struct Fixture {
        runtime: TestRuntime,
        db: Database,
        store: Arc<InMemorySessionStore>,
        writer: Arc<FlakyWriter>,
        transport: Arc<RecordingTransport>,
        _uploads: tempfile::TempDir,
    }

    fn fixture(db: Database, is_admin: bool) -> Fixture {
        let store = Arc::new(InMemorySessionStore::new());
        if is_admin {
            store.grant_admin(USER);
        }
        let writer = Arc::new(FlakyWriter::new(db.clone()));
        let transport = Arc::new(RecordingTransport::new());
        let uploads = tempfile::tempdir().unwrap();
        let (_tx, rx) = mpsc::channel(8);
        let runtime = SessionRuntime::new(
            USER,
            Session::default(),
            store.clone(),
            writer.clone(),
            transport.clone(),
            Arc::new(db.clone()),
            uploads.path().to_path_buf(),
            rx,
        );
        Fixture {
            runtime,
            db,
            store,
            writer,
            transport,
            _uploads: uploads,
        }
    }

    fn press(action: Action, message_id: i64) -> Event {
        Event::Action {
            action,
            message_id: Some(message_id),
        }
    }

    fn current_question(session: &Session) -> i64 {
        match &session.context.mode {
            Mode::Quiz(quiz) => quiz.current_question_id().unwrap(),
            other => panic!("not in a quiz: {other:?}"),
        }
    }

    fn wrong_option(db: &Database, question_id: i64) -> i64 {
        let question = db.question(question_id).unwrap().unwrap();
        question.options.iter().find(|o| !o.is_correct).unwrap().id
    }

    #[tokio::test]
    async fn test_start_commits_and_sends_menu() {
        let mut f = fixture(seeded_db(), false);
        f.runtime
            .process_event(Event::Start {
                display_name: Some("Ada".to_string()),
            })
            .await
            .unwrap();

        let stored = f.store.session(USER).unwrap();
        assert_eq!(stored.state, BotState::MainMenu);
        assert_eq!(stored.context.display_name.as_deref(), Some("Ada"));

        let sent = f.transport.sent();
        assert!(matches!(&sent[..], [Sent::Message { text, keyboard: Some(_), .. }] if text.contains("Ada")));
        // The menu became the interactive message
        assert_eq!(
            stored.context.last_interactive_message_id,
            Some(f.transport.last_message_id())
        );
    }

    #[tokio::test]
    async fn test_button_press_edits_in_place() {
        let mut f = fixture(seeded_db(), false);
        f.runtime
            .process_event(press(Action::AllCourses, 7))
            .await
            .unwrap();

        let sent = f.transport.sent();
        assert!(matches!(&sent[..], [Sent::Edit { message_id: 7, .. }]));
        assert_eq!(f.store.session(USER).unwrap().state, BotState::AllCourses);
    }

    #[tokio::test]
    async fn test_failed_edit_falls_back_to_send() {
        let mut f = fixture(seeded_db(), false);
        f.transport.fail_edits(true);
        f.runtime
            .process_event(press(Action::AllCourses, 7))
            .await
            .unwrap();

        let sent = f.transport.sent();
        assert!(matches!(&sent[..], [Sent::Message { keyboard: Some(_), .. }]));
    }

    #[tokio::test]
    async fn test_new_message_retires_previous_interactive_one() {
        let mut f = fixture(seeded_db(), false);
        f.runtime
            .process_event(Event::Start { display_name: None })
            .await
            .unwrap();
        let first = f.transport.last_message_id();

        f.runtime
            .process_event(Event::Start { display_name: None })
            .await
            .unwrap();

        let sent = f.transport.sent();
        assert!(sent.contains(&Sent::Delete { message_id: first }));
    }

    #[tokio::test]
    async fn test_wrong_answer_writes_mistake_before_commit() {
        let mut f = fixture(seeded_db(), false);
        let topic_id = f.db.section_topic_ids(f.db.course_section_ids(1).unwrap()[0]).unwrap()[0];
        f.runtime
            .process_event(press(Action::TestTopic { topic_id }, 3))
            .await
            .unwrap();
        let session = f.store.session(USER).unwrap();
        assert_eq!(session.state, BotState::Question);

        let question_id = current_question(&session);
        let option_id = wrong_option(&f.db, question_id);
        f.runtime
            .process_event(press(
                Action::Answer {
                    question_id,
                    option_id,
                },
                3,
            ))
            .await
            .unwrap();

        assert_eq!(f.db.mistake_question_ids(USER).unwrap(), vec![question_id]);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_committed_session() {
        let mut f = fixture(seeded_db(), false);
        f.runtime
            .process_event(press(Action::AllCourses, 3))
            .await
            .unwrap();
        let before = f.store.session(USER).unwrap();

        // Entering a course touches its access timestamp
        f.writer.fail(true);
        let result = f
            .runtime
            .process_event(press(Action::SelectCourse { course_id: 1 }, 3))
            .await;

        assert!(result.is_err());
        assert_eq!(f.store.session(USER).unwrap(), before);
        assert_eq!(f.transport.last_text().as_deref(), Some(MSG_STORAGE_ERROR));
    }

    #[tokio::test]
    async fn test_rejected_event_changes_nothing() {
        let mut f = fixture(seeded_db(), false);
        f.runtime
            .process_event(press(Action::CreateCourse, 3))
            .await
            .unwrap();

        assert!(f.store.session(USER).is_none());
        assert!(f.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_course_import_runs_result_event_in_same_turn() {
        let mut f = fixture(Database::open_in_memory().unwrap(), true);
        f.runtime
            .process_event(press(Action::CreateCourse, 3))
            .await
            .unwrap();
        assert_eq!(
            f.store.session(USER).unwrap().state,
            BotState::AwaitingCourseJson
        );

        let doc = course("Go", vec![topic("Goroutines", vec![block("Spawn", vec![question("q", 1)])])]);
        f.runtime
            .process_event(Event::Document {
                file_name: Some("go.json".to_string()),
                bytes: serde_json::to_vec(&doc).unwrap(),
            })
            .await
            .unwrap();

        assert_eq!(f.store.session(USER).unwrap().state, BotState::MainMenu);
        assert_eq!(f.db.all_courses(0).unwrap().items[0].title, "Go");
        assert!(f.transport.last_text().unwrap().contains("\"Go\""));
    }

    #[tokio::test]
    async fn test_uploaded_photo_is_stored_on_disk() {
        let mut f = fixture(Database::open_in_memory().unwrap(), true);
        let mut with_image = block("Spawn", vec![question("q", 1)]);
        with_image.images = vec!["diagram".to_string()];
        let doc = course("Go", vec![topic("Goroutines", vec![with_image])]);

        f.runtime
            .process_event(press(Action::CreateCourse, 3))
            .await
            .unwrap();
        f.runtime
            .process_event(Event::Document {
                file_name: None,
                bytes: serde_json::to_vec(&doc).unwrap(),
            })
            .await
            .unwrap();
        assert_eq!(f.store.session(USER).unwrap().state, BotState::AwaitingImage);

        f.transport.add_file("photo-1", b"jpeg bytes".to_vec());
        f.runtime
            .process_event(Event::Photo {
                file_id: "photo-1".to_string(),
            })
            .await
            .unwrap();

        let block_id = f.db.block_ids(1).unwrap()[0];
        let stored = f.db.block(block_id).unwrap().unwrap();
        let path = stored.images[0].file_path.clone().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"jpeg bytes");
        assert_eq!(f.store.session(USER).unwrap().state, BotState::MainMenu);
    }

    #[tokio::test]
    async fn test_missing_photo_file_reports_and_stays() {
        let mut f = fixture(Database::open_in_memory().unwrap(), true);
        let mut with_image = block("Spawn", vec![question("q", 1)]);
        with_image.images = vec!["diagram".to_string()];
        let doc = course("Go", vec![topic("Goroutines", vec![with_image])]);

        f.runtime
            .process_event(press(Action::CreateCourse, 3))
            .await
            .unwrap();
        f.runtime
            .process_event(Event::Document {
                file_name: None,
                bytes: serde_json::to_vec(&doc).unwrap(),
            })
            .await
            .unwrap();

        f.runtime
            .process_event(Event::Photo {
                file_id: "unknown".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(f.store.session(USER).unwrap().state, BotState::AwaitingImage);
        let block_id = f.db.block_ids(1).unwrap()[0];
        assert!(f.db.block(block_id).unwrap().unwrap().images[0]
            .file_path
            .is_none());
    }
}
