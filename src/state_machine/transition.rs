//! Pure state transition function
//!
//! Given the stored session, the dispatch context and one event, compute
//! the next session and the effects to run. Content is read through the
//! [`Catalog`]; every write is emitted as an effect.

mod admin;
mod navigation;
mod quiz_flow;

use super::action::{Action, AdminListPurpose};
use super::effect::{Button, Effect, Keyboard, ShowTarget};
use super::event::Event;
use super::messages::{self as msg};
use super::state::{BotState, DispatchContext, ListSource, Session, SessionContext};
use crate::catalog::{Catalog, CatalogResult};
use crate::db::{StoredImage, TestKind};
use crate::pagination::Page;
use rand::RngCore;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub session: Session,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    /// Text of the last interactive message, if any
    #[cfg(test)]
    pub fn shown_text(&self) -> Option<&str> {
        self.effects.iter().rev().find_map(|e| match e {
            Effect::ShowMessage { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Keyboard of the last interactive message, if any
    #[cfg(test)]
    pub fn shown_keyboard(&self) -> Option<&Keyboard> {
        self.effects.iter().rev().find_map(|e| match e {
            Effect::ShowMessage { keyboard, .. } => keyboard.as_ref(),
            _ => None,
        })
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Not permitted for non-admin user: {0}")]
    NotPermitted(String),
    #[error("Stale input ignored: {0}")]
    Stale(String),
    #[error("Unexpected {event} event in state {state}")]
    UnexpectedEvent { event: &'static str, state: BotState },
    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl From<String> for TransitionError {
    fn from(e: String) -> Self {
        TransitionError::Catalog(e)
    }
}

/// Pure transition function
///
/// Given the same session, context, catalog contents and random source it
/// always produces the same result and performs no I/O.
pub fn transition<'a>(
    session: &Session,
    ctx: &'a DispatchContext,
    event: Event,
    catalog: &'a dyn Catalog,
    rng: &'a mut dyn RngCore,
) -> Result<TransitionResult, TransitionError> {
    let mut turn = Turn::new(session.clone(), ctx, catalog, rng);

    match event {
        Event::Start { display_name } => turn.start(display_name),
        Event::Text { text } => turn.on_text(&text)?,
        Event::Document { bytes, .. } => turn.on_document(&bytes)?,
        Event::Photo { file_id } => turn.on_photo(file_id)?,
        Event::Action { action, message_id } => {
            turn.origin = message_id;
            turn.on_action(action)?;
        }
        Event::ImportFinished { scope, result } => turn.import_finished(scope, result)?,
        Event::ImageStored { image_id, result } => turn.image_stored(image_id, result)?,
        Event::RenameFinished { level, result } => turn.rename_finished(level, result)?,
        Event::CourseDeleted { course_id, result } => turn.course_deleted(course_id, result)?,
    }

    Ok(turn.finish())
}

/// Working copy of a session while one event is handled
pub(super) struct Turn<'a> {
    session: Session,
    effects: Vec<Effect>,
    ctx: &'a DispatchContext,
    catalog: &'a dyn Catalog,
    rng: &'a mut dyn RngCore,
    /// Message carrying the pressed button
    origin: Option<i64>,
}

type Step = Result<(), TransitionError>;

impl<'a> Turn<'a> {
    fn new(
        session: Session,
        ctx: &'a DispatchContext,
        catalog: &'a dyn Catalog,
        rng: &'a mut dyn RngCore,
    ) -> Self {
        Self {
            session,
            effects: Vec::new(),
            ctx,
            catalog,
            rng,
            origin: None,
        }
    }

    fn finish(mut self) -> TransitionResult {
        self.effects.push(Effect::PersistSession);
        TransitionResult::new(self.session).with_effects(self.effects)
    }

    // ==================== Accessors ====================

    fn state(&self) -> BotState {
        self.session.state
    }

    fn set_state(&mut self, state: BotState) {
        self.session.state = state;
    }

    fn context(&mut self) -> &mut SessionContext {
        &mut self.session.context
    }

    fn effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    /// Show an interactive message, replacing the pressed one if any
    fn show(&mut self, text: impl Into<String>, keyboard: Keyboard) {
        let target = self.origin.map_or(ShowTarget::New, ShowTarget::Replace);
        self.effects.push(Effect::show(text, keyboard, target));
    }

    fn notice(&mut self, text: impl Into<String>) {
        self.effects.push(Effect::notice(text));
    }

    /// Put the uploaded images of a block or question on screen
    fn media(&mut self, images: &[StoredImage]) {
        let paths: Vec<String> = images.iter().filter_map(|i| i.file_path.clone()).collect();
        if paths.is_empty() {
            self.effects.push(Effect::ClearMedia);
        } else {
            self.effects.push(Effect::ShowMedia { paths });
        }
    }

    fn require_admin(&self, what: impl Into<String>) -> Step {
        if self.ctx.is_admin {
            Ok(())
        } else {
            Err(TransitionError::NotPermitted(what.into()))
        }
    }

    // ==================== Entry Points ====================

    fn start(&mut self, display_name: Option<String>) {
        if display_name.is_some() {
            self.context().display_name = display_name;
        }
        self.context().reset_all();
        self.set_state(BotState::MainMenu);
        self.effect(Effect::ClearMedia);
        let text = msg::greeting(self.session.context.display_name.as_deref());
        let keyboard = self.main_menu_keyboard();
        self.show(text, keyboard);
    }

    fn on_text(&mut self, text: &str) -> Step {
        match self.state() {
            BotState::AwaitingSearchQuery => self.search(text),
            BotState::AwaitingImage => {
                self.require_admin("text in image upload")?;
                self.show(msg::MSG_PLEASE_SEND_PHOTO, cancel_keyboard());
                Ok(())
            }
            BotState::AwaitingCourseJson
            | BotState::EditCourseNameDesc
            | BotState::EditSectionNameDesc
            | BotState::EditTopicJson => self.on_document(text.as_bytes()),
            _ => {
                self.fallback();
                Ok(())
            }
        }
    }

    fn on_document(&mut self, bytes: &[u8]) -> Step {
        match self.state() {
            BotState::AwaitingCourseJson => self.receive_course(bytes),
            BotState::EditCourseNameDesc => self.receive_course_rename(bytes),
            BotState::EditSectionNameDesc => self.receive_section_rename(bytes),
            BotState::EditTopicJson => self.receive_topic(bytes),
            BotState::AwaitingImage => {
                self.require_admin("document in image upload")?;
                self.show(msg::MSG_PLEASE_SEND_PHOTO, cancel_keyboard());
                Ok(())
            }
            _ => {
                let keyboard = Keyboard::new().button(msg::BUTTON_MAIN_MENU, Action::MainMenu);
                self.show(msg::MSG_UNEXPECTED_FILE, keyboard);
                Ok(())
            }
        }
    }

    fn on_photo(&mut self, file_id: String) -> Step {
        if self.state() == BotState::AwaitingImage {
            return self.receive_image(file_id);
        }
        let keyboard = Keyboard::new().button(msg::BUTTON_MAIN_MENU, Action::MainMenu);
        self.show(msg::MSG_UNEXPECTED_FILE, keyboard);
        Ok(())
    }

    fn on_action(&mut self, action: Action) -> Step {
        if action.requires_admin() {
            self.require_admin(action.encode())?;
        }

        match action {
            Action::MainMenu | Action::Cancel => {
                self.main_menu();
                Ok(())
            }
            Action::Back => self.back(),
            Action::Retry => self.retry(),

            Action::MyCourses => self.show_course_list(ListSource::MyCourses, 0),
            Action::AllCourses => self.show_course_list(ListSource::AllCourses, 0),
            Action::SearchCourses => {
                self.prompt_search();
                Ok(())
            }
            Action::CoursesPage { source, page } => self.show_course_list(source, page),
            Action::SelectCourse { course_id } => self.select_course(course_id),
            Action::SectionsPage { course_id, page } => self.show_sections(course_id, page),
            Action::SelectSection { section_id } => self.select_section(section_id),
            Action::TopicsPage { section_id, page } => self.show_topics(section_id, page, false),
            Action::SelectTopic { topic_id } => self.select_topic(topic_id),
            Action::BackToCourses if self.state().is_admin() => {
                let page = self.session.context.admin().map_or(0, |a| a.courses_page);
                self.admin_course_list(AdminListPurpose::Edit, page)
            }
            Action::BackToCourses => self.back_to_courses(),
            Action::BackToSections => self.back_to_sections(),
            Action::BackToTopics => self.back_to_topics(),
            Action::Statistics => self.show_statistics(),

            Action::NextBlock => self.next_block(),
            Action::PrevBlock => self.prev_block(),
            Action::BackToBlockText => self.back_to_block_text(),
            Action::NextQuestion => match self.state() {
                BotState::Question => self.quiz_next(),
                BotState::TopicLearning => self.learning_next_question(),
                _ => {
                    self.fallback();
                    Ok(())
                }
            },
            Action::PrevQuestion => match self.state() {
                BotState::Question => self.quiz_prev(),
                BotState::TopicLearning => self.learning_prev_question(),
                _ => {
                    self.fallback();
                    Ok(())
                }
            },
            Action::Answer {
                question_id,
                option_id,
            } => match self.state() {
                BotState::Question => self.quiz_answer(question_id, option_id),
                BotState::TopicLearning => self.learning_answer(question_id, option_id),
                _ => {
                    self.fallback();
                    Ok(())
                }
            },

            Action::TestTopic { topic_id } => self.start_quiz(TestKind::Topic, Some(topic_id)),
            Action::TestSection { section_id } => {
                self.start_quiz(TestKind::Section, Some(section_id))
            }
            Action::TestCourse { course_id } => self.start_quiz(TestKind::Course, Some(course_id)),
            Action::MyMistakes => self.start_quiz(TestKind::Mistakes, None),

            Action::CreateCourse
            | Action::EditCourse
            | Action::DeleteCourse
            | Action::AdminCoursesPage { .. }
            | Action::SelectCourseForEdit { .. }
            | Action::SelectCourseForDelete { .. }
            | Action::ConfirmDeleteCourse { .. }
            | Action::EditCourseAction(_)
            | Action::AdminSectionsPage { .. }
            | Action::SelectSectionForEdit { .. }
            | Action::EditSectionAction(_)
            | Action::AdminTopicsPage { .. }
            | Action::SelectTopicForEdit { .. }
            | Action::AdminBackToSections
            | Action::AdminBackToTopics => self.admin_action(action),
        }
    }

    // ==================== Shared Screens ====================

    fn main_menu_keyboard(&self) -> Keyboard {
        let keyboard = Keyboard::new()
            .row(vec![
                Button::new(msg::BUTTON_MY_COURSES, Action::MyCourses),
                Button::new(msg::BUTTON_ALL_COURSES, Action::AllCourses),
            ])
            .row(vec![
                Button::new(msg::BUTTON_SEARCH, Action::SearchCourses),
                Button::new(msg::BUTTON_STATISTICS, Action::Statistics),
            ])
            .button(msg::BUTTON_MISTAKES, Action::MyMistakes);
        if !self.ctx.is_admin {
            return keyboard;
        }
        keyboard.row(vec![
            Button::new(msg::BUTTON_CREATE_COURSE, Action::CreateCourse),
            Button::new(msg::BUTTON_EDIT_COURSE, Action::EditCourse),
            Button::new(msg::BUTTON_DELETE_COURSE, Action::DeleteCourse),
        ])
    }

    /// Main menu, discarding navigation and any in-flight admin edit
    fn main_menu(&mut self) {
        self.context().reset_all();
        self.show_main_menu(msg::MSG_MAIN_MENU);
    }

    fn show_main_menu(&mut self, text: &str) {
        self.set_state(BotState::MainMenu);
        self.effect(Effect::ClearMedia);
        let keyboard = self.main_menu_keyboard();
        self.show(text, keyboard);
    }

    /// Unrecognised input: back to the main menu, keeping admin edit ids
    fn fallback(&mut self) {
        self.context().reset_navigation();
        self.show_main_menu(msg::MSG_MAIN_MENU);
    }

    /// Entity vanished between render and press
    fn not_found(&mut self, text: &str, back: Action) {
        let keyboard = Keyboard::new().button(msg::BUTTON_BACK, back);
        self.show(text, keyboard);
    }

    fn back(&mut self) -> Step {
        match self.state() {
            BotState::CourseSections => self.back_to_courses(),
            BotState::SectionTopics => self.back_to_sections(),
            BotState::TopicLearning => self.back_to_topics(),
            BotState::Question => self.exit_quiz(),
            _ => {
                self.main_menu();
                Ok(())
            }
        }
    }

    fn retry(&mut self) -> Step {
        match self.state() {
            BotState::AwaitingSearchQuery | BotState::SearchResults => {
                self.prompt_search();
                Ok(())
            }
            state if state.is_admin() => self.admin_retry(),
            _ => {
                self.fallback();
                Ok(())
            }
        }
    }
}

fn cancel_keyboard() -> Keyboard {
    Keyboard::new().button(msg::BUTTON_CANCEL, Action::Cancel)
}

fn retry_cancel_keyboard(cancel: Action) -> Keyboard {
    Keyboard::new().row(vec![
        Button::new(msg::BUTTON_RETRY, Action::Retry),
        Button::new(msg::BUTTON_CANCEL, cancel),
    ])
}

/// Fetch a page, falling back to the last page when the index ran past
/// the end (e.g. items deleted since the button was rendered)
fn fetch_page<T>(
    page: usize,
    fetch: impl Fn(usize) -> CatalogResult<Page<T>>,
) -> CatalogResult<Page<T>> {
    let result = fetch(page)?;
    if result.items.is_empty() && !result.is_empty() && page >= result.total_pages {
        return fetch(result.total_pages - 1);
    }
    Ok(result)
}

/// Prev/next row for a paged list; empty when there is a single page
fn page_row<T>(page: &Page<T>, to: impl Fn(usize) -> Action) -> Vec<Button> {
    let mut row = Vec::new();
    if page.has_previous {
        row.push(Button::new(
            msg::BUTTON_PREV_PAGE,
            to(page.current_page.saturating_sub(1)),
        ));
    }
    if page.has_next {
        row.push(Button::new(msg::BUTTON_NEXT_PAGE, to(page.current_page + 1)));
    }
    row
}
