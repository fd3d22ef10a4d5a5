//! Admin content workflows: import, edit, rename, delete and image uploads

use super::{cancel_keyboard, fetch_page, page_row, retry_cancel_keyboard, Step, TransitionError, Turn};
use crate::db::{ImportedTree, Renamed};
use crate::import::{self, ImportError};
use crate::state_machine::action::{Action, AdminListPurpose, EditTarget};
use crate::state_machine::effect::{Button, Effect, Keyboard};
use crate::state_machine::event::{ImportScope, RenameLevel};
use crate::state_machine::messages as msg;
use crate::state_machine::state::{AdminEdit, BotState, ImageQueue};

fn course_actions_keyboard() -> Keyboard {
    Keyboard::new()
        .button(msg::BUTTON_NAME_DESC, Action::EditCourseAction(EditTarget::NameDesc))
        .button(msg::BUTTON_SECTIONS, Action::EditCourseAction(EditTarget::Children))
        .row(vec![
            Button::new(msg::BUTTON_BACK, Action::EditCourse),
            Button::new(msg::BUTTON_MAIN_MENU, Action::MainMenu),
        ])
}

fn section_actions_keyboard() -> Keyboard {
    Keyboard::new()
        .button(msg::BUTTON_NAME_DESC, Action::EditSectionAction(EditTarget::NameDesc))
        .button(msg::BUTTON_TOPICS, Action::EditSectionAction(EditTarget::Children))
        .row(vec![
            Button::new(msg::BUTTON_BACK, Action::AdminBackToSections),
            Button::new(msg::BUTTON_MAIN_MENU, Action::MainMenu),
        ])
}

impl Turn<'_> {
    fn edit(&self) -> AdminEdit {
        self.session.context.admin().cloned().unwrap_or_default()
    }

    fn unexpected(&self, event: &'static str) -> TransitionError {
        TransitionError::UnexpectedEvent {
            event,
            state: self.state(),
        }
    }

    /// Invalid upload: report every problem and stay for a retry
    fn import_rejected(&mut self, error: &ImportError) {
        tracing::debug!(state = %self.state(), error = %error, "Rejected admin upload");
        self.show(error.to_string(), retry_cancel_keyboard(Action::Cancel));
    }

    pub(super) fn admin_action(&mut self, action: Action) -> Step {
        match action {
            Action::CreateCourse => {
                self.context().reset_all();
                self.context().admin_mut();
                self.prompt_course_json();
                Ok(())
            }
            Action::EditCourse => {
                let page = self.edit().courses_page;
                self.admin_course_list(AdminListPurpose::Edit, page)
            }
            Action::DeleteCourse => self.admin_course_list(AdminListPurpose::Delete, 0),
            Action::AdminCoursesPage { purpose, page } => self.admin_course_list(purpose, page),
            Action::SelectCourseForEdit { course_id } => self.select_course_for_edit(course_id),
            Action::SelectCourseForDelete { course_id } => self.select_course_for_delete(course_id),
            Action::ConfirmDeleteCourse { course_id } => {
                if self.state() != BotState::DeleteCourseList {
                    return Err(TransitionError::Stale(format!("delete confirmation for course {course_id}")));
                }
                self.effect(Effect::DeleteCourse { course_id });
                Ok(())
            }
            Action::EditCourseAction(EditTarget::NameDesc) => {
                if self.edit().course_id.is_none() {
                    self.nothing_selected(msg::MSG_COURSE_NOT_SELECTED);
                    return Ok(());
                }
                self.set_state(BotState::EditCourseNameDesc);
                self.show(msg::MSG_SEND_JSON_COURSE_NAME_DESC, cancel_keyboard());
                Ok(())
            }
            Action::EditCourseAction(EditTarget::Children) => match self.edit().course_id {
                Some(course_id) => self.admin_sections_list(course_id, 0),
                None => {
                    self.nothing_selected(msg::MSG_COURSE_NOT_SELECTED);
                    Ok(())
                }
            },
            Action::AdminSectionsPage { course_id, page } => self.admin_sections_list(course_id, page),
            Action::SelectSectionForEdit { section_id } => self.select_section_for_edit(section_id),
            Action::EditSectionAction(EditTarget::NameDesc) => {
                if self.edit().section_id.is_none() {
                    self.nothing_selected(msg::MSG_SECTION_NOT_SELECTED);
                    return Ok(());
                }
                self.set_state(BotState::EditSectionNameDesc);
                self.show(msg::MSG_SEND_JSON_SECTION_NAME_DESC, cancel_keyboard());
                Ok(())
            }
            Action::EditSectionAction(EditTarget::Children) => match self.edit().section_id {
                Some(section_id) => self.admin_topics_list(section_id, 0),
                None => {
                    self.nothing_selected(msg::MSG_SECTION_NOT_SELECTED);
                    Ok(())
                }
            },
            Action::AdminTopicsPage { section_id, page } => self.admin_topics_list(section_id, page),
            Action::SelectTopicForEdit { topic_id } => self.select_topic_for_edit(topic_id),
            Action::AdminBackToSections => {
                let edit = self.edit();
                match edit.course_id {
                    Some(course_id) => self.admin_sections_list(course_id, edit.sections_page),
                    None => {
                        self.nothing_selected(msg::MSG_COURSE_NOT_SELECTED);
                        Ok(())
                    }
                }
            }
            Action::AdminBackToTopics => {
                let edit = self.edit();
                match edit.section_id {
                    Some(section_id) => self.admin_topics_list(section_id, edit.topics_page),
                    None => {
                        self.nothing_selected(msg::MSG_SECTION_NOT_SELECTED);
                        Ok(())
                    }
                }
            }
            other => {
                self.fallback();
                tracing::warn!(action = %other, "Non-admin action routed to admin controller");
                Ok(())
            }
        }
    }

    fn nothing_selected(&mut self, text: &str) {
        let keyboard = Keyboard::new().button(msg::BUTTON_MAIN_MENU, Action::MainMenu);
        self.show(text, keyboard);
    }

    fn prompt_course_json(&mut self) {
        self.set_state(BotState::AwaitingCourseJson);
        self.show(msg::MSG_SEND_JSON_COURSE, cancel_keyboard());
    }

    fn prompt_topic_json(&mut self) {
        self.set_state(BotState::EditTopicJson);
        let keyboard = Keyboard::new().row(vec![
            Button::new(msg::BUTTON_BACK, Action::AdminBackToTopics),
            Button::new(msg::BUTTON_CANCEL, Action::Cancel),
        ]);
        self.show(msg::MSG_SEND_JSON_TOPIC, keyboard);
    }

    // ==================== Lists ====================

    pub(super) fn admin_course_list(&mut self, purpose: AdminListPurpose, page: usize) -> Step {
        let catalog = self.catalog;
        let courses = fetch_page(page, |p| catalog.all_courses(p))?;
        let state = match purpose {
            AdminListPurpose::Edit => BotState::EditCourseList,
            AdminListPurpose::Delete => BotState::DeleteCourseList,
        };
        self.context().path = Default::default();
        let edit = self.context().admin_mut();
        edit.courses_page = courses.current_page;
        edit.images = ImageQueue::default();
        self.set_state(state);
        self.effect(Effect::ClearMedia);

        if courses.is_empty() {
            let text = match purpose {
                AdminListPurpose::Edit => msg::MSG_NO_COURSES_TO_EDIT,
                AdminListPurpose::Delete => msg::MSG_NO_COURSES_TO_DELETE,
            };
            self.nothing_selected(text);
            return Ok(());
        }

        let (shown, pages, total) = (courses.display_page(), courses.total_pages, courses.total_items);
        let header = match purpose {
            AdminListPurpose::Edit => msg::edit_courses_header(shown, pages, total),
            AdminListPurpose::Delete => msg::delete_courses_header(shown, pages, total),
        };
        let mut keyboard = Keyboard::new();
        for course in &courses.items {
            let action = match purpose {
                AdminListPurpose::Edit => Action::SelectCourseForEdit {
                    course_id: course.id,
                },
                AdminListPurpose::Delete => Action::SelectCourseForDelete {
                    course_id: course.id,
                },
            };
            keyboard = keyboard.button(course.title.clone(), action);
        }
        let keyboard = keyboard
            .row(page_row(&courses, |page| Action::AdminCoursesPage { purpose, page }))
            .button(msg::BUTTON_MAIN_MENU, Action::MainMenu);
        self.show(header, keyboard);
        Ok(())
    }

    fn admin_sections_list(&mut self, course_id: i64, page: usize) -> Step {
        let catalog = self.catalog;
        let Some(course) = catalog.course(course_id)? else {
            self.not_found(msg::MSG_NOT_FOUND, Action::EditCourse);
            return Ok(());
        };
        let sections = fetch_page(page, |p| catalog.sections(course.id, p))?;
        let edit = self.context().admin_mut();
        edit.course_id = Some(course.id);
        edit.section_id = None;
        edit.topic_id = None;
        edit.sections_page = sections.current_page;
        self.set_state(BotState::EditCourseSectionChoose);

        let back = Action::SelectCourseForEdit { course_id };
        if sections.is_empty() {
            let keyboard = Keyboard::new().button(msg::BUTTON_BACK, back);
            self.show(msg::MSG_NO_SECTIONS, keyboard);
            return Ok(());
        }

        let mut keyboard = Keyboard::new();
        for section in &sections.items {
            keyboard = keyboard.button(
                section.title.clone(),
                Action::SelectSectionForEdit {
                    section_id: section.id,
                },
            );
        }
        let keyboard = keyboard
            .row(page_row(&sections, |page| Action::AdminSectionsPage { course_id, page }))
            .row(vec![
                Button::new(msg::BUTTON_BACK, back),
                Button::new(msg::BUTTON_MAIN_MENU, Action::MainMenu),
            ]);
        let text = msg::edit_sections_header(
            &course.title,
            sections.display_page(),
            sections.total_pages,
            sections.total_items,
        );
        self.show(text, keyboard);
        Ok(())
    }

    fn admin_topics_list(&mut self, section_id: i64, page: usize) -> Step {
        let catalog = self.catalog;
        let Some(section) = catalog.section(section_id)? else {
            self.not_found(msg::MSG_NOT_FOUND, Action::AdminBackToSections);
            return Ok(());
        };
        let topics = fetch_page(page, |p| catalog.topics(section.id, p))?;
        let edit = self.context().admin_mut();
        edit.course_id = Some(section.course_id);
        edit.section_id = Some(section.id);
        edit.topic_id = None;
        edit.topics_page = topics.current_page;
        self.set_state(BotState::EditSectionChooseTopic);

        let back = Action::SelectSectionForEdit { section_id };
        if topics.is_empty() {
            let keyboard = Keyboard::new().button(msg::BUTTON_BACK, back);
            self.show(msg::MSG_NO_TOPICS, keyboard);
            return Ok(());
        }

        let mut keyboard = Keyboard::new();
        for topic in &topics.items {
            keyboard = keyboard.button(
                topic.title.clone(),
                Action::SelectTopicForEdit { topic_id: topic.id },
            );
        }
        let keyboard = keyboard
            .row(page_row(&topics, |page| Action::AdminTopicsPage { section_id, page }))
            .row(vec![
                Button::new(msg::BUTTON_BACK, back),
                Button::new(msg::BUTTON_MAIN_MENU, Action::MainMenu),
            ]);
        let text = msg::edit_topics_header(
            &section.title,
            topics.display_page(),
            topics.total_pages,
            topics.total_items,
        );
        self.show(text, keyboard);
        Ok(())
    }

    // ==================== Selection ====================

    fn select_course_for_edit(&mut self, course_id: i64) -> Step {
        if self.catalog.course(course_id)?.is_none() {
            self.not_found(msg::MSG_NOT_FOUND, Action::EditCourse);
            return Ok(());
        }
        let edit = self.context().admin_mut();
        edit.course_id = Some(course_id);
        edit.section_id = None;
        edit.topic_id = None;
        self.set_state(BotState::EditCourseChooseAction);
        self.show(msg::MSG_WHAT_TO_CHANGE, course_actions_keyboard());
        Ok(())
    }

    fn select_course_for_delete(&mut self, course_id: i64) -> Step {
        let Some(course) = self.catalog.course(course_id)? else {
            self.not_found(msg::MSG_NOT_FOUND, Action::DeleteCourse);
            return Ok(());
        };
        let page = self.edit().courses_page;
        self.context().admin_mut().course_id = Some(course_id);
        self.set_state(BotState::DeleteCourseList);
        let keyboard = Keyboard::new().row(vec![
            Button::new(msg::BUTTON_YES_DELETE, Action::ConfirmDeleteCourse { course_id }),
            Button::new(
                msg::BUTTON_NO,
                Action::AdminCoursesPage {
                    purpose: AdminListPurpose::Delete,
                    page,
                },
            ),
        ]);
        self.show(msg::confirm_delete(&course.title), keyboard);
        Ok(())
    }

    fn select_section_for_edit(&mut self, section_id: i64) -> Step {
        let Some(section) = self.catalog.section(section_id)? else {
            self.not_found(msg::MSG_NOT_FOUND, Action::AdminBackToSections);
            return Ok(());
        };
        let edit = self.context().admin_mut();
        edit.course_id = Some(section.course_id);
        edit.section_id = Some(section.id);
        edit.topic_id = None;
        self.set_state(BotState::EditSectionChooseAction);
        self.show(msg::MSG_WHAT_TO_CHANGE_SECTION, section_actions_keyboard());
        Ok(())
    }

    fn select_topic_for_edit(&mut self, topic_id: i64) -> Step {
        let Some(topic) = self.catalog.topic(topic_id)? else {
            self.not_found(msg::MSG_NOT_FOUND, Action::AdminBackToTopics);
            return Ok(());
        };
        let edit = self.context().admin_mut();
        edit.section_id = Some(topic.section_id);
        edit.topic_id = Some(topic.id);
        self.prompt_topic_json();
        Ok(())
    }

    // ==================== Uploads ====================

    pub(super) fn receive_course(&mut self, bytes: &[u8]) -> Step {
        self.require_admin("course upload")?;
        match import::parse_course(bytes) {
            Ok(course) => self.effect(Effect::ImportCourse { course }),
            Err(e) => self.import_rejected(&e),
        }
        Ok(())
    }

    pub(super) fn receive_topic(&mut self, bytes: &[u8]) -> Step {
        self.require_admin("topic upload")?;
        let Some(topic_id) = self.edit().topic_id else {
            self.nothing_selected(msg::MSG_NOT_FOUND);
            return Ok(());
        };
        match import::parse_topic(bytes) {
            Ok(topic) => self.effect(Effect::ImportTopic { topic_id, topic }),
            Err(e) => self.import_rejected(&e),
        }
        Ok(())
    }

    pub(super) fn receive_course_rename(&mut self, bytes: &[u8]) -> Step {
        self.require_admin("course rename")?;
        let Some(course_id) = self.edit().course_id else {
            self.nothing_selected(msg::MSG_COURSE_NOT_SELECTED);
            return Ok(());
        };
        match import::parse_name_desc(bytes) {
            Ok(update) => self.effect(Effect::RenameCourse { course_id, update }),
            Err(e) => self.import_rejected(&e),
        }
        Ok(())
    }

    pub(super) fn receive_section_rename(&mut self, bytes: &[u8]) -> Step {
        self.require_admin("section rename")?;
        let Some(section_id) = self.edit().section_id else {
            self.nothing_selected(msg::MSG_SECTION_NOT_SELECTED);
            return Ok(());
        };
        match import::parse_name_desc(bytes) {
            Ok(update) => self.effect(Effect::RenameSection { section_id, update }),
            Err(e) => self.import_rejected(&e),
        }
        Ok(())
    }

    pub(super) fn receive_image(&mut self, file_id: String) -> Step {
        self.require_admin("image upload")?;
        match self.edit().images.current() {
            Some(image) => {
                self.effect(Effect::StoreImage {
                    file_id,
                    image: image.clone(),
                });
                Ok(())
            }
            None => self.images_complete(),
        }
    }

    fn request_image(&mut self) -> Step {
        let queue = self.edit().images;
        let Some(image) = queue.current() else {
            return self.images_complete();
        };
        self.set_state(BotState::AwaitingImage);
        let text = msg::image_request(queue.index + 1, queue.pending.len(), &image.description);
        self.show(text, cancel_keyboard());
        Ok(())
    }

    fn images_complete(&mut self) -> Step {
        self.context().admin_mut().images = ImageQueue::default();
        self.notice(msg::MSG_IMAGES_COMPLETE);
        let edit = self.edit();
        match edit.section_id {
            Some(section_id) => self.admin_topics_list(section_id, edit.topics_page),
            None => {
                self.main_menu();
                Ok(())
            }
        }
    }

    // ==================== Write Results ====================

    pub(super) fn import_finished(&mut self, scope: ImportScope, result: Result<ImportedTree, String>) -> Step {
        let expected = match scope {
            ImportScope::Course => BotState::AwaitingCourseJson,
            ImportScope::Topic { .. } => BotState::EditTopicJson,
        };
        if self.state() != expected {
            return Err(self.unexpected("import_finished"));
        }
        let tree = match result {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!(error = %e, "Import failed");
                let text = format!("{} {e}", msg::MSG_IMPORT_FAILED);
                self.show(text, retry_cancel_keyboard(Action::Cancel));
                return Ok(());
            }
        };
        tracing::info!(root_id = tree.root_id, images = tree.pending_images.len(), "Import committed");

        let no_images = tree.pending_images.is_empty();
        let edit = self.context().admin_mut();
        if scope == ImportScope::Course {
            edit.course_id = Some(tree.root_id);
            edit.section_id = None;
        }
        edit.images = ImageQueue::new(tree.pending_images);

        match (scope, no_images) {
            (_, false) => self.request_image(),
            (ImportScope::Course, true) => {
                self.context().reset_all();
                self.show_main_menu(&msg::course_import_success(&tree.title));
                Ok(())
            }
            (ImportScope::Topic { .. }, true) => {
                self.notice(msg::MSG_TOPIC_UPDATED_NO_IMAGES);
                let edit = self.edit();
                match edit.section_id {
                    Some(section_id) => self.admin_topics_list(section_id, edit.topics_page),
                    None => {
                        self.main_menu();
                        Ok(())
                    }
                }
            }
        }
    }

    pub(super) fn image_stored(&mut self, image_id: i64, result: Result<(), String>) -> Step {
        if self.state() != BotState::AwaitingImage {
            return Err(self.unexpected("image_stored"));
        }
        if self.edit().images.current().map(|i| i.image_id) != Some(image_id) {
            return Err(TransitionError::Stale(format!("stored image {image_id}")));
        }
        if let Err(e) = result {
            tracing::warn!(image_id, error = %e, "Image upload failed");
            self.show(msg::MSG_SAVE_IMAGE_ERROR, retry_cancel_keyboard(Action::Cancel));
            return Ok(());
        }
        self.context().admin_mut().images.index += 1;
        self.request_image()
    }

    pub(super) fn rename_finished(&mut self, level: RenameLevel, result: Result<Renamed, String>) -> Step {
        let expected = match level {
            RenameLevel::Course => BotState::EditCourseNameDesc,
            RenameLevel::Section => BotState::EditSectionNameDesc,
        };
        if self.state() != expected {
            return Err(self.unexpected("rename_finished"));
        }
        let renamed = match result {
            Ok(renamed) => renamed,
            Err(e) => {
                tracing::warn!(error = %e, "Rename failed");
                let text = format!("{} {e}", msg::MSG_UPDATE_FAILED);
                self.show(text, retry_cancel_keyboard(Action::Cancel));
                return Ok(());
            }
        };
        let (what, state, keyboard) = match level {
            RenameLevel::Course => ("Course", BotState::EditCourseChooseAction, course_actions_keyboard()),
            RenameLevel::Section => ("Section", BotState::EditSectionChooseAction, section_actions_keyboard()),
        };
        let text = msg::rename_report(
            what,
            &renamed.old_title,
            &renamed.new_title,
            &renamed.old_description,
            &renamed.new_description,
        );
        self.set_state(state);
        self.show(text, keyboard);
        Ok(())
    }

    pub(super) fn course_deleted(&mut self, course_id: i64, result: Result<(), String>) -> Step {
        if self.state() != BotState::DeleteCourseList {
            return Err(self.unexpected("course_deleted"));
        }
        let page = self.edit().courses_page;
        if let Err(e) = result {
            tracing::warn!(course_id, error = %e, "Course deletion failed");
            let keyboard = Keyboard::new().row(vec![
                Button::new(
                    msg::BUTTON_BACK,
                    Action::AdminCoursesPage {
                        purpose: AdminListPurpose::Delete,
                        page,
                    },
                ),
                Button::new(msg::BUTTON_MAIN_MENU, Action::MainMenu),
            ]);
            self.show(msg::MSG_ERROR_DELETING_COURSE, keyboard);
            return Ok(());
        }
        tracing::info!(course_id, "Course deleted");
        self.context().admin_mut().course_id = None;
        self.notice(msg::MSG_COURSE_DELETED);
        self.admin_course_list(AdminListPurpose::Delete, page)
    }

    pub(super) fn admin_retry(&mut self) -> Step {
        match self.state() {
            BotState::AwaitingCourseJson => {
                self.prompt_course_json();
                Ok(())
            }
            BotState::AwaitingImage => self.request_image(),
            BotState::EditTopicJson => {
                self.prompt_topic_json();
                Ok(())
            }
            BotState::EditCourseNameDesc => {
                self.show(msg::MSG_SEND_JSON_COURSE_NAME_DESC, cancel_keyboard());
                Ok(())
            }
            BotState::EditSectionNameDesc => {
                self.show(msg::MSG_SEND_JSON_SECTION_NAME_DESC, cancel_keyboard());
                Ok(())
            }
            BotState::DeleteCourseList => {
                let page = self.edit().courses_page;
                self.admin_course_list(AdminListPurpose::Delete, page)
            }
            _ => {
                self.fallback();
                Ok(())
            }
        }
    }
}
