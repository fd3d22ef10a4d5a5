//! Browsing the course tree and learning through a topic's blocks

use super::{fetch_page, page_row, Step, TransitionError, Turn};
use crate::catalog::sanitize_query;
use crate::db::{AccessLevel, AnswerMode, Course, Section, TestKind};
use crate::progress::{course_status, section_status, relative_time, test_status, topic_status};
use crate::state_machine::action::Action;
use crate::state_machine::effect::{Button, Effect, Keyboard};
use crate::state_machine::messages as msg;
use crate::state_machine::state::{
    BlockCursor, BotState, BrowseList, LearningTraversal, ListSource, Mode,
};
use rand::seq::SliceRandom;

impl Turn<'_> {
    // ==================== Course Lists ====================

    /// Copy the visible list page into the path before drilling in
    pub(super) fn capture_page_marker(&mut self) {
        let page = self.session.context.browse_page();
        let state = self.state();
        let path = &mut self.context().path;
        if let Some(source) = state.list_source() {
            path.source = source;
            path.source_page = page;
        } else if state == BotState::CourseSections {
            path.sections_page = page;
        } else if state == BotState::SectionTopics {
            path.topics_page = page;
        }
    }

    fn set_browse_page(&mut self, page: usize) {
        self.context().mode = Mode::Browse(BrowseList { page });
    }

    pub(super) fn prompt_search(&mut self) {
        self.set_state(BotState::AwaitingSearchQuery);
        let keyboard = Keyboard::new().button(msg::BUTTON_MAIN_MENU, Action::MainMenu);
        self.show(msg::MSG_SEARCH_PROMPT, keyboard);
    }

    pub(super) fn search(&mut self, raw: &str) -> Step {
        let query = sanitize_query(raw);
        if query.is_empty() {
            self.prompt_search();
            return Ok(());
        }
        self.context().path.search_query = Some(query);
        self.show_course_list(ListSource::Search, 0)
    }

    pub(super) fn show_course_list(&mut self, source: ListSource, page: usize) -> Step {
        let user_id = self.ctx.user_id;
        let catalog = self.catalog;
        let query = self.session.context.path.search_query.clone();
        let courses = match source {
            ListSource::AllCourses => fetch_page(page, |p| catalog.all_courses(p))?,
            ListSource::MyCourses => fetch_page(page, |p| catalog.my_courses(user_id, p))?,
            ListSource::Search => {
                let Some(query) = query.as_deref() else {
                    self.prompt_search();
                    return Ok(());
                };
                fetch_page(page, |p| catalog.search_courses(query, p))?
            }
        };

        let path = &mut self.context().path;
        path.source = source;
        path.source_page = courses.current_page;
        path.course_id = None;
        path.section_id = None;
        path.topic_id = None;
        self.set_browse_page(courses.current_page);
        self.set_state(source.state());
        self.effect(Effect::ClearMedia);

        if courses.is_empty() {
            let (text, keyboard) = match source {
                ListSource::MyCourses => (
                    msg::MSG_NO_MY_COURSES.to_string(),
                    Keyboard::new().button(msg::BUTTON_ALL_COURSES, Action::AllCourses),
                ),
                ListSource::AllCourses => (msg::MSG_NO_COURSES.to_string(), Keyboard::new()),
                ListSource::Search => (
                    msg::search_not_found(query.as_deref().unwrap_or_default()),
                    Keyboard::new().button(msg::BUTTON_RETRY_SEARCH, Action::Retry),
                ),
            };
            self.show(text, keyboard.button(msg::BUTTON_MAIN_MENU, Action::MainMenu));
            return Ok(());
        }

        let (shown, pages, total) = (courses.display_page(), courses.total_pages, courses.total_items);
        let header = match source {
            ListSource::MyCourses => msg::my_courses_header(shown, pages, total),
            ListSource::AllCourses => msg::all_courses_header(shown, pages, total),
            ListSource::Search => {
                msg::search_results_header(query.as_deref().unwrap_or_default(), shown, pages, total)
            }
        };

        let mut keyboard = Keyboard::new();
        for course in &courses.items {
            keyboard = keyboard.row(self.course_row(course)?);
        }
        let keyboard = keyboard
            .row(page_row(&courses, |page| Action::CoursesPage { source, page }))
            .button(msg::BUTTON_MAIN_MENU, Action::MainMenu);
        self.show(header, keyboard);
        Ok(())
    }

    fn course_row(&self, course: &Course) -> Result<Vec<Button>, TransitionError> {
        let user_id = self.ctx.user_id;
        let status = course_status(self.catalog, user_id, course.id)?;
        let test = test_status(self.catalog.test_score(user_id, TestKind::Course, course.id)?);
        Ok(vec![
            Button::new(
                format!("{status} {}", course.title),
                Action::SelectCourse {
                    course_id: course.id,
                },
            ),
            Button::new(
                format!("{test} {}", msg::BUTTON_TEST),
                Action::TestCourse {
                    course_id: course.id,
                },
            ),
        ])
    }

    // ==================== Sections ====================

    pub(super) fn select_course(&mut self, course_id: i64) -> Step {
        let Some(course) = self.catalog.course(course_id)? else {
            self.not_found(msg::MSG_NOT_FOUND, Action::BackToCourses);
            return Ok(());
        };
        self.capture_page_marker();
        let path = &mut self.context().path;
        path.course_id = Some(course.id);
        path.sections_page = 0;
        path.section_id = None;
        path.topic_id = None;
        self.effect(Effect::TouchAccess {
            level: AccessLevel::Course,
            entity_id: course.id,
        });
        self.effect(Effect::ClearMedia);
        self.render_sections(&course, 0)
    }

    pub(super) fn show_sections(&mut self, course_id: i64, page: usize) -> Step {
        let Some(course) = self.catalog.course(course_id)? else {
            self.not_found(msg::MSG_NOT_FOUND, Action::BackToCourses);
            return Ok(());
        };
        self.render_sections(&course, page)
    }

    fn render_sections(&mut self, course: &Course, page: usize) -> Step {
        let catalog = self.catalog;
        let user_id = self.ctx.user_id;
        let sections = fetch_page(page, |p| catalog.sections(course.id, p))?;
        let last_visit = relative_time(
            catalog.last_accessed(user_id, AccessLevel::Course, course.id)?,
            self.ctx.now,
        );

        self.context().path.course_id = Some(course.id);
        self.set_browse_page(sections.current_page);
        self.set_state(BotState::CourseSections);

        let mut text = msg::course_sections_header(
            &course.title,
            &course.description,
            &last_visit,
            sections.display_page(),
            sections.total_pages,
            sections.total_items,
        );
        if sections.is_empty() {
            text = format!("{text}\n\n{}", msg::MSG_NO_SECTIONS);
        }

        let mut keyboard = Keyboard::new();
        for section in &sections.items {
            keyboard = keyboard.row(self.section_row(section)?);
        }
        let course_id = course.id;
        let keyboard = keyboard
            .row(page_row(&sections, |page| Action::SectionsPage { course_id, page }))
            .row(vec![
                Button::new(msg::BUTTON_BACK, Action::BackToCourses),
                Button::new(msg::BUTTON_MAIN_MENU, Action::MainMenu),
            ]);
        self.show(text, keyboard);
        Ok(())
    }

    fn section_row(&self, section: &Section) -> Result<Vec<Button>, TransitionError> {
        let user_id = self.ctx.user_id;
        let status = section_status(self.catalog, user_id, section.id)?;
        let test = test_status(self.catalog.test_score(user_id, TestKind::Section, section.id)?);
        Ok(vec![
            Button::new(
                format!("{status} {}", section.title),
                Action::SelectSection {
                    section_id: section.id,
                },
            ),
            Button::new(
                format!("{test} {}", msg::BUTTON_TEST),
                Action::TestSection {
                    section_id: section.id,
                },
            ),
        ])
    }

    // ==================== Topics ====================

    pub(super) fn select_section(&mut self, section_id: i64) -> Step {
        if self.catalog.section(section_id)?.is_none() {
            self.not_found(msg::MSG_NOT_FOUND, Action::BackToSections);
            return Ok(());
        }
        self.capture_page_marker();
        let path = &mut self.context().path;
        path.section_id = Some(section_id);
        path.topics_page = 0;
        path.topic_id = None;
        self.effect(Effect::ClearMedia);
        self.show_topics(section_id, 0, true)
    }

    /// Render a topics page; `fresh` marks an entry into the section
    /// rather than a page flip
    pub(super) fn show_topics(&mut self, section_id: i64, page: usize, fresh: bool) -> Step {
        let catalog = self.catalog;
        let user_id = self.ctx.user_id;
        let Some(section) = catalog.section(section_id)? else {
            self.not_found(msg::MSG_NOT_FOUND, Action::BackToSections);
            return Ok(());
        };
        let topics = fetch_page(page, |p| catalog.topics(section.id, p))?;
        let last_visit = relative_time(
            catalog.last_accessed(user_id, AccessLevel::Section, section.id)?,
            self.ctx.now,
        );

        if fresh && topics.current_page == 0 {
            self.effect(Effect::TouchAccess {
                level: AccessLevel::Section,
                entity_id: section.id,
            });
        }
        let path = &mut self.context().path;
        path.course_id = Some(section.course_id);
        path.section_id = Some(section.id);
        self.set_browse_page(topics.current_page);
        self.set_state(BotState::SectionTopics);

        let mut text = msg::section_topics_header(
            &section.title,
            &section.description,
            &last_visit,
            topics.display_page(),
            topics.total_pages,
            topics.total_items,
        );
        if topics.is_empty() {
            text = format!("{text}\n\n{}", msg::MSG_NO_TOPICS);
        }

        let mut keyboard = Keyboard::new();
        for topic in &topics.items {
            let status = topic_status(catalog, user_id, topic.id)?;
            let test = test_status(catalog.test_score(user_id, TestKind::Topic, topic.id)?);
            keyboard = keyboard.row(vec![
                Button::new(
                    format!("{status} {}", topic.title),
                    Action::SelectTopic { topic_id: topic.id },
                ),
                Button::new(
                    format!("{test} {}", msg::BUTTON_TEST),
                    Action::TestTopic { topic_id: topic.id },
                ),
            ]);
        }
        let section_id = section.id;
        let keyboard = keyboard
            .row(page_row(&topics, |page| Action::TopicsPage { section_id, page }))
            .row(vec![
                Button::new(msg::BUTTON_BACK, Action::BackToSections),
                Button::new(msg::BUTTON_MAIN_MENU, Action::MainMenu),
            ]);
        self.show(text, keyboard);
        Ok(())
    }

    // ==================== Backing Out ====================

    pub(super) fn back_to_courses(&mut self) -> Step {
        let path = self.session.context.path.clone();
        if let Some(course_id) = path.course_id {
            self.effect(Effect::TouchAccess {
                level: AccessLevel::Course,
                entity_id: course_id,
            });
        }
        self.show_course_list(path.source, path.source_page)
    }

    pub(super) fn back_to_sections(&mut self) -> Step {
        let path = self.session.context.path.clone();
        let Some(course_id) = path.course_id else {
            self.fallback();
            return Ok(());
        };
        if let Some(section_id) = path.section_id {
            self.effect(Effect::TouchAccess {
                level: AccessLevel::Section,
                entity_id: section_id,
            });
        }
        let current = &mut self.context().path;
        current.section_id = None;
        current.topic_id = None;
        self.effect(Effect::ClearMedia);
        self.show_sections(course_id, path.sections_page)
    }

    pub(super) fn back_to_topics(&mut self) -> Step {
        let Some(section_id) = self.session.context.path.section_id else {
            self.fallback();
            return Ok(());
        };
        self.context().path.topic_id = None;
        self.effect(Effect::ClearMedia);
        let page = self.session.context.path.topics_page;
        self.show_topics(section_id, page, true)
    }

    pub(super) fn show_statistics(&mut self) -> Step {
        let stats = self.catalog.statistics(self.ctx.user_id)?;
        self.context().reset_navigation();
        self.set_state(BotState::MainMenu);
        self.effect(Effect::ClearMedia);
        let keyboard = Keyboard::new().button(msg::BUTTON_MAIN_MENU, Action::MainMenu);
        self.show(msg::statistics(&stats), keyboard);
        Ok(())
    }

    // ==================== Learning ====================

    pub(super) fn select_topic(&mut self, topic_id: i64) -> Step {
        let Some(topic) = self.catalog.topic(topic_id)? else {
            self.not_found(msg::MSG_NOT_FOUND, Action::BackToTopics);
            return Ok(());
        };
        self.capture_page_marker();
        let block_ids = self.catalog.block_ids(topic.id)?;
        let path = &mut self.context().path;
        path.section_id = Some(topic.section_id);
        path.topic_id = Some(topic.id);

        if block_ids.is_empty() {
            let page = self.session.context.path.topics_page;
            self.set_browse_page(page);
            self.set_state(BotState::SectionTopics);
            let keyboard = Keyboard::new().button(msg::BUTTON_BACK_TO_TOPICS_LIST, Action::BackToTopics);
            self.show(msg::MSG_TOPIC_NO_BLOCKS, keyboard);
            return Ok(());
        }

        let mut traversal = LearningTraversal {
            block_ids,
            ..LearningTraversal::default()
        };
        self.enter_block(&mut traversal, 0)?;
        self.set_state(BotState::TopicLearning);
        self.render_block_text(traversal)
    }

    /// Current traversal, only while the state says we are learning
    fn traversal(&self) -> Option<LearningTraversal> {
        match (&self.session.context.mode, self.state()) {
            (Mode::Learning(t), BotState::TopicLearning) => Some(t.clone()),
            _ => None,
        }
    }

    fn enter_block(&self, traversal: &mut LearningTraversal, index: usize) -> Step {
        traversal.block_index = index;
        traversal.question_ids = match traversal.current_block_id() {
            Some(block_id) => self.catalog.question_ids(block_id)?,
            None => Vec::new(),
        };
        traversal.cursor = BlockCursor::ReadingText;
        traversal.answered = false;
        Ok(())
    }

    fn render_block_text(&mut self, traversal: LearningTraversal) -> Step {
        let block = match traversal.current_block_id() {
            Some(id) => self.catalog.block(id)?,
            None => None,
        };
        let Some(block) = block else {
            self.context().mode = Mode::Learning(traversal);
            let keyboard = Keyboard::new().button(msg::BUTTON_BACK_TO_TOPICS_LIST, Action::BackToTopics);
            self.show(msg::MSG_BLOCK_NOT_FOUND, keyboard);
            return Ok(());
        };
        let title = match self.catalog.topic(block.topic_id)? {
            Some(topic) => topic.title,
            None => String::new(),
        };

        let forward = if !traversal.question_ids.is_empty() {
            Button::new(msg::BUTTON_TO_QUESTIONS, Action::NextQuestion)
        } else if traversal.is_last_block() {
            Button::new(msg::BUTTON_FINISH_TOPIC, Action::NextBlock)
        } else {
            Button::new(msg::BUTTON_NEXT_BLOCK, Action::NextBlock)
        };
        let mut keyboard = Keyboard::new().row(vec![forward]);
        keyboard = if traversal.block_index == 0 {
            keyboard.button(msg::BUTTON_BACK, Action::BackToTopics)
        } else {
            keyboard
                .button(msg::BUTTON_PREV_BLOCK, Action::PrevBlock)
                .button(msg::BUTTON_BACK_TO_TOPICS_LIST, Action::BackToTopics)
        };

        let text = msg::block_text(
            &title,
            traversal.block_index + 1,
            traversal.block_ids.len(),
            &block.text,
        );
        self.media(&block.images);
        self.context().mode = Mode::Learning(traversal);
        self.show(text, keyboard);
        Ok(())
    }

    fn render_learning_question(&mut self, traversal: LearningTraversal) -> Step {
        let BlockCursor::Question(index) = traversal.cursor else {
            return self.render_block_text(traversal);
        };
        let question = match traversal.current_question_id() {
            Some(id) => self.catalog.question(id)?,
            None => None,
        };
        let Some(question) = question else {
            self.context().mode = Mode::Learning(traversal);
            self.not_found(msg::MSG_QUESTION_NOT_FOUND, Action::BackToTopics);
            return Ok(());
        };

        let mut options = question.options.clone();
        options.shuffle(&mut *self.rng);
        let mut keyboard = Keyboard::new();
        for option in options {
            keyboard = keyboard.button(
                option.text,
                Action::Answer {
                    question_id: question.id,
                    option_id: option.id,
                },
            );
        }
        let keyboard = keyboard.row(vec![
            Button::new(msg::BUTTON_BACK_TO_TEXT, Action::BackToBlockText),
            Button::new(msg::BUTTON_EXIT_TOPIC, Action::BackToTopics),
        ]);

        let text = msg::question(index + 1, traversal.question_ids.len(), &question.text);
        self.media(&question.images);
        self.context().mode = Mode::Learning(traversal);
        self.show(text, keyboard);
        Ok(())
    }

    pub(super) fn next_block(&mut self) -> Step {
        let Some(mut traversal) = self.traversal() else {
            self.fallback();
            return Ok(());
        };
        if traversal.is_last_block() {
            return self.finish_topic(traversal);
        }
        let index = traversal.block_index + 1;
        self.enter_block(&mut traversal, index)?;
        self.render_block_text(traversal)
    }

    fn finish_topic(&mut self, mut traversal: LearningTraversal) -> Step {
        let text = msg::topic_completed(traversal.correct, traversal.wrong);
        traversal.correct = 0;
        traversal.wrong = 0;
        traversal.answered = false;
        let keyboard = match self.session.context.path.topic_id {
            Some(topic_id) => {
                Keyboard::new().button(msg::BUTTON_TEST, Action::TestTopic { topic_id })
            }
            None => Keyboard::new(),
        }
        .button(msg::BUTTON_BACK_TO_TOPICS_LIST, Action::BackToTopics);
        self.context().mode = Mode::Learning(traversal);
        self.effect(Effect::ClearMedia);
        self.show(text, keyboard);
        Ok(())
    }

    pub(super) fn prev_block(&mut self) -> Step {
        let Some(mut traversal) = self.traversal() else {
            self.fallback();
            return Ok(());
        };
        if traversal.block_index == 0 {
            return self.back_to_topics();
        }
        let index = traversal.block_index - 1;
        self.enter_block(&mut traversal, index)?;
        self.render_block_text(traversal)
    }

    pub(super) fn back_to_block_text(&mut self) -> Step {
        let Some(mut traversal) = self.traversal() else {
            self.fallback();
            return Ok(());
        };
        traversal.cursor = BlockCursor::ReadingText;
        traversal.answered = false;
        self.render_block_text(traversal)
    }

    pub(super) fn learning_next_question(&mut self) -> Step {
        let Some(mut traversal) = self.traversal() else {
            self.fallback();
            return Ok(());
        };
        let next = match traversal.cursor {
            BlockCursor::ReadingText => 0,
            BlockCursor::Question(i) => i + 1,
        };
        if next >= traversal.question_ids.len() {
            return self.next_block();
        }
        traversal.cursor = BlockCursor::Question(next);
        traversal.answered = false;
        self.render_learning_question(traversal)
    }

    pub(super) fn learning_prev_question(&mut self) -> Step {
        let Some(mut traversal) = self.traversal() else {
            self.fallback();
            return Ok(());
        };
        traversal.answered = false;
        match traversal.cursor {
            BlockCursor::ReadingText => self.prev_block(),
            BlockCursor::Question(0) => {
                traversal.cursor = BlockCursor::ReadingText;
                self.render_block_text(traversal)
            }
            BlockCursor::Question(i) => {
                traversal.cursor = BlockCursor::Question(i - 1);
                self.render_learning_question(traversal)
            }
        }
    }

    pub(super) fn learning_answer(&mut self, question_id: i64, option_id: i64) -> Step {
        let Some(mut traversal) = self.traversal() else {
            self.fallback();
            return Ok(());
        };
        if traversal.answered || traversal.current_question_id() != Some(question_id) {
            return Err(TransitionError::Stale(format!(
                "learning answer for question {question_id}"
            )));
        }
        let Some(question) = self.catalog.question(question_id)? else {
            self.not_found(msg::MSG_QUESTION_NOT_FOUND, Action::BackToTopics);
            return Ok(());
        };
        let Some(option) = question.option(option_id) else {
            self.notice(msg::MSG_WRONG_OPTION);
            return Ok(());
        };
        let correct = option.is_correct;

        self.record_answer(question_id, AnswerMode::Learning, correct);
        if let Some(topic_id) = self.session.context.path.topic_id {
            self.effect(Effect::RecordStudyAction { topic_id });
        }
        if correct {
            traversal.correct += 1;
        } else {
            traversal.wrong += 1;
        }
        traversal.answered = true;

        let forward = if !traversal.is_last_question() {
            Button::new(msg::BUTTON_NEXT, Action::NextQuestion)
        } else if !traversal.is_last_block() {
            Button::new(msg::BUTTON_NEXT_BLOCK, Action::NextBlock)
        } else {
            Button::new(msg::BUTTON_FINISH_TOPIC, Action::NextBlock)
        };
        let keyboard = Keyboard::new().row(vec![forward]).row(vec![
            Button::new(msg::BUTTON_BACK_TO_TEXT, Action::BackToBlockText),
            Button::new(msg::BUTTON_EXIT_TOPIC, Action::BackToTopics),
        ]);
        self.context().mode = Mode::Learning(traversal);
        self.show(msg::answer_result(correct, &question.explanation), keyboard);
        Ok(())
    }

    /// Answer log plus mistake-set bookkeeping, shared by learning and quizzes
    pub(super) fn record_answer(&mut self, question_id: i64, mode: AnswerMode, correct: bool) {
        self.effect(Effect::RecordAnswer {
            question_id,
            mode,
            correct,
        });
        self.effect(if correct {
            Effect::ClearMistake { question_id }
        } else {
            Effect::RecordMistake { question_id }
        });
    }
}
