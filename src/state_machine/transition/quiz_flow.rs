//! Quiz attempts: topic, section sample, course sample and mistake review

use super::{Step, TransitionError, Turn};
use crate::db::{AnswerMode, TestKind};
use crate::quiz::{sample_groups, AnswerOutcome, QuizSession, QuizStep, QuizSummary, SAMPLE_PER_GROUP};
use crate::state_machine::action::Action;
use crate::state_machine::effect::{Effect, Keyboard};
use crate::state_machine::messages as msg;
use crate::state_machine::state::{BotState, Mode};
use rand::seq::SliceRandom;

/// Where a finished or abandoned attempt returns to
fn exit_action(kind: TestKind) -> Action {
    match kind {
        TestKind::Topic => Action::BackToTopics,
        TestKind::Section => Action::BackToSections,
        TestKind::Course => Action::BackToCourses,
        TestKind::Mistakes => Action::MainMenu,
    }
}

impl Turn<'_> {
    fn quiz(&self) -> Option<QuizSession> {
        match (&self.session.context.mode, self.state()) {
            (Mode::Quiz(quiz), BotState::Question) => Some(quiz.clone()),
            _ => None,
        }
    }

    /// Question ids for a new attempt, pinning the path to the target
    fn quiz_source(&mut self, kind: TestKind, target_id: Option<i64>) -> Result<Option<Vec<i64>>, TransitionError> {
        let catalog = self.catalog;
        match (kind, target_id) {
            (TestKind::Topic, Some(topic_id)) => {
                let Some(topic) = catalog.topic(topic_id)? else {
                    return Ok(None);
                };
                let course_id = catalog.section(topic.section_id)?.map(|s| s.course_id);
                let path = &mut self.context().path;
                path.course_id = course_id.or(path.course_id);
                path.section_id = Some(topic.section_id);
                Ok(Some(catalog.topic_question_ids(topic.id)?))
            }
            (TestKind::Section, Some(section_id)) => {
                let Some(section) = catalog.section(section_id)? else {
                    return Ok(None);
                };
                let path = &mut self.context().path;
                path.course_id = Some(section.course_id);
                path.section_id = Some(section.id);
                let groups = catalog.section_question_groups(section.id)?;
                Ok(Some(sample_groups(&groups, SAMPLE_PER_GROUP, &mut *self.rng)))
            }
            (TestKind::Course, Some(course_id)) => {
                if catalog.course(course_id)?.is_none() {
                    return Ok(None);
                }
                self.context().path.course_id = Some(course_id);
                let groups = catalog.course_question_groups(course_id)?;
                Ok(Some(sample_groups(&groups, SAMPLE_PER_GROUP, &mut *self.rng)))
            }
            (TestKind::Mistakes, _) => Ok(Some(catalog.mistake_question_ids(self.ctx.user_id)?)),
            (_, None) => Ok(None),
        }
    }

    pub(super) fn start_quiz(&mut self, kind: TestKind, target_id: Option<i64>) -> Step {
        // Path changes only stick once the attempt actually starts
        let previous_path = self.session.context.path.clone();
        self.capture_page_marker();
        let Some(question_ids) = self.quiz_source(kind, target_id)? else {
            self.context().path = previous_path;
            self.not_found(msg::MSG_NOT_FOUND, exit_action(kind));
            return Ok(());
        };
        let Some(quiz) = QuizSession::start(kind, target_id, question_ids, &mut *self.rng) else {
            self.context().path = previous_path;
            let keyboard = Keyboard::new().button(msg::BUTTON_BACK, exit_action(kind));
            self.show(msg::no_questions(kind), keyboard);
            return Ok(());
        };
        tracing::debug!(kind = %kind, questions = quiz.total(), "Quiz started");
        self.set_state(BotState::Question);
        self.render_quiz_question(quiz)
    }

    fn render_quiz_question(&mut self, quiz: QuizSession) -> Step {
        let exit = exit_action(quiz.kind);
        let question = match quiz.current_question_id() {
            Some(id) => self.catalog.question(id)?,
            None => None,
        };
        let Some(question) = question else {
            self.context().mode = Mode::Quiz(quiz);
            self.not_found(msg::MSG_QUESTION_NOT_FOUND, exit);
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
        let back = if quiz.position == 0 {
            exit
        } else {
            Action::PrevQuestion
        };
        let keyboard = keyboard.button(msg::BUTTON_BACK, back);

        let text = msg::question(quiz.position + 1, quiz.total(), &question.text);
        self.media(&question.images);
        self.context().mode = Mode::Quiz(quiz);
        self.show(text, keyboard);
        Ok(())
    }

    pub(super) fn quiz_answer(&mut self, question_id: i64, option_id: i64) -> Step {
        let Some(mut quiz) = self.quiz() else {
            self.fallback();
            return Ok(());
        };
        if quiz.current_question_id() != Some(question_id) {
            return Err(TransitionError::Stale(format!("quiz answer for question {question_id}")));
        }
        let Some(question) = self.catalog.question(question_id)? else {
            self.not_found(msg::MSG_QUESTION_NOT_FOUND, exit_action(quiz.kind));
            return Ok(());
        };
        let Some(option) = question.option(option_id) else {
            self.notice(msg::MSG_WRONG_OPTION);
            return Ok(());
        };
        let correct = option.is_correct;
        let outcome = quiz
            .answer(question_id, correct)
            .map_err(|e| TransitionError::Stale(e.to_string()))?;

        self.record_answer(question_id, AnswerMode::Test, correct);
        match outcome {
            AnswerOutcome::Advanced { .. } => self.render_quiz_question(quiz),
            AnswerOutcome::ShowExplanation { is_last } => {
                let label = if is_last {
                    msg::BUTTON_COMPLETE
                } else {
                    msg::BUTTON_NEXT
                };
                let keyboard = Keyboard::new().button(label, Action::NextQuestion);
                self.context().mode = Mode::Quiz(quiz);
                self.effect(Effect::ClearMedia);
                self.show(msg::answer_result(false, &question.explanation), keyboard);
                Ok(())
            }
            AnswerOutcome::Completed(summary) => {
                self.context().mode = Mode::Quiz(quiz);
                self.finish_quiz(summary);
                Ok(())
            }
        }
    }

    pub(super) fn quiz_next(&mut self) -> Step {
        let Some(mut quiz) = self.quiz() else {
            self.fallback();
            return Ok(());
        };
        if !quiz.awaiting_next {
            return Err(TransitionError::Stale("next without a pending explanation".to_string()));
        }
        match quiz.next().map_err(|e| TransitionError::Stale(e.to_string()))? {
            QuizStep::Question(_) => self.render_quiz_question(quiz),
            QuizStep::Completed(summary) => {
                self.context().mode = Mode::Quiz(quiz);
                self.finish_quiz(summary);
                Ok(())
            }
            QuizStep::Exit => self.exit_quiz(),
        }
    }

    pub(super) fn quiz_prev(&mut self) -> Step {
        let Some(mut quiz) = self.quiz() else {
            self.fallback();
            return Ok(());
        };
        match quiz.prev() {
            QuizStep::Question(_) => self.render_quiz_question(quiz),
            QuizStep::Exit | QuizStep::Completed(_) => self.exit_quiz(),
        }
    }

    /// Leave the attempt for the context it was started from
    pub(super) fn exit_quiz(&mut self) -> Step {
        let Some(quiz) = self.quiz() else {
            self.main_menu();
            return Ok(());
        };
        self.effect(Effect::ClearMedia);
        match exit_action(quiz.kind) {
            Action::BackToTopics => self.back_to_topics(),
            Action::BackToSections => self.back_to_sections(),
            Action::BackToCourses => self.back_to_courses(),
            _ => {
                self.main_menu();
                Ok(())
            }
        }
    }

    fn finish_quiz(&mut self, summary: QuizSummary) {
        if let (true, Some(target_id)) = (summary.is_recorded(), summary.target_id) {
            self.effect(Effect::SaveTestResult {
                kind: summary.kind,
                target_id,
                score: summary.score(),
            });
        }
        tracing::debug!(kind = %summary.kind, correct = summary.correct, wrong = summary.wrong, "Quiz finished");
        let keyboard = Keyboard::new().button(msg::BUTTON_COMPLETE, exit_action(summary.kind));
        self.effect(Effect::ClearMedia);
        self.show(msg::test_completed(&summary), keyboard);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::catalog::Catalog;
    use crate::db::TestScore;
    use crate::state_machine::event::Event;

    fn quiz(h: &Harness) -> QuizSession {
        match &h.session.context.mode {
            Mode::Quiz(quiz) => quiz.clone(),
            other => panic!("expected quiz mode, got {other:?}"),
        }
    }

    fn start_topic_quiz(h: &mut Harness) -> i64 {
        h.press(Action::AllCourses);
        let course_id = h.course_id();
        h.press(Action::SelectCourse { course_id });
        let section_id = h.section_id();
        h.press(Action::SelectSection { section_id });
        let topic_id = h.topic_ids()[0];
        h.press(Action::TestTopic { topic_id });
        topic_id
    }

    fn answer(h: &mut Harness, correct: bool) -> crate::state_machine::transition::TransitionResult {
        let question_id = quiz(h).current_question_id().unwrap();
        let option_id = h.option_for(question_id, correct);
        h.press(Action::Answer {
            question_id,
            option_id,
        })
    }

    #[test]
    fn test_topic_quiz_uses_all_topic_questions() {
        let mut h = Harness::learner();
        let topic_id = start_topic_quiz(&mut h);
        assert_eq!(h.state(), BotState::Question);
        let q = quiz(&h);
        assert_eq!(q.kind, TestKind::Topic);
        assert_eq!(q.target_id, Some(topic_id));
        assert_eq!(q.total(), 3);
        assert_eq!((q.position, q.correct, q.wrong), (0, 0, 0));
    }

    #[test]
    fn test_correct_answer_auto_advances_without_explanation() {
        let mut h = Harness::learner();
        start_topic_quiz(&mut h);
        let result = answer(&mut h, true);
        let q = quiz(&h);
        assert_eq!(q.position, 1);
        assert_eq!(q.correct, 1);
        let text = result.shown_text().unwrap();
        assert!(text.starts_with("Question 2 of 3"));
        assert!(!text.contains("Explanation"));
        assert!(result.effects.iter().any(|e| matches!(
            e,
            Effect::RecordAnswer {
                mode: AnswerMode::Test,
                correct: true,
                ..
            }
        )));
    }

    #[test]
    fn test_wrong_final_answer_waits_for_next() {
        let mut h = Harness::learner();
        let topic_id = start_topic_quiz(&mut h);
        answer(&mut h, true);
        answer(&mut h, true);

        let result = answer(&mut h, false);
        assert!(result.shown_text().unwrap().contains("Explanation"));
        assert!(!result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::SaveTestResult { .. })));
        assert_eq!(quiz(&h).position, 2);

        let result = h.press(Action::NextQuestion);
        assert!(result.effects.contains(&Effect::SaveTestResult {
            kind: TestKind::Topic,
            target_id: topic_id,
            score: TestScore {
                correct: 2,
                wrong: 1
            },
        }));
        assert!(result.shown_text().unwrap().starts_with("Test finished!"));
        assert_eq!(
            result.shown_keyboard().unwrap().actions().collect::<Vec<_>>(),
            vec![Action::BackToTopics]
        );
    }

    #[test]
    fn test_correct_final_answer_jumps_to_summary() {
        let mut h = Harness::learner();
        let topic_id = start_topic_quiz(&mut h);
        answer(&mut h, true);
        answer(&mut h, true);
        let result = answer(&mut h, true);
        assert!(result.effects.contains(&Effect::SaveTestResult {
            kind: TestKind::Topic,
            target_id: topic_id,
            score: TestScore {
                correct: 3,
                wrong: 0
            },
        }));
    }

    #[test]
    fn test_next_without_explanation_is_stale() {
        let mut h = Harness::learner();
        start_topic_quiz(&mut h);
        let err = h.send(Event::action(Action::NextQuestion)).unwrap_err();
        assert!(matches!(err, TransitionError::Stale(_)));
        assert_eq!(quiz(&h).position, 0);
    }

    #[test]
    fn test_prev_at_first_question_exits_to_topics() {
        let mut h = Harness::learner();
        start_topic_quiz(&mut h);
        h.press(Action::PrevQuestion);
        assert_eq!(h.state(), BotState::SectionTopics);
        assert!(matches!(h.session.context.mode, Mode::Browse(_)));
    }

    #[test]
    fn test_empty_source_changes_nothing() {
        let mut h = Harness::learner();
        h.press(Action::MainMenu);
        let before = h.session.clone();
        let result = h.press(Action::MyMistakes);
        assert_eq!(result.shown_text(), Some(msg::MSG_NO_MISTAKES));
        assert_eq!(h.session, before);
    }

    #[test]
    fn test_empty_topic_quiz_keeps_browse_path() {
        let mut h = Harness::learner();
        h.db.import_course(&crate::import::fixtures::course(
            "Alpha",
            vec![crate::import::fixtures::topic(
                "Reading only",
                vec![crate::import::fixtures::block("Notes", vec![])],
            )],
        ))
        .unwrap();
        let alpha = h.db.all_courses(0).unwrap().items[0].id;
        let section_id = h.db.course_section_ids(alpha).unwrap()[0];
        let topic_id = h.db.section_topic_ids(section_id).unwrap()[0];

        h.press(Action::MainMenu);
        let before = h.session.clone();
        let result = h.press(Action::TestTopic { topic_id });
        assert_eq!(result.shown_text(), Some(msg::no_questions(TestKind::Topic)));
        assert_eq!(h.session.context.path, before.context.path);
        assert_eq!(h.session.context.path.course_id, None);
        assert_eq!(h.session.context.path.section_id, None);
        assert_eq!(h.state(), BotState::MainMenu);
    }

    #[test]
    fn test_missing_quiz_target_keeps_browse_path() {
        let mut h = Harness::learner();
        h.press(Action::MainMenu);
        let before = h.session.context.path.clone();
        h.press(Action::TestSection { section_id: 9999 });
        assert_eq!(h.session.context.path, before);
    }

    #[test]
    fn test_mistake_review_is_not_recorded() {
        let mut h = Harness::learner();
        let question_id = h.db.topic_question_ids(h.topic_ids()[1]).unwrap()[0];
        h.db.record_mistake(USER, question_id).unwrap();

        h.press(Action::MyMistakes);
        assert_eq!(quiz(&h).kind, TestKind::Mistakes);
        let result = answer(&mut h, true);
        assert!(result.effects.contains(&Effect::ClearMistake { question_id }));
        assert!(!result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::SaveTestResult { .. })));
        assert_eq!(
            result.shown_keyboard().unwrap().actions().collect::<Vec<_>>(),
            vec![Action::MainMenu]
        );
    }

    #[test]
    fn test_section_quiz_samples_per_block() {
        let mut h = Harness::learner();
        let section_id = h.section_id();
        h.press(Action::TestSection { section_id });
        let q = quiz(&h);
        // Blocks hold 2, 0, 1 and 1 questions
        assert_eq!(q.total(), 4);
        assert_eq!(h.session.context.path.section_id, Some(section_id));
    }

    #[test]
    fn test_course_quiz_samples_per_topic() {
        let mut h = Harness::learner();
        let course_id = h.course_id();
        h.press(Action::TestCourse { course_id });
        // Ownership contributes 2 of 3, Traits its single question
        assert_eq!(quiz(&h).total(), 3);
    }

    #[test]
    fn test_stale_answer_is_rejected() {
        let mut h = Harness::learner();
        start_topic_quiz(&mut h);
        let current = quiz(&h).current_question_id().unwrap();
        let other = quiz(&h)
            .question_ids
            .into_iter()
            .find(|id| *id != current)
            .unwrap();
        let option_id = h.option_for(other, true);
        let err = h
            .send(Event::action(Action::Answer {
                question_id: other,
                option_id,
            }))
            .unwrap_err();
        assert!(matches!(err, TransitionError::Stale(_)));
    }
}
