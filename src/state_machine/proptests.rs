//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::action::{AdminListPurpose, EditTarget};
use super::effect::Effect;
use super::state::{BotState, ListSource, Mode};
use super::transition::test_support::Harness;
use super::*;
use crate::db::TestKind;
use crate::pagination::{paginate, total_pages};
use crate::quiz::{AnswerOutcome, QuizSession, QuizStep};
use proptest::prelude::*;

/// Telegram's limit on inline button callback data
const MAX_CALLBACK_BYTES: usize = 64;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_id() -> impl Strategy<Value = i64> {
    1i64..14
}

fn arb_page() -> impl Strategy<Value = usize> {
    prop_oneof![4 => 0usize..4, 1 => Just(usize::MAX)]
}

fn arb_source() -> impl Strategy<Value = ListSource> {
    prop_oneof![
        Just(ListSource::MyCourses),
        Just(ListSource::AllCourses),
        Just(ListSource::Search),
    ]
}

fn arb_edit_target() -> impl Strategy<Value = EditTarget> {
    prop_oneof![Just(EditTarget::NameDesc), Just(EditTarget::Children)]
}

fn arb_simple_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::MainMenu),
        Just(Action::Cancel),
        Just(Action::Back),
        Just(Action::Retry),
        Just(Action::MyCourses),
        Just(Action::AllCourses),
        Just(Action::SearchCourses),
        Just(Action::BackToCourses),
        Just(Action::BackToSections),
        Just(Action::BackToTopics),
        Just(Action::Statistics),
        Just(Action::NextBlock),
        Just(Action::PrevBlock),
        Just(Action::BackToBlockText),
        Just(Action::NextQuestion),
        Just(Action::PrevQuestion),
        Just(Action::MyMistakes),
        Just(Action::CreateCourse),
        Just(Action::EditCourse),
        Just(Action::DeleteCourse),
        Just(Action::AdminBackToSections),
        Just(Action::AdminBackToTopics),
    ]
}

fn arb_learner_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (arb_source(), arb_page()).prop_map(|(source, page)| Action::CoursesPage { source, page }),
        arb_id().prop_map(|course_id| Action::SelectCourse { course_id }),
        (arb_id(), arb_page()).prop_map(|(course_id, page)| Action::SectionsPage { course_id, page }),
        arb_id().prop_map(|section_id| Action::SelectSection { section_id }),
        (arb_id(), arb_page()).prop_map(|(section_id, page)| Action::TopicsPage { section_id, page }),
        arb_id().prop_map(|topic_id| Action::SelectTopic { topic_id }),
        (arb_id(), arb_id()).prop_map(|(question_id, option_id)| Action::Answer {
            question_id,
            option_id
        }),
        arb_id().prop_map(|topic_id| Action::TestTopic { topic_id }),
        arb_id().prop_map(|section_id| Action::TestSection { section_id }),
        arb_id().prop_map(|course_id| Action::TestCourse { course_id }),
    ]
}

fn arb_admin_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (prop_oneof![Just(AdminListPurpose::Edit), Just(AdminListPurpose::Delete)], arb_page())
            .prop_map(|(purpose, page)| Action::AdminCoursesPage { purpose, page }),
        arb_id().prop_map(|course_id| Action::SelectCourseForEdit { course_id }),
        arb_id().prop_map(|course_id| Action::SelectCourseForDelete { course_id }),
        arb_edit_target().prop_map(Action::EditCourseAction),
        (arb_id(), arb_page()).prop_map(|(course_id, page)| Action::AdminSectionsPage { course_id, page }),
        arb_id().prop_map(|section_id| Action::SelectSectionForEdit { section_id }),
        arb_edit_target().prop_map(Action::EditSectionAction),
        (arb_id(), arb_page()).prop_map(|(section_id, page)| Action::AdminTopicsPage { section_id, page }),
        arb_id().prop_map(|topic_id| Action::SelectTopicForEdit { topic_id }),
    ]
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![arb_simple_action(), arb_learner_action(), arb_admin_action()]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        6 => arb_action().prop_map(|action| Event::Action {
            action,
            message_id: Some(1),
        }),
        1 => "[a-zA-Z ]{0,12}".prop_map(|text| Event::Text { text }),
        1 => Just(Event::Start { display_name: None }),
        1 => Just(Event::Photo {
            file_id: "photo".to_string(),
        }),
        1 => Just(Event::Document {
            file_name: None,
            bytes: b"{}".to_vec(),
        }),
    ]
}

fn arb_answers() -> impl Strategy<Value = Vec<bool>> {
    proptest::collection::vec(any::<bool>(), 1..12)
}

// ============================================================================
// Invariant Checks
// ============================================================================

/// The mode union always matches the state group that reads it
fn mode_matches_state(session: &Session) -> bool {
    match session.state {
        BotState::TopicLearning => matches!(session.context.mode, Mode::Learning(_)),
        BotState::Question => matches!(session.context.mode, Mode::Quiz(_)),
        state if state.is_admin() => matches!(session.context.mode, Mode::AdminEdit(_)),
        _ => true,
    }
}

fn effects_are_valid(effects: &[Effect]) -> bool {
    let persists = effects
        .iter()
        .filter(|e| matches!(e, Effect::PersistSession))
        .count();
    let buttons_fit = effects.iter().all(|e| match e {
        Effect::ShowMessage {
            keyboard: Some(keyboard),
            ..
        } => keyboard.actions().all(|a| {
            let data = a.encode();
            data.len() <= MAX_CALLBACK_BYTES && data.parse::<Action>() == Ok(a)
        }),
        _ => true,
    });
    persists == 1 && matches!(effects.last(), Some(Effect::PersistSession)) && buttons_fit
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn prop_out_of_range_page_is_empty(total in 0usize..40, size in 1usize..8, extra in 0usize..5) {
        let all: Vec<usize> = (0..total).collect();
        let pages = total_pages(total, size);
        prop_assert!(pages >= 1);
        let page = paginate(&all, pages + extra, size);
        prop_assert!(page.items.is_empty());
        prop_assert!(!page.has_next);
        prop_assert_eq!(page.total_items, total);
    }

    #[test]
    fn prop_huge_page_is_empty_without_next(total in 0usize..40, size in 1usize..8, back in 0usize..3) {
        let all: Vec<usize> = (0..total).collect();
        let page = paginate(&all, usize::MAX - back, size);
        prop_assert!(page.items.is_empty());
        prop_assert!(!page.has_next);
        prop_assert!(page.has_previous);
    }

    #[test]
    fn prop_pages_cover_every_item_once(total in 0usize..40, size in 1usize..8) {
        let all: Vec<usize> = (0..total).collect();
        let mut seen = Vec::new();
        for p in 0..total_pages(total, size) {
            let page = paginate(&all, p, size);
            prop_assert_eq!(page.has_previous, p > 0);
            seen.extend(page.items);
        }
        prop_assert_eq!(seen, all);
    }

    #[test]
    fn prop_action_wire_round_trip(action in arb_action()) {
        let data = action.encode();
        prop_assert!(data.len() <= MAX_CALLBACK_BYTES);
        prop_assert_eq!(data.parse::<Action>(), Ok(action));
    }

    #[test]
    fn prop_garbage_callback_never_panics(data in "[a-z_:0-9-]{0,30}") {
        let _ = data.parse::<Action>();
    }

    #[test]
    fn prop_correct_answers_advance_by_one(answers in arb_answers()) {
        let ids: Vec<i64> = (1..=i64::try_from(answers.len()).unwrap()).collect();
        let mut quiz = QuizSession {
            kind: TestKind::Topic,
            target_id: Some(1),
            question_ids: ids,
            ..QuizSession::default()
        };
        for correct in answers {
            let Some(current) = quiz.current_question_id() else { break };
            let before = quiz.position;
            match quiz.answer(current, correct).unwrap() {
                AnswerOutcome::Advanced { .. } => prop_assert_eq!(quiz.position, before + 1),
                AnswerOutcome::Completed(summary) => {
                    prop_assert!(correct);
                    prop_assert_eq!(summary.total, quiz.total());
                }
                AnswerOutcome::ShowExplanation { .. } => {
                    prop_assert!(!correct);
                    prop_assert_eq!(quiz.position, before);
                    quiz.next().unwrap();
                }
            }
            prop_assert_eq!(quiz.correct + quiz.wrong, u32::try_from(quiz.position).unwrap());
        }
    }

    #[test]
    fn prop_prev_never_underflows(steps in 0usize..6, total in 1usize..6) {
        let mut quiz = QuizSession {
            question_ids: (1..=i64::try_from(total).unwrap()).collect(),
            position: steps.min(total - 1),
            ..QuizSession::default()
        };
        let mut exited = false;
        for _ in 0..=total {
            if quiz.prev() == QuizStep::Exit {
                exited = true;
                prop_assert_eq!(quiz.position, 0);
            }
        }
        prop_assert!(exited);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_transitions_preserve_validity(
        is_admin in any::<bool>(),
        events in proptest::collection::vec(arb_event(), 0..25)
    ) {
        let mut h = if is_admin { Harness::admin() } else { Harness::learner() };
        for event in events {
            let before = h.session.clone();
            match h.send(event) {
                Ok(result) => {
                    prop_assert!(mode_matches_state(&h.session), "Mode/state mismatch: {:?}", h.session);
                    prop_assert!(effects_are_valid(&result.effects), "Invalid effects: {:?}", result.effects);
                    if !is_admin {
                        prop_assert!(!h.session.state.is_admin());
                    }
                }
                Err(_) => prop_assert_eq!(&h.session, &before),
            }
        }
    }

    #[test]
    fn prop_persisted_context_round_trips(events in proptest::collection::vec(arb_event(), 0..15)) {
        let mut h = Harness::admin();
        for event in events {
            let _ = h.send(event);
        }
        h.db.save_session(1, &h.session).unwrap();
        prop_assert_eq!(h.db.load_session(1).unwrap(), h.session);
    }
}
