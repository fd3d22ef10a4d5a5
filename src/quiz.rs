//! Quiz session engine
//!
//! Pure bookkeeping for one attempt: question order, position, counters
//! and the "wrong answer shown, waiting for next" flag. Persisting answers
//! and results is left to the caller.

use crate::db::{TestKind, TestScore};
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Questions sampled per block (section tests) or per topic (course tests)
pub const SAMPLE_PER_GROUP: usize = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuizError {
    #[error("Answer for question {got} does not match current question {expected:?}")]
    StaleQuestion { expected: Option<i64>, got: i64 },
    #[error("Question already answered; waiting for next")]
    AwaitingNext,
    #[error("Attempt already finished")]
    Finished,
}

/// Snapshot of a finished attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizSummary {
    pub kind: TestKind,
    pub target_id: Option<i64>,
    pub correct: u32,
    pub wrong: u32,
    pub total: usize,
}

impl QuizSummary {
    pub fn score(&self) -> TestScore {
        TestScore {
            correct: self.correct,
            wrong: self.wrong,
        }
    }

    /// Whether this attempt produces a stored result
    pub fn is_recorded(&self) -> bool {
        self.kind != TestKind::Mistakes && self.target_id.is_some()
    }
}

/// What happened after an answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Correct, moved on without an explanation
    Advanced { next_question_id: i64 },
    /// Wrong; show the explanation and wait for an explicit next
    ShowExplanation { is_last: bool },
    /// Correct answer on the final question
    Completed(QuizSummary),
}

/// Result of a next/previous step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizStep {
    Question(i64),
    Completed(QuizSummary),
    /// Stepped back past the first question
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizSession {
    pub kind: TestKind,
    /// Topic, section or course id; `None` for mistake review
    pub target_id: Option<i64>,
    pub question_ids: Vec<i64>,
    pub position: usize,
    pub correct: u32,
    pub wrong: u32,
    pub awaiting_next: bool,
}

impl Default for QuizSession {
    fn default() -> Self {
        Self {
            kind: TestKind::Topic,
            target_id: None,
            question_ids: Vec::new(),
            position: 0,
            correct: 0,
            wrong: 0,
            awaiting_next: false,
        }
    }
}

/// Pick up to `per_group` questions from each group at random
pub fn sample_groups(groups: &[Vec<i64>], per_group: usize, rng: &mut dyn RngCore) -> Vec<i64> {
    groups
        .iter()
        .flat_map(|group| group.choose_multiple(&mut *rng, per_group).copied().collect::<Vec<_>>())
        .collect()
}

impl QuizSession {
    /// Start an attempt over the given questions in random order; `None`
    /// when there is nothing to ask
    pub fn start(
        kind: TestKind,
        target_id: Option<i64>,
        mut question_ids: Vec<i64>,
        rng: &mut dyn RngCore,
    ) -> Option<Self> {
        if question_ids.is_empty() {
            return None;
        }
        question_ids.shuffle(rng);
        Some(Self {
            kind,
            target_id,
            question_ids,
            ..Self::default()
        })
    }

    pub fn total(&self) -> usize {
        self.question_ids.len()
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.question_ids.len()
    }

    pub fn is_last(&self) -> bool {
        self.position + 1 >= self.question_ids.len()
    }

    pub fn current_question_id(&self) -> Option<i64> {
        self.question_ids.get(self.position).copied()
    }

    pub fn summary(&self) -> QuizSummary {
        QuizSummary {
            kind: self.kind,
            target_id: self.target_id,
            correct: self.correct,
            wrong: self.wrong,
            total: self.total(),
        }
    }

    /// Apply an answer to the current question
    pub fn answer(&mut self, question_id: i64, correct: bool) -> Result<AnswerOutcome, QuizError> {
        if self.is_finished() {
            return Err(QuizError::Finished);
        }
        if self.awaiting_next {
            return Err(QuizError::AwaitingNext);
        }
        let expected = self.current_question_id();
        if expected != Some(question_id) {
            return Err(QuizError::StaleQuestion {
                expected,
                got: question_id,
            });
        }

        if !correct {
            self.wrong += 1;
            self.awaiting_next = true;
            return Ok(AnswerOutcome::ShowExplanation {
                is_last: self.is_last(),
            });
        }

        self.correct += 1;
        self.position += 1;
        match self.current_question_id() {
            Some(next_question_id) => Ok(AnswerOutcome::Advanced { next_question_id }),
            None => Ok(AnswerOutcome::Completed(self.summary())),
        }
    }

    /// Move past the current question
    pub fn next(&mut self) -> Result<QuizStep, QuizError> {
        if self.is_finished() {
            return Err(QuizError::Finished);
        }
        self.awaiting_next = false;
        self.position += 1;
        Ok(match self.current_question_id() {
            Some(id) => QuizStep::Question(id),
            None => QuizStep::Completed(self.summary()),
        })
    }

    /// Step back one question, or exit from the first
    pub fn prev(&mut self) -> QuizStep {
        self.awaiting_next = false;
        if self.position == 0 {
            return QuizStep::Exit;
        }
        self.position = self.position.min(self.question_ids.len()) - 1;
        match self.current_question_id() {
            Some(id) => QuizStep::Question(id),
            None => QuizStep::Exit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn session(ids: &[i64]) -> QuizSession {
        QuizSession {
            kind: TestKind::Topic,
            target_id: Some(1),
            question_ids: ids.to_vec(),
            ..QuizSession::default()
        }
    }

    #[test]
    fn test_start_shuffles_and_rejects_empty() {
        let mut rng = rng();
        assert!(QuizSession::start(TestKind::Topic, Some(1), vec![], &mut rng).is_none());
        let quiz = QuizSession::start(TestKind::Topic, Some(1), (1..=20).collect(), &mut rng).unwrap();
        let mut sorted = quiz.question_ids.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (1..=20).collect::<Vec<_>>());
        assert_eq!(quiz.position, 0);
    }

    #[test]
    fn test_correct_answer_advances_by_one() {
        let mut quiz = session(&[10, 20, 30]);
        assert_eq!(
            quiz.answer(10, true),
            Ok(AnswerOutcome::Advanced { next_question_id: 20 })
        );
        assert_eq!(quiz.position, 1);
        assert_eq!(quiz.correct, 1);
    }

    #[test]
    fn test_wrong_answer_waits_for_next() {
        let mut quiz = session(&[10, 20]);
        assert_eq!(
            quiz.answer(10, false),
            Ok(AnswerOutcome::ShowExplanation { is_last: false })
        );
        assert_eq!(quiz.position, 0);
        assert_eq!(quiz.answer(10, true), Err(QuizError::AwaitingNext));
        assert_eq!(quiz.next(), Ok(QuizStep::Question(20)));
        assert!(!quiz.awaiting_next);
    }

    #[test]
    fn test_stale_answer_rejected() {
        let mut quiz = session(&[10, 20]);
        assert!(matches!(
            quiz.answer(20, true),
            Err(QuizError::StaleQuestion { .. })
        ));
        assert_eq!(quiz.correct, 0);
    }

    #[test]
    fn test_completion_paths() {
        let mut quiz = session(&[10, 20]);
        quiz.answer(10, true).unwrap();
        let Ok(AnswerOutcome::Completed(summary)) = quiz.answer(20, true) else {
            panic!("expected completion");
        };
        assert_eq!((summary.correct, summary.wrong, summary.total), (2, 0, 2));
        assert!(summary.is_recorded());
        assert_eq!(quiz.answer(20, true), Err(QuizError::Finished));

        let mut quiz = session(&[10]);
        assert_eq!(
            quiz.answer(10, false),
            Ok(AnswerOutcome::ShowExplanation { is_last: true })
        );
        let Ok(QuizStep::Completed(summary)) = quiz.next() else {
            panic!("expected completion");
        };
        assert_eq!((summary.correct, summary.wrong), (0, 1));
        assert_eq!(quiz.next(), Err(QuizError::Finished));
    }

    #[test]
    fn test_prev_exits_from_first() {
        let mut quiz = session(&[10, 20]);
        assert_eq!(quiz.prev(), QuizStep::Exit);
        quiz.answer(10, true).unwrap();
        assert_eq!(quiz.prev(), QuizStep::Question(10));
    }

    #[test]
    fn test_mistake_review_is_not_recorded() {
        let mut quiz = QuizSession {
            kind: TestKind::Mistakes,
            ..session(&[5])
        };
        quiz.target_id = None;
        let Ok(AnswerOutcome::Completed(summary)) = quiz.answer(5, true) else {
            panic!("expected completion");
        };
        assert!(!summary.is_recorded());
    }

    #[test]
    fn test_sample_groups_caps_each_group() {
        let mut rng = rng();
        let groups = vec![vec![1, 2, 3, 4], vec![5], vec![], vec![6, 7]];
        let sampled = sample_groups(&groups, SAMPLE_PER_GROUP, &mut rng);
        assert_eq!(sampled.len(), 5);
        assert!(sampled.contains(&5));
        assert_eq!(sampled.iter().filter(|id| **id <= 4).count(), 2);
    }
}
