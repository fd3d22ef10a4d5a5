//! Effects produced by state transitions

use crate::db::{AccessLevel, AnswerMode, PendingImage, TestKind, TestScore};
use crate::import::{CourseImport, NameDescImport, TopicImport};
use crate::state_machine::action::Action;

/// Inline keyboard button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Rows of inline buttons
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        if !buttons.is_empty() {
            self.rows.push(buttons);
        }
        self
    }

    /// Append a row holding a single button
    #[must_use]
    pub fn button(self, label: impl Into<String>, action: Action) -> Self {
        self.row(vec![Button::new(label, action)])
    }

    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.rows.iter().flatten().map(|b| b.action)
    }
}

/// Where an interactive message goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowTarget {
    /// Edit the message whose button was pressed; send anew if that fails
    Replace(i64),
    /// Send a fresh message, retiring the previous interactive one
    New,
}

/// Execution phase; the executor runs effects phase by phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EffectPhase {
    Write,
    Commit,
    Present,
}

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    // Learner records
    RecordAnswer {
        question_id: i64,
        mode: AnswerMode,
        correct: bool,
    },
    RecordMistake {
        question_id: i64,
    },
    ClearMistake {
        question_id: i64,
    },
    SaveTestResult {
        kind: TestKind,
        target_id: i64,
        score: TestScore,
    },
    TouchAccess {
        level: AccessLevel,
        entity_id: i64,
    },
    RecordStudyAction {
        topic_id: i64,
    },

    // Content administration; each feeds a result event back
    ImportCourse {
        course: CourseImport,
    },
    ImportTopic {
        topic_id: i64,
        topic: TopicImport,
    },
    RenameCourse {
        course_id: i64,
        update: NameDescImport,
    },
    RenameSection {
        section_id: i64,
        update: NameDescImport,
    },
    DeleteCourse {
        course_id: i64,
    },
    StoreImage {
        file_id: String,
        image: PendingImage,
    },

    /// Persist the new session
    PersistSession,

    // Presentation
    ShowMessage {
        text: String,
        keyboard: Option<Keyboard>,
        target: ShowTarget,
    },
    /// Plain message outside the interactive flow
    Notice {
        text: String,
    },
    /// Replace the media on screen with these local files
    ShowMedia {
        paths: Vec<String>,
    },
    ClearMedia,
}

impl Effect {
    pub fn phase(&self) -> EffectPhase {
        match self {
            Effect::PersistSession => EffectPhase::Commit,
            Effect::ShowMessage { .. }
            | Effect::Notice { .. }
            | Effect::ShowMedia { .. }
            | Effect::ClearMedia => EffectPhase::Present,
            _ => EffectPhase::Write,
        }
    }

    pub fn show(text: impl Into<String>, keyboard: Keyboard, target: ShowTarget) -> Self {
        Effect::ShowMessage {
            text: text.into(),
            keyboard: Some(keyboard),
            target,
        }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Effect::Notice { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_order() {
        let mut effects = vec![
            Effect::ClearMedia,
            Effect::PersistSession,
            Effect::RecordMistake { question_id: 1 },
            Effect::notice("hi"),
            Effect::TouchAccess {
                level: AccessLevel::Course,
                entity_id: 1,
            },
        ];
        effects.sort_by_key(Effect::phase);
        let phases: Vec<_> = effects.iter().map(Effect::phase).collect();
        assert_eq!(
            phases,
            vec![
                EffectPhase::Write,
                EffectPhase::Write,
                EffectPhase::Commit,
                EffectPhase::Present,
                EffectPhase::Present
            ]
        );
        // Stable within a phase
        assert_eq!(effects[0], Effect::RecordMistake { question_id: 1 });
        assert_eq!(effects[3], Effect::ClearMedia);
    }

    #[test]
    fn test_keyboard_skips_empty_rows() {
        let kb = Keyboard::new()
            .row(vec![])
            .button("Menu", Action::MainMenu);
        assert_eq!(kb.rows.len(), 1);
        assert_eq!(kb.actions().collect::<Vec<_>>(), vec![Action::MainMenu]);
    }
}
