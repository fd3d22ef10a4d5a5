//! Events that drive session transitions

use crate::db::{ImportedTree, Renamed};
use crate::state_machine::action::Action;

/// Inbound user events plus the follow-ups produced by write effects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // User events
    /// `/start` command
    Start { display_name: Option<String> },

    /// Free text message
    Text { text: String },

    /// Uploaded document, already downloaded
    Document { file_name: Option<String>, bytes: Vec<u8> },

    /// Uploaded photo; the largest size's file id
    Photo { file_id: String },

    /// Inline button press; `message_id` is the message carrying the button
    Action {
        action: Action,
        message_id: Option<i64>,
    },

    // Effect results
    /// Course or topic import committed (or failed)
    ImportFinished {
        scope: ImportScope,
        result: Result<ImportedTree, String>,
    },

    /// Uploaded photo stored for the image placeholder
    ImageStored {
        image_id: i64,
        result: Result<(), String>,
    },

    /// Course or section renamed
    RenameFinished {
        level: RenameLevel,
        result: Result<Renamed, String>,
    },

    /// Course deletion finished
    CourseDeleted {
        course_id: i64,
        result: Result<(), String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportScope {
    Course,
    Topic { topic_id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameLevel {
    Course,
    Section,
}

impl Event {
    #[cfg(test)]
    pub fn action(action: Action) -> Self {
        Event::Action {
            action,
            message_id: None,
        }
    }

    /// Events produced by effects rather than by the user
    pub fn is_effect_result(&self) -> bool {
        matches!(
            self,
            Event::ImportFinished { .. }
                | Event::ImageStored { .. }
                | Event::RenameFinished { .. }
                | Event::CourseDeleted { .. }
        )
    }

    /// Length of user-supplied text subject to the message-length guard
    pub fn text_len(&self) -> usize {
        match self {
            Event::Text { text } => text.chars().count(),
            _ => 0,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::Text { .. } => "text",
            Event::Document { .. } => "document",
            Event::Photo { .. } => "photo",
            Event::Action { .. } => "action",
            Event::ImportFinished { .. } => "import_finished",
            Event::ImageStored { .. } => "image_stored",
            Event::RenameFinished { .. } => "rename_finished",
            Event::CourseDeleted { .. } => "course_deleted",
        }
    }
}
