//! Session state types

use crate::db::{PendingImage, UserId};
use crate::quiz::QuizSession;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Bot State
// ============================================================================

/// Flat state tag: each value names the kind of input expected next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BotState {
    // Menus
    #[default]
    MainMenu,
    MyCourses,
    AllCourses,
    SearchResults,
    AwaitingSearchQuery,

    // Content
    CourseSections,
    SectionTopics,
    TopicLearning,
    Question,

    // Admin
    AwaitingCourseJson,
    EditCourseList,
    DeleteCourseList,
    EditCourseChooseAction,
    EditCourseNameDesc,
    EditCourseSectionChoose,
    EditSectionChooseAction,
    EditSectionNameDesc,
    EditSectionChooseTopic,
    EditTopicJson,
    AwaitingImage,
}

impl BotState {
    pub const ALL: [BotState; 20] = [
        BotState::MainMenu,
        BotState::MyCourses,
        BotState::AllCourses,
        BotState::SearchResults,
        BotState::AwaitingSearchQuery,
        BotState::CourseSections,
        BotState::SectionTopics,
        BotState::TopicLearning,
        BotState::Question,
        BotState::AwaitingCourseJson,
        BotState::EditCourseList,
        BotState::DeleteCourseList,
        BotState::EditCourseChooseAction,
        BotState::EditCourseNameDesc,
        BotState::EditCourseSectionChoose,
        BotState::EditSectionChooseAction,
        BotState::EditSectionNameDesc,
        BotState::EditSectionChooseTopic,
        BotState::EditTopicJson,
        BotState::AwaitingImage,
    ];

    /// Persisted tag
    pub fn as_str(self) -> &'static str {
        match self {
            BotState::MainMenu => "main_menu",
            BotState::MyCourses => "my_courses",
            BotState::AllCourses => "all_courses",
            BotState::SearchResults => "search_results",
            BotState::AwaitingSearchQuery => "awaiting_search_query",
            BotState::CourseSections => "course_sections",
            BotState::SectionTopics => "section_topics",
            BotState::TopicLearning => "topic_learning",
            BotState::Question => "question",
            BotState::AwaitingCourseJson => "awaiting_course_json",
            BotState::EditCourseList => "edit_course_list",
            BotState::DeleteCourseList => "delete_course_list",
            BotState::EditCourseChooseAction => "edit_course_choose_action",
            BotState::EditCourseNameDesc => "edit_course_name_desc",
            BotState::EditCourseSectionChoose => "edit_course_section_choose",
            BotState::EditSectionChooseAction => "edit_section_choose_action",
            BotState::EditSectionNameDesc => "edit_section_name_desc",
            BotState::EditSectionChooseTopic => "edit_section_choose_topic",
            BotState::EditTopicJson => "edit_topic_json",
            BotState::AwaitingImage => "awaiting_image",
        }
    }

    /// States only reachable through admin actions
    pub fn is_admin(self) -> bool {
        matches!(
            self,
            BotState::AwaitingCourseJson
                | BotState::EditCourseList
                | BotState::DeleteCourseList
                | BotState::EditCourseChooseAction
                | BotState::EditCourseNameDesc
                | BotState::EditCourseSectionChoose
                | BotState::EditSectionChooseAction
                | BotState::EditSectionNameDesc
                | BotState::EditSectionChooseTopic
                | BotState::EditTopicJson
                | BotState::AwaitingImage
        )
    }

    /// Top-level course list this state displays, if any
    pub fn list_source(self) -> Option<ListSource> {
        match self {
            BotState::MyCourses => Some(ListSource::MyCourses),
            BotState::AllCourses => Some(ListSource::AllCourses),
            BotState::SearchResults => Some(ListSource::Search),
            _ => None,
        }
    }
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownState(pub String);

impl FromStr for BotState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BotState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

// ============================================================================
// Context
// ============================================================================

/// Which top-level list the user entered the course tree from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListSource {
    MyCourses,
    #[default]
    AllCourses,
    Search,
}

impl ListSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ListSource::MyCourses => "my_courses",
            ListSource::AllCourses => "all_courses",
            ListSource::Search => "search",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "my_courses" => Some(ListSource::MyCourses),
            "all_courses" => Some(ListSource::AllCourses),
            "search" => Some(ListSource::Search),
            _ => None,
        }
    }

    pub fn state(self) -> BotState {
        match self {
            ListSource::MyCourses => BotState::MyCourses,
            ListSource::AllCourses => BotState::AllCourses,
            ListSource::Search => BotState::SearchResults,
        }
    }
}

/// Drill-down path shared by browsing, learning and quizzes.
///
/// Page markers are captured when drilling in so that backing out lands
/// on the page the user left, not page 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BrowsePath {
    pub source: ListSource,
    pub source_page: usize,
    pub search_query: Option<String>,
    pub course_id: Option<i64>,
    pub sections_page: usize,
    pub section_id: Option<i64>,
    pub topics_page: usize,
    pub topic_id: Option<i64>,
}

/// Currently visible list page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BrowseList {
    pub page: usize,
}

/// Position inside a block: reading its text, or on question N.
///
/// Persisted as the integer question index with `-1` for the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "i64", try_from = "i64")]
pub enum BlockCursor {
    #[default]
    ReadingText,
    Question(usize),
}

impl From<BlockCursor> for i64 {
    fn from(cursor: BlockCursor) -> Self {
        match cursor {
            BlockCursor::ReadingText => -1,
            BlockCursor::Question(i) => i64::try_from(i).unwrap_or(i64::MAX),
        }
    }
}

impl TryFrom<i64> for BlockCursor {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(BlockCursor::ReadingText),
            n => usize::try_from(n)
                .map(BlockCursor::Question)
                .map_err(|_| format!("invalid block cursor: {n}")),
        }
    }
}

/// Learning traversal through one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LearningTraversal {
    pub block_ids: Vec<i64>,
    pub block_index: usize,
    /// Question ids of the current block
    pub question_ids: Vec<i64>,
    #[serde(rename = "question_index")]
    pub cursor: BlockCursor,
    /// Current question already answered; waiting for navigation
    pub answered: bool,
    pub correct: u32,
    pub wrong: u32,
}

impl LearningTraversal {
    pub fn current_block_id(&self) -> Option<i64> {
        self.block_ids.get(self.block_index).copied()
    }

    pub fn is_last_block(&self) -> bool {
        self.block_index + 1 >= self.block_ids.len()
    }

    pub fn current_question_id(&self) -> Option<i64> {
        match self.cursor {
            BlockCursor::ReadingText => None,
            BlockCursor::Question(i) => self.question_ids.get(i).copied(),
        }
    }

    pub fn is_last_question(&self) -> bool {
        match self.cursor {
            BlockCursor::ReadingText => self.question_ids.is_empty(),
            BlockCursor::Question(i) => i + 1 >= self.question_ids.len(),
        }
    }
}

/// Serial queue of image placeholders awaiting uploads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ImageQueue {
    pub pending: Vec<PendingImage>,
    pub index: usize,
}

impl ImageQueue {
    pub fn new(pending: Vec<PendingImage>) -> Self {
        Self { pending, index: 0 }
    }

    pub fn current(&self) -> Option<&PendingImage> {
        self.pending.get(self.index)
    }
}

/// Entities being edited plus the admin list page markers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AdminEdit {
    pub course_id: Option<i64>,
    pub section_id: Option<i64>,
    pub topic_id: Option<i64>,
    pub courses_page: usize,
    pub sections_page: usize,
    pub topics_page: usize,
    pub images: ImageQueue,
}

/// Mode-specific fields, keyed by state group.
///
/// Readers gate on the state tag; a mode left over from an earlier
/// state is never interpreted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Mode {
    Browse(BrowseList),
    Learning(LearningTraversal),
    Quiz(QuizSession),
    AdminEdit(AdminEdit),
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Browse(BrowseList::default())
    }
}

/// Structured context stored next to the state tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionContext {
    pub display_name: Option<String>,
    /// Last message carrying an inline keyboard
    pub last_interactive_message_id: Option<i64>,
    /// Media group currently on screen
    pub last_media_message_ids: Vec<i64>,
    pub path: BrowsePath,
    pub mode: Mode,
}

impl SessionContext {
    /// Current browse list page, 0 outside browse mode
    pub fn browse_page(&self) -> usize {
        match &self.mode {
            Mode::Browse(list) => list.page,
            _ => 0,
        }
    }

    pub fn admin(&self) -> Option<&AdminEdit> {
        match &self.mode {
            Mode::AdminEdit(edit) => Some(edit),
            _ => None,
        }
    }

    /// Admin edit fields, switching into admin mode if needed
    pub fn admin_mut(&mut self) -> &mut AdminEdit {
        if !matches!(self.mode, Mode::AdminEdit(_)) {
            self.mode = Mode::AdminEdit(AdminEdit::default());
        }
        match &mut self.mode {
            Mode::AdminEdit(edit) => edit,
            _ => unreachable!("mode was just set to admin edit"),
        }
    }

    /// Drop navigation; admin edit fields survive
    pub fn reset_navigation(&mut self) {
        self.path = BrowsePath::default();
        if !matches!(self.mode, Mode::AdminEdit(_)) {
            self.mode = Mode::default();
        }
    }

    /// Drop navigation and any in-flight admin edit
    pub fn reset_all(&mut self) {
        self.path = BrowsePath::default();
        self.mode = Mode::default();
    }
}

/// One user's session: state tag plus context
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    pub state: BotState,
    pub context: SessionContext,
}

impl Session {
    pub fn new(state: BotState, context: SessionContext) -> Self {
        Self { state, context }
    }
}

/// Per-event dispatch inputs that are not part of the session
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub user_id: UserId,
    pub is_admin: bool,
    pub now: chrono::DateTime<chrono::Utc>,
}

impl DispatchContext {
    pub fn new(user_id: UserId, is_admin: bool) -> Self {
        Self {
            user_id,
            is_admin,
            now: chrono::Utc::now(),
        }
    }
}
