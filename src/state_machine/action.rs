//! Typed button actions
//!
//! Inline keyboard buttons carry `name[:arg[:arg]]` strings. They are parsed
//! into [`Action`] once, at the transport boundary; malformed data never
//! reaches a transition.

use crate::state_machine::state::ListSource;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionParseError {
    #[error("Unknown action: {0}")]
    Unknown(String),
    #[error("Action {action} expects {expected} argument(s), got {got}")]
    Arity {
        action: String,
        expected: usize,
        got: usize,
    },
    #[error("Action {action}: invalid argument {value:?}")]
    InvalidArgument { action: String, value: String },
}

/// Which admin course list a page flip belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminListPurpose {
    Edit,
    Delete,
}

impl AdminListPurpose {
    fn as_str(self) -> &'static str {
        match self {
            AdminListPurpose::Edit => "edit",
            AdminListPurpose::Delete => "delete",
        }
    }
}

/// What to change about a course or section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditTarget {
    NameDesc,
    Children,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    MainMenu,
    Cancel,
    Back,
    Retry,

    // Browsing
    MyCourses,
    AllCourses,
    SearchCourses,
    CoursesPage { source: ListSource, page: usize },
    SelectCourse { course_id: i64 },
    SectionsPage { course_id: i64, page: usize },
    SelectSection { section_id: i64 },
    TopicsPage { section_id: i64, page: usize },
    SelectTopic { topic_id: i64 },
    BackToCourses,
    BackToSections,
    BackToTopics,
    Statistics,

    // Learning
    NextBlock,
    PrevBlock,
    BackToBlockText,
    NextQuestion,
    PrevQuestion,
    Answer { question_id: i64, option_id: i64 },

    // Quizzes
    TestTopic { topic_id: i64 },
    TestSection { section_id: i64 },
    TestCourse { course_id: i64 },
    MyMistakes,

    // Admin
    CreateCourse,
    EditCourse,
    DeleteCourse,
    AdminCoursesPage { purpose: AdminListPurpose, page: usize },
    SelectCourseForEdit { course_id: i64 },
    SelectCourseForDelete { course_id: i64 },
    ConfirmDeleteCourse { course_id: i64 },
    EditCourseAction(EditTarget),
    AdminSectionsPage { course_id: i64, page: usize },
    SelectSectionForEdit { section_id: i64 },
    EditSectionAction(EditTarget),
    AdminTopicsPage { section_id: i64, page: usize },
    SelectTopicForEdit { topic_id: i64 },
    AdminBackToSections,
    AdminBackToTopics,
}

impl Action {
    /// Actions that only admins may trigger
    pub fn requires_admin(self) -> bool {
        matches!(
            self,
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
                | Action::AdminBackToTopics
        )
    }

    fn name(self) -> &'static str {
        match self {
            Action::MainMenu => "main_menu",
            Action::Cancel => "cancel",
            Action::Back => "back",
            Action::Retry => "retry",
            Action::MyCourses => "my_courses",
            Action::AllCourses => "all_courses",
            Action::SearchCourses => "search_courses",
            Action::CoursesPage { .. } => "courses_page",
            Action::SelectCourse { .. } => "select_course",
            Action::SectionsPage { .. } => "sections_page",
            Action::SelectSection { .. } => "select_section",
            Action::TopicsPage { .. } => "topics_page",
            Action::SelectTopic { .. } => "select_topic",
            Action::BackToCourses => "back_to_courses",
            Action::BackToSections => "back_to_sections",
            Action::BackToTopics => "back_to_topics",
            Action::Statistics => "statistics",
            Action::NextBlock => "next_block",
            Action::PrevBlock => "prev_block",
            Action::BackToBlockText => "back_to_block_text",
            Action::NextQuestion => "next_question",
            Action::PrevQuestion => "prev_question",
            Action::Answer { .. } => "answer",
            Action::TestTopic { .. } => "test_topic",
            Action::TestSection { .. } => "test_section",
            Action::TestCourse { .. } => "test_course",
            Action::MyMistakes => "my_mistakes",
            Action::CreateCourse => "create_course",
            Action::EditCourse => "edit_course",
            Action::DeleteCourse => "delete_course",
            Action::AdminCoursesPage { .. } => "admin_courses_page",
            Action::SelectCourseForEdit { .. } => "select_course_for_edit",
            Action::SelectCourseForDelete { .. } => "select_course_for_delete",
            Action::ConfirmDeleteCourse { .. } => "confirm_delete_course",
            Action::EditCourseAction(_) => "edit_course_action",
            Action::AdminSectionsPage { .. } => "admin_sections_page",
            Action::SelectSectionForEdit { .. } => "select_section_for_edit",
            Action::EditSectionAction(_) => "edit_section_action",
            Action::AdminTopicsPage { .. } => "admin_topics_page",
            Action::SelectTopicForEdit { .. } => "select_topic_for_edit",
            Action::AdminBackToSections => "admin_back_to_sections",
            Action::AdminBackToTopics => "admin_back_to_topics",
        }
    }

    /// Wire form carried in the button's callback data
    pub fn encode(self) -> String {
        self.to_string()
    }
}

fn edit_target_str(target: EditTarget, children: &'static str) -> &'static str {
    match target {
        EditTarget::NameDesc => "name_desc",
        EditTarget::Children => children,
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match *self {
            Action::CoursesPage { source, page } => write!(f, "{name}:{}:{page}", source.as_str()),
            Action::SelectCourse { course_id }
            | Action::TestCourse { course_id }
            | Action::SelectCourseForEdit { course_id }
            | Action::SelectCourseForDelete { course_id }
            | Action::ConfirmDeleteCourse { course_id } => write!(f, "{name}:{course_id}"),
            Action::SelectSection { section_id }
            | Action::TestSection { section_id }
            | Action::SelectSectionForEdit { section_id } => write!(f, "{name}:{section_id}"),
            Action::SelectTopic { topic_id }
            | Action::TestTopic { topic_id }
            | Action::SelectTopicForEdit { topic_id } => write!(f, "{name}:{topic_id}"),
            Action::SectionsPage { course_id, page }
            | Action::AdminSectionsPage { course_id, page } => write!(f, "{name}:{course_id}:{page}"),
            Action::TopicsPage { section_id, page }
            | Action::AdminTopicsPage { section_id, page } => write!(f, "{name}:{section_id}:{page}"),
            Action::Answer {
                question_id,
                option_id,
            } => write!(f, "{name}:{question_id}:{option_id}"),
            Action::AdminCoursesPage { purpose, page } => {
                write!(f, "{name}:{}:{page}", purpose.as_str())
            }
            Action::EditCourseAction(target) => {
                write!(f, "{name}:{}", edit_target_str(target, "sections"))
            }
            Action::EditSectionAction(target) => {
                write!(f, "{name}:{}", edit_target_str(target, "topics"))
            }
            _ => f.write_str(name),
        }
    }
}

/// Positional argument reader for one callback string
struct Args<'a> {
    action: &'a str,
    parts: Vec<&'a str>,
}

impl<'a> Args<'a> {
    fn expect(&self, count: usize) -> Result<(), ActionParseError> {
        if self.parts.len() == count {
            Ok(())
        } else {
            Err(ActionParseError::Arity {
                action: self.action.to_string(),
                expected: count,
                got: self.parts.len(),
            })
        }
    }

    fn invalid(&self, value: &str) -> ActionParseError {
        ActionParseError::InvalidArgument {
            action: self.action.to_string(),
            value: value.to_string(),
        }
    }

    fn str(&self, index: usize) -> &'a str {
        self.parts.get(index).copied().unwrap_or_default()
    }

    fn id(&self, index: usize) -> Result<i64, ActionParseError> {
        let raw = self.str(index);
        raw.parse().map_err(|_| self.invalid(raw))
    }

    fn page(&self, index: usize) -> Result<usize, ActionParseError> {
        let raw = self.str(index);
        raw.parse().map_err(|_| self.invalid(raw))
    }

    fn one_id(&self) -> Result<i64, ActionParseError> {
        self.expect(1)?;
        self.id(0)
    }

    fn id_and_page(&self) -> Result<(i64, usize), ActionParseError> {
        self.expect(2)?;
        Ok((self.id(0)?, self.page(1)?))
    }

    fn none(&self) -> Result<(), ActionParseError> {
        self.expect(0)
    }
}

impl FromStr for Action {
    type Err = ActionParseError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut split = data.split(':');
        let name = split.next().unwrap_or_default();
        let args = Args {
            action: name,
            parts: split.collect(),
        };

        let action = match name {
            "main_menu" => args.none().map(|()| Action::MainMenu)?,
            "cancel" => args.none().map(|()| Action::Cancel)?,
            "back" => args.none().map(|()| Action::Back)?,
            "retry" => args.none().map(|()| Action::Retry)?,
            "my_courses" => args.none().map(|()| Action::MyCourses)?,
            "all_courses" => args.none().map(|()| Action::AllCourses)?,
            "search_courses" => args.none().map(|()| Action::SearchCourses)?,
            "courses_page" => {
                args.expect(2)?;
                let source = ListSource::parse(args.str(0)).ok_or_else(|| args.invalid(args.str(0)))?;
                Action::CoursesPage {
                    source,
                    page: args.page(1)?,
                }
            }
            "select_course" => Action::SelectCourse {
                course_id: args.one_id()?,
            },
            "sections_page" => {
                let (course_id, page) = args.id_and_page()?;
                Action::SectionsPage { course_id, page }
            }
            "select_section" => Action::SelectSection {
                section_id: args.one_id()?,
            },
            "topics_page" => {
                let (section_id, page) = args.id_and_page()?;
                Action::TopicsPage { section_id, page }
            }
            "select_topic" => Action::SelectTopic {
                topic_id: args.one_id()?,
            },
            "back_to_courses" => args.none().map(|()| Action::BackToCourses)?,
            "back_to_sections" => args.none().map(|()| Action::BackToSections)?,
            "back_to_topics" => args.none().map(|()| Action::BackToTopics)?,
            "statistics" => args.none().map(|()| Action::Statistics)?,
            "next_block" => args.none().map(|()| Action::NextBlock)?,
            "prev_block" => args.none().map(|()| Action::PrevBlock)?,
            "back_to_block_text" => args.none().map(|()| Action::BackToBlockText)?,
            "next_question" => args.none().map(|()| Action::NextQuestion)?,
            "prev_question" => args.none().map(|()| Action::PrevQuestion)?,
            "answer" => {
                args.expect(2)?;
                Action::Answer {
                    question_id: args.id(0)?,
                    option_id: args.id(1)?,
                }
            }
            "test_topic" => Action::TestTopic {
                topic_id: args.one_id()?,
            },
            "test_section" => Action::TestSection {
                section_id: args.one_id()?,
            },
            "test_course" => Action::TestCourse {
                course_id: args.one_id()?,
            },
            "my_mistakes" => args.none().map(|()| Action::MyMistakes)?,
            "create_course" => args.none().map(|()| Action::CreateCourse)?,
            "edit_course" => args.none().map(|()| Action::EditCourse)?,
            "delete_course" => args.none().map(|()| Action::DeleteCourse)?,
            "admin_courses_page" => {
                args.expect(2)?;
                let purpose = match args.str(0) {
                    "edit" => AdminListPurpose::Edit,
                    "delete" => AdminListPurpose::Delete,
                    other => return Err(args.invalid(other)),
                };
                Action::AdminCoursesPage {
                    purpose,
                    page: args.page(1)?,
                }
            }
            "select_course_for_edit" => Action::SelectCourseForEdit {
                course_id: args.one_id()?,
            },
            "select_course_for_delete" => Action::SelectCourseForDelete {
                course_id: args.one_id()?,
            },
            "confirm_delete_course" => Action::ConfirmDeleteCourse {
                course_id: args.one_id()?,
            },
            "edit_course_action" => {
                args.expect(1)?;
                match args.str(0) {
                    "name_desc" => Action::EditCourseAction(EditTarget::NameDesc),
                    "sections" => Action::EditCourseAction(EditTarget::Children),
                    other => return Err(args.invalid(other)),
                }
            }
            "admin_sections_page" => {
                let (course_id, page) = args.id_and_page()?;
                Action::AdminSectionsPage { course_id, page }
            }
            "select_section_for_edit" => Action::SelectSectionForEdit {
                section_id: args.one_id()?,
            },
            "edit_section_action" => {
                args.expect(1)?;
                match args.str(0) {
                    "name_desc" => Action::EditSectionAction(EditTarget::NameDesc),
                    "topics" => Action::EditSectionAction(EditTarget::Children),
                    other => return Err(args.invalid(other)),
                }
            }
            "admin_topics_page" => {
                let (section_id, page) = args.id_and_page()?;
                Action::AdminTopicsPage { section_id, page }
            }
            "select_topic_for_edit" => Action::SelectTopicForEdit {
                topic_id: args.one_id()?,
            },
            "admin_back_to_sections" => args.none().map(|()| Action::AdminBackToSections)?,
            "admin_back_to_topics" => args.none().map(|()| Action::AdminBackToTopics)?,
            other => return Err(ActionParseError::Unknown(other.to_string())),
        };
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_and_parameterized() {
        assert_eq!("main_menu".parse(), Ok(Action::MainMenu));
        assert_eq!(
            "answer:12:34".parse(),
            Ok(Action::Answer {
                question_id: 12,
                option_id: 34
            })
        );
        assert_eq!(
            "courses_page:search:2".parse(),
            Ok(Action::CoursesPage {
                source: ListSource::Search,
                page: 2
            })
        );
        assert_eq!(
            "edit_section_action:topics".parse(),
            Ok(Action::EditSectionAction(EditTarget::Children))
        );
    }

    #[test]
    fn test_encode_matches_wire_format() {
        assert_eq!(
            Action::SectionsPage {
                course_id: 3,
                page: 1
            }
            .encode(),
            "sections_page:3:1"
        );
        assert_eq!(
            Action::AdminCoursesPage {
                purpose: AdminListPurpose::Delete,
                page: 0
            }
            .encode(),
            "admin_courses_page:delete:0"
        );
        assert_eq!(Action::BackToTopics.encode(), "back_to_topics");
    }

    #[test]
    fn test_malformed_data_is_rejected() {
        assert!(matches!(
            "select_course:abc".parse::<Action>(),
            Err(ActionParseError::InvalidArgument { .. })
        ));
        assert!(matches!(
            "select_course".parse::<Action>(),
            Err(ActionParseError::Arity { expected: 1, got: 0, .. })
        ));
        assert!(matches!(
            "main_menu:1".parse::<Action>(),
            Err(ActionParseError::Arity { .. })
        ));
        assert!(matches!(
            "launch_rockets".parse::<Action>(),
            Err(ActionParseError::Unknown(_))
        ));
        assert!(matches!(
            "topics_page:1:-1".parse::<Action>(),
            Err(ActionParseError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_admin_gate() {
        assert!(Action::CreateCourse.requires_admin());
        assert!(Action::ConfirmDeleteCourse { course_id: 1 }.requires_admin());
        assert!(!Action::MyMistakes.requires_admin());
        assert!(!Action::Cancel.requires_admin());
    }
}
