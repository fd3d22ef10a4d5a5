//! JSON content documents uploaded by admins
//!
//! Missing fields decode as empty so that validation can report every
//! problem with its position instead of failing on the first one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("Could not parse JSON: {0}")]
    Parse(String),
    #[error("{header}\n{}", .errors.join("\n"))]
    Invalid {
        header: &'static str,
        errors: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CourseImport {
    pub title: String,
    pub description: String,
    pub sections: Vec<SectionImport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SectionImport {
    pub title: String,
    pub description: String,
    pub topics: Vec<TopicImport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TopicImport {
    pub title: String,
    pub description: String,
    pub blocks: Vec<BlockImport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BlockImport {
    pub text: String,
    /// Image descriptions; files are uploaded afterwards
    pub images: Vec<String>,
    pub questions: Vec<QuestionImport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct QuestionImport {
    pub text: String,
    pub images: Vec<String>,
    pub options: Vec<String>,
    #[serde(alias = "correct_index")]
    pub correct_index: i64,
    pub explanation: String,
}

/// Title and description replacement for a course or section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NameDescImport {
    pub title: String,
    pub description: String,
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ImportError> {
    serde_json::from_slice(bytes).map_err(|e| ImportError::Parse(e.to_string()))
}

/// Parse and validate a full course document
pub fn parse_course(bytes: &[u8]) -> Result<CourseImport, ImportError> {
    let course: CourseImport = decode(bytes)?;
    validate_course(&course)?;
    Ok(course)
}

/// Parse and validate a single-topic replacement document
pub fn parse_topic(bytes: &[u8]) -> Result<TopicImport, ImportError> {
    let topic: TopicImport = decode(bytes)?;
    validate_topic(&topic)?;
    Ok(topic)
}

/// Parse a rename document; both fields must be non-empty
pub fn parse_name_desc(bytes: &[u8]) -> Result<NameDescImport, ImportError> {
    let update: NameDescImport = decode(bytes)?;
    let mut errors = Vec::new();
    if blank(&update.title) {
        errors.push("Title must not be empty".to_string());
    }
    if blank(&update.description) {
        errors.push("Description must not be empty".to_string());
    }
    if errors.is_empty() {
        Ok(update)
    } else {
        Err(ImportError::Invalid {
            header: "Errors in JSON:",
            errors,
        })
    }
}

pub fn validate_course(course: &CourseImport) -> Result<(), ImportError> {
    let mut errors = Vec::new();
    if blank(&course.title) {
        errors.push("Course title must not be empty".to_string());
    }
    if blank(&course.description) {
        errors.push("Course description must not be empty".to_string());
    }
    if course.sections.is_empty() {
        errors.push("Course must contain at least one section".to_string());
    }
    for (i, section) in course.sections.iter().enumerate() {
        let at = format!("Section {}", i + 1);
        if blank(&section.title) {
            errors.push(format!("{at}: title must not be empty"));
        }
        if section.topics.is_empty() {
            errors.push(format!("{at}: section must contain at least one topic"));
        }
        for (j, topic) in section.topics.iter().enumerate() {
            let at = format!("{at}, topic {}", j + 1);
            if blank(&topic.title) {
                errors.push(format!("{at}: title must not be empty"));
            }
            check_blocks(&topic.blocks, Some(&at), &mut errors);
        }
    }
    finish(errors, "Errors in JSON:")
}

pub fn validate_topic(topic: &TopicImport) -> Result<(), ImportError> {
    let mut errors = Vec::new();
    if blank(&topic.title) {
        errors.push("Topic title must not be empty".to_string());
    }
    if blank(&topic.description) {
        errors.push("Topic description must not be empty".to_string());
    }
    check_blocks(&topic.blocks, None, &mut errors);
    finish(errors, "Errors in topic JSON:")
}

fn check_blocks(blocks: &[BlockImport], prefix: Option<&str>, errors: &mut Vec<String>) {
    let position = |tail: String| match prefix {
        Some(p) => format!("{p}, {}", tail.to_lowercase()),
        None => tail,
    };
    if blocks.is_empty() {
        match prefix {
            Some(p) => errors.push(format!("{p}: topic must contain at least one block")),
            None => errors.push("Topic must contain at least one block".to_string()),
        }
    }
    for (k, block) in blocks.iter().enumerate() {
        let at = position(format!("Block {}", k + 1));
        if blank(&block.text) {
            errors.push(format!("{at}: block text must not be empty"));
        }
        if block.questions.is_empty() {
            errors.push(format!("{at}: block must contain at least one question"));
        }
        for (l, question) in block.questions.iter().enumerate() {
            let at = format!("{at}, question {}", l + 1);
            if blank(&question.text) {
                errors.push(format!("{at}: question text must not be empty"));
            }
            if question.options.len() < 2 {
                errors.push(format!("{at}: at least 2 answer options are required"));
            } else if usize::try_from(question.correct_index)
                .map_or(true, |idx| idx >= question.options.len())
            {
                errors.push(format!(
                    "{at}: correct answer index must be between 0 and {}",
                    question.options.len() - 1
                ));
            }
            if blank(&question.explanation) {
                errors.push(format!("{at}: explanation must not be empty"));
            }
        }
    }
}

fn finish(errors: Vec<String>, header: &'static str) -> Result<(), ImportError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ImportError::Invalid { header, errors })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn question(text: &str, correct_index: i64) -> QuestionImport {
        QuestionImport {
            text: text.to_string(),
            images: Vec::new(),
            options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            correct_index,
            explanation: format!("Because {text}"),
        }
    }

    pub fn block(text: &str, questions: Vec<QuestionImport>) -> BlockImport {
        BlockImport {
            text: text.to_string(),
            images: Vec::new(),
            questions,
        }
    }

    pub fn topic(title: &str, blocks: Vec<BlockImport>) -> TopicImport {
        TopicImport {
            title: title.to_string(),
            description: format!("About {title}"),
            blocks,
        }
    }

    /// Course with one section holding the given topics
    pub fn course(title: &str, topics: Vec<TopicImport>) -> CourseImport {
        CourseImport {
            title: title.to_string(),
            description: format!("{title} course"),
            sections: vec![SectionImport {
                title: "Basics".to_string(),
                description: "First steps".to_string(),
                topics,
            }],
        }
    }
}
