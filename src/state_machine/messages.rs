//! User-facing texts and button labels

use crate::db::{TestKind, UserStatistics};
use crate::progress::format_study_time;
use crate::quiz::QuizSummary;

// ============================================================================
// Buttons
// ============================================================================

pub const BUTTON_BACK: &str = "🔙 Back";
pub const BUTTON_MAIN_MENU: &str = "🏠 Main menu";
pub const BUTTON_CANCEL: &str = "❌ Cancel";
pub const BUTTON_RETRY: &str = "🔄 Retry";
pub const BUTTON_NEXT: &str = "Next →";
pub const BUTTON_PREV_PAGE: &str = "◀ Prev";
pub const BUTTON_NEXT_PAGE: &str = "Next ▶";
pub const BUTTON_TO_QUESTIONS: &str = "❓ To questions";
pub const BUTTON_NEXT_BLOCK: &str = "⏩ Next block";
pub const BUTTON_PREV_BLOCK: &str = "⏪ Previous block";
pub const BUTTON_FINISH_TOPIC: &str = "✅ Finish topic";
pub const BUTTON_BACK_TO_TEXT: &str = "Back to text";
pub const BUTTON_EXIT_TOPIC: &str = "Exit topic";
pub const BUTTON_COMPLETE: &str = "✅ Complete";
pub const BUTTON_RETRY_SEARCH: &str = "🔁 Search again";
pub const BUTTON_BACK_TO_TOPICS_LIST: &str = "📋 To topics list";
pub const BUTTON_NAME_DESC: &str = "Title / description";
pub const BUTTON_SECTIONS: &str = "Course sections";
pub const BUTTON_TOPICS: &str = "Section topics";
pub const BUTTON_YES_DELETE: &str = "Yes, delete";
pub const BUTTON_NO: &str = "No";
pub const BUTTON_TEST: &str = "Test";

pub const BUTTON_MY_COURSES: &str = "📚 My courses";
pub const BUTTON_ALL_COURSES: &str = "📋 Choose a course";
pub const BUTTON_SEARCH: &str = "🔍 Find a course";
pub const BUTTON_STATISTICS: &str = "📊 Statistics";
pub const BUTTON_MISTAKES: &str = "❌ My mistakes";
pub const BUTTON_CREATE_COURSE: &str = "➕ Create course";
pub const BUTTON_EDIT_COURSE: &str = "✏️ Edit course";
pub const BUTTON_DELETE_COURSE: &str = "🗑️ Delete course";

// ============================================================================
// Messages
// ============================================================================

pub const MSG_MAIN_MENU: &str = "Main menu:";
pub const MSG_TOO_MANY_REQUESTS: &str = "⏳ Too many requests. Please wait a minute.";
pub const MSG_TOO_LONG: &str = "⚠️ Message too long. Please keep it under {max} characters.";
pub const MSG_SEARCH_PROMPT: &str = "🔍 Enter text to search for courses:";
pub const MSG_NO_MY_COURSES: &str =
    "🌟 You have no courses yet. Press \"Choose a course\" to start learning!";
pub const MSG_NO_COURSES: &str =
    "📚 There are no courses yet. Contact the administrator if you expected to see some.";
pub const MSG_TOPIC_NO_QUESTIONS: &str =
    "❓ This topic has no questions to test yet. Try another topic or come back later.";
pub const MSG_SECTION_NO_QUESTIONS: &str =
    "❓ This section has no questions yet. They may appear later.";
pub const MSG_COURSE_NO_QUESTIONS: &str =
    "❓ This course has no questions yet. Contact the administrator.";
pub const MSG_NO_MISTAKES: &str =
    "✅ Great! You have no mistakes to review. Keep it up!";
pub const MSG_TOPIC_NO_BLOCKS: &str =
    "⚠️ This topic has no study blocks yet. You can go back to the topic list.";
pub const MSG_BLOCK_NOT_FOUND: &str =
    "😕 Block not found. It may have been deleted. Go back to the topic list.";
pub const MSG_QUESTION_NOT_FOUND: &str = "😕 Question not found. It may have been deleted.";
pub const MSG_NOT_FOUND: &str = "😕 Not found. It may have been deleted.";
pub const MSG_WRONG_OPTION: &str = "Error: unknown answer option.";
pub const MSG_UNEXPECTED_FILE: &str = "Unexpected file. Please try again.";
pub const MSG_CORRECT: &str = "✅ Correct!";
pub const MSG_WRONG: &str = "❌ Wrong.";

pub const MSG_SEND_JSON_COURSE: &str = "Send a JSON file with the course data.";
pub const MSG_SEND_JSON_COURSE_NAME_DESC: &str =
    "Send JSON with the new course title and description:";
pub const MSG_SEND_JSON_SECTION_NAME_DESC: &str =
    "Send JSON with the new section title and description:";
pub const MSG_SEND_JSON_TOPIC: &str =
    "Send JSON with the full topic content (blocks, questions, options):";
pub const MSG_WHAT_TO_CHANGE: &str = "What do you want to change?";
pub const MSG_WHAT_TO_CHANGE_SECTION: &str = "What do you want to change in the section?";
pub const MSG_CONFIRM_DELETE_COURSE: &str =
    "Are you sure you want to delete the course \"{title}\"? This cannot be undone.";
pub const MSG_COURSE_DELETED: &str = "Course deleted.";
pub const MSG_ERROR_DELETING_COURSE: &str = "Error while deleting the course.";
pub const MSG_TOPIC_UPDATED_NO_IMAGES: &str = "Topic updated. No images required.";
pub const MSG_IMAGES_COMPLETE: &str = "All images received.";
pub const MSG_SAVE_IMAGE_ERROR: &str =
    "🖼️ Could not save the image. Make sure you send a photo and try again.";
pub const MSG_PLEASE_SEND_PHOTO: &str = "Please send an image.";
pub const MSG_NO_COURSES_TO_EDIT: &str =
    "📭 No courses to edit. Create one first with \"Create course\".";
pub const MSG_NO_COURSES_TO_DELETE: &str = "📭 No courses to delete.";
pub const MSG_NO_SECTIONS: &str = "📭 This course has no sections.";
pub const MSG_NO_TOPICS: &str = "📭 This section has no topics.";
pub const MSG_COURSE_NOT_SELECTED: &str = "Error: no course selected for editing.";
pub const MSG_SECTION_NOT_SELECTED: &str = "Error: no section selected for editing.";
pub const MSG_IMPORT_FAILED: &str = "Import failed:";
pub const MSG_UPDATE_FAILED: &str = "Update failed:";
pub const MSG_STORAGE_ERROR: &str = "⚠️ Something went wrong. Please try again later.";

pub const DEFAULT_USER_NAME: &str = "there";

// ============================================================================
// Formatters
// ============================================================================

pub fn greeting(name: Option<&str>) -> String {
    format!(
        "👋 Hi, {}!\n\n{MSG_MAIN_MENU}",
        name.unwrap_or(DEFAULT_USER_NAME)
    )
}

pub fn too_long(max: usize) -> String {
    MSG_TOO_LONG.replace("{max}", &max.to_string())
}

pub fn search_results_header(query: &str, page: usize, pages: usize, total: usize) -> String {
    format!("🔍 Results for \"{query}\" (page {page} of {pages}): {total} course(s) found.")
}

pub fn search_not_found(query: &str) -> String {
    format!("😕 Nothing found for \"{query}\".")
}

pub fn my_courses_header(page: usize, pages: usize, total: usize) -> String {
    format!(
        "📚 My courses (page {page} of {pages}): {total} course(s).\nTap a course to continue learning."
    )
}

pub fn all_courses_header(page: usize, pages: usize, total: usize) -> String {
    format!(
        "📋 All courses (page {page} of {pages}): {total} course(s).\nChoose a course to study."
    )
}

pub fn course_sections_header(
    title: &str,
    description: &str,
    last_visit: &str,
    page: usize,
    pages: usize,
    total: usize,
) -> String {
    format!(
        "📖 Course: {title}\n{description}\n\n⏱️ Last visit: {last_visit}\n\n📌 Sections (page {page} of {pages}): {total} section(s).\nChoose a section."
    )
}

pub fn section_topics_header(
    title: &str,
    description: &str,
    last_visit: &str,
    page: usize,
    pages: usize,
    total: usize,
) -> String {
    format!(
        "📂 Section: {title}\n{description}\n\n⏱️ Last visit: {last_visit}\n\n📌 Topics (page {page} of {pages}): {total} topic(s).\nChoose a topic."
    )
}

pub fn block_text(topic_title: &str, index: usize, total: usize, text: &str) -> String {
    format!("📘 {topic_title} ({index}/{total})\n\n{text}")
}

pub fn question(number: usize, total: usize, text: &str) -> String {
    format!("Question {number} of {total}:\n\n{text}")
}

pub fn answer_result(correct: bool, explanation: &str) -> String {
    let verdict = if correct { MSG_CORRECT } else { MSG_WRONG };
    format!("{verdict}\n\nExplanation: {explanation}")
}

pub fn topic_completed(correct: u32, wrong: u32) -> String {
    format!(
        "Topic finished.\nCorrect answers: {correct}\nWrong answers: {wrong}\nTotal questions: {}",
        correct + wrong
    )
}

pub fn test_completed(summary: &QuizSummary) -> String {
    format!(
        "Test finished!\n\nCorrect answers: {}\nWrong answers: {}\nTotal questions: {}",
        summary.correct, summary.wrong, summary.total
    )
}

pub fn no_questions(kind: TestKind) -> &'static str {
    match kind {
        TestKind::Topic => MSG_TOPIC_NO_QUESTIONS,
        TestKind::Section => MSG_SECTION_NO_QUESTIONS,
        TestKind::Course => MSG_COURSE_NO_QUESTIONS,
        TestKind::Mistakes => MSG_NO_MISTAKES,
    }
}

pub fn statistics(stats: &UserStatistics) -> String {
    let mut text = String::from("📊 Your statistics:\n\n");
    text.push_str(&format!("Courses started: {}\n", stats.started_courses()));
    text.push_str(&format!("Fully completed: {}\n", stats.completed_courses()));
    match &stats.hardest_course {
        Some(hardest) => text.push_str(&format!(
            "Hardest course: {} ({}% mistakes)\n\n",
            hardest.title, hardest.error_percent
        )),
        None => text.push_str("Hardest course: no data\n\n"),
    }
    text.push_str(&format!(
        "⏱️ Total study time: {}\n",
        format_study_time(stats.study_seconds)
    ));
    text.push_str("📚 Course progress:\n");
    if stats.courses.is_empty() {
        text.push_str("   (no data)");
    }
    for course in &stats.courses {
        let marker = if course.is_completed() { "🟢" } else { "🟡" };
        text.push_str(&format!(
            "{marker} {} — {}% ({}/{} questions)\n",
            course.title,
            course.percent(),
            course.answered_questions.min(course.total_questions),
            course.total_questions
        ));
    }
    text
}

pub fn confirm_delete(title: &str) -> String {
    MSG_CONFIRM_DELETE_COURSE.replace("{title}", title)
}

pub fn course_import_success(title: &str) -> String {
    format!("Success. Course \"{title}\" added. No images required.")
}

pub fn image_request(number: usize, total: usize, description: &str) -> String {
    format!("📸 Image {number} of {total} required:\n{description}")
}

pub fn rename_report(
    what: &str,
    old_title: &str,
    new_title: &str,
    old_description: &str,
    new_description: &str,
) -> String {
    format!(
        "Success. {what} updated.\nPrevious title: {old_title}\nNew title: {new_title}\nPrevious description: {old_description}\nNew description: {new_description}"
    )
}

pub fn edit_courses_header(page: usize, pages: usize, total: usize) -> String {
    format!("✏️ Edit courses (page {page} of {pages}): {total} course(s).\nChoose a course to change.")
}

pub fn delete_courses_header(page: usize, pages: usize, total: usize) -> String {
    format!("🗑️ Delete courses (page {page} of {pages}): {total} course(s).\nChoose a course to delete.")
}

pub fn edit_sections_header(course: &str, page: usize, pages: usize, total: usize) -> String {
    format!("✏️ Course: {course}\n\nChoose a section to edit (page {page} of {pages}): {total} section(s).")
}

pub fn edit_topics_header(section: &str, page: usize, pages: usize, total: usize) -> String {
    format!("✏️ Section: {section}\n\nChoose a topic to edit (page {page} of {pages}): {total} topic(s).")
}
