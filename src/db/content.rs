//! Catalog reads over the content and learner tables

use super::{
    parse_datetime, AccessLevel, AnswerOption, Block, Course, CourseProgress, Database, DbError,
    DbResult, HardestCourse, LearningCounts, Question, Section, StoredImage, TestKind, TestScore,
    Topic, UserId, UserStatistics,
};
use crate::catalog::{matches_query, Catalog, CatalogResult};
use crate::pagination::{limit_offset, paginate, Page, PAGE_SIZE};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};

impl Database {
    fn all_courses_ordered(&self) -> DbResult<Vec<Course>> {
        query_list(
            &self.conn(),
            "SELECT id, title, description FROM courses ORDER BY title COLLATE NOCASE, id",
            [],
            course_row,
        )
    }

    fn paged<T>(
        &self,
        count_sql: &str,
        page_sql: &str,
        parent: i64,
        page: usize,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> DbResult<Page<T>> {
        let conn = self.conn();
        let total: i64 = conn.query_row(count_sql, params![parent], |row| row.get(0))?;
        let (limit, offset) = limit_offset(page, PAGE_SIZE);
        let items = query_list(&conn, page_sql, params![parent, limit, offset], map)?;
        Ok(Page::new(
            items,
            page,
            PAGE_SIZE,
            usize::try_from(total).unwrap_or(0),
        ))
    }

    fn images(&self, table: &str, owner_column: &str, owner_id: i64) -> DbResult<Vec<StoredImage>> {
        let sql = format!(
            "SELECT id, file_path, description FROM {table} WHERE {owner_column} = ?1 ORDER BY order_index, id"
        );
        query_list(&self.conn(), &sql, params![owner_id], |row| {
            Ok(StoredImage {
                id: row.get(0)?,
                file_path: row.get(1)?,
                description: row.get(2)?,
            })
        })
    }

    fn ids(&self, sql: &str, parent: i64) -> DbResult<Vec<i64>> {
        query_list(&self.conn(), sql, params![parent], |row| row.get(0))
    }

    fn load_block(&self, id: i64) -> DbResult<Option<Block>> {
        let block = self
            .conn()
            .query_row(
                "SELECT id, topic_id, text_content FROM blocks WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Block {
                        id: row.get(0)?,
                        topic_id: row.get(1)?,
                        text: row.get(2)?,
                        images: Vec::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut block) = block else {
            return Ok(None);
        };
        block.images = self.images("block_images", "block_id", id)?;
        Ok(Some(block))
    }

    fn load_question(&self, id: i64) -> DbResult<Option<Question>> {
        let question = self
            .conn()
            .query_row(
                "SELECT id, block_id, text, explanation FROM questions WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Question {
                        id: row.get(0)?,
                        block_id: row.get(1)?,
                        text: row.get(2)?,
                        explanation: row.get(3)?,
                        options: Vec::new(),
                        images: Vec::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut question) = question else {
            return Ok(None);
        };
        question.options = query_list(
            &self.conn(),
            "SELECT id, text, is_correct FROM answer_options WHERE question_id = ?1 ORDER BY order_index, id",
            params![id],
            |row| {
                Ok(AnswerOption {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    is_correct: row.get(2)?,
                })
            },
        )?;
        question.images = self.images("question_images", "question_id", id)?;
        Ok(Some(question))
    }

    fn grouped_ids(&self, group_sql: &str, parent: i64, member_sql: &str) -> DbResult<Vec<Vec<i64>>> {
        self.ids(group_sql, parent)?
            .into_iter()
            .map(|group| self.ids(member_sql, group))
            .collect()
    }

    fn load_learning_counts(&self, user_id: UserId, topic_id: i64) -> DbResult<LearningCounts> {
        let conn = self.conn();
        let total: u32 = conn.query_row(
            "SELECT COUNT(*) FROM questions q JOIN blocks b ON q.block_id = b.id WHERE b.topic_id = ?1",
            params![topic_id],
            |row| row.get(0),
        )?;
        // Latest learning answer per question of the topic
        let (answered, correct): (u32, u32) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(p.correct), 0)
             FROM progress p
             JOIN questions q ON p.question_id = q.id
             JOIN blocks b ON q.block_id = b.id
             WHERE b.topic_id = ?2 AND p.user_id = ?1 AND p.mode = 'learning'
               AND p.id = (SELECT p2.id FROM progress p2
                           WHERE p2.user_id = p.user_id AND p2.question_id = p.question_id
                             AND p2.mode = 'learning'
                           ORDER BY p2.answered_at DESC, p2.id DESC LIMIT 1)",
            params![user_id, topic_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(LearningCounts {
            total,
            answered,
            correct,
        })
    }

    fn load_statistics(&self, user_id: UserId) -> DbResult<UserStatistics> {
        let conn = self.conn();
        let study_seconds: i64 = conn.query_row(
            "SELECT COALESCE(SUM(total_seconds), 0) FROM study_time WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;

        let courses = query_list(
            &conn,
            "SELECT c.id, c.title,
                    (SELECT COUNT(*) FROM questions q2
                       JOIN blocks b2 ON q2.block_id = b2.id
                       JOIN topics t2 ON b2.topic_id = t2.id
                       JOIN sections s2 ON t2.section_id = s2.id
                      WHERE s2.course_id = c.id),
                    COUNT(DISTINCT p.question_id)
             FROM progress p
             JOIN questions q ON p.question_id = q.id
             JOIN blocks b ON q.block_id = b.id
             JOIN topics t ON b.topic_id = t.id
             JOIN sections s ON t.section_id = s.id
             JOIN courses c ON s.course_id = c.id
             WHERE p.user_id = ?1
             GROUP BY c.id
             ORDER BY c.title COLLATE NOCASE",
            params![user_id],
            |row| {
                Ok(CourseProgress {
                    course_id: row.get(0)?,
                    title: row.get(1)?,
                    total_questions: row.get(2)?,
                    answered_questions: row.get(3)?,
                })
            },
        )?;

        let rates = query_list(
            &conn,
            "SELECT c.title, COUNT(*), SUM(CASE WHEN p.correct THEN 0 ELSE 1 END)
             FROM progress p
             JOIN questions q ON p.question_id = q.id
             JOIN blocks b ON q.block_id = b.id
             JOIN topics t ON b.topic_id = t.id
             JOIN sections s ON t.section_id = s.id
             JOIN courses c ON s.course_id = c.id
             WHERE p.user_id = ?1
             GROUP BY c.id
             ORDER BY c.title COLLATE NOCASE",
            params![user_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?, row.get::<_, u32>(2)?)),
        )?;
        let hardest_course = rates
            .into_iter()
            .filter(|(_, total, _)| *total > 0)
            .map(|(title, total, wrong)| HardestCourse {
                title,
                error_percent: (wrong * 100 + total / 2) / total,
            })
            .reduce(|best, next| {
                if next.error_percent > best.error_percent {
                    next
                } else {
                    best
                }
            });

        Ok(UserStatistics {
            study_seconds,
            courses,
            hardest_course,
        })
    }
}

impl Catalog for Database {
    fn all_courses(&self, page: usize) -> CatalogResult<Page<Course>> {
        let all = self.all_courses_ordered().map_err(err)?;
        Ok(paginate(&all, page, PAGE_SIZE))
    }

    fn my_courses(&self, user_id: UserId, page: usize) -> CatalogResult<Page<Course>> {
        self.paged(
            "SELECT COUNT(*) FROM access_log a JOIN courses c ON a.entity_id = c.id
             WHERE a.level = 'course' AND a.user_id = ?1",
            "SELECT c.id, c.title, c.description FROM access_log a JOIN courses c ON a.entity_id = c.id
             WHERE a.level = 'course' AND a.user_id = ?1
             ORDER BY a.last_accessed_at DESC, c.id LIMIT ?2 OFFSET ?3",
            user_id,
            page,
            course_row,
        )
        .map_err(err)
    }

    fn search_courses(&self, query: &str, page: usize) -> CatalogResult<Page<Course>> {
        let matching: Vec<Course> = self
            .all_courses_ordered()
            .map_err(err)?
            .into_iter()
            .filter(|course| matches_query(course, query))
            .collect();
        Ok(paginate(&matching, page, PAGE_SIZE))
    }

    fn sections(&self, course_id: i64, page: usize) -> CatalogResult<Page<Section>> {
        self.paged(
            "SELECT COUNT(*) FROM sections WHERE course_id = ?1",
            "SELECT id, course_id, title, description FROM sections WHERE course_id = ?1
             ORDER BY order_index, id LIMIT ?2 OFFSET ?3",
            course_id,
            page,
            section_row,
        )
        .map_err(err)
    }

    fn topics(&self, section_id: i64, page: usize) -> CatalogResult<Page<Topic>> {
        self.paged(
            "SELECT COUNT(*) FROM topics WHERE section_id = ?1",
            "SELECT id, section_id, title, description FROM topics WHERE section_id = ?1
             ORDER BY order_index, id LIMIT ?2 OFFSET ?3",
            section_id,
            page,
            topic_row,
        )
        .map_err(err)
    }

    fn course(&self, id: i64) -> CatalogResult<Option<Course>> {
        query_one(
            &self.conn(),
            "SELECT id, title, description FROM courses WHERE id = ?1",
            id,
            course_row,
        )
        .map_err(err)
    }

    fn section(&self, id: i64) -> CatalogResult<Option<Section>> {
        query_one(
            &self.conn(),
            "SELECT id, course_id, title, description FROM sections WHERE id = ?1",
            id,
            section_row,
        )
        .map_err(err)
    }

    fn topic(&self, id: i64) -> CatalogResult<Option<Topic>> {
        query_one(
            &self.conn(),
            "SELECT id, section_id, title, description FROM topics WHERE id = ?1",
            id,
            topic_row,
        )
        .map_err(err)
    }

    fn block(&self, id: i64) -> CatalogResult<Option<Block>> {
        self.load_block(id).map_err(err)
    }

    fn question(&self, id: i64) -> CatalogResult<Option<Question>> {
        self.load_question(id).map_err(err)
    }

    fn block_ids(&self, topic_id: i64) -> CatalogResult<Vec<i64>> {
        self.ids(
            "SELECT id FROM blocks WHERE topic_id = ?1 ORDER BY order_index, id",
            topic_id,
        )
        .map_err(err)
    }

    fn question_ids(&self, block_id: i64) -> CatalogResult<Vec<i64>> {
        self.ids(
            "SELECT id FROM questions WHERE block_id = ?1 ORDER BY order_index, id",
            block_id,
        )
        .map_err(err)
    }

    fn topic_question_ids(&self, topic_id: i64) -> CatalogResult<Vec<i64>> {
        self.ids(
            "SELECT q.id FROM questions q JOIN blocks b ON q.block_id = b.id
             WHERE b.topic_id = ?1 ORDER BY b.order_index, b.id, q.order_index, q.id",
            topic_id,
        )
        .map_err(err)
    }

    fn section_question_groups(&self, section_id: i64) -> CatalogResult<Vec<Vec<i64>>> {
        self.grouped_ids(
            "SELECT b.id FROM blocks b JOIN topics t ON b.topic_id = t.id
             WHERE t.section_id = ?1 ORDER BY t.order_index, t.id, b.order_index, b.id",
            section_id,
            "SELECT id FROM questions WHERE block_id = ?1 ORDER BY order_index, id",
        )
        .map_err(err)
    }

    fn course_question_groups(&self, course_id: i64) -> CatalogResult<Vec<Vec<i64>>> {
        self.grouped_ids(
            "SELECT t.id FROM topics t JOIN sections s ON t.section_id = s.id
             WHERE s.course_id = ?1 ORDER BY s.order_index, s.id, t.order_index, t.id",
            course_id,
            "SELECT q.id FROM questions q JOIN blocks b ON q.block_id = b.id
             WHERE b.topic_id = ?1 ORDER BY b.order_index, b.id, q.order_index, q.id",
        )
        .map_err(err)
    }

    fn section_topic_ids(&self, section_id: i64) -> CatalogResult<Vec<i64>> {
        self.ids(
            "SELECT id FROM topics WHERE section_id = ?1 ORDER BY order_index, id",
            section_id,
        )
        .map_err(err)
    }

    fn course_section_ids(&self, course_id: i64) -> CatalogResult<Vec<i64>> {
        self.ids(
            "SELECT id FROM sections WHERE course_id = ?1 ORDER BY order_index, id",
            course_id,
        )
        .map_err(err)
    }

    fn mistake_question_ids(&self, user_id: UserId) -> CatalogResult<Vec<i64>> {
        self.ids(
            "SELECT question_id FROM mistakes WHERE user_id = ?1 ORDER BY last_mistake_at, question_id",
            user_id,
        )
        .map_err(err)
    }

    fn last_accessed(
        &self,
        user_id: UserId,
        level: AccessLevel,
        entity_id: i64,
    ) -> CatalogResult<Option<DateTime<Utc>>> {
        self.conn()
            .query_row(
                "SELECT last_accessed_at FROM access_log
                 WHERE user_id = ?1 AND level = ?2 AND entity_id = ?3",
                params![user_id, level.as_str(), entity_id],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map(|found| found.map(|s| parse_datetime(&s)))
            .map_err(|e| err(e.into()))
    }

    fn test_score(
        &self,
        user_id: UserId,
        kind: TestKind,
        target_id: i64,
    ) -> CatalogResult<Option<TestScore>> {
        self.conn()
            .query_row(
                "SELECT correct, wrong FROM test_results
                 WHERE user_id = ?1 AND kind = ?2 AND target_id = ?3",
                params![user_id, kind.as_str(), target_id],
                |row| {
                    Ok(TestScore {
                        correct: row.get(0)?,
                        wrong: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(|e| err(e.into()))
    }

    fn learning_counts(&self, user_id: UserId, topic_id: i64) -> CatalogResult<LearningCounts> {
        self.load_learning_counts(user_id, topic_id).map_err(err)
    }

    fn statistics(&self, user_id: UserId) -> CatalogResult<UserStatistics> {
        self.load_statistics(user_id).map_err(err)
    }
}

fn err(e: DbError) -> String {
    e.to_string()
}

fn query_list<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> DbResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, map)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn query_one<T>(
    conn: &Connection,
    sql: &str,
    id: i64,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> DbResult<Option<T>> {
    Ok(conn.query_row(sql, params![id], map).optional()?)
}

fn course_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
    })
}

fn section_row(row: &Row<'_>) -> rusqlite::Result<Section> {
    Ok(Section {
        id: row.get(0)?,
        course_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
    })
}

fn topic_row(row: &Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        section_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
    })
}
