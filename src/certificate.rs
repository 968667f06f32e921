use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use time::Date;

use crate::{
    course::{Course, CourseOutline},
    quiz::{Quiz, QuizResult},
    utils::{local_now, now_millis},
};

/// Minimum quiz score, in percent, to be awarded a certificate.
pub const PASSING_SCORE: u32 = 70;

/// All lessons completed (and at least one lesson exists), and the quiz score
/// is either absent or passing.
pub fn is_eligible_for_certificate(
    completed_lessons: usize,
    total_lessons: usize,
    quiz_score: Option<u32>,
) -> bool {
    let all_lessons_completed = completed_lessons == total_lessons && total_lessons > 0;
    let quiz_passed = quiz_score.is_none_or(|score| score >= PASSING_SCORE);
    all_lessons_completed && quiz_passed
}

/// Quiz score of a user over every quiz attached to the course, in percent.
///
/// Quizzes the user has not taken count as zero. `None` when the course has no
/// quiz.
pub fn course_quiz_score(
    course: &Course,
    quizzes: &[Quiz],
    results: &[QuizResult],
    user_id: i64,
) -> Option<u32> {
    let (score, total) = quizzes
        .iter()
        .filter(|quiz| course.chapter(quiz.chapter_id).is_some() && !quiz.questions.is_empty())
        .fold(None, |acc: Option<(u32, u32)>, quiz| {
            let (score, total) = acc.unwrap_or((0, 0));
            let taken = results
                .iter()
                .find(|r| r.user_id == user_id && r.chapter_id == quiz.chapter_id);
            let quiz_total = taken.map_or(quiz.questions.len() as u32, |r| r.total);
            Some((score + taken.map_or(0, |r| r.score), total + quiz_total))
        })?;
    if total == 0 {
        return Some(0);
    }
    Some(score * 100 / total)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub course_name: String,
    pub student_name: String,
    pub completion_date: Date,
    pub score: Option<u32>,
}

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

fn slug(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), "-").to_lowercase()
}

impl Certificate {
    /// Issue a certificate, `None` when the student is not eligible. Only
    /// lessons that resolve in the outline count towards the total.
    pub fn issue(
        outline: &CourseOutline,
        user_id: i64,
        student_name: &str,
        completed_lessons: usize,
        quiz_score: Option<u32>,
    ) -> Option<Self> {
        let total_lessons = outline.lesson_ids().len();
        if !is_eligible_for_certificate(completed_lessons, total_lessons, quiz_score) {
            return None;
        }
        Some(Self {
            id: now_millis(),
            user_id,
            course_id: outline.course_id,
            course_name: outline.title.clone(),
            student_name: student_name.to_string(),
            completion_date: local_now().date(),
            score: quiz_score,
        })
    }

    pub fn certificate_id(&self) -> String {
        format!("CERT-{}-{}-{}", self.id, self.user_id, self.course_id)
    }

    pub fn file_name(&self) -> String {
        format!(
            "certificate-{}-{}.pdf",
            slug(&self.course_name),
            slug(&self.student_name)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        course::{Chapter, Lesson, LessonRef},
        quiz::Question,
    };

    #[test]
    fn eligibility_rule() {
        assert!(is_eligible_for_certificate(5, 5, None));
        assert!(!is_eligible_for_certificate(5, 5, Some(65)));
        assert!(is_eligible_for_certificate(5, 5, Some(70)));
        assert!(!is_eligible_for_certificate(4, 5, Some(100)));
        assert!(!is_eligible_for_certificate(0, 0, Some(100)));
        assert!(!is_eligible_for_certificate(0, 0, None));
    }

    fn course() -> Course {
        Course {
            id: 3,
            title: "Advanced   Rust Patterns".to_string(),
            category: String::new(),
            description: String::new(),
            instructor_id: 2,
            chapters: vec![
                Chapter {
                    id: 1,
                    title: "a".to_string(),
                    lessons: vec![LessonRef::ById(1), LessonRef::ById(2)],
                },
                Chapter {
                    id: 2,
                    title: "b".to_string(),
                    lessons: vec![LessonRef::ById(3)],
                },
            ],
        }
    }

    fn quiz(chapter_id: i64, questions: usize) -> Quiz {
        Quiz {
            id: chapter_id,
            chapter_id,
            questions: (0..questions)
                .map(|i| Question {
                    id: i as i64,
                    question: String::new(),
                    choices: vec!["x".into(), "y".into()],
                    answer: 0,
                })
                .collect(),
        }
    }

    fn result(chapter_id: i64, score: u32, total: u32) -> QuizResult {
        QuizResult {
            id: None,
            user_id: 1,
            chapter_id,
            score,
            total,
        }
    }

    #[test]
    fn quiz_score_spans_the_course_quizzes() {
        let quizzes = [quiz(1, 4), quiz(2, 6), quiz(99, 10)];
        let results = [result(1, 4, 4), result(2, 3, 6), result(99, 0, 10)];
        assert_eq!(course_quiz_score(&course(), &quizzes, &results, 1), Some(70));
        // untaken quiz counts as zero
        assert_eq!(course_quiz_score(&course(), &quizzes, &results[..1], 1), Some(40));
        assert_eq!(course_quiz_score(&course(), &quizzes[2..], &results, 1), None);
    }

    fn outline(lesson_ids: &[i64]) -> CourseOutline {
        let lessons: Vec<Lesson> = lesson_ids
            .iter()
            .map(|&id| Lesson {
                id,
                title: format!("lesson {id}"),
                video_url: String::new(),
                chapter_id: 1,
            })
            .collect();
        CourseOutline::resolve(&course(), &lessons)
    }

    #[test]
    fn issue_requires_eligibility() {
        let outline = outline(&[1, 2, 3]);
        assert!(Certificate::issue(&outline, 1, "Alice", 2, None).is_none());
        assert!(Certificate::issue(&outline, 1, "Alice", 3, Some(60)).is_none());
        let cert = Certificate::issue(&outline, 1, "Alice Student", 3, Some(80)).unwrap();
        assert_eq!(cert.course_id, 3);
        assert_eq!(
            cert.certificate_id(),
            format!("CERT-{}-1-3", cert.id)
        );
        assert_eq!(
            cert.file_name(),
            "certificate-advanced-rust-patterns-alice-student.pdf"
        );
    }

    #[test]
    fn dangling_lesson_does_not_block_the_certificate() {
        // lesson 3 is referenced by the course but missing from the store
        let outline = outline(&[1, 2]);
        assert!(Certificate::issue(&outline, 1, "Alice", 2, None).is_some());
    }
}
