use serde::{Deserialize, Serialize};

use super::{Course, CourseOutline, Lesson};
use crate::quiz::{Question, Quiz};

/// Instructor-side authoring form of a course.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub instructor_id: i64,
    #[serde(default)]
    pub chapters: Vec<ChapterForm>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterForm {
    /// Backing chapter id, carried from the stored course while editing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub lessons: Vec<LessonForm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<QuizForm>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonForm {
    /// Id of the lesson record, when editing a stored lesson
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub video_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl CourseForm {
    /// Empty form for a new course of the given instructor.
    pub fn new(instructor_id: i64) -> Self {
        Self {
            instructor_id,
            ..Default::default()
        }
    }

    /// Form pre-filled from a stored course, for editing.
    ///
    /// Lesson ids are only carried for lessons backed by the `lessons`
    /// collection, inline lessons are re-created on save.
    pub fn from_course(course: &Course, all_lessons: &[Lesson], quizzes: &[Quiz]) -> Self {
        let outline = CourseOutline::resolve(course, all_lessons);
        let chapters = outline
            .chapters
            .iter()
            .map(|chapter| ChapterForm {
                id: Some(chapter.id),
                title: chapter.title.clone(),
                lessons: chapter
                    .lessons
                    .iter()
                    .map(|lesson| LessonForm {
                        id: outline.is_stored(lesson.id).then_some(lesson.id),
                        title: lesson.title.clone(),
                        video_url: lesson.video_url.clone(),
                    })
                    .collect(),
                quiz: quizzes
                    .iter()
                    .find(|quiz| quiz.chapter_id == chapter.id)
                    .map(|quiz| QuizForm {
                        id: Some(quiz.id),
                        questions: quiz.questions.clone(),
                    }),
            })
            .collect();
        Self {
            id: Some(course.id),
            title: course.title.clone(),
            category: course.category.clone(),
            description: course.description.clone(),
            instructor_id: course.instructor_id,
            chapters,
        }
    }

    pub fn add_chapter(&mut self, title: impl Into<String>) -> &mut ChapterForm {
        self.chapters.push(ChapterForm {
            title: title.into(),
            ..Default::default()
        });
        let last = self.chapters.len() - 1;
        &mut self.chapters[last]
    }

    pub fn remove_chapter(&mut self, index: usize) -> Option<ChapterForm> {
        (index < self.chapters.len()).then(|| self.chapters.remove(index))
    }

    pub fn lesson_count(&self) -> usize {
        self.chapters.iter().map(|ch| ch.lessons.len()).sum()
    }
}

impl ChapterForm {
    pub fn add_lesson(&mut self, title: impl Into<String>, video_url: impl Into<String>) {
        self.lessons.push(LessonForm {
            id: None,
            title: title.into(),
            video_url: video_url.into(),
        });
    }

    pub fn remove_lesson(&mut self, index: usize) -> Option<LessonForm> {
        (index < self.lessons.len()).then(|| self.lessons.remove(index))
    }

    /// The quiz to upsert on save, if it holds any question.
    pub fn quiz_to_save(&self) -> Option<&QuizForm> {
        self.quiz.as_ref().filter(|quiz| !quiz.questions.is_empty())
    }
}
