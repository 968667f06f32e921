pub mod form;
pub mod outline;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use form::{ChapterForm, CourseForm, LessonForm, QuizForm};
pub use outline::{CourseOutline, ResolvedChapter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub instructor_id: i64,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

/// Course record as submitted for creation, the store assigns the id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub title: String,
    pub category: String,
    pub description: String,
    pub instructor_id: i64,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub lessons: Vec<LessonRef>,
}

/// A chapter entry is either the id of a record in the `lessons` collection or
/// a lesson object stored inline in the course record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LessonRef {
    ById(i64),
    Embedded(EmbeddedLesson),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedLesson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub video_url: String,
    pub chapter_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLesson {
    pub title: String,
    pub video_url: String,
    pub chapter_id: i64,
}

impl Chapter {
    /// Id an entry of this chapter resolves to. Inline lessons without an id get
    /// `chapter_id * 1000 + index`, or none when that overflows.
    pub fn lesson_id_at(&self, index: usize) -> Option<i64> {
        match self.lessons.get(index)? {
            LessonRef::ById(id) => Some(*id),
            LessonRef::Embedded(embedded) => embedded.id.or_else(|| {
                self.id
                    .checked_mul(1000)?
                    .checked_add(i64::try_from(index).ok()?)
            }),
        }
    }

    /// Ids of the records this chapter references in the `lessons` collection.
    pub fn stored_lesson_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.lessons.iter().filter_map(|lesson| match lesson {
            LessonRef::ById(id) => Some(*id),
            LessonRef::Embedded(_) => None,
        })
    }
}

impl Course {
    pub fn chapter(&self, id: i64) -> Option<&Chapter> {
        self.chapters.iter().find(|ch| ch.id == id)
    }

    /// Union of the lesson ids reachable from the chapters.
    pub fn lesson_ids(&self) -> BTreeSet<i64> {
        self.chapters
            .iter()
            .flat_map(|ch| (0..ch.lessons.len()).filter_map(|i| ch.lesson_id_at(i)))
            .collect()
    }

    pub fn lesson_count(&self) -> usize {
        self.lesson_ids().len()
    }

    pub fn stored_lesson_ids(&self) -> BTreeSet<i64> {
        self.chapters
            .iter()
            .flat_map(|ch| ch.stored_lesson_ids())
            .collect()
    }
}
