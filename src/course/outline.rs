use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use super::{Course, Lesson, LessonRef};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedChapter {
    pub id: i64,
    pub title: String,
    pub lessons: Vec<Lesson>,
}

/// A course with every chapter's lesson references resolved into lessons.
///
/// Chapters referencing the `lessons` collection by id and chapters holding
/// inline lesson objects look the same here, so consumers never inspect the
/// stored shape again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseOutline {
    pub course_id: i64,
    pub title: String,
    pub chapters: Vec<ResolvedChapter>,
    #[serde(skip)]
    stored_lesson_ids: BTreeSet<i64>,
}

impl CourseOutline {
    /// Ids missing from `all_lessons` are skipped.
    pub fn resolve(course: &Course, all_lessons: &[Lesson]) -> Self {
        let by_id: HashMap<i64, &Lesson> = all_lessons.iter().map(|l| (l.id, l)).collect();
        let mut stored_lesson_ids = BTreeSet::new();
        let chapters = course
            .chapters
            .iter()
            .map(|chapter| {
                let lessons = chapter
                    .lessons
                    .iter()
                    .enumerate()
                    .filter_map(|(index, lesson)| match lesson {
                        LessonRef::ById(id) => by_id.get(id).map(|&lesson| {
                            stored_lesson_ids.insert(*id);
                            lesson.clone()
                        }),
                        LessonRef::Embedded(embedded) => Some(Lesson {
                            id: chapter.lesson_id_at(index)?,
                            title: embedded.title.clone(),
                            video_url: embedded.video_url.clone(),
                            chapter_id: chapter.id,
                        }),
                    })
                    .collect();
                ResolvedChapter {
                    id: chapter.id,
                    title: chapter.title.clone(),
                    lessons,
                }
            })
            .collect();
        Self {
            course_id: course.id,
            title: course.title.clone(),
            chapters,
            stored_lesson_ids,
        }
    }

    pub fn chapter(&self, id: i64) -> Option<&ResolvedChapter> {
        self.chapters.iter().find(|ch| ch.id == id)
    }

    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.chapters.iter().flat_map(|ch| ch.lessons.iter())
    }

    pub fn lesson(&self, id: i64) -> Option<&Lesson> {
        self.lessons().find(|l| l.id == id)
    }

    pub fn video_url(&self, lesson_id: i64) -> Option<&str> {
        self.lesson(lesson_id).map(|l| l.video_url.as_str())
    }

    pub fn lesson_ids(&self) -> BTreeSet<i64> {
        self.lessons().map(|l| l.id).collect()
    }

    pub fn total_lessons(&self) -> usize {
        self.lessons().count()
    }

    /// Whether the lesson was resolved from a record of the `lessons` collection
    /// rather than from an inline object.
    pub fn is_stored(&self, lesson_id: i64) -> bool {
        self.stored_lesson_ids.contains(&lesson_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::{Chapter, EmbeddedLesson};

    fn lesson(id: i64, chapter_id: i64) -> Lesson {
        Lesson {
            id,
            title: format!("lesson {id}"),
            video_url: format!("https://videos/{id}"),
            chapter_id,
        }
    }

    fn course() -> Course {
        Course {
            id: 1,
            title: "Rust".to_string(),
            category: "dev".to_string(),
            description: String::new(),
            instructor_id: 2,
            chapters: vec![
                Chapter {
                    id: 10,
                    title: "Relational".to_string(),
                    lessons: vec![LessonRef::ById(2), LessonRef::ById(1), LessonRef::ById(99)],
                },
                Chapter {
                    id: 20,
                    title: "Nested".to_string(),
                    lessons: vec![
                        LessonRef::Embedded(EmbeddedLesson {
                            id: None,
                            title: "inline".to_string(),
                            video_url: "https://videos/inline".to_string(),
                            chapter_id: None,
                        }),
                        LessonRef::Embedded(EmbeddedLesson {
                            id: Some(5),
                            title: "inline with id".to_string(),
                            video_url: String::new(),
                            chapter_id: Some(20),
                        }),
                    ],
                },
            ],
        }
    }

    #[test]
    fn resolves_ids_in_reference_order_and_skips_unknown() {
        let outline = CourseOutline::resolve(&course(), &[lesson(1, 10), lesson(2, 10)]);
        let ids: Vec<i64> = outline.chapter(10).unwrap().lessons.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(outline.is_stored(1));
        assert!(!outline.is_stored(99));
    }

    #[test]
    fn inline_lessons_get_synthesized_ids() {
        let outline = CourseOutline::resolve(&course(), &[]);
        let nested = outline.chapter(20).unwrap();
        assert_eq!(nested.lessons[0].id, 20_000);
        assert_eq!(nested.lessons[0].chapter_id, 20);
        assert_eq!(nested.lessons[1].id, 5);
        assert_eq!(outline.video_url(20_000), Some("https://videos/inline"));
        assert!(!outline.is_stored(5));
    }

    #[test]
    fn totals_cover_every_resolved_lesson() {
        let outline = CourseOutline::resolve(&course(), &[lesson(1, 10), lesson(2, 10)]);
        assert_eq!(outline.total_lessons(), 4);
        assert_eq!(outline.lesson_ids(), BTreeSet::from([1, 2, 5, 20_000]));
        assert_eq!(outline.video_url(3), None);
    }
}
