//! Course composition.
//!
//! A course is spread over several collections: the course record holds the
//! chapters, each chapter references records of the `lessons` collection, and
//! quizzes point back at their chapter. [`CourseComposer`] turns one authored
//! [`CourseForm`] into the sequence of store calls that keeps those shapes
//! consistent.
//!
//! Every workflow runs its steps strictly in sequence. Independent lesson
//! writes inside a step go out as one bounded batch. The first failed call
//! aborts the rest of the chain, and the course cache is only replaced by the
//! terminal refetch.

use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    course::{
        Chapter, ChapterForm, Course, CourseForm, Lesson, LessonRef, NewCourse, NewLesson,
        QuizForm,
    },
    error::{Error, Result, StoreError},
    lesson::{LessonService, LessonWrite},
    quiz::QuizService,
    store::{Collection, RecordStore},
    utils::mint_chapter_id,
};

pub struct CourseComposer {
    store: Arc<dyn RecordStore>,
    lessons: LessonService,
    quizzes: QuizService,
    courses: RwLock<Vec<Course>>,
}

impl CourseComposer {
    pub fn new(store: Arc<dyn RecordStore>, concurrency: usize) -> Self {
        Self {
            lessons: LessonService::new(store.clone(), concurrency),
            quizzes: QuizService::new(store.clone()),
            store,
            courses: RwLock::new(Vec::new()),
        }
    }

    pub fn lessons(&self) -> &LessonService {
        &self.lessons
    }

    pub fn quizzes(&self) -> &QuizService {
        &self.quizzes
    }

    pub async fn fetch_courses(&self) -> Result<Vec<Course>> {
        let courses: Vec<Course> = self.store.list_as(Collection::Courses, &[]).await?;
        debug!("fetched {} courses", courses.len());
        *self.courses.write() = courses.clone();
        Ok(courses)
    }

    pub fn courses(&self) -> Vec<Course> {
        self.courses.read().clone()
    }

    pub fn course(&self, id: i64) -> Option<Course> {
        self.courses.read().iter().find(|c| c.id == id).cloned()
    }

    /// Instructor save: update the course being edited, or add a new one.
    pub async fn save(&self, edit_id: Option<i64>, form: &CourseForm) -> Result<Course> {
        match edit_id {
            Some(id) => self.update_course(id, form).await,
            None => self.add_course(form).await,
        }
    }

    /// Authoring form of a stored course, pre-filled for editing.
    pub async fn edit_form(&self, id: i64) -> Result<CourseForm> {
        let course = self.get_course(id).await?;
        let lessons = self.lessons.fetch_lessons().await?;
        let quizzes = self.quizzes.fetch_quizzes().await?;
        Ok(CourseForm::from_course(&course, &lessons, &quizzes))
    }

    /// Create a course with its lessons and quizzes.
    ///
    /// The course is created first with empty chapters, so that its lessons
    /// can be created against known chapter ids, then patched with the lesson
    /// ids. Chapter, lesson and quiz ids carried by the form are ignored: a new
    /// course never shares records with the course the form was copied from.
    pub async fn add_course(&self, form: &CourseForm) -> Result<Course> {
        let chapter_ids: Vec<i64> = form.chapters.iter().map(|_| mint_chapter_id()).collect();
        let shell = NewCourse {
            title: form.title.clone(),
            category: form.category.clone(),
            description: form.description.clone(),
            instructor_id: form.instructor_id,
            chapters: form
                .chapters
                .iter()
                .zip(&chapter_ids)
                .map(|(chapter, &id)| Chapter {
                    id,
                    title: chapter.title.clone(),
                    lessons: Vec::new(),
                })
                .collect(),
        };
        let created: Course = self.store.create_as(Collection::Courses, &shell).await?;
        debug!("created course shell {}", created.id);

        let new_lessons = form
            .chapters
            .iter()
            .zip(&chapter_ids)
            .flat_map(|(chapter, &chapter_id)| {
                chapter.lessons.iter().map(move |lesson| NewLesson {
                    title: lesson.title.clone(),
                    video_url: lesson.video_url.clone(),
                    chapter_id,
                })
            })
            .collect();
        let lessons = self.lessons.add_lessons(new_lessons).await?;

        let chapters = group_lessons(shell.chapters, &lessons);
        let course: Course = self
            .store
            .patch_as(Collection::Courses, created.id, json!({ "chapters": chapters }))
            .await?;

        self.upsert_quizzes(form, &chapter_ids, false).await?;
        info!(
            "added course {} \"{}\" with {} lessons",
            course.id,
            course.title,
            lessons.len()
        );
        self.fetch_courses().await?;
        Ok(course)
    }

    /// Rebuild a stored course from the authoring form.
    ///
    /// Authored lessons carrying the id of a stored lesson of the course are
    /// replaced in place, the others are created. The course record is then
    /// replaced as a whole, and only after that are the lessons it no longer
    /// references deleted.
    pub async fn update_course(&self, id: i64, form: &CourseForm) -> Result<Course> {
        let stored = self.get_course(id).await?;
        let chapter_ids = resolve_chapter_ids(&stored.chapters, &form.chapters);
        let stored_lessons = stored.stored_lesson_ids();
        let orphans = self.orphaned_lessons(&stored).await?;

        let (writes, kept) = plan_lesson_writes(&form.chapters, &chapter_ids, &stored_lessons);
        let lessons = self.lessons.write_lessons(writes).await?;

        let chapters = form
            .chapters
            .iter()
            .zip(&chapter_ids)
            .map(|(chapter, &id)| Chapter {
                id,
                title: chapter.title.clone(),
                lessons: Vec::new(),
            })
            .collect();
        let course = Course {
            id,
            title: form.title.clone(),
            category: form.category.clone(),
            description: form.description.clone(),
            instructor_id: form.instructor_id,
            chapters: group_lessons(chapters, &lessons),
        };
        let course: Course = self
            .store
            .replace_as(Collection::Courses, id, &course)
            .await?;

        let stale: Vec<i64> = stored_lessons
            .union(&orphans)
            .filter(|id| !kept.contains(id))
            .copied()
            .collect();
        self.lessons.delete_lessons(&stale).await?;

        self.upsert_quizzes(form, &chapter_ids, true).await?;
        info!(
            "updated course {} \"{}\": {} lessons written, {} removed",
            course.id,
            course.title,
            lessons.len(),
            stale.len()
        );
        self.fetch_courses().await?;
        Ok(course)
    }

    /// Delete the course record. Its lessons and quizzes are left in place.
    pub async fn delete_course(&self, id: i64) -> Result<()> {
        let orphans = self
            .course(id)
            .map(|course| course.stored_lesson_ids().len())
            .unwrap_or(0);
        self.store
            .delete(Collection::Courses, id)
            .await
            .map_err(|e| course_error(id, e))?;
        if orphans > 0 {
            warn!("course {} deleted, {} of its lessons are orphaned", id, orphans);
        }
        info!("deleted course {}", id);
        self.fetch_courses().await?;
        Ok(())
    }

    /// Lessons filed under a chapter of the course that the course no longer
    /// references, left behind by an earlier interrupted update.
    async fn orphaned_lessons(&self, course: &Course) -> Result<BTreeSet<i64>> {
        let chapter_ids: HashSet<i64> = course.chapters.iter().map(|ch| ch.id).collect();
        let referenced = course.stored_lesson_ids();
        let orphans: BTreeSet<i64> = self
            .lessons
            .fetch_lessons()
            .await?
            .into_iter()
            .filter(|l| chapter_ids.contains(&l.chapter_id) && !referenced.contains(&l.id))
            .map(|l| l.id)
            .collect();
        if !orphans.is_empty() {
            warn!("course {} has {} orphaned lessons", course.id, orphans.len());
        }
        Ok(orphans)
    }

    async fn get_course(&self, id: i64) -> Result<Course> {
        self.store
            .get_as(Collection::Courses, id)
            .await
            .map_err(|e| course_error(id, e))
    }

    /// Upsert the quiz of every authored chapter. Without `keep_ids` every
    /// quiz is created.
    async fn upsert_quizzes(
        &self,
        form: &CourseForm,
        chapter_ids: &[i64],
        keep_ids: bool,
    ) -> Result<()> {
        for (chapter, &chapter_id) in form.chapters.iter().zip(chapter_ids) {
            let Some(quiz) = chapter.quiz_to_save() else {
                continue;
            };
            if keep_ids {
                self.quizzes.upsert(chapter_id, quiz).await?;
            } else {
                let quiz = QuizForm {
                    id: None,
                    ..quiz.clone()
                };
                self.quizzes.upsert(chapter_id, &quiz).await?;
            }
        }
        Ok(())
    }
}

fn course_error(id: i64, e: StoreError) -> Error {
    match e {
        StoreError::NotFound { .. } => Error::CourseNotFound(id),
        e => e.into(),
    }
}

/// Back every authored chapter by a stored chapter id.
///
/// Each stored chapter backs at most one authored chapter. Explicit ids are
/// honoured first, then titles are matched, then the stored chapter at the
/// same position is taken. Chapters left over get a minted id.
fn resolve_chapter_ids(stored: &[Chapter], authored: &[ChapterForm]) -> Vec<i64> {
    let mut claimed = HashSet::new();
    let mut resolved: Vec<Option<i64>> = vec![None; authored.len()];

    for (slot, chapter) in resolved.iter_mut().zip(authored) {
        if let Some(id) = chapter.id {
            if stored.iter().any(|s| s.id == id) && claimed.insert(id) {
                *slot = Some(id);
            }
        }
    }
    for (slot, chapter) in resolved.iter_mut().zip(authored) {
        if slot.is_some() {
            continue;
        }
        if let Some(found) = stored
            .iter()
            .find(|s| !claimed.contains(&s.id) && s.title == chapter.title)
        {
            claimed.insert(found.id);
            *slot = Some(found.id);
        }
    }
    for (index, slot) in resolved.iter_mut().enumerate() {
        if slot.is_some() {
            continue;
        }
        if let Some(found) = stored.get(index).filter(|s| !claimed.contains(&s.id)) {
            claimed.insert(found.id);
            *slot = Some(found.id);
        }
    }

    resolved
        .into_iter()
        .map(|slot| slot.unwrap_or_else(mint_chapter_id))
        .collect()
}

/// Lesson writes bringing the stored lessons in line with the authored ones,
/// plus the ids of the stored lessons that survive.
fn plan_lesson_writes(
    authored: &[ChapterForm],
    chapter_ids: &[i64],
    stored_lessons: &BTreeSet<i64>,
) -> (Vec<LessonWrite>, BTreeSet<i64>) {
    let mut kept = BTreeSet::new();
    let mut writes = Vec::new();
    for (chapter, &chapter_id) in authored.iter().zip(chapter_ids) {
        for lesson in &chapter.lessons {
            // an id is only trusted once, and only for lessons of this course
            let existing = lesson
                .id
                .filter(|id| stored_lessons.contains(id) && !kept.contains(id));
            match existing {
                Some(id) => {
                    kept.insert(id);
                    writes.push(LessonWrite::Replace(Lesson {
                        id,
                        title: lesson.title.clone(),
                        video_url: lesson.video_url.clone(),
                        chapter_id,
                    }));
                }
                None => writes.push(LessonWrite::Create(NewLesson {
                    title: lesson.title.clone(),
                    video_url: lesson.video_url.clone(),
                    chapter_id,
                })),
            }
        }
    }
    (writes, kept)
}

/// Fill each chapter with the written lessons reporting its id, keeping their
/// order.
fn group_lessons(mut chapters: Vec<Chapter>, lessons: &[Lesson]) -> Vec<Chapter> {
    for chapter in &mut chapters {
        chapter.lessons = lessons
            .iter()
            .filter(|lesson| lesson.chapter_id == chapter.id)
            .map(|lesson| LessonRef::ById(lesson.id))
            .collect();
    }
    chapters
}
