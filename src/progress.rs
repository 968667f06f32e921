use std::{collections::BTreeSet, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    course::{Course, CourseOutline, Lesson},
    error::Result,
    store::{Collection, RecordStore},
};

/// Lessons a user completed in one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    #[serde(default)]
    pub completed_lessons: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewProgress {
    user_id: i64,
    course_id: i64,
    completed_lessons: Vec<i64>,
}

impl Progress {
    pub fn is_completed(&self, lesson_id: i64) -> bool {
        self.completed_lessons.contains(&lesson_id)
    }
}

/// Completion of one course, as shown on the student dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CourseProgress {
    pub completed: usize,
    pub total: usize,
    pub percentage: f64,
}

impl CourseProgress {
    /// Only completed lessons that still resolve in the course are counted,
    /// and dangling lesson references do not count towards the total.
    pub fn of(outline: &CourseOutline, progress: Option<&Progress>) -> Self {
        let lesson_ids = outline.lesson_ids();
        let completed = progress
            .map(|p| {
                p.completed_lessons
                    .iter()
                    .filter(|id| lesson_ids.contains(*id))
                    .collect::<BTreeSet<_>>()
                    .len()
            })
            .unwrap_or(0);
        let total = lesson_ids.len();
        Self {
            completed,
            total,
            percentage: percentage(completed, total),
        }
    }
}

fn percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    completed as f64 / total as f64 * 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseSummary {
    pub course_id: i64,
    pub title: String,
    pub progress: CourseProgress,
}

/// Per-course completion of a user plus the overall percentage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub courses: Vec<CourseSummary>,
    pub completed_lessons: usize,
    pub total_lessons: usize,
    pub overall_percentage: f64,
}

impl Dashboard {
    pub fn build(
        user_id: i64,
        courses: &[Course],
        all_lessons: &[Lesson],
        progresses: &[Progress],
    ) -> Self {
        let courses: Vec<CourseSummary> = courses
            .iter()
            .map(|course| {
                let progress = progresses
                    .iter()
                    .find(|p| p.user_id == user_id && p.course_id == course.id);
                CourseSummary {
                    course_id: course.id,
                    title: course.title.clone(),
                    progress: CourseProgress::of(
                        &CourseOutline::resolve(course, all_lessons),
                        progress,
                    ),
                }
            })
            .collect();
        let completed_lessons = courses.iter().map(|c| c.progress.completed).sum();
        let total_lessons = courses.iter().map(|c| c.progress.total).sum();
        Self {
            courses,
            completed_lessons,
            total_lessons,
            overall_percentage: percentage(completed_lessons, total_lessons),
        }
    }
}

pub struct ProgressService {
    store: Arc<dyn RecordStore>,
    /// progress of the course being viewed
    current: RwLock<Option<Progress>>,
    /// every progress record of the dashboard user
    all_user: RwLock<Vec<Progress>>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
            all_user: RwLock::new(Vec::new()),
        }
    }

    /// Load the progress of a user in a course, `None` when there is none yet.
    pub async fn progress_for_course(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<Progress>> {
        let records: Vec<Progress> = self
            .store
            .list_as(
                Collection::Progress,
                &[
                    ("userId", user_id.to_string()),
                    ("courseId", course_id.to_string()),
                ],
            )
            .await?;
        let progress = records.into_iter().next();
        *self.current.write() = progress.clone();
        Ok(progress)
    }

    pub async fn fetch_all_for_user(&self, user_id: i64) -> Result<Vec<Progress>> {
        let records: Vec<Progress> = self
            .store
            .list_as(Collection::Progress, &[("userId", user_id.to_string())])
            .await?;
        *self.all_user.write() = records.clone();
        Ok(records)
    }

    pub fn current_course_progress(&self) -> Option<Progress> {
        self.current.read().clone()
    }

    pub fn all_user_progress(&self) -> Vec<Progress> {
        self.all_user.read().clone()
    }

    pub fn is_lesson_completed(&self, lesson_id: i64) -> bool {
        self.current
            .read()
            .as_ref()
            .is_some_and(|p| p.is_completed(lesson_id))
    }

    /// Flip the completion of a lesson. Returns the stored record.
    pub async fn toggle_lesson(
        &self,
        user_id: i64,
        course_id: i64,
        lesson_id: i64,
    ) -> Result<Option<Progress>> {
        let current = self.load_current(user_id, course_id).await?;
        let completed = !current.as_ref().is_some_and(|p| p.is_completed(lesson_id));
        self.write_completion(current, user_id, course_id, lesson_id, completed)
            .await
    }

    /// Mark a lesson completed or not. Un-completing a lesson of a course the
    /// user has no record for writes nothing and returns `None`.
    pub async fn set_lesson_completed(
        &self,
        user_id: i64,
        course_id: i64,
        lesson_id: i64,
        completed: bool,
    ) -> Result<Option<Progress>> {
        let current = self.load_current(user_id, course_id).await?;
        self.write_completion(current, user_id, course_id, lesson_id, completed)
            .await
    }

    async fn load_current(&self, user_id: i64, course_id: i64) -> Result<Option<Progress>> {
        let cached = self
            .current
            .read()
            .clone()
            .filter(|p| p.user_id == user_id && p.course_id == course_id);
        match cached {
            Some(progress) => Ok(Some(progress)),
            None => self.progress_for_course(user_id, course_id).await,
        }
    }

    async fn write_completion(
        &self,
        current: Option<Progress>,
        user_id: i64,
        course_id: i64,
        lesson_id: i64,
        completed: bool,
    ) -> Result<Option<Progress>> {
        match current {
            Some(progress) if progress.is_completed(lesson_id) == completed => Ok(Some(progress)),
            Some(mut progress) => {
                if completed {
                    progress.completed_lessons.push(lesson_id);
                } else {
                    progress.completed_lessons.retain(|id| *id != lesson_id);
                }
                debug!(
                    "progress {}: lesson {} completed={}",
                    progress.id, lesson_id, completed
                );
                let stored: Progress = self
                    .store
                    .replace_as(Collection::Progress, progress.id, &progress)
                    .await?;
                *self.current.write() = Some(stored.clone());
                for p in self.all_user.write().iter_mut() {
                    if p.id == stored.id {
                        *p = stored.clone();
                    }
                }
                Ok(Some(stored))
            }
            None if completed => {
                let record = NewProgress {
                    user_id,
                    course_id,
                    completed_lessons: vec![lesson_id],
                };
                let stored: Progress = self.store.create_as(Collection::Progress, &record).await?;
                debug!("created progress {} for user {}", stored.id, user_id);
                *self.current.write() = Some(stored.clone());
                self.all_user.write().push(stored.clone());
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        course::{Chapter, LessonRef},
        store::{MemoryStore, memory::Operation},
    };

    fn course(id: i64, lessons: &[i64]) -> Course {
        Course {
            id,
            title: format!("course {id}"),
            category: String::new(),
            description: String::new(),
            instructor_id: 2,
            chapters: vec![Chapter {
                id: id * 10,
                title: "only".to_string(),
                lessons: lessons.iter().map(|&l| LessonRef::ById(l)).collect(),
            }],
        }
    }

    #[tokio::test]
    async fn toggle_adds_then_removes() {
        let store = Arc::new(MemoryStore::new());
        let id = store.seed(
            Collection::Progress,
            json!({"userId": 1, "courseId": 3, "completedLessons": [10]}),
        );
        let service = ProgressService::new(store.clone());
        service.fetch_all_for_user(1).await.unwrap();

        let added = service.toggle_lesson(1, 3, 11).await.unwrap().unwrap();
        assert_eq!(added.id, id);
        assert_eq!(added.completed_lessons, vec![10, 11]);
        assert!(service.is_lesson_completed(11));
        assert_eq!(service.all_user_progress()[0].completed_lessons, vec![10, 11]);

        let removed = service.toggle_lesson(1, 3, 11).await.unwrap().unwrap();
        assert_eq!(removed.completed_lessons, vec![10]);
        assert!(!service.is_lesson_completed(11));
        assert_eq!(store.records(Collection::Progress).len(), 1);
    }

    #[tokio::test]
    async fn toggle_without_record_creates_one() {
        let store = Arc::new(MemoryStore::new());
        let service = ProgressService::new(store.clone());

        let created = service.toggle_lesson(1, 3, 7).await.unwrap().unwrap();
        assert_eq!(created.completed_lessons, vec![7]);
        assert_eq!(created.user_id, 1);
        assert_eq!(created.course_id, 3);
        let ops: Vec<Operation> = store.writes().iter().map(|c| c.operation).collect();
        assert_eq!(ops, vec![Operation::Create]);
        assert_eq!(service.all_user_progress().len(), 1);
    }

    #[tokio::test]
    async fn uncompleting_without_record_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let service = ProgressService::new(store.clone());

        let result = service.set_lesson_completed(1, 3, 7, false).await.unwrap();
        assert!(result.is_none());
        assert!(store.writes().is_empty());
        assert!(service.current_course_progress().is_none());
    }

    #[tokio::test]
    async fn cached_progress_of_another_course_is_not_reused() {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            Collection::Progress,
            json!({"userId": 1, "courseId": 3, "completedLessons": [1]}),
        );
        let service = ProgressService::new(store.clone());
        service.progress_for_course(1, 3).await.unwrap();

        let other = service.toggle_lesson(1, 4, 1).await.unwrap().unwrap();
        assert_eq!(other.course_id, 4);
        assert_eq!(store.records(Collection::Progress).len(), 2);
    }

    fn lessons(ids: impl IntoIterator<Item = i64>) -> Vec<Lesson> {
        ids.into_iter()
            .map(|id| Lesson {
                id,
                title: format!("lesson {id}"),
                video_url: String::new(),
                chapter_id: 10,
            })
            .collect()
    }

    #[test]
    fn course_progress_ignores_unreachable_lessons() {
        let outline = CourseOutline::resolve(&course(1, &[1, 2, 3, 4]), &lessons(1..=4));
        let progress = Progress {
            id: 1,
            user_id: 1,
            course_id: 1,
            completed_lessons: vec![1, 2, 99],
        };
        let summary = CourseProgress::of(&outline, Some(&progress));
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.percentage, 50.0);
        assert_eq!(CourseProgress::of(&outline, None).percentage, 0.0);
    }

    #[test]
    fn dangling_references_do_not_block_completion() {
        // lesson 3 is referenced by the course but gone from the store
        let outline = CourseOutline::resolve(&course(1, &[1, 2, 3]), &lessons([1, 2]));
        let progress = Progress {
            id: 1,
            user_id: 1,
            course_id: 1,
            completed_lessons: vec![1, 2],
        };
        let summary = CourseProgress::of(&outline, Some(&progress));
        assert_eq!(summary.total, 2);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.percentage, 100.0);
    }

    #[test]
    fn dashboard_sums_over_courses() {
        let courses = [course(1, &[1, 2]), course(2, &[3, 4, 5, 6]), course(3, &[])];
        let progresses = [
            Progress {
                id: 1,
                user_id: 1,
                course_id: 1,
                completed_lessons: vec![1, 2],
            },
            Progress {
                id: 2,
                user_id: 2,
                course_id: 2,
                completed_lessons: vec![3, 4, 5, 6],
            },
            Progress {
                id: 3,
                user_id: 1,
                course_id: 2,
                completed_lessons: vec![3],
            },
        ];
        let dashboard = Dashboard::build(1, &courses, &lessons(1..=6), &progresses);
        assert_eq!(dashboard.completed_lessons, 3);
        assert_eq!(dashboard.total_lessons, 6);
        assert_eq!(dashboard.overall_percentage, 50.0);
        assert_eq!(dashboard.courses[0].progress.percentage, 100.0);
        assert_eq!(dashboard.courses[2].progress.total, 0);
    }
}
