use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use parking_lot::RwLock;
use tracing::debug;

use crate::{
    course::{Lesson, NewLesson},
    error::{Error, Result, StoreError},
    store::{Collection, RecordStore},
};

/// One write of a lesson reconciliation batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LessonWrite {
    Create(NewLesson),
    Replace(Lesson),
}

pub struct LessonService {
    store: Arc<dyn RecordStore>,
    lessons: RwLock<Vec<Lesson>>,
    /// max in-flight calls of one batch
    concurrency: usize,
}

impl LessonService {
    pub fn new(store: Arc<dyn RecordStore>, concurrency: usize) -> Self {
        Self {
            store,
            lessons: RwLock::new(Vec::new()),
            concurrency: concurrency.max(1),
        }
    }

    pub async fn fetch_lessons(&self) -> Result<Vec<Lesson>> {
        let lessons: Vec<Lesson> = self.store.list_as(Collection::Lessons, &[]).await?;
        *self.lessons.write() = lessons.clone();
        Ok(lessons)
    }

    pub fn lessons(&self) -> Vec<Lesson> {
        self.lessons.read().clone()
    }

    pub async fn add_lesson(&self, lesson: &NewLesson) -> Result<Lesson> {
        Ok(self.store.create_as(Collection::Lessons, lesson).await?)
    }

    pub async fn replace_lesson(&self, lesson: &Lesson) -> Result<Lesson> {
        Ok(self
            .store
            .replace_as(Collection::Lessons, lesson.id, lesson)
            .await?)
    }

    pub async fn delete_lesson(&self, id: i64) -> Result<()> {
        Ok(self.store.delete(Collection::Lessons, id).await?)
    }

    /// Delete every lesson in `ids`, returning the deleted ids. Lessons already
    /// gone from the store count as deleted. An empty input issues no call.
    pub async fn delete_lessons(&self, ids: &[i64]) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        debug!("deleting {} lessons", ids.len());
        stream::iter(ids.iter().copied())
            .map(|id| async move {
                match self.delete_lesson(id).await {
                    Ok(()) => Ok(id),
                    Err(Error::Store(StoreError::NotFound { .. })) => {
                        debug!("lesson {} already deleted", id);
                        Ok(id)
                    }
                    Err(e) => Err(e),
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    /// Create all lessons, results in input order.
    pub async fn add_lessons(&self, lessons: Vec<NewLesson>) -> Result<Vec<Lesson>> {
        self.write_lessons(lessons.into_iter().map(LessonWrite::Create).collect())
            .await
    }

    /// Apply a batch of creates and replaces. Calls run concurrently up to the
    /// configured bound, the first failure aborts the batch. Results keep the
    /// input order.
    pub async fn write_lessons(&self, writes: Vec<LessonWrite>) -> Result<Vec<Lesson>> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }
        debug!("writing {} lessons", writes.len());
        stream::iter(writes)
            .map(|write| async move {
                match write {
                    LessonWrite::Create(lesson) => self.add_lesson(&lesson).await,
                    LessonWrite::Replace(lesson) => self.replace_lesson(&lesson).await,
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}
