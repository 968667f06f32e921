use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    course::QuizForm,
    error::Result,
    store::{Collection, RecordStore},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub question: String,
    pub choices: Vec<String>,
    /// Index of the correct choice
    pub answer: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: i64,
    pub chapter_id: i64,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuiz {
    pub chapter_id: i64,
    pub questions: Vec<Question>,
}

/// Outcome of a student's first attempt at a chapter quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub user_id: i64,
    pub chapter_id: i64,
    pub score: u32,
    pub total: u32,
}

impl Quiz {
    /// Grade an attempt, `answers[i]` being the choice picked for question `i`.
    /// Unanswered questions count as wrong.
    pub fn grade(&self, user_id: i64, answers: &[usize]) -> QuizResult {
        let score = self
            .questions
            .iter()
            .zip(answers)
            .filter(|(question, answer)| question.answer == **answer)
            .count();
        QuizResult {
            id: None,
            user_id,
            chapter_id: self.chapter_id,
            score: score as u32,
            total: self.questions.len() as u32,
        }
    }
}

impl QuizResult {
    /// Score in percent, rounded down.
    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        self.score * 100 / self.total
    }
}

pub struct QuizService {
    store: Arc<dyn RecordStore>,
    quizzes: RwLock<Vec<Quiz>>,
}

impl QuizService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            quizzes: RwLock::new(Vec::new()),
        }
    }

    pub async fn fetch_quizzes(&self) -> Result<Vec<Quiz>> {
        let quizzes: Vec<Quiz> = self.store.list_as(Collection::Quizzes, &[]).await?;
        *self.quizzes.write() = quizzes.clone();
        Ok(quizzes)
    }

    pub fn quizzes(&self) -> Vec<Quiz> {
        self.quizzes.read().clone()
    }

    pub fn quiz_by_chapter(&self, chapter_id: i64) -> Option<Quiz> {
        self.quizzes
            .read()
            .iter()
            .find(|quiz| quiz.chapter_id == chapter_id)
            .cloned()
    }

    /// Replace the quiz when the form has an id, create one for the chapter
    /// otherwise. Forms without questions are skipped.
    pub async fn upsert(&self, chapter_id: i64, form: &QuizForm) -> Result<Option<Quiz>> {
        if form.questions.is_empty() {
            return Ok(None);
        }
        let quiz: Quiz = match form.id {
            Some(id) => {
                debug!("replace quiz {} of chapter {}", id, chapter_id);
                let quiz = Quiz {
                    id,
                    chapter_id,
                    questions: form.questions.clone(),
                };
                self.store.replace_as(Collection::Quizzes, id, &quiz).await?
            }
            None => {
                debug!("create quiz for chapter {}", chapter_id);
                let quiz = NewQuiz {
                    chapter_id,
                    questions: form.questions.clone(),
                };
                self.store.create_as(Collection::Quizzes, &quiz).await?
            }
        };
        Ok(Some(quiz))
    }
}

pub struct QuizResultService {
    store: Arc<dyn RecordStore>,
    results: RwLock<Vec<QuizResult>>,
}

impl QuizResultService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            results: RwLock::new(Vec::new()),
        }
    }

    pub async fn fetch_results(&self) -> Result<Vec<QuizResult>> {
        let results: Vec<QuizResult> = self.store.list_as(Collection::QuizResults, &[]).await?;
        *self.results.write() = results.clone();
        Ok(results)
    }

    pub fn results(&self) -> Vec<QuizResult> {
        self.results.read().clone()
    }

    pub fn get_result(&self, user_id: i64, chapter_id: i64) -> Option<QuizResult> {
        self.results
            .read()
            .iter()
            .find(|r| r.user_id == user_id && r.chapter_id == chapter_id)
            .cloned()
    }

    /// Store the first result of a user for a chapter. Returns `false` without
    /// writing when a result for the pair already exists.
    pub async fn save_result(&self, result: &QuizResult) -> Result<bool> {
        if self.get_result(result.user_id, result.chapter_id).is_some() {
            return Ok(false);
        }
        let existing = self
            .store
            .list(
                Collection::QuizResults,
                &[
                    ("userId", result.user_id.to_string()),
                    ("chapterId", result.chapter_id.to_string()),
                ],
            )
            .await?;
        if !existing.is_empty() {
            debug!(
                "quiz result for user {} chapter {} already stored",
                result.user_id, result.chapter_id
            );
            self.fetch_results().await?;
            return Ok(false);
        }
        let record = QuizResult {
            id: None,
            ..result.clone()
        };
        let _: QuizResult = self.store.create_as(Collection::QuizResults, &record).await?;
        info!(
            "saved quiz result {}/{} for user {} chapter {}",
            result.score, result.total, result.user_id, result.chapter_id
        );
        self.fetch_results().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::{MemoryStore, memory::Operation};

    fn question(id: i64, answer: usize) -> Question {
        Question {
            id,
            question: format!("question {id}"),
            choices: vec!["a".into(), "b".into(), "c".into()],
            answer,
        }
    }

    #[test]
    fn grading_counts_matching_answers() {
        let quiz = Quiz {
            id: 1,
            chapter_id: 7,
            questions: vec![question(1, 0), question(2, 2), question(3, 1)],
        };
        let result = quiz.grade(1, &[0, 1]);
        assert_eq!(result.score, 1);
        assert_eq!(result.total, 3);
        assert_eq!(result.chapter_id, 7);
        assert_eq!(result.percentage(), 33);
        assert_eq!(quiz.grade(1, &[0, 2, 1]).percentage(), 100);
    }

    #[tokio::test]
    async fn save_result_is_idempotent_per_pair() {
        let store = Arc::new(MemoryStore::new());
        let service = QuizResultService::new(store.clone());
        let result = QuizResult {
            id: None,
            user_id: 1,
            chapter_id: 4,
            score: 2,
            total: 3,
        };

        assert!(service.save_result(&result).await.unwrap());
        let retry = QuizResult {
            score: 3,
            ..result.clone()
        };
        assert!(!service.save_result(&retry).await.unwrap());

        let stored = store.records(Collection::QuizResults);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["score"], 2);
        assert_eq!(service.get_result(1, 4).map(|r| r.score), Some(2));
    }

    #[tokio::test]
    async fn save_result_checks_the_store_not_only_the_cache() {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            Collection::QuizResults,
            json!({"userId": 1, "chapterId": 4, "score": 1, "total": 3}),
        );
        let service = QuizResultService::new(store.clone());
        let result = QuizResult {
            id: None,
            user_id: 1,
            chapter_id: 4,
            score: 3,
            total: 3,
        };

        assert!(!service.save_result(&result).await.unwrap());
        assert!(store.writes().is_empty());
        assert_eq!(service.get_result(1, 4).map(|r| r.score), Some(1));
    }

    #[tokio::test]
    async fn upsert_creates_then_replaces() {
        let store = Arc::new(MemoryStore::new());
        let service = QuizService::new(store.clone());
        let mut form = QuizForm {
            id: None,
            questions: vec![question(1, 0)],
        };

        let created = service.upsert(9, &form).await.unwrap().unwrap();
        assert_eq!(created.chapter_id, 9);

        form.id = Some(created.id);
        form.questions.push(question(2, 1));
        let replaced = service.upsert(9, &form).await.unwrap().unwrap();
        assert_eq!(replaced.id, created.id);
        assert_eq!(replaced.questions.len(), 2);
        assert_eq!(store.records(Collection::Quizzes).len(), 1);

        service.fetch_quizzes().await.unwrap();
        assert_eq!(service.quiz_by_chapter(9).map(|q| q.id), Some(created.id));
        assert!(service.quiz_by_chapter(10).is_none());
        let ops: Vec<Operation> = store.writes().iter().map(|c| c.operation).collect();
        assert_eq!(ops, vec![Operation::Create, Operation::Replace]);
    }

    #[tokio::test]
    async fn quiz_without_questions_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let service = QuizService::new(store.clone());
        assert!(service.upsert(1, &QuizForm::default()).await.unwrap().is_none());
        assert!(store.calls().is_empty());
    }
}
