use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::{Collection, Filters, RecordStore};
use crate::{config::Config, error::StoreError};

/// json-server style REST store: `/{collection}` and `/{collection}/{id}`.
#[derive(Debug, Clone)]
pub struct RestStore {
    base_url: String,
    client: Client,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        Self::new(
            config.store_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    fn record_url(&self, collection: Collection, id: i64) -> String {
        format!("{}/{}/{}", self.base_url, collection, id)
    }

    async fn check_status(
        response: Response,
        collection: Collection,
        id: Option<i64>,
    ) -> Result<Response, StoreError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(StoreError::NotFound { collection, id });
            }
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn handle_response(
        response: Response,
        collection: Collection,
        id: Option<i64>,
    ) -> Result<Value, StoreError> {
        let response = Self::check_status(response, collection, id).await?;
        let body = response.json().await?;
        Ok(body)
    }
}

#[async_trait::async_trait]
impl RecordStore for RestStore {
    async fn list(
        &self,
        collection: Collection,
        filters: Filters<'_>,
    ) -> Result<Vec<Value>, StoreError> {
        debug!("GET /{} {:?}", collection, filters);
        let response = self
            .client
            .get(self.collection_url(collection))
            .query(filters)
            .send()
            .await?;
        match Self::handle_response(response, collection, None).await? {
            Value::Array(records) => Ok(records),
            other => Err(StoreError::InvalidResponse(format!(
                "expected an array from /{}, got {}",
                collection, other
            ))),
        }
    }

    async fn get(&self, collection: Collection, id: i64) -> Result<Value, StoreError> {
        debug!("GET /{}/{}", collection, id);
        let response = self
            .client
            .get(self.record_url(collection, id))
            .send()
            .await?;
        Self::handle_response(response, collection, Some(id)).await
    }

    async fn create(&self, collection: Collection, record: Value) -> Result<Value, StoreError> {
        debug!("POST /{}", collection);
        let response = self
            .client
            .post(self.collection_url(collection))
            .json(&record)
            .send()
            .await?;
        Self::handle_response(response, collection, None).await
    }

    async fn replace(
        &self,
        collection: Collection,
        id: i64,
        record: Value,
    ) -> Result<Value, StoreError> {
        debug!("PUT /{}/{}", collection, id);
        let response = self
            .client
            .put(self.record_url(collection, id))
            .json(&record)
            .send()
            .await?;
        Self::handle_response(response, collection, Some(id)).await
    }

    async fn patch(
        &self,
        collection: Collection,
        id: i64,
        fields: Value,
    ) -> Result<Value, StoreError> {
        debug!("PATCH /{}/{}", collection, id);
        let response = self
            .client
            .patch(self.record_url(collection, id))
            .json(&fields)
            .send()
            .await?;
        Self::handle_response(response, collection, Some(id)).await
    }

    async fn delete(&self, collection: Collection, id: i64) -> Result<(), StoreError> {
        debug!("DELETE /{}/{}", collection, id);
        let response = self
            .client
            .delete(self.record_url(collection, id))
            .send()
            .await?;
        Self::check_status(response, collection, Some(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path, query_param},
    };

    use super::*;

    fn store(server: &MockServer) -> RestStore {
        RestStore::new(format!("{}/", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn list_sends_equality_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/progress"))
            .and(query_param("userId", "1"))
            .and(query_param("courseId", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 3, "userId": 1, "courseId": 7, "completedLessons": [4]}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let records = store(&server)
            .list(
                Collection::Progress,
                &[("userId", "1".to_string()), ("courseId", "7".to_string())],
            )
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], 3);
    }

    #[tokio::test]
    async fn collection_paths_use_store_names() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/quizResults"))
            .and(body_json(json!({"userId": 1, "chapterId": 2, "score": 3, "total": 4})))
            .respond_with(ResponseTemplate::new(201).set_body_json(
                json!({"id": 9, "userId": 1, "chapterId": 2, "score": 3, "total": 4}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let created = store(&server)
            .create(
                Collection::QuizResults,
                json!({"userId": 1, "chapterId": 2, "score": 3, "total": 4}),
            )
            .await
            .unwrap();
        assert_eq!(created["id"], 9);
    }

    #[tokio::test]
    async fn missing_record_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/courses/42"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = store(&server).get(Collection::Courses, 42).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotFound {
                collection: Collection::Courses,
                id: 42
            }
        ));
    }

    #[tokio::test]
    async fn server_failure_keeps_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/courses/1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = store(&server)
            .patch(Collection::Courses, 1, json!({"title": "x"}))
            .await
            .unwrap_err();
        match err {
            StoreError::Server { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_ignores_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/lessons/5"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        store(&server).delete(Collection::Lessons, 5).await.unwrap();
    }

    #[tokio::test]
    async fn non_array_list_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/courses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"oops": true})))
            .mount(&server)
            .await;

        let err = store(&server).list(Collection::Courses, &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidResponse(_)));
    }
}
