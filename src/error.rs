use crate::session::Role;
use crate::store::Collection;

/// Failure of a single call against the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{collection} record {id} not found")]
    NotFound { collection: Collection, id: i64 },
    #[error("Store error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("No user is logged in")]
    Unauthenticated,
    #[error("Access denied, role required: {required}")]
    Forbidden { required: Role },
    #[error("Course {0} not found")]
    CourseNotFound(i64),
    #[error("Session storage error: {0}")]
    Session(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Fatal error: {0}")]
    Fatal(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
