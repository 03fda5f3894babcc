//! Repository error model.
//! Every operation of the store, the type registry and the query pipeline reports failures
//! through [`RepoError`]; bindings map them by [`RepoError::code_str`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepoError {
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    #[error("name constraint violation: {message}")]
    NameConstraintViolation { message: String },
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },
    #[error("update conflict: {message}")]
    UpdateConflict { message: String },
    #[error("versioning violation: {message}")]
    VersioningViolation { message: String },
    #[error("query compilation failed: {message}")]
    QueryCompilation { message: String, position: Option<usize> },
    #[error("storage failure: {message}")]
    StorageFailure { message: String },
}

impl RepoError {
    pub fn code_str(&self) -> &'static str {
        match self {
            RepoError::NotFound { .. } => "not_found",
            RepoError::InvalidArgument { .. } => "invalid_argument",
            RepoError::NameConstraintViolation { .. } => "name_constraint_violation",
            RepoError::ConstraintViolation { .. } => "constraint_violation",
            RepoError::UpdateConflict { .. } => "update_conflict",
            RepoError::VersioningViolation { .. } => "versioning_violation",
            RepoError::QueryCompilation { .. } => "query_compilation",
            RepoError::StorageFailure { .. } => "storage_failure",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RepoError::NotFound { message }
            | RepoError::InvalidArgument { message }
            | RepoError::NameConstraintViolation { message }
            | RepoError::ConstraintViolation { message }
            | RepoError::UpdateConflict { message }
            | RepoError::VersioningViolation { message }
            | RepoError::QueryCompilation { message, .. }
            | RepoError::StorageFailure { message } => message.as_str(),
        }
    }

    /// Statement offset of a query compilation failure, when the parser knew it.
    pub fn position(&self) -> Option<usize> {
        match self { RepoError::QueryCompilation { position, .. } => *position, _ => None }
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self { RepoError::NotFound { message: msg.into() } }
    pub fn invalid<S: Into<String>>(msg: S) -> Self { RepoError::InvalidArgument { message: msg.into() } }
    pub fn name_conflict<S: Into<String>>(msg: S) -> Self { RepoError::NameConstraintViolation { message: msg.into() } }
    pub fn constraint<S: Into<String>>(msg: S) -> Self { RepoError::ConstraintViolation { message: msg.into() } }
    pub fn update_conflict<S: Into<String>>(msg: S) -> Self { RepoError::UpdateConflict { message: msg.into() } }
    pub fn versioning<S: Into<String>>(msg: S) -> Self { RepoError::VersioningViolation { message: msg.into() } }
    pub fn query<S: Into<String>>(msg: S, position: Option<usize>) -> Self { RepoError::QueryCompilation { message: msg.into(), position } }
    pub fn storage<S: Into<String>>(msg: S) -> Self { RepoError::StorageFailure { message: msg.into() } }
}

pub type RepoResult<T> = Result<T, RepoError>;

impl From<anyhow::Error> for RepoError {
    fn from(err: anyhow::Error) -> Self {
        // Anything bubbling up untyped is a backend problem, never a caller mistake
        match err.downcast::<RepoError>() {
            Ok(e) => e,
            Err(other) => RepoError::StorageFailure { message: other.to_string() },
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
