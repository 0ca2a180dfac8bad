use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::storage::StoreError;
use crate::users::keys::UserKey;

/// Everything the repository layer can report. Driver errors are folded into
/// these before they leave `UserService`.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("{0}")]
    Validation(String),
    #[error("user {0} not found")]
    NotFound(String),
    #[error("user with email {0} already exists")]
    Conflict(String),
    #[error("{0}")]
    Storage(String),
}

impl UserError {
    pub fn from_store(err: StoreError, key: &UserKey) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound(key.to_string()),
            StoreError::AlreadyExists(email) => Self::Conflict(email),
            StoreError::Backend(msg) | StoreError::InvalidData(msg) => Self::Storage(msg),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Bad request",
            Self::NotFound(_) => "User not found",
            Self::Conflict(_) => "User already exists",
            Self::Storage(_) => "Storage error",
        }
    }
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.summary(),
            "details": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}
