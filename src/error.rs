use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::repositories::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("アカウントが見つかりません")]
    NotFound,

    #[error("このメールアドレスは既に使用されています")]
    EmailAlreadyExists,

    #[error("データベースエラー")]
    Database(sqlx::Error),

    #[error("内部エラー")]
    Internal(anyhow::Error),
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::DuplicateKey { field: "email" } => Self::EmailAlreadyExists,
            RepositoryError::DuplicateKey { field } => {
                Self::Internal(anyhow::anyhow!("duplicate key: {field}"))
            }
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Validation(msg) => Self::Validation(msg),
            RepositoryError::CorruptRow(msg) => {
                Self::Internal(anyhow::anyhow!("corrupt account row: {msg}"))
            }
            RepositoryError::Database(e) => Self::Database(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                "アカウントが見つかりません".to_string(),
            ),
            Self::EmailAlreadyExists => (
                StatusCode::CONFLICT,
                "このメールアドレスは既に使用されています".to_string(),
            ),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
