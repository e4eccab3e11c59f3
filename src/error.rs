use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("unknown meal '{0}'")]
    InvalidMeal(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("menu containers did not stabilize in time")]
    MenuLoadTimeout,

    #[error("browser session failed: {0}")]
    Browser(String),

    #[error("storage failure: {0}")]
    Store(#[from] anyhow::Error),

    #[error("no token provided")]
    MissingToken,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidMeal(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::MissingToken => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::InvalidToken => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            // Scrape and store details stay in the logs, not the response.
            AppError::Extraction(_)
            | AppError::MenuLoadTimeout
            | AppError::Browser(_)
            | AppError::Store(_) => {
                error!("{self}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        (status, axum::Json(serde_json::json!({ "message": message }))).into_response()
    }
}
