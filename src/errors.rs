use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Config(String),
    #[error("product service responded with {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("geocoding failed ({status}): {message}")]
    Geocoding { status: String, message: String },
    #[error("request cancelled")]
    Cancelled,
}

impl AppError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }
}
