use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{service} API error: {message}")]
    Provider { service: String, message: String },

    #[error("{0} returned no usable content")]
    EmptyResult(String),

    #[error("Database error: {0}")]
    Persistence(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid headline: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Coarse failure category, stable across message wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Provider,
    EmptyResult,
    Persistence,
    Validation,
    NotFound,
    InvalidTransition,
    Other,
}

impl AppError {
    pub fn provider(service: &str, message: impl Into<String>) -> Self {
        AppError::Provider {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Config(_) | AppError::TomlParse(_) => ErrorKind::Configuration,
            AppError::Transport(_) => ErrorKind::Transport,
            AppError::Provider { .. } => ErrorKind::Provider,
            AppError::EmptyResult(_) => ErrorKind::EmptyResult,
            AppError::Persistence(_) | AppError::Sqlite(_) => ErrorKind::Persistence,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            AppError::Io(_) | AppError::Json(_) | AppError::Other(_) => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
