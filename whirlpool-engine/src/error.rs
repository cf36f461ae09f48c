//! Engine-wide error types.

use thiserror::Error;

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Discovery failed at {url}: {detail}")]
    Discovery { url: String, detail: String },

    #[error("Resolution failed: {detail}")]
    Resolution {
        detail: String,
        diagnostics: Vec<String>,
    },

    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Import rejected: {0}")]
    ImportValidation(String),

    #[error("Update check failed: {0}")]
    UpdateCheck(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Process error: {0}")]
    Process(#[from] process_utils::ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} ({path}): {source}")]
    IoPath {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`] for callers that only need to know
/// which part of the engine failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    Discovery,
    Resolution,
    Persistence,
    ImportValidation,
    UpdateCheck,
    Invalid,
    Internal,
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn discovery(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Discovery {
            url: url.into(),
            detail: detail.into(),
        }
    }

    pub fn resolution(detail: impl Into<String>) -> Self {
        Self::Resolution {
            detail: detail.into(),
            diagnostics: Vec::new(),
        }
    }

    pub fn resolution_with(detail: impl Into<String>, diagnostics: Vec<String>) -> Self {
        Self::Resolution {
            detail: detail.into(),
            diagnostics,
        }
    }

    pub fn import_validation(msg: impl Into<String>) -> Self {
        Self::ImportValidation(msg.into())
    }

    pub fn io_path(op: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.display().to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Discovery { .. } => ErrorKind::Discovery,
            Self::Resolution { .. } | Self::Process(_) => ErrorKind::Resolution,
            Self::DatabaseSqlx(_) | Self::Migration(_) | Self::Database(_) => {
                ErrorKind::Persistence
            }
            Self::ImportValidation(_) => ErrorKind::ImportValidation,
            Self::UpdateCheck(_) => ErrorKind::UpdateCheck,
            Self::NotFound { .. } | Self::Validation(_) | Self::Configuration(_) => {
                ErrorKind::Invalid
            }
            Self::Serialization(_) | Self::Io(_) | Self::IoPath { .. } | Self::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Diagnostics collected while resolving, empty for every other kind.
    pub fn diagnostics(&self) -> &[String] {
        match self {
            Self::Resolution { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}
