use serde::Serialize;
use serde_json::json;

/// The primary error type for the application.
///
/// This enum consolidates all failures that cross a component boundary and
/// maps each of them onto the stable error codes of the RPC envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// For internal errors that are not expected to be handled by the caller.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
    /// For when a requested record or job is not found.
    #[error("Not found: {0}")]
    NotFound(String),
    /// For when caller input is invalid.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// For when a branch checkout is refused because the working tree is dirty.
    #[error("Uncommitted changes in {0}")]
    UncommittedChanges(String),
    /// For when an operation was cancelled before it completed.
    #[error("Cancelled: {0}")]
    Cancelled(String),
    /// For failures inside the persistent store.
    #[error("Store error: {0}")]
    Store(String),
    /// For failures of the scanning process as a whole.
    #[error("Scanner error: {0}")]
    Scanner(String),
    /// For git invocations that failed in a way the caller must see.
    #[error("Git error: {0}")]
    Git(String),
    /// For errors related to I/O operations.
    #[error("I/O error: {0}")]
    Io(String),
    /// For when a specific field in a request fails validation.
    #[error("Validation error on field '{field}': {message}")]
    ValidationError { field: String, message: String },
}

/// Error body of the RPC envelope: `{code, message, details?}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    /// Stable machine-readable code for the RPC boundary.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidInput(_) | AppError::ValidationError { .. } => "INVALID_INPUT",
            AppError::UncommittedChanges(_) => "UNCOMMITTED_CHANGES",
            AppError::Cancelled(_) => "CANCELLED",
            AppError::Store(_) => "STORE_ERROR",
            AppError::Scanner(_) => "SCANNER_ERROR",
            AppError::Git(_) => "GIT_ERROR",
            AppError::Io(_) => "IO_ERROR",
        }
    }

    /// Renders the error into the RPC envelope body. Internal errors are not
    /// leaked verbatim; they get an error id that links back to the log.
    pub fn to_rpc_body(&self) -> RpcErrorBody {
        match self {
            AppError::Internal(e) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!("Internal error {}: {:?}", error_id, e);
                RpcErrorBody {
                    code: self.code(),
                    message: "An internal error occurred".to_string(),
                    details: Some(json!({ "errorId": error_id.to_string() })),
                }
            }
            AppError::ValidationError { field, message } => RpcErrorBody {
                code: self.code(),
                message: format!("Validation failed for field '{}'", field),
                details: Some(json!({ "field": field, "message": message })),
            },
            other => RpcErrorBody { code: other.code(), message: other.to_string(), details: None },
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(format!("{}: {}", err.kind(), err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("Invalid JSON: {}", err))
    }
}

impl From<globset::Error> for AppError {
    fn from(err: globset::Error) -> Self {
        AppError::InvalidInput(format!("Invalid glob pattern: {}", err))
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the application.
pub type AppResult<T> = Result<T, AppError>;

/// An extension trait for `Option` that provides a convenient way to convert
/// an `Option` to a `Result` with a `NotFound` error.
pub trait OptionExt<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
    }
}

/// Helper functions for request validation at the RPC boundary.
pub mod validation {
    use super::*;

    pub fn validate_path(path: &str) -> AppResult<()> {
        if path.trim().is_empty() {
            return Err(AppError::ValidationError {
                field: "path".to_string(),
                message: "Path cannot be empty".to_string(),
            });
        }
        if path.contains('\0') {
            return Err(AppError::ValidationError {
                field: "path".to_string(),
                message: "Path contains null characters".to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_importance(value: u8) -> AppResult<()> {
        if value > 5 {
            return Err(AppError::ValidationError {
                field: "importance".to_string(),
                message: format!("Importance must be in 0..=5, got {}", value),
            });
        }
        Ok(())
    }

    pub fn validate_concurrency(value: Option<usize>) -> AppResult<()> {
        if let Some(c) = value {
            if c == 0 || c > 256 {
                return Err(AppError::ValidationError {
                    field: "concurrency".to_string(),
                    message: format!("Concurrency must be in 1..=256, got {}", c),
                });
            }
        }
        Ok(())
    }
}
