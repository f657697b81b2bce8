use thiserror::Error;

use crate::uploader::session::SessionStatus;

/// Category shown to the user when the request could not be sent or answered.
pub const CATEGORY_NETWORK: &str = "network error";
/// Category shown when the backend answered 200 with an unusable body.
pub const CATEGORY_INVALID_RESPONSE: &str = "invalid server response";
/// Category shown for any non-200 status.
pub const CATEGORY_SERVER: &str = "server error";
/// Category shown when the picked image could not be packed into a request.
pub const CATEGORY_ENCODING: &str = "encoding error";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request failure from an `UploadBackend` that does not go through reqwest
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Server responded with status {status}")]
    Server { status: u16 },

    #[error("Unreadable server response: {0}")]
    ResponseParse(String),

    #[error("Cannot {operation} while session is {status}")]
    InvalidState {
        operation: String,
        status: SessionStatus,
    },

    #[error("Invalid endpoint URL: {url}")]
    InvalidEndpoint { url: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid file type: {path}. Only image files are supported.")]
    InvalidFileType { path: String },

    #[error("File too large: {path}. Maximum size is {max_mb}MB.")]
    FileTooLarge { path: String, max_mb: u64 },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_state(operation: &str, status: SessionStatus) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            status,
        }
    }

    pub fn file_not_found(path: &str) -> Self {
        Self::FileNotFound {
            path: path.to_string(),
        }
    }

    pub fn invalid_file_type(path: &str) -> Self {
        Self::InvalidFileType {
            path: path.to_string(),
        }
    }

    pub fn file_too_large(path: &str, max_mb: u64) -> Self {
        Self::FileTooLarge {
            path: path.to_string(),
            max_mb,
        }
    }

    pub fn invalid_endpoint(url: &str) -> Self {
        Self::InvalidEndpoint {
            url: url.to_string(),
        }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding(message.into())
    }

    pub fn response_parse(message: impl Into<String>) -> Self {
        Self::ResponseParse(message.into())
    }

    /// User-facing category for a failed submission.
    ///
    /// Only the four submission failure kinds have a dedicated category; anything
    /// else reaching a session is reported as a network problem since it happened
    /// while talking to the backend.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Encoding(_) => CATEGORY_ENCODING,
            AppError::Server { .. } => CATEGORY_SERVER,
            AppError::ResponseParse(_) => CATEGORY_INVALID_RESPONSE,
            _ => CATEGORY_NETWORK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(AppError::Server { status: 500 }.category(), "server error");
        assert_eq!(
            AppError::Transport("connection refused".into()).category(),
            "network error"
        );
        assert_eq!(
            AppError::response_parse("empty body").category(),
            "invalid server response"
        );
        assert_eq!(AppError::encoding("bad header").category(), "encoding error");
    }

    #[test]
    fn test_invalid_state_message() {
        let err = AppError::invalid_state("change preset", SessionStatus::Submitting);
        assert_eq!(
            err.to_string(),
            "Cannot change preset while session is submitting"
        );
        assert_eq!(err.category(), "network error");
    }
}
