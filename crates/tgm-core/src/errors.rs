use std::path::PathBuf;

/// Core error type.
///
/// Adapter crates map their client-specific failures into this type so the
/// services and the HTTP layer can tell retryable conditions (flood waits,
/// dropped connections) from user-facing ones (bad IDs, missing rights).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("not authenticated")]
    NotAuthorized,

    #[error("chat not found: {0} (list your dialogs again to refresh IDs)")]
    ChatNotFound(i64),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("flood wait: retry after {seconds}s")]
    FloodWait { seconds: u32 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::FloodWait { .. } | Error::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(Error::FloodWait { seconds: 3 }.is_retryable());
        assert!(Error::Network("reset".to_string()).is_retryable());
        assert!(!Error::ChatNotFound(1).is_retryable());
        assert!(!Error::PermissionDenied("CHAT_ADMIN_REQUIRED".to_string()).is_retryable());
        assert!(!Error::NotAuthorized.is_retryable());
    }
}
