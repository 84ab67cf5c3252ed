//! Errors raised by persisted state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a [`StateStore`](crate::storage::StateStore) call.
///
/// ```
/// use rampart_core::error::StorageError;
///
/// let error = StorageError::write_error("/var/lib/rampart/gate.json", "disk full");
/// assert!(error.to_string().contains("write"));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageError {
    /// The filesystem refused an operation.
    #[error("state: {operation} {path} failed: {reason}")]
    IoError {
        /// `read` or `write`
        operation: String,
        /// File or directory involved
        path: String,
        /// Underlying I/O error
        reason: String,
    },

    /// A value could not be turned into JSON.
    #[error("state: cannot encode value: {reason}")]
    SerializationError {
        /// Encoder message
        reason: String,
    },

    /// Stored JSON does not match the expected shape.
    #[error("state: `{key}` is unreadable: {reason}")]
    DeserializationError {
        /// Key of the stored record
        key: String,
        /// Decoder message
        reason: String,
    },

    /// Keys are file stems; path separators and a leading dot are refused.
    #[error("state: `{key}` is not a valid key")]
    InvalidKey {
        /// The refused key
        key: String,
    },
}

impl StorageError {
    /// Failure reading `path`.
    #[must_use]
    pub fn read_error(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IoError {
            operation: "read".to_string(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Failure writing `path`.
    #[must_use]
    pub fn write_error(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IoError {
            operation: "write".to_string(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError {
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_messages_name_operation() {
        let error = StorageError::read_error("/data/gate.json", "corrupted");
        assert_eq!(
            error.to_string(),
            "state: read /data/gate.json failed: corrupted"
        );
    }

    #[test]
    fn test_invalid_key_message() {
        let error = StorageError::InvalidKey {
            key: "../escape".to_string(),
        };
        assert_eq!(error.to_string(), "state: `../escape` is not a valid key");
    }
}
