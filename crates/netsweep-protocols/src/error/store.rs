//! Persistent store errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::store::ExpectedVersion;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Version conflict on {id}: expected {expected}, found {}", actual.map_or_else(|| "none".to_string(), |v| v.to_string()))]
    Conflict {
        id: String,
        expected: ExpectedVersion,
        actual: Option<u64>,
    },

    #[error("Timed out waiting for lock on {0}")]
    LockTimeout(PathBuf),

    #[error("Invalid record: {0}")]
    Invalid(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_display() {
        let err = StoreError::Conflict {
            id: "nightly".to_string(),
            expected: ExpectedVersion::Exact(3),
            actual: Some(4),
        };
        let display = err.to_string();
        assert!(display.contains("nightly"));
        assert!(display.contains("version 3"));
        assert!(display.contains('4'));
    }

    #[test]
    fn test_conflict_absent_record() {
        let err = StoreError::Conflict {
            id: "gone".to_string(),
            expected: ExpectedVersion::Exact(1),
            actual: None,
        };
        assert!(err.to_string().contains("found none"));
    }

    #[test]
    fn test_lock_timeout_display() {
        let err = StoreError::LockTimeout(PathBuf::from("/tmp/schedules.lock"));
        assert!(err.to_string().contains("schedules.lock"));
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = StoreError::from(json_err);
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
