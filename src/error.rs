use std::fmt;
use std::io;

use thiserror::Error;

use crate::status::FieldMismatch;

/// Main error type for s3a-testkit operations
#[derive(Error, Debug)]
pub enum TestKitError {
    #[error("Cannot parse value of {key} as {target}: {value:?}")]
    Parse {
        key: String,
        value: String,
        target: &'static str,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Assumption violated: {0}")]
    Assumption(String),

    #[error("{message}: {statistic} expected {expected} but diff was {actual}")]
    DiffMismatch {
        message: String,
        statistic: String,
        expected: i64,
        actual: i64,
    },

    #[error("Status mismatch for {path}: {}", Mismatches(.mismatches))]
    FieldMismatch {
        path: String,
        mismatches: Vec<FieldMismatch>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Coarse classification of a [`TestKitError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Configuration,
    Assumption,
    Assertion,
    Io,
}

impl TestKitError {
    /// Classify the error for dispatch
    pub fn kind(&self) -> ErrorKind {
        match self {
            TestKitError::Parse { .. } => ErrorKind::Parse,
            TestKitError::Configuration(_) => ErrorKind::Configuration,
            TestKitError::Yaml(_) => ErrorKind::Configuration,
            TestKitError::Assumption(_) => ErrorKind::Assumption,
            TestKitError::DiffMismatch { .. } => ErrorKind::Assertion,
            TestKitError::FieldMismatch { .. } => ErrorKind::Assertion,
            TestKitError::Io(_) => ErrorKind::Io,
        }
    }

    /// True if the test should be skipped rather than failed
    pub fn is_assumption(&self) -> bool {
        self.kind() == ErrorKind::Assumption
    }
}

struct Mismatches<'a>(&'a [FieldMismatch]);

impl fmt::Display for Mismatches<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, m) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", m)?;
        }
        Ok(())
    }
}

/// Result type alias for s3a-testkit operations
pub type Result<T> = std::result::Result<T, TestKitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_names_key_and_value() {
        let err = TestKitError::Parse {
            key: "fs.s3a.scale.test.huge.filesize".to_string(),
            value: "12q".to_string(),
            target: "byte size",
        };
        let msg = err.to_string();
        assert!(msg.contains("fs.s3a.scale.test.huge.filesize"));
        assert!(msg.contains("12q"));
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_field_mismatch_lists_every_field() {
        let err = TestKitError::FieldMismatch {
            path: "s3a://bucket/file".to_string(),
            mismatches: vec![
                FieldMismatch::new("len", 10, 12),
                FieldMismatch::new("owner", "alice", "bob"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("len: expected 10, got 12"), "{}", msg);
        assert!(msg.contains("owner: expected alice, got bob"), "{}", msg);
        assert_eq!(err.kind(), ErrorKind::Assertion);
    }

    #[test]
    fn test_assumption_classification() {
        let err = TestKitError::Assumption("no test filesystem".to_string());
        assert!(err.is_assumption());
        assert!(!TestKitError::Configuration("x".into()).is_assumption());
    }
}
