use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid target '{spec}': {reason}")]
    InvalidTarget { spec: String, reason: String },

    #[error("failed to read target list {}: {source}", path.display())]
    TargetList {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid port specification: {0}")]
    InvalidPort(String),

    #[error("unknown port preset: {0}")]
    UnknownPreset(String),

    #[error("failed to read wordlist {}: {source}", path.display())]
    Wordlist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("scan interrupted")]
    Interrupted,
}

impl ScanError {
    pub(crate) fn invalid_target(spec: &str, reason: impl Into<String>) -> Self {
        ScanError::InvalidTarget {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }

    /// Malformed input that only invalidates the entry it came from.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidTarget { .. }
                | ScanError::TargetList { .. }
                | ScanError::InvalidPort(_)
                | ScanError::UnknownPreset(_)
        )
    }
}
