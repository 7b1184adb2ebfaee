//! The error taxonomy described in the design: expected failures are data,
//! never panics. [`DotlinkError`] is returned by every library entry point;
//! `main.rs` is the only place that turns it into a process exit code.

use crate::conflict::Conflict;
use camino::Utf8PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DotlinkError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{} conflict(s) detected", .0.len())]
    Conflict(Vec<Conflict>),

    #[error("permission denied: {path}")]
    Permission { path: Utf8PathBuf },

    #[error("io error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest corruption: {0}")]
    Corruption(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl DotlinkError {
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            return Self::Permission { path: path.into() };
        }
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Coarse taxonomy kind, used by the CLI to pick an exit code.
    pub fn severity(&self) -> Severity {
        match self {
            DotlinkError::Conflict(conflicts) => {
                if conflicts
                    .iter()
                    .any(|c| c.severity == crate::conflict::Severity::Error)
                {
                    Severity::Error
                } else {
                    Severity::Warning
                }
            }
            DotlinkError::Cancelled => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}
