use std::path::PathBuf;

use serde::Serialize;

/// Coarse failure category reported to the user alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    InvalidInput,
    UnsupportedFormat,
    EmptyArchive,
    ExtractionFailed,
    TestFailed,
    Output,
}

/// Top-level error type. All orchestration entry points return this.
#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error("Not an archive or unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Not an archive format: {0}")]
    NotAnArchive(String),

    #[error("Could not read {format} records: {source}")]
    Enumerate {
        format: String,
        #[source]
        source: HandlerError,
    },

    #[error("Archive contains no records")]
    EmptyArchive,

    #[error("Failed to extract archive into {}: {source}", .destination.display())]
    ExtractionFailed {
        destination: PathBuf,
        #[source]
        source: HandlerError,
    },

    #[error("Test FAILED: Could not extract archive ({reason})")]
    TestFailed { reason: String, temp_dir: PathBuf },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl UnpackError {
    pub fn kind(&self) -> FailureKind {
        match self {
            UnpackError::Input(_) | UnpackError::Detect(_) => FailureKind::InvalidInput,
            UnpackError::UnsupportedFormat(_)
            | UnpackError::NotAnArchive(_)
            | UnpackError::Enumerate { .. } => FailureKind::UnsupportedFormat,
            UnpackError::EmptyArchive => FailureKind::EmptyArchive,
            UnpackError::ExtractionFailed { .. } => FailureKind::ExtractionFailed,
            UnpackError::TestFailed { .. } => FailureKind::TestFailed,
            UnpackError::Output(_) => FailureKind::Output,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Cannot open file: {} ({source})", .path.display())]
    CannotOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("Could not read file header: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure raised inside a format handler. Opaque to the orchestrator beyond its message.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Malformed {format} archive: {detail}")]
    Malformed { format: String, detail: String },

    #[error("Operation cancelled; partial output may remain")]
    Cancelled,

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HandlerError {
    pub fn malformed(format: impl Into<String>, detail: impl ToString) -> Self {
        Self::Malformed {
            format: format.into(),
            detail: detail.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgressError {
    #[error("Progress slot {index} is out of range (capacity {capacity})")]
    SlotOutOfRange { index: usize, capacity: usize },

    #[error("All {capacity} progress slots are in use")]
    Exhausted { capacity: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Path traversal detected in archive entry: {path}")]
    PathTraversal { path: String },

    #[error("Archive contains {count} entries, exceeding limit of {limit}")]
    TooManyFiles { count: u64, limit: u64 },

    #[error("Extracted data is {size_mb}MB, exceeding limit of {limit_mb}MB")]
    OversizedOutput { size_mb: u64, limit_mb: u64 },
}
