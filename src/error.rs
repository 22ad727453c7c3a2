//! Typed failures raised at the library boundary.
//!
//! Only two conditions abort an ingestion: the workbook cannot be opened and
//! its first sheet has no header row. Everything below that level is either a
//! skipped row ([`crate::record::SkipReason`]) or a cell sentinel.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unable to read workbook {path:?}: {reason}")]
    FileUnreadable { path: PathBuf, reason: String },
    #[error("Workbook {path:?} has no header row on its first sheet")]
    NoHeader { path: PathBuf },
}

impl IngestError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        IngestError::FileUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            IngestError::FileUnreadable { path, .. } | IngestError::NoHeader { path } => path,
        }
    }
}

/// Why a formula could not be turned into a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("Unsupported formula '{0}'")]
    Unsupported(String),
    #[error("Formula has no cached result")]
    NoCachedValue,
    #[error("Circular reference through {0}")]
    CircularReference(String),
    #[error("Referenced cell holds error {0}")]
    CellError(String),
    #[error("Invalid reference '{0}'")]
    InvalidReference(String),
    #[error("Evaluation failed: {0}")]
    Evaluation(String),
}
