//! Fatal page-level errors.
//!
//! Structure and resolution problems abort the whole page build because the
//! output would be ambiguous. Evaluation faults never reach this type; they
//! are logged where they occur and the affected directive degrades.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::control::StructuralError;
use crate::loader::LoadError;
use crate::split::FormatError;

pub type CompileResult<T> = Result<T, CompileError>;

pub const ERR_STRUCTURE: &str = "E-STRUCT";
pub const ERR_FORMAT: &str = "E-FORMAT";
pub const ERR_RESOLVE: &str = "E-RESOLVE";
pub const ERR_DEPTH: &str = "E-DEPTH";

#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("{}: {source}", path.display())]
    Structural {
        path: PathBuf,
        #[source]
        source: StructuralError,
    },

    #[error("{}: {source}", path.display())]
    FormatConstraint {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("{}: cannot resolve component '{target}' at byte {offset}: {reason}", path.display())]
    Resolution {
        path: PathBuf,
        target: String,
        offset: usize,
        reason: String,
    },

    #[error("{}: could not load page: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    #[error("{}: component nesting exceeds {depth} levels", path.display())]
    RecursionLimit { path: PathBuf, depth: usize },
}

impl CompileError {
    /// Stable diagnostic code for tooling.
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::Structural { .. } => ERR_STRUCTURE,
            CompileError::FormatConstraint { .. } => ERR_FORMAT,
            CompileError::Resolution { .. } | CompileError::Load { .. } => ERR_RESOLVE,
            CompileError::RecursionLimit { .. } => ERR_DEPTH,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            CompileError::Structural { path, .. }
            | CompileError::FormatConstraint { path, .. }
            | CompileError::Resolution { path, .. }
            | CompileError::Load { path, .. }
            | CompileError::RecursionLimit { path, .. } => path,
        }
    }

    /// Byte offset into the component source, where one is known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            CompileError::Structural { source, .. } => Some(source.offset),
            CompileError::FormatConstraint { source, .. } => Some(source.offset),
            CompileError::Resolution { offset, .. } => Some(*offset),
            CompileError::Load { .. } | CompileError::RecursionLimit { .. } => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            code: self.code().to_string(),
            message: self.to_string(),
            file: self.path().display().to_string(),
            offset: self.offset(),
        }
    }
}

/// Serializable diagnostic handed across the native boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub file: String,
    pub offset: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_error_reports_path_and_offset() {
        let err = CompileError::Structural {
            path: PathBuf::from("views/home.html"),
            source: StructuralError::new(12, "closing {/if} without opening {if}"),
        };
        assert_eq!(err.code(), ERR_STRUCTURE);
        assert_eq!(err.offset(), Some(12));
        let message = err.to_string();
        assert!(message.contains("views/home.html"));
        assert!(message.contains("byte 12"));
    }

    #[test]
    fn test_diagnostic_shape() {
        let err = CompileError::Resolution {
            path: PathBuf::from("a.html"),
            target: "Card".to_string(),
            offset: 4,
            reason: "no import named 'Card'".to_string(),
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.code, ERR_RESOLVE);
        assert_eq!(diag.offset, Some(4));
        assert!(diag.message.contains("Card"));
    }
}
