//! Error kinds shared by the storage engine and the patient service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The classification every user-facing failure maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Mandatory input missing, e.g. an empty ID
    Required,
    /// Field or entity rule violated
    Validation,
    /// Target patient, visit or backup does not exist
    NotFound,
    /// Called before initialization completed
    NotReady,
    /// Underlying persistence failure
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Required => "required",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::NotReady => "not-ready",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
