//! Patient service errors.

use thiserror::Error;

use crate::error::ErrorKind;
use crate::store::StorageError;
use crate::validation::ValidationErrors;

/// Service errors. Each variant is exactly one [`ErrorKind`].
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} is required")]
    Required(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Patient service is not ready")]
    NotReady,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Required(_) => ErrorKind::Required,
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::NotReady => ErrorKind::NotReady,
            ServiceError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Structured field errors, for `Validation` failures only.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            ServiceError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Required(field) => ServiceError::Required(field.to_string()),
            StorageError::NotFound(what) => ServiceError::NotFound(what),
            StorageError::NotInitialized => ServiceError::NotReady,
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Storage(format!("serialization failed: {}", e))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_keep_their_kind() {
        let cases = vec![
            StorageError::Required("id"),
            StorageError::NotFound("patient x".into()),
            StorageError::NotInitialized,
            StorageError::DuplicateId("x".into()),
            StorageError::InvalidBackup {
                id: "b".into(),
                reason: "checksum mismatch".into(),
            },
        ];

        for storage_error in cases {
            let expected = storage_error.kind();
            let service_error: ServiceError = storage_error.into();
            assert_eq!(service_error.kind(), expected);
        }
    }

    #[test]
    fn test_required_message() {
        let err: ServiceError = StorageError::Required("id").into();
        assert_eq!(err.to_string(), "id is required");
    }
}
