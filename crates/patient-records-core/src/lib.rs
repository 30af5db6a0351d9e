//! Patient Records Core Library
//!
//! Local, single-practice patient record manager: validated patient records
//! with visit notes, SQLite persistence with a denormalized search index, and
//! checksummed backup/restore.
//!
//! # Architecture
//!
//! ```text
//!   UI (forms, lists)
//!         │  PatientInput / VisitInput
//!         ▼
//!   PatientService ──────▶ validation (pure gate)
//!         │
//!         ▼
//!   PatientStore ── one transaction per mutation ──┐
//!         │                                        │
//!         ▼                                        ▼
//!   patients (id → JSON record)          patient_index (id → row)
//!                                                  │
//!                                        in-memory PatientIndex
//!                                        (search, list, statistics)
//! ```
//!
//! # Core Principle
//!
//! **The index always reflects the latest committed write.** No table is ever
//! written without the other, and the in-memory mirror is updated only after
//! the commit succeeds.
//!
//! # Modules
//!
//! - [`models`]: Domain types (Patient, Visit, PatientSummary, etc.)
//! - [`validation`]: Field and entity validators
//! - [`db`]: SQLite database layer
//! - [`store`]: Storage engine (lifecycle, index, backups)
//! - [`service`]: Patient service consumed by the UI layer
//! - [`config`]: TOML/environment configuration
//! - [`logging`]: Tracing subscriber setup

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod sanitize;
pub mod service;
pub mod store;
pub mod validation;

// Re-export commonly used types
pub use config::RecordsConfig;
pub use db::Database;
pub use error::ErrorKind;
pub use models::{
    BackupInfo, Gender, Patient, PatientInput, PatientStatistics, PatientSummary, Visit,
    VisitInput,
};
pub use service::{PatientService, ServiceError, ServiceResult};
pub use store::{PatientStore, SearchCriteria, StorageError};
pub use validation::{validate_patient, ValidationErrors, ValidationResult};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Mutex;
use std::sync::Arc;

// =========================================================================
// FFI Error Type
// =========================================================================

/// FFI errors, one variant per [`ErrorKind`].
///
/// `Validation` carries every field problem so forms can mark each input.
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum PatientRecordsError {
    #[error("Required: {message}")]
    Required { message: String },

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        errors: Vec<FfiFieldError>,
    },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Not ready: {message}")]
    NotReady { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl PatientRecordsError {
    fn storage(message: impl Into<String>) -> Self {
        PatientRecordsError::Storage {
            message: message.into(),
        }
    }
}

impl From<ServiceError> for PatientRecordsError {
    fn from(e: ServiceError) -> Self {
        let message = e.to_string();
        match e {
            ServiceError::Validation(errors) => PatientRecordsError::Validation {
                message,
                errors: field_errors(&errors),
            },
            other => match other.kind() {
                ErrorKind::Required => PatientRecordsError::Required { message },
                ErrorKind::NotFound => PatientRecordsError::NotFound { message },
                ErrorKind::NotReady => PatientRecordsError::NotReady { message },
                ErrorKind::Validation | ErrorKind::Storage => {
                    PatientRecordsError::Storage { message }
                }
            },
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for PatientRecordsError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        PatientRecordsError::storage(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open (creating if needed) and initialize the records database at `path`.
#[uniffi::export]
pub fn open_patient_records(path: String) -> Result<Arc<PatientRecordsCore>, PatientRecordsError> {
    let config = RecordsConfig {
        database_path: path,
        ..RecordsConfig::default()
    };
    PatientRecordsCore::from_config(&config)
}

/// Open using a TOML configuration document.
#[uniffi::export]
pub fn open_patient_records_with_config(
    config_toml: String,
) -> Result<Arc<PatientRecordsCore>, PatientRecordsError> {
    let mut config = RecordsConfig::from_toml_str(&config_toml)
        .map_err(|e| PatientRecordsError::storage(e.to_string()))?;
    config
        .apply_env_overrides()
        .and_then(|_| config.validate())
        .map_err(|e| PatientRecordsError::storage(e.to_string()))?;
    logging::init_logging(&config.log_filter);
    PatientRecordsCore::from_config(&config)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_patient_records_in_memory() -> Result<Arc<PatientRecordsCore>, PatientRecordsError> {
    PatientRecordsCore::from_config(&RecordsConfig::in_memory())
}

/// Install the tracing subscriber. Returns false if one was already set.
#[uniffi::export]
pub fn init_logging(filter: String) -> bool {
    logging::init_logging(&filter)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe service wrapper for FFI.
#[derive(uniffi::Object)]
pub struct PatientRecordsCore {
    service: Mutex<PatientService>,
}

impl PatientRecordsCore {
    fn from_config(config: &RecordsConfig) -> Result<Arc<Self>, PatientRecordsError> {
        let mut service = PatientService::open(config)?;
        service.initialize()?;
        Ok(Arc::new(Self {
            service: Mutex::new(service),
        }))
    }
}

#[uniffi::export]
impl PatientRecordsCore {
    pub fn is_ready(&self) -> Result<bool, PatientRecordsError> {
        Ok(self.service.lock()?.is_ready())
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Create a new patient.
    pub fn create_patient(
        &self,
        input: FfiPatientInput,
    ) -> Result<FfiOperationResult, PatientRecordsError> {
        let mut service = self.service.lock()?;
        let patient = service.create_patient(input.into())?;
        Ok(FfiOperationResult::saved(patient, "Patient created"))
    }

    /// Update fields of an existing patient.
    pub fn update_patient(
        &self,
        patient_id: String,
        patch: FfiPatientInput,
    ) -> Result<FfiOperationResult, PatientRecordsError> {
        let mut service = self.service.lock()?;
        let patient = service.update_patient(&patient_id, patch.into())?;
        Ok(FfiOperationResult::saved(patient, "Patient updated"))
    }

    /// Delete a patient and all of their visits.
    pub fn delete_patient(
        &self,
        patient_id: String,
    ) -> Result<FfiOperationResult, PatientRecordsError> {
        let mut service = self.service.lock()?;
        service.delete_patient(&patient_id)?;
        Ok(FfiOperationResult {
            success: true,
            patient_id: Some(patient_id),
            patient: None,
            message: Some("Patient deleted".into()),
        })
    }

    /// Get a full patient record.
    pub fn get_patient(&self, patient_id: String) -> Result<FfiPatient, PatientRecordsError> {
        let service = self.service.lock()?;
        Ok(service.get_patient(&patient_id)?.into())
    }

    /// Validate form data without saving.
    pub fn validate_patient(
        &self,
        input: FfiPatientInput,
    ) -> Result<FfiValidationReport, PatientRecordsError> {
        let service = self.service.lock()?;
        Ok(service.validate_patient(&input.into()).into())
    }

    /// Search patients by name or residence.
    pub fn search_patients(
        &self,
        term: String,
    ) -> Result<Vec<FfiPatientSummary>, PatientRecordsError> {
        let service = self.service.lock()?;
        let rows = service.search_patients(&term)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// List all patients.
    pub fn get_all_patients(&self) -> Result<Vec<FfiPatientSummary>, PatientRecordsError> {
        let service = self.service.lock()?;
        let rows = service.get_all_patients()?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub fn get_patient_statistics(&self) -> Result<FfiStatistics, PatientRecordsError> {
        let service = self.service.lock()?;
        Ok(service.get_patient_statistics()?.into())
    }

    // =========================================================================
    // Visit Operations
    // =========================================================================

    pub fn add_visit(
        &self,
        patient_id: String,
        input: FfiVisitInput,
    ) -> Result<FfiVisit, PatientRecordsError> {
        let mut service = self.service.lock()?;
        Ok(service.add_visit(&patient_id, input.into())?.into())
    }

    pub fn update_visit(
        &self,
        patient_id: String,
        visit_id: String,
        patch: FfiVisitInput,
    ) -> Result<FfiVisit, PatientRecordsError> {
        let mut service = self.service.lock()?;
        Ok(service
            .update_visit(&patient_id, &visit_id, patch.into())?
            .into())
    }

    pub fn remove_visit(
        &self,
        patient_id: String,
        visit_id: String,
    ) -> Result<(), PatientRecordsError> {
        let mut service = self.service.lock()?;
        service.remove_visit(&patient_id, &visit_id)?;
        Ok(())
    }

    // =========================================================================
    // Backup Operations
    // =========================================================================

    pub fn create_backup(&self) -> Result<FfiBackupInfo, PatientRecordsError> {
        let mut service = self.service.lock()?;
        Ok(service.create_backup()?.into())
    }

    /// Restore a snapshot. Returns the number of patients restored.
    pub fn restore_from_backup(&self, backup_id: String) -> Result<u32, PatientRecordsError> {
        let mut service = self.service.lock()?;
        Ok(service.restore_from_backup(&backup_id)? as u32)
    }

    pub fn list_backups(&self) -> Result<Vec<FfiBackupInfo>, PatientRecordsError> {
        let service = self.service.lock()?;
        Ok(service.list_backups()?.into_iter().map(Into::into).collect())
    }

    pub fn delete_backup(&self, backup_id: String) -> Result<(), PatientRecordsError> {
        let mut service = self.service.lock()?;
        service.delete_backup(&backup_id)?;
        Ok(())
    }

    /// Wipe all patient data. Returns the number of patients removed.
    pub fn clear_all_data(&self) -> Result<u32, PatientRecordsError> {
        let mut service = self.service.lock()?;
        Ok(service.clear_all_data()? as u32)
    }

    /// Export all records as JSON.
    pub fn export_data(&self) -> Result<String, PatientRecordsError> {
        let service = self.service.lock()?;
        Ok(service.export_data()?)
    }

    /// Replace all records from an export document.
    pub fn import_data(&self, json: String) -> Result<u32, PatientRecordsError> {
        let mut service = self.service.lock()?;
        Ok(service.import_data(&json)? as u32)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe patient form data.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiPatientInput {
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub place_of_residence: Option<String>,
    pub gender: Option<String>,
}

impl From<FfiPatientInput> for PatientInput {
    fn from(input: FfiPatientInput) -> Self {
        PatientInput {
            id: input.id,
            first_name: input.first_name,
            last_name: input.last_name,
            date_of_birth: input.date_of_birth,
            place_of_residence: input.place_of_residence,
            gender: input.gender,
        }
    }
}

/// FFI-safe visit form data.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiVisitInput {
    pub visit_date: Option<String>,
    pub medications: Option<String>,
    pub observations: Option<String>,
    pub additional_comments: Option<String>,
}

impl From<FfiVisitInput> for VisitInput {
    fn from(input: FfiVisitInput) -> Self {
        VisitInput {
            id: None,
            visit_date: input.visit_date,
            medications: input.medications,
            observations: input.observations,
            additional_comments: input.additional_comments,
        }
    }
}

/// FFI-safe visit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisit {
    pub id: String,
    pub visit_date: String,
    pub medications: String,
    pub observations: String,
    pub additional_comments: String,
    pub created_at: String,
}

impl From<Visit> for FfiVisit {
    fn from(visit: Visit) -> Self {
        Self {
            id: visit.id,
            visit_date: visit.visit_date,
            medications: visit.medications,
            observations: visit.observations,
            additional_comments: visit.additional_comments,
            created_at: visit.created_at,
        }
    }
}

/// FFI-safe patient. Visits are newest first.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub age: Option<u32>,
    pub place_of_residence: Option<String>,
    pub gender: String,
    pub visits: Vec<FfiVisit>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        let visits = patient
            .visits_sorted_by_date()
            .into_iter()
            .cloned()
            .map(Into::into)
            .collect();
        Self {
            id: patient.id,
            first_name: patient.first_name,
            last_name: patient.last_name,
            date_of_birth: patient.date_of_birth,
            age: patient.age,
            place_of_residence: patient.place_of_residence,
            gender: patient.gender,
            visits,
            created_at: patient.created_at,
            updated_at: patient.updated_at,
        }
    }
}

/// FFI-safe index row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub age: Option<u32>,
    pub gender: String,
    pub place_of_residence: Option<String>,
    pub visit_count: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PatientSummary> for FfiPatientSummary {
    fn from(row: PatientSummary) -> Self {
        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            full_name: row.full_name,
            age: row.age,
            gender: row.gender,
            place_of_residence: row.place_of_residence,
            visit_count: row.visit_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// FFI-safe statistics.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStatistics {
    pub total_patients: u32,
    pub male: u32,
    pub female: u32,
    pub other: u32,
    pub average_age: Option<f64>,
    pub total_visits: u32,
    pub patients_with_visits: u32,
}

impl From<PatientStatistics> for FfiStatistics {
    fn from(stats: PatientStatistics) -> Self {
        Self {
            total_patients: stats.total_patients,
            male: stats.gender_distribution.male,
            female: stats.gender_distribution.female,
            other: stats.gender_distribution.other,
            average_age: stats.average_age,
            total_visits: stats.total_visits,
            patients_with_visits: stats.patients_with_visits,
        }
    }
}

/// FFI-safe backup descriptor.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBackupInfo {
    pub backup_id: String,
    pub created_at: String,
    pub patient_count: u32,
}

impl From<BackupInfo> for FfiBackupInfo {
    fn from(info: BackupInfo) -> Self {
        Self {
            backup_id: info.backup_id,
            created_at: info.created_at,
            patient_count: info.patient_count,
        }
    }
}

/// `{ success, patientId?, patient?, message? }` result shape for the UI.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOperationResult {
    pub success: bool,
    pub patient_id: Option<String>,
    pub patient: Option<FfiPatient>,
    pub message: Option<String>,
}

impl FfiOperationResult {
    fn saved(patient: Patient, message: &str) -> Self {
        Self {
            success: true,
            patient_id: Some(patient.id.clone()),
            patient: Some(patient.into()),
            message: Some(message.to_string()),
        }
    }
}

/// One validation problem, flattened for FFI.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFieldError {
    pub field: String,
    /// Position in the visit list for visit errors
    pub visit_index: Option<u32>,
    pub kind: String,
    pub message: String,
}

/// FFI-safe validation result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiValidationReport {
    pub is_valid: bool,
    pub errors: Vec<FfiFieldError>,
}

impl From<ValidationResult> for FfiValidationReport {
    fn from(result: ValidationResult) -> Self {
        Self {
            is_valid: result.is_valid,
            errors: field_errors(&result.errors),
        }
    }
}

/// Flatten patient errors, then visit errors by position.
fn field_errors(errors: &ValidationErrors) -> Vec<FfiFieldError> {
    let mut flat = Vec::new();
    for (field, field_errors) in &errors.fields {
        for error in field_errors {
            flat.push(FfiFieldError {
                field: field.clone(),
                visit_index: None,
                kind: error.kind.code().to_string(),
                message: error.message.clone(),
            });
        }
    }
    for (index, fields) in &errors.visits {
        for (field, field_errors) in fields {
            for error in field_errors {
                flat.push(FfiFieldError {
                    field: field.clone(),
                    visit_index: Some(*index as u32),
                    kind: error.kind.code().to_string(),
                    message: error.message.clone(),
                });
            }
        }
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;

    fn john() -> FfiPatientInput {
        FfiPatientInput {
            first_name: Some("John".into()),
            last_name: Some("Doe".into()),
            date_of_birth: Some("1990-01-01".into()),
            gender: Some("Male".into()),
            ..FfiPatientInput::default()
        }
    }

    #[test]
    fn test_ffi_create_and_list() {
        let core = open_patient_records_in_memory().unwrap();
        assert!(core.is_ready().unwrap());

        let result = core.create_patient(john()).unwrap();
        assert!(result.success);
        let patient = result.patient.unwrap();
        assert_eq!(result.patient_id.as_deref(), Some(patient.id.as_str()));
        assert_eq!(patient.gender, "male");

        let rows = core.get_all_patients().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].full_name, "John Doe");
    }

    #[test]
    fn test_ffi_errors_are_classified() {
        let core = open_patient_records_in_memory().unwrap();

        assert!(matches!(
            core.delete_patient(String::new()),
            Err(PatientRecordsError::Required { .. })
        ));
        assert!(matches!(
            core.delete_patient("unknown".into()),
            Err(PatientRecordsError::NotFound { .. })
        ));
        assert!(matches!(
            core.create_patient(FfiPatientInput::default()),
            Err(PatientRecordsError::Validation { .. })
        ));
    }

    #[test]
    fn test_ffi_validation_report() {
        let core = open_patient_records_in_memory().unwrap();
        let report = core
            .validate_patient(FfiPatientInput {
                first_name: Some("J".into()),
                last_name: Some(String::new()),
                date_of_birth: Some("2099-01-01".into()),
                gender: Some("invalid".into()),
                ..FfiPatientInput::default()
            })
            .unwrap();

        assert!(!report.is_valid);
        let fields: Vec<&str> = report.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["dateOfBirth", "firstName", "gender", "lastName"]);
        assert_eq!(report.errors[0].kind, "future-date");
    }

    #[test]
    fn test_ffi_validation_error_carries_fields() {
        let core = open_patient_records_in_memory().unwrap();

        let err = core
            .create_patient(FfiPatientInput {
                first_name: Some("J".into()),
                gender: Some("invalid".into()),
                ..FfiPatientInput::default()
            })
            .unwrap_err();
        let errors = match err {
            PatientRecordsError::Validation { errors, .. } => errors,
            other => panic!("expected a validation error, got {:?}", other),
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["firstName", "gender", "lastName"]);
        assert!(errors.iter().all(|e| e.visit_index.is_none()));

        let id = core.create_patient(john()).unwrap().patient_id.unwrap();
        let err = core
            .add_visit(
                id,
                FfiVisitInput {
                    visit_date: Some("2999-01-01".into()),
                    ..FfiVisitInput::default()
                },
            )
            .unwrap_err();
        let errors = match err {
            PatientRecordsError::Validation { errors, .. } => errors,
            other => panic!("expected a validation error, got {:?}", other),
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "visitDate");
        assert_eq!(errors[0].visit_index, Some(0));
        assert_eq!(errors[0].kind, "future-date");
    }

    #[test]
    fn test_ffi_patient_visits_newest_first() {
        let core = open_patient_records_in_memory().unwrap();
        let id = core.create_patient(john()).unwrap().patient_id.unwrap();

        core.add_visit(
            id.clone(),
            FfiVisitInput {
                visit_date: Some("2023-03-01".into()),
                ..FfiVisitInput::default()
            },
        )
        .unwrap();
        let newest = core
            .add_visit(
                id.clone(),
                FfiVisitInput {
                    visit_date: Some("2024-01-15".into()),
                    medications: Some("Aspirin".into()),
                    ..FfiVisitInput::default()
                },
            )
            .unwrap();

        let patient = core.get_patient(id).unwrap();
        assert_eq!(patient.visits[0].id, newest.id);
        assert_eq!(patient.visits.len(), 2);
    }

    #[test]
    fn test_ffi_backup_cycle() {
        let core = open_patient_records_in_memory().unwrap();
        core.create_patient(john()).unwrap();

        let backup = core.create_backup().unwrap();
        assert_eq!(core.clear_all_data().unwrap(), 1);
        assert_eq!(core.restore_from_backup(backup.backup_id).unwrap(), 1);
        assert_eq!(core.get_patient_statistics().unwrap().male, 1);
        assert_eq!(core.list_backups().unwrap().len(), 1);
    }
}
