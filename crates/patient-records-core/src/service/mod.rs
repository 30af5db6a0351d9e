//! Patient service: the entry point for the UI layer.
//!
//! Every write goes through the same gate:
//!
//! ```text
//! input → Patient entity → sanitize → validate ──✗──▶ ServiceError::Validation (no write)
//!                                         │
//!                                         ✓
//!                                         ▼
//!                                  PatientStore (primary map + index)
//! ```
//!
//! Validators decode escaped text before measuring it, so escaping never
//! pushes a field over its length limit.

mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RecordsConfig;
use crate::models::{
    now_timestamp, BackupInfo, Patient, PatientInput, PatientStatistics, PatientSummary, Visit,
    VisitInput,
};
use crate::store::{PatientStore, SearchCriteria};
use crate::validation::{validate_patient, ValidationResult};

/// Full-data export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataExport {
    pub exported_at: String,
    pub patients: Vec<Patient>,
}

/// Orchestrates validation and storage.
pub struct PatientService {
    store: PatientStore,
}

impl PatientService {
    /// Wrap a store. Call [`PatientService::initialize`] before use.
    pub fn new(store: PatientStore) -> Self {
        Self { store }
    }

    /// Open the store described by `config` (not yet initialized).
    pub fn open(config: &RecordsConfig) -> ServiceResult<Self> {
        let store = PatientStore::open(&config.database_path)?.with_max_backups(config.max_backups);
        Ok(Self::new(store))
    }

    /// Bring the underlying storage to `Ready`. Safe to call again.
    pub fn initialize(&mut self) -> ServiceResult<()> {
        let count = self.store.initialize_storage()?;
        info!(patients = count, "Patient service ready");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.store.is_ready()
    }

    fn ensure_ready(&self) -> ServiceResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(ServiceError::NotReady)
        }
    }

    /// Read-only access to the store (diagnostics, consistency checks).
    pub fn store(&self) -> &PatientStore {
        &self.store
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validate form data without persisting anything. Never fails.
    pub fn validate_patient(&self, input: &PatientInput) -> ValidationResult {
        let mut patient = Patient::from_input(input);
        patient.sanitize();
        validate_patient(&patient)
    }

    fn check(patient: &Patient) -> ServiceResult<()> {
        let result = validate_patient(patient);
        if result.is_valid {
            Ok(())
        } else {
            debug!(
                patient_id = %patient.id,
                errors = result.errors.error_count(),
                "Rejected invalid patient"
            );
            Err(ServiceError::Validation(result.errors))
        }
    }

    // =========================================================================
    // Patient CRUD
    // =========================================================================

    /// Build, sanitize, validate and store a new patient.
    ///
    /// A caller-supplied ID that is already stored is rejected.
    pub fn create_patient(&mut self, input: PatientInput) -> ServiceResult<Patient> {
        self.ensure_ready()?;

        let mut patient = Patient::from_input(&input);
        patient.sanitize();
        Self::check(&patient)?;

        self.store.insert_patient(&patient)?;
        info!(patient_id = %patient.id, "Patient created");
        Ok(patient)
    }

    /// Merge `patch` into the stored patient and save it if still valid.
    pub fn update_patient(&mut self, id: &str, patch: PatientInput) -> ServiceResult<Patient> {
        self.ensure_ready()?;
        let mut patient = self.load_existing(id)?;

        patient.apply_input(&patch);
        patient.sanitize();
        Self::check(&patient)?;

        self.store.save_patient(&patient)?;
        info!(patient_id = %patient.id, "Patient updated");
        Ok(patient)
    }

    pub fn delete_patient(&mut self, id: &str) -> ServiceResult<()> {
        self.ensure_ready()?;
        self.store.delete_patient(id)?;
        Ok(())
    }

    /// Fully hydrated record, visits included.
    pub fn get_patient(&self, id: &str) -> ServiceResult<Patient> {
        self.ensure_ready()?;
        self.load_existing(id)
    }

    fn load_existing(&self, id: &str) -> ServiceResult<Patient> {
        if id.trim().is_empty() {
            return Err(ServiceError::Required("id".into()));
        }
        self.store
            .load_patient(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("patient {}", id)))
    }

    // =========================================================================
    // Visits
    // =========================================================================

    pub fn add_visit(&mut self, patient_id: &str, input: VisitInput) -> ServiceResult<Visit> {
        self.ensure_ready()?;
        let mut patient = self.load_existing(patient_id)?;

        let visit_id = patient.add_visit(&input).id;
        let visit = self.commit_visit_change(patient, &visit_id)?;
        info!(patient_id = %patient_id, visit_id = %visit_id, "Visit added");
        Ok(visit)
    }

    pub fn update_visit(
        &mut self,
        patient_id: &str,
        visit_id: &str,
        patch: VisitInput,
    ) -> ServiceResult<Visit> {
        self.ensure_ready()?;
        if visit_id.trim().is_empty() {
            return Err(ServiceError::Required("visit id".into()));
        }
        let mut patient = self.load_existing(patient_id)?;

        if patient.update_visit(visit_id, &patch).is_none() {
            return Err(ServiceError::NotFound(format!("visit {}", visit_id)));
        }
        let visit = self.commit_visit_change(patient, visit_id)?;
        info!(patient_id = %patient_id, visit_id = %visit_id, "Visit updated");
        Ok(visit)
    }

    pub fn remove_visit(&mut self, patient_id: &str, visit_id: &str) -> ServiceResult<()> {
        self.ensure_ready()?;
        if visit_id.trim().is_empty() {
            return Err(ServiceError::Required("visit id".into()));
        }
        let mut patient = self.load_existing(patient_id)?;

        if !patient.remove_visit(visit_id) {
            return Err(ServiceError::NotFound(format!("visit {}", visit_id)));
        }
        self.store.save_patient(&patient)?;
        info!(patient_id = %patient_id, visit_id = %visit_id, "Visit removed");
        Ok(())
    }

    /// Sanitize, validate and save a patient after a visit change, returning
    /// the stored form of `visit_id`.
    fn commit_visit_change(&mut self, mut patient: Patient, visit_id: &str) -> ServiceResult<Visit> {
        patient.sanitize();
        Self::check(&patient)?;
        self.store.save_patient(&patient)?;

        patient
            .find_visit(visit_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("visit {}", visit_id)))
    }

    // =========================================================================
    // Listing / search
    // =========================================================================

    /// Index rows matching `term`, for list views.
    pub fn search_patients(&self, term: &str) -> ServiceResult<Vec<PatientSummary>> {
        self.ensure_ready()?;
        Ok(self.store.search_patients(&SearchCriteria::term(term))?)
    }

    /// Index rows matching arbitrary criteria.
    pub fn search_patients_by(&self, criteria: &SearchCriteria) -> ServiceResult<Vec<PatientSummary>> {
        self.ensure_ready()?;
        Ok(self.store.search_patients(criteria)?)
    }

    /// Full records matching `term`, in the same order as the index scan.
    pub fn search_patient_records(&self, term: &str) -> ServiceResult<Vec<Patient>> {
        self.ensure_ready()?;
        let hits = self.store.search_patients(&SearchCriteria::term(term))?;
        Ok(self.store.load_patients(hits.iter().map(|h| h.id.as_str()))?)
    }

    pub fn get_all_patients(&self) -> ServiceResult<Vec<PatientSummary>> {
        self.ensure_ready()?;
        Ok(self.store.get_all_patients()?)
    }

    pub fn get_patient_statistics(&self) -> ServiceResult<PatientStatistics> {
        self.ensure_ready()?;
        Ok(self.store.get_statistics()?)
    }

    // =========================================================================
    // Backup / restore / bulk
    // =========================================================================

    pub fn create_backup(&mut self) -> ServiceResult<BackupInfo> {
        self.ensure_ready()?;
        Ok(self.store.create_backup()?)
    }

    pub fn restore_from_backup(&mut self, backup_id: &str) -> ServiceResult<usize> {
        self.ensure_ready()?;
        Ok(self.store.restore_from_backup(backup_id)?)
    }

    pub fn list_backups(&self) -> ServiceResult<Vec<BackupInfo>> {
        self.ensure_ready()?;
        Ok(self.store.list_backups()?)
    }

    pub fn delete_backup(&mut self, backup_id: &str) -> ServiceResult<()> {
        self.ensure_ready()?;
        Ok(self.store.delete_backup(backup_id)?)
    }

    /// Wipe every patient. Returns how many were removed.
    pub fn clear_all_data(&mut self) -> ServiceResult<usize> {
        self.ensure_ready()?;
        Ok(self.store.clear_all_data()?)
    }

    /// Serialize every full record as a [`DataExport`] JSON document.
    pub fn export_data(&self) -> ServiceResult<String> {
        self.ensure_ready()?;
        let export = DataExport {
            exported_at: now_timestamp(),
            patients: self.store.export_patients()?,
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Replace all patients with the contents of a [`DataExport`] document.
    ///
    /// Every record is sanitized and validated first; one invalid record
    /// rejects the whole import and nothing is written.
    pub fn import_data(&mut self, json: &str) -> ServiceResult<usize> {
        self.ensure_ready()?;
        let export: DataExport = serde_json::from_str(json)
            .map_err(|e| ServiceError::Storage(format!("invalid import document: {}", e)))?;

        let mut patients = export.patients;
        for (position, patient) in patients.iter_mut().enumerate() {
            // Imported records keep their own timestamps
            let updated_at = patient.updated_at.clone();
            patient.refresh_age();
            patient.sanitize();
            patient.updated_at = updated_at;

            if let Err(e) = Self::check(patient) {
                warn!(position, "Import rejected: invalid record");
                return Err(e);
            }
        }

        let count = self.store.replace_all_patients(&patients)?;
        info!(patients = count, "Import completed");
        Ok(count)
    }
}
