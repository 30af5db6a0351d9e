//! Storage engine.
//!
//! Owns the database handle and the in-memory index. Lifecycle:
//!
//! ```text
//! Uninitialized ──initialize_storage()──▶ Initializing ──▶ Ready
//!        ▲                                     │
//!        └──────────── on failure ─────────────┘
//! ```
//!
//! Every operation other than `initialize_storage` requires `Ready`. Each
//! mutation commits the primary map and the index row together, then mirrors
//! the committed rows into memory, so a listing issued after a write has
//! returned always sees that write.

mod index;

pub use index::SearchCriteria;
pub(crate) use index::PatientIndex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::{BackupRow, Database, DbError, REQUIRED_TABLES};
use crate::error::ErrorKind;
use crate::models::{now_timestamp, BackupInfo, Patient, PatientStatistics, PatientSummary};

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage is not initialized")]
    NotInitialized,

    #[error("Invalid backup {id}: {reason}")]
    InvalidBackup { id: String, reason: String },

    #[error("Duplicate patient id: {0}")]
    DuplicateId(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Required(_) => ErrorKind::Required,
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::NotInitialized => ErrorKind::NotReady,
            StorageError::InvalidBackup { .. }
            | StorageError::DuplicateId(_)
            | StorageError::Database(_) => ErrorKind::Storage,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage handle lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Payload stored in a backup row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Snapshot format version
    pub version: u32,
    pub created_at: String,
    pub patients: Vec<Patient>,
}

const SNAPSHOT_VERSION: u32 = 1;

/// Default number of snapshots kept by `create_backup`.
pub const DEFAULT_MAX_BACKUPS: usize = 10;

/// Result of checking the index against the primary map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConsistency {
    pub primary_count: usize,
    pub index_count: usize,
    pub memory_count: usize,
    /// IDs in the primary map without an index row
    pub missing_from_index: Vec<String>,
    /// Index rows without a primary record
    pub orphaned_in_index: Vec<String>,
}

impl IndexConsistency {
    pub fn is_consistent(&self) -> bool {
        self.primary_count == self.index_count
            && self.index_count == self.memory_count
            && self.missing_from_index.is_empty()
            && self.orphaned_in_index.is_empty()
    }
}

/// Persistent patient store with a denormalized search index.
pub struct PatientStore {
    db: Database,
    state: StorageState,
    index: PatientIndex,
    max_backups: usize,
}

impl PatientStore {
    /// Wrap an open database. The store starts `Uninitialized`.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            state: StorageState::Uninitialized,
            index: PatientIndex::default(),
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }

    /// Open a file-backed store (`":memory:"` opens an in-memory one).
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        let db = if path == Path::new(":memory:") {
            Database::open_in_memory()?
        } else {
            Database::open(path)?
        };
        Ok(Self::new(db))
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Number of snapshots to retain; 0 disables pruning.
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    pub fn state(&self) -> StorageState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == StorageState::Ready
    }

    fn ensure_ready(&self) -> StorageResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Create missing tables and load the index into memory.
    ///
    /// Idempotent. If the stored index disagrees with the primary map it is
    /// rebuilt from the primary map. Returns the number of indexed patients.
    pub fn initialize_storage(&mut self) -> StorageResult<usize> {
        self.state = StorageState::Initializing;
        match self.load_index() {
            Ok(count) => {
                self.state = StorageState::Ready;
                info!(patients = count, "Storage ready");
                Ok(count)
            }
            Err(e) => {
                self.state = StorageState::Uninitialized;
                warn!(error = %e, "Storage initialization failed");
                Err(e)
            }
        }
    }

    fn load_index(&mut self) -> StorageResult<usize> {
        let mut missing = Vec::new();
        for table in REQUIRED_TABLES {
            if !self.db.has_table(table)? {
                missing.push(*table);
            }
        }
        if !missing.is_empty() {
            debug!(tables = ?missing, "Creating missing tables");
        }
        self.db.ensure_schema()?;

        let primary_ids: BTreeSet<String> = self.db.list_patient_ids()?.into_iter().collect();
        let mut rows = self.db.list_index_rows()?;
        let index_ids: BTreeSet<String> = rows.iter().map(|r| r.id.clone()).collect();

        if primary_ids != index_ids {
            warn!(
                primary = primary_ids.len(),
                indexed = index_ids.len(),
                "Index out of sync with primary map, rebuilding"
            );
            rows = self.db.rebuild_index()?;
        }

        self.index = PatientIndex::from_rows(rows);
        Ok(self.index.len())
    }

    // =========================================================================
    // Patient CRUD
    // =========================================================================

    /// Insert or replace a patient and its index row. Returns the ID.
    pub fn save_patient(&mut self, patient: &Patient) -> StorageResult<String> {
        self.ensure_ready()?;
        require_id(&patient.id)?;

        let summary = self.db.upsert_patient(patient)?;
        self.index.upsert(summary);
        debug!(patient_id = %patient.id, "Patient saved");
        Ok(patient.id.clone())
    }

    /// Insert a patient whose ID is not stored yet; duplicates are rejected.
    pub fn insert_patient(&mut self, patient: &Patient) -> StorageResult<String> {
        self.ensure_ready()?;
        require_id(&patient.id)?;

        let summary = self.db.insert_new_patient(patient).map_err(|e| match e {
            DbError::Constraint(_) => StorageError::DuplicateId(patient.id.clone()),
            other => other.into(),
        })?;
        self.index.upsert(summary);
        debug!(patient_id = %patient.id, "Patient inserted");
        Ok(patient.id.clone())
    }

    /// Load a full record. `Ok(None)` when the ID is unknown.
    pub fn load_patient(&self, id: &str) -> StorageResult<Option<Patient>> {
        self.ensure_ready()?;
        require_id(id)?;
        Ok(self.db.get_patient(id)?)
    }

    /// Load several full records, skipping unknown IDs.
    pub fn load_patients<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> StorageResult<Vec<Patient>> {
        self.ensure_ready()?;
        let mut patients = Vec::new();
        for id in ids {
            if let Some(patient) = self.db.get_patient(id)? {
                patients.push(patient);
            }
        }
        Ok(patients)
    }

    /// Remove a patient, its visits and its index row.
    pub fn delete_patient(&mut self, id: &str) -> StorageResult<()> {
        self.ensure_ready()?;
        require_id(id)?;

        if !self.db.delete_patient(id)? {
            return Err(StorageError::NotFound(format!("patient {}", id)));
        }
        self.index.remove(id);
        info!(patient_id = %id, "Patient deleted");
        Ok(())
    }

    // =========================================================================
    // Index queries
    // =========================================================================

    /// Scan the index. No match is an empty vector, never an error.
    pub fn search_patients(&self, criteria: &SearchCriteria) -> StorageResult<Vec<PatientSummary>> {
        self.ensure_ready()?;
        Ok(self.index.search(criteria))
    }

    pub fn get_all_patients(&self) -> StorageResult<Vec<PatientSummary>> {
        self.ensure_ready()?;
        Ok(self.index.all())
    }

    pub fn get_statistics(&self) -> StorageResult<PatientStatistics> {
        self.ensure_ready()?;
        Ok(self.index.statistics())
    }

    /// Compare primary map, stored index and in-memory index.
    pub fn check_index_consistency(&self) -> StorageResult<IndexConsistency> {
        self.ensure_ready()?;

        let primary: BTreeSet<String> = self.db.list_patient_ids()?.into_iter().collect();
        let stored: BTreeSet<String> = self
            .db
            .list_index_rows()?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let memory: BTreeSet<String> = self.index.ids().cloned().collect();

        Ok(IndexConsistency {
            primary_count: primary.len(),
            index_count: stored.len(),
            memory_count: memory.len(),
            missing_from_index: primary
                .difference(&stored)
                .chain(primary.difference(&memory))
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            orphaned_in_index: stored
                .union(&memory)
                .filter(|id| !primary.contains(*id))
                .cloned()
                .collect(),
        })
    }

    // =========================================================================
    // Bulk operations
    // =========================================================================

    /// Every full record, ordered by ID.
    pub fn export_patients(&self) -> StorageResult<Vec<Patient>> {
        self.ensure_ready()?;
        Ok(self.db.list_patients()?)
    }

    /// Replace the whole store with `patients` in one transaction.
    ///
    /// Either every record is written or nothing changes.
    pub fn replace_all_patients(&mut self, patients: &[Patient]) -> StorageResult<usize> {
        self.ensure_ready()?;
        let mut seen = BTreeSet::new();
        for patient in patients {
            require_id(&patient.id)?;
            if !seen.insert(patient.id.as_str()) {
                return Err(StorageError::DuplicateId(patient.id.clone()));
            }
        }

        let rows = self.db.replace_all_patients(patients)?;
        let count = rows.len();
        self.index = PatientIndex::from_rows(rows);
        info!(patients = count, "Patient store replaced");
        Ok(count)
    }

    /// Wipe the primary map and the index. Backups are kept.
    pub fn clear_all_data(&mut self) -> StorageResult<usize> {
        self.ensure_ready()?;
        let removed = self.db.clear_patients()?;
        self.index.clear();
        warn!(patients = removed, "All patient data cleared");
        Ok(removed)
    }

    // =========================================================================
    // Backups
    // =========================================================================

    /// Snapshot the primary map under a new backup ID.
    pub fn create_backup(&mut self) -> StorageResult<BackupInfo> {
        self.ensure_ready()?;

        let created_at = now_timestamp();
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            created_at: created_at.clone(),
            patients: self.db.list_patients()?,
        };
        let payload = serde_json::to_string(&snapshot).map_err(DbError::from)?;

        let row = BackupRow {
            backup_id: new_backup_id(),
            created_at,
            patient_count: snapshot.patients.len() as u32,
            checksum: checksum(&payload),
            snapshot: payload,
        };
        self.db.insert_backup(&row)?;
        info!(backup_id = %row.backup_id, patients = row.patient_count, "Backup created");

        if self.max_backups > 0 {
            let pruned = self.db.prune_backups(self.max_backups)?;
            if pruned > 0 {
                debug!(pruned, "Old backups pruned");
            }
        }

        Ok(row.info())
    }

    /// Replace the store with the contents of a snapshot.
    ///
    /// The snapshot is fully decoded and checked before anything is written;
    /// a corrupt snapshot leaves the current data untouched.
    pub fn restore_from_backup(&mut self, backup_id: &str) -> StorageResult<usize> {
        self.ensure_ready()?;
        if backup_id.trim().is_empty() {
            return Err(StorageError::Required("backup id"));
        }

        let row = self
            .db
            .get_backup(backup_id)?
            .ok_or_else(|| StorageError::NotFound(format!("backup {}", backup_id)))?;
        let snapshot = decode_snapshot(&row)?;

        let count = self.replace_all_patients(&snapshot.patients)?;
        info!(backup_id = %backup_id, patients = count, "Backup restored");
        Ok(count)
    }

    /// Snapshot descriptors, newest first.
    pub fn list_backups(&self) -> StorageResult<Vec<BackupInfo>> {
        self.ensure_ready()?;
        Ok(self.db.list_backups()?)
    }

    pub fn delete_backup(&mut self, backup_id: &str) -> StorageResult<()> {
        self.ensure_ready()?;
        if backup_id.trim().is_empty() {
            return Err(StorageError::Required("backup id"));
        }
        if !self.db.delete_backup(backup_id)? {
            return Err(StorageError::NotFound(format!("backup {}", backup_id)));
        }
        info!(backup_id = %backup_id, "Backup deleted");
        Ok(())
    }

    /// Raw database access (for tests and diagnostics).
    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn require_id(id: &str) -> StorageResult<()> {
    if id.trim().is_empty() {
        Err(StorageError::Required("id"))
    } else {
        Ok(())
    }
}

fn new_backup_id() -> String {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("backup_{}_{}", stamp, &suffix[..12])
}

fn checksum(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

fn decode_snapshot(row: &BackupRow) -> StorageResult<Snapshot> {
    let invalid = |reason: String| StorageError::InvalidBackup {
        id: row.backup_id.clone(),
        reason,
    };

    if checksum(&row.snapshot) != row.checksum {
        return Err(invalid("checksum mismatch".into()));
    }

    let mut snapshot: Snapshot =
        serde_json::from_str(&row.snapshot).map_err(|e| invalid(e.to_string()))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(invalid(format!("unsupported version {}", snapshot.version)));
    }
    if snapshot.patients.len() != row.patient_count as usize {
        return Err(invalid(format!(
            "expected {} patients, found {}",
            row.patient_count,
            snapshot.patients.len()
        )));
    }

    let mut seen = BTreeSet::new();
    for patient in &mut snapshot.patients {
        if patient.id.trim().is_empty() {
            return Err(invalid("record without id".into()));
        }
        if !seen.insert(patient.id.clone()) {
            return Err(invalid(format!("duplicate id {}", patient.id)));
        }
        patient.refresh_age();
    }

    Ok(snapshot)
}
