//! SQLite schema definition.

/// Complete database schema for patient records.
///
/// Every statement is `IF NOT EXISTS`, so applying it to an existing database
/// creates whatever is missing and leaves existing data alone.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Patients (primary map: id -> full record)
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    record TEXT NOT NULL,                         -- JSON Patient incl. visits
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- ============================================================================
-- Patient Index (denormalized projection for listing/search)
-- ============================================================================

CREATE TABLE IF NOT EXISTS patient_index (
    id TEXT PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    full_name TEXT NOT NULL,
    date_of_birth TEXT,
    age INTEGER,
    gender TEXT NOT NULL DEFAULT '',
    place_of_residence TEXT,
    visit_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patient_index_name ON patient_index(last_name, first_name);

-- ============================================================================
-- Backups (self-contained snapshots of the primary map)
-- ============================================================================

CREATE TABLE IF NOT EXISTS backups (
    backup_id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    patient_count INTEGER NOT NULL,
    checksum TEXT NOT NULL,                       -- hex SHA-256 of snapshot
    snapshot TEXT NOT NULL                        -- JSON {version, createdAt, patients}
);

CREATE INDEX IF NOT EXISTS idx_backups_created ON backups(created_at);
"#;

/// Tables the storage engine needs before it can serve requests.
pub const REQUIRED_TABLES: &[&str] = &["patients", "patient_index", "backups"];
