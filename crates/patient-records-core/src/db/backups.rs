//! Backup snapshot database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};
use crate::models::BackupInfo;

/// A stored snapshot row.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRow {
    pub backup_id: String,
    pub created_at: String,
    pub patient_count: u32,
    /// Hex SHA-256 of `snapshot`
    pub checksum: String,
    /// JSON payload
    pub snapshot: String,
}

impl BackupRow {
    pub fn info(&self) -> BackupInfo {
        BackupInfo {
            backup_id: self.backup_id.clone(),
            created_at: self.created_at.clone(),
            patient_count: self.patient_count,
        }
    }
}

impl Database {
    /// Store a new snapshot.
    pub fn insert_backup(&self, backup: &BackupRow) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO backups (backup_id, created_at, patient_count, checksum, snapshot)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                backup.backup_id,
                backup.created_at,
                backup.patient_count,
                backup.checksum,
                backup.snapshot,
            ],
        )?;
        Ok(())
    }

    /// Get a snapshot by ID.
    pub fn get_backup(&self, backup_id: &str) -> DbResult<Option<BackupRow>> {
        self.conn
            .query_row(
                r#"
                SELECT backup_id, created_at, patient_count, checksum, snapshot
                FROM backups
                WHERE backup_id = ?
                "#,
                [backup_id],
                |row| {
                    Ok(BackupRow {
                        backup_id: row.get(0)?,
                        created_at: row.get(1)?,
                        patient_count: row.get(2)?,
                        checksum: row.get(3)?,
                        snapshot: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Snapshot descriptors, newest first.
    pub fn list_backups(&self) -> DbResult<Vec<BackupInfo>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT backup_id, created_at, patient_count
            FROM backups
            ORDER BY created_at DESC, rowid DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(BackupInfo {
                backup_id: row.get(0)?,
                created_at: row.get(1)?,
                patient_count: row.get(2)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a snapshot. Returns false if it did not exist.
    pub fn delete_backup(&self, backup_id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM backups WHERE backup_id = ?", [backup_id])?;
        Ok(rows_affected > 0)
    }

    /// Keep only the `keep` newest snapshots. Returns how many were removed.
    pub fn prune_backups(&self, keep: usize) -> DbResult<usize> {
        let removed = self.conn.execute(
            r#"
            DELETE FROM backups WHERE backup_id NOT IN (
                SELECT backup_id FROM backups
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?
            )
            "#,
            [keep as i64],
        )?;
        Ok(removed)
    }
}
