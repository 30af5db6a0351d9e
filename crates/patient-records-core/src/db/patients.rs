//! Patient database operations.
//!
//! Every mutating method writes `patients` and `patient_index` inside a
//! single transaction and returns the index rows it wrote, so the caller can
//! mirror them in memory after the commit.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{Patient, PatientSummary};

const INDEX_COLUMNS: &str = "id, first_name, last_name, full_name, date_of_birth, age, \
     gender, place_of_residence, visit_count, created_at, updated_at";

impl Database {
    /// Insert or replace a patient and its index row.
    pub fn upsert_patient(&mut self, patient: &Patient) -> DbResult<PatientSummary> {
        let tx = self.conn.transaction()?;
        let summary = write_patient(&tx, patient)?;
        tx.commit()?;
        Ok(summary)
    }

    /// Insert a patient whose ID must not exist yet.
    pub fn insert_new_patient(&mut self, patient: &Patient) -> DbResult<PatientSummary> {
        let tx = self.conn.transaction()?;
        if patient_exists(&tx, &patient.id)? {
            return Err(DbError::Constraint(format!(
                "patient id already exists: {}",
                patient.id
            )));
        }
        let summary = write_patient(&tx, patient)?;
        tx.commit()?;
        Ok(summary)
    }

    /// Get a patient by ID. The age is recomputed on load.
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        let record: Option<String> = self
            .conn
            .query_row("SELECT record FROM patients WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .optional()?;

        record
            .map(|json| Patient::from_json(&json))
            .transpose()
            .map_err(Into::into)
    }

    #[cfg(test)]
    pub fn patient_exists(&self, id: &str) -> DbResult<bool> {
        patient_exists(&self.conn, id)
    }

    /// Delete a patient and its index row. Returns false if nothing existed.
    pub fn delete_patient(&mut self, id: &str) -> DbResult<bool> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM patients WHERE id = ?", [id])?;
        tx.execute("DELETE FROM patient_index WHERE id = ?", [id])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// All full records, ordered by ID.
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let mut stmt = self
            .conn
            .prepare("SELECT record FROM patients ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut patients = Vec::new();
        for json in rows {
            patients.push(Patient::from_json(&json?)?);
        }
        Ok(patients)
    }

    /// IDs present in the primary map, ordered.
    pub fn list_patient_ids(&self) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM patients ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All stored index rows, ordered by ID, with ages recomputed.
    pub fn list_index_rows(&self) -> DbResult<Vec<PatientSummary>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM patient_index ORDER BY id",
            INDEX_COLUMNS
        ))?;
        let rows = stmt.query_map([], summary_from_row)?;

        let mut summaries = Vec::new();
        for row in rows {
            let mut summary = row?;
            summary.refresh_age();
            summaries.push(summary);
        }
        Ok(summaries)
    }

    #[cfg(test)]
    pub fn count_patients(&self) -> DbResult<usize> {
        count(&self.conn, "patients")
    }

    #[cfg(test)]
    pub fn count_index_rows(&self) -> DbResult<usize> {
        count(&self.conn, "patient_index")
    }

    /// Replace the whole primary map and index with `patients`.
    ///
    /// Runs in one transaction: on any error nothing changes.
    pub fn replace_all_patients(&mut self, patients: &[Patient]) -> DbResult<Vec<PatientSummary>> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM patients", [])?;
        tx.execute("DELETE FROM patient_index", [])?;

        let mut summaries = Vec::with_capacity(patients.len());
        for patient in patients {
            if patient_exists(&tx, &patient.id)? {
                return Err(DbError::Constraint(format!(
                    "duplicate patient id: {}",
                    patient.id
                )));
            }
            summaries.push(write_patient(&tx, patient)?);
        }

        tx.commit()?;
        Ok(summaries)
    }

    /// Regenerate every index row from the primary map.
    pub fn rebuild_index(&mut self) -> DbResult<Vec<PatientSummary>> {
        let patients = self.list_patients()?;

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM patient_index", [])?;
        let mut summaries = Vec::with_capacity(patients.len());
        for patient in &patients {
            let summary = patient.summary();
            write_index_row(&tx, &summary)?;
            summaries.push(summary);
        }
        tx.commit()?;
        Ok(summaries)
    }

    /// Wipe the primary map and the index. Returns the number of patients removed.
    pub fn clear_patients(&mut self) -> DbResult<usize> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM patients", [])?;
        tx.execute("DELETE FROM patient_index", [])?;
        tx.commit()?;
        Ok(removed)
    }
}

fn patient_exists(conn: &Connection, id: &str) -> DbResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM patients WHERE id = ?",
        [id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
fn count(conn: &Connection, table: &str) -> DbResult<usize> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

fn write_patient(conn: &Connection, patient: &Patient) -> DbResult<PatientSummary> {
    let record = patient.to_json()?;
    conn.execute(
        r#"
        INSERT INTO patients (id, record, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(id) DO UPDATE SET
            record = excluded.record,
            updated_at = excluded.updated_at
        "#,
        params![patient.id, record, patient.created_at, patient.updated_at],
    )?;

    let summary = patient.summary();
    write_index_row(conn, &summary)?;
    Ok(summary)
}

fn write_index_row(conn: &Connection, summary: &PatientSummary) -> DbResult<()> {
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO patient_index ({}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            INDEX_COLUMNS
        ),
        params![
            summary.id,
            summary.first_name,
            summary.last_name,
            summary.full_name,
            summary.date_of_birth,
            summary.age,
            summary.gender,
            summary.place_of_residence,
            summary.visit_count,
            summary.created_at,
            summary.updated_at,
        ],
    )?;
    Ok(())
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<PatientSummary> {
    Ok(PatientSummary {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        full_name: row.get(3)?,
        date_of_birth: row.get(4)?,
        age: row.get(5)?,
        gender: row.get(6)?,
        place_of_residence: row.get(7)?,
        visit_count: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
