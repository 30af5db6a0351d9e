//! In-memory mirror of the `patient_index` table.

use std::collections::BTreeMap;

use crate::models::{Gender, PatientStatistics, PatientSummary};

/// Filters for an index scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    /// Name/residence substring; `None` or blank matches everyone
    pub term: Option<String>,
    /// Restrict to one gender
    pub gender: Option<Gender>,
}

impl SearchCriteria {
    pub fn term(term: impl Into<String>) -> Self {
        Self {
            term: Some(term.into()),
            gender: None,
        }
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    fn matches(&self, row: &PatientSummary) -> bool {
        let term_ok = self
            .term
            .as_deref()
            .map(|t| row.matches_search(t))
            .unwrap_or(true);
        let gender_ok = self
            .gender
            .map(|g| row.gender_kind() == Some(g))
            .unwrap_or(true);
        term_ok && gender_ok
    }
}

/// Index rows keyed by patient ID.
///
/// Only the storage engine holds one, and it is updated after every
/// committed write.
#[derive(Debug, Default)]
pub(crate) struct PatientIndex {
    rows: BTreeMap<String, PatientSummary>,
}

impl PatientIndex {
    pub fn from_rows(rows: impl IntoIterator<Item = PatientSummary>) -> Self {
        Self {
            rows: rows.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn upsert(&mut self, row: PatientSummary) {
        self.rows.insert(row.id.clone(), row);
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.rows.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.rows.keys()
    }

    /// Matching rows in display order (last name, first name).
    ///
    /// Ages are recomputed on the way out; stored rows keep the age from
    /// their last write, which goes stale in a long-running process.
    pub fn search(&self, criteria: &SearchCriteria) -> Vec<PatientSummary> {
        let mut hits: Vec<PatientSummary> = self
            .rows
            .values()
            .filter(|row| criteria.matches(row))
            .cloned()
            .map(|mut row| {
                row.refresh_age();
                row
            })
            .collect();
        sort_for_display(&mut hits);
        hits
    }

    pub fn all(&self) -> Vec<PatientSummary> {
        self.search(&SearchCriteria::default())
    }

    pub fn statistics(&self) -> PatientStatistics {
        PatientStatistics::from_summaries(&self.all())
    }
}

fn sort_for_display(rows: &mut [PatientSummary]) {
    rows.sort_by(|a, b| {
        a.last_name
            .to_lowercase()
            .cmp(&b.last_name.to_lowercase())
            .then_with(|| a.first_name.to_lowercase().cmp(&b.first_name.to_lowercase()))
            .then_with(|| a.id.cmp(&b.id))
    });
}
