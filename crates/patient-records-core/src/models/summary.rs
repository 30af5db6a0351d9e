//! Index rows, statistics and backup descriptors.

use serde::{Deserialize, Serialize};

use super::patient::{derive_age, matches_search_fields, Gender};

/// Lightweight projection of a patient used for listing and search.
///
/// Deliberately a separate type from [`super::Patient`]: it carries no visits
/// and cannot be saved back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    /// "First Last"
    pub full_name: String,
    pub date_of_birth: Option<String>,
    pub age: Option<u32>,
    pub gender: String,
    pub place_of_residence: Option<String>,
    /// Number of visits on the full record
    pub visit_count: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl PatientSummary {
    pub fn matches_search(&self, term: &str) -> bool {
        matches_search_fields(
            term,
            &self.first_name,
            &self.last_name,
            self.place_of_residence.as_deref(),
        )
    }

    pub fn refresh_age(&mut self) {
        self.age = derive_age(self.date_of_birth.as_deref());
    }

    pub fn gender_kind(&self) -> Option<Gender> {
        Gender::parse(&self.gender)
    }
}

/// Per-gender patient counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenderDistribution {
    pub male: u32,
    pub female: u32,
    pub other: u32,
}

impl GenderDistribution {
    pub fn count(&self, gender: Gender) -> u32 {
        match gender {
            Gender::Male => self.male,
            Gender::Female => self.female,
            Gender::Other => self.other,
        }
    }
}

/// Aggregate figures derived from the index.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientStatistics {
    pub total_patients: u32,
    pub gender_distribution: GenderDistribution,
    /// Mean age over patients with a known birth date
    pub average_age: Option<f64>,
    pub total_visits: u32,
    pub patients_with_visits: u32,
}

impl PatientStatistics {
    pub fn from_summaries<'a>(rows: impl IntoIterator<Item = &'a PatientSummary>) -> Self {
        let mut stats = PatientStatistics::default();
        let mut age_sum = 0u64;
        let mut aged = 0u64;

        for row in rows {
            stats.total_patients += 1;
            match row.gender_kind() {
                Some(Gender::Male) => stats.gender_distribution.male += 1,
                Some(Gender::Female) => stats.gender_distribution.female += 1,
                Some(Gender::Other) => stats.gender_distribution.other += 1,
                None => {}
            }
            if let Some(age) = row.age {
                age_sum += u64::from(age);
                aged += 1;
            }
            stats.total_visits += row.visit_count;
            if row.visit_count > 0 {
                stats.patients_with_visits += 1;
            }
        }

        if aged > 0 {
            stats.average_age = Some(age_sum as f64 / aged as f64);
        }
        stats
    }
}

/// Descriptor of a stored backup snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub backup_id: String,
    pub created_at: String,
    pub patient_count: u32,
}
