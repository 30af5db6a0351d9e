//! Patient entity.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::dates::{age_on, now_timestamp, parse_date, today};
use super::input::{PatientInput, VisitInput};
use super::summary::PatientSummary;
use super::visit::Visit;
use crate::sanitize::{decode_markup, escape_markup};

/// Recognised gender values. Stored lower-cased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Male, Gender::Female, Gender::Other];

    /// Case-insensitive parse.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A patient record with its visit history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Opaque UUID, immutable once assigned
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    /// `YYYY-MM-DD`, absent when unknown
    #[serde(default)]
    pub date_of_birth: Option<String>,
    /// Derived from `date_of_birth`; never trusted from storage
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub place_of_residence: Option<String>,
    /// One of `male`, `female`, `other` once validated
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub visits: Vec<Visit>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Patient {
    /// Create a new patient with required fields.
    pub fn new(first_name: String, last_name: String) -> Self {
        let now = now_timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            first_name,
            last_name,
            date_of_birth: None,
            age: None,
            place_of_residence: None,
            gender: String::new(),
            visits: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Build a fresh entity from form data, applying defaults.
    ///
    /// A non-blank caller-supplied ID is kept; otherwise a UUID is generated.
    pub fn from_input(input: &PatientInput) -> Self {
        let mut patient = Self::new(
            input.first_name.clone().unwrap_or_default(),
            input.last_name.clone().unwrap_or_default(),
        );
        if let Some(id) = input.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            patient.id = id.to_string();
        }
        patient.date_of_birth = non_blank(input.date_of_birth.as_deref());
        patient.place_of_residence = non_blank(input.place_of_residence.as_deref());
        patient.gender = input.gender.clone().unwrap_or_default();
        patient.refresh_age();
        patient
    }

    /// Merge the provided fields of `patch` into this record.
    ///
    /// The ID and `created_at` are preserved. Returns true if any field changed.
    pub fn apply_input(&mut self, patch: &PatientInput) -> bool {
        let before = self.clone();

        if let Some(first) = &patch.first_name {
            self.first_name = first.clone();
        }
        if let Some(last) = &patch.last_name {
            self.last_name = last.clone();
        }
        if let Some(dob) = &patch.date_of_birth {
            self.date_of_birth = non_blank(Some(dob));
        }
        if let Some(place) = &patch.place_of_residence {
            self.place_of_residence = non_blank(Some(place));
        }
        if let Some(gender) = &patch.gender {
            self.gender = gender.clone();
        }

        let changed = *self != before;
        if changed {
            self.refresh_age();
            self.touch();
        }
        changed
    }

    /// "First Last", as shown in lists and matched by search.
    pub fn full_name(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }

    /// Recompute `age` from `date_of_birth` as of today.
    pub fn refresh_age(&mut self) {
        self.age = derive_age(self.date_of_birth.as_deref());
    }

    /// Parsed gender, `None` if the stored value is not recognised.
    pub fn gender_kind(&self) -> Option<Gender> {
        Gender::parse(&self.gender)
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = now_timestamp();
    }

    // =========================================================================
    // Visits
    // =========================================================================

    /// Append a visit built from `input` and return a copy of it.
    pub fn add_visit(&mut self, input: &VisitInput) -> Visit {
        let visit = Visit::from_input(input);
        self.visits.push(visit.clone());
        self.touch();
        visit
    }

    /// Patch the visit with `visit_id`. Returns `None` if there is no such visit.
    pub fn update_visit(&mut self, visit_id: &str, patch: &VisitInput) -> Option<Visit> {
        let visit = self.visits.iter_mut().find(|v| v.id == visit_id)?;
        visit.apply(patch);
        let updated = visit.clone();
        self.touch();
        Some(updated)
    }

    /// Remove the visit with `visit_id`. Returns whether anything was removed.
    pub fn remove_visit(&mut self, visit_id: &str) -> bool {
        let before = self.visits.len();
        self.visits.retain(|v| v.id != visit_id);
        let removed = self.visits.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    pub fn find_visit(&self, visit_id: &str) -> Option<&Visit> {
        self.visits.iter().find(|v| v.id == visit_id)
    }

    /// Visits newest first. Equal dates keep insertion order; visits whose
    /// date cannot be parsed go last.
    pub fn visits_sorted_by_date(&self) -> Vec<&Visit> {
        let mut sorted: Vec<&Visit> = self.visits.iter().collect();
        sorted.sort_by(|a, b| b.parsed_date().cmp(&a.parsed_date()));
        sorted
    }

    pub fn latest_visit(&self) -> Option<&Visit> {
        self.visits_sorted_by_date().into_iter().next()
    }

    // =========================================================================
    // Sanitization / search
    // =========================================================================

    /// Escape markup in every free-text field and lower-case the gender.
    pub fn sanitize(&mut self) {
        self.first_name = escape_markup(self.first_name.trim());
        self.last_name = escape_markup(self.last_name.trim());
        self.place_of_residence = self
            .place_of_residence
            .as_deref()
            .map(|p| escape_markup(p.trim()));
        self.gender = self.gender.trim().to_lowercase();
        for visit in &mut self.visits {
            visit.sanitize();
        }
        self.touch();
    }

    /// Case-insensitive substring match on names and residence.
    pub fn matches_search(&self, term: &str) -> bool {
        matches_search_fields(
            term,
            &self.first_name,
            &self.last_name,
            self.place_of_residence.as_deref(),
        )
    }

    /// Lightweight index projection of this record.
    pub fn summary(&self) -> PatientSummary {
        PatientSummary {
            id: self.id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            full_name: self.full_name(),
            date_of_birth: self.date_of_birth.clone(),
            age: self.age,
            gender: self.gender.clone(),
            place_of_residence: self.place_of_residence.clone(),
            visit_count: self.visits.len() as u32,
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a stored record. The age is always recomputed.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let mut patient: Patient = serde_json::from_str(json)?;
        patient.refresh_age();
        Ok(patient)
    }
}

pub(crate) fn full_name(first: &str, last: &str) -> String {
    format!("{} {}", first, last).trim().to_string()
}

pub(crate) fn derive_age(date_of_birth: Option<&str>) -> Option<u32> {
    date_of_birth
        .and_then(parse_date)
        .map(|birth| age_on(birth, today()))
}

/// Search semantics shared by full records and index rows.
///
/// Stored text is escaped, so fields are decoded before matching the term as
/// the user typed it.
pub(crate) fn matches_search_fields(
    term: &str,
    first_name: &str,
    last_name: &str,
    place_of_residence: Option<&str>,
) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }

    let first = decode_markup(first_name).to_lowercase();
    let last = decode_markup(last_name).to_lowercase();
    first.contains(&term)
        || last.contains(&term)
        || full_name(&first, &last).contains(&term)
        || place_of_residence
            .map(|p| decode_markup(p).to_lowercase().contains(&term))
            .unwrap_or(false)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn john() -> Patient {
        Patient::from_input(
            &PatientInput::named("John", "Doe")
                .with_date_of_birth("1990-01-01")
                .with_gender("male")
                .with_place_of_residence("Casablanca"),
        )
    }

    #[test]
    fn test_new_patient() {
        let patient = Patient::new("John".into(), "Doe".into());
        assert_eq!(patient.first_name, "John");
        assert_eq!(patient.id.len(), 36); // UUID format
        assert_eq!(patient.created_at, patient.updated_at);
        assert!(patient.visits.is_empty());
        assert_eq!(patient.age, None);
    }

    #[test]
    fn test_from_input_derives_age() {
        let patient = john();
        let expected = today().year() - 1990;
        let age = patient.age.unwrap() as i32;
        assert!(age == expected || age == expected - 1);
    }

    #[test]
    fn test_from_input_keeps_supplied_id() {
        let patient = Patient::from_input(&PatientInput::named("Ann", "Lee").with_id(" p-1 "));
        assert_eq!(patient.id, "p-1");

        let generated = Patient::from_input(&PatientInput::named("Ann", "Lee").with_id("  "));
        assert_eq!(generated.id.len(), 36);
    }

    #[test]
    fn test_blank_optional_fields_become_none() {
        let patient = Patient::from_input(
            &PatientInput::named("Ann", "Lee")
                .with_date_of_birth(" ")
                .with_place_of_residence(""),
        );
        assert_eq!(patient.date_of_birth, None);
        assert_eq!(patient.place_of_residence, None);
    }

    #[test]
    fn test_apply_input_recomputes_age() {
        let mut patient = john();
        patient.updated_at = "2000-01-01T00:00:00+00:00".into();
        let created = patient.created_at.clone();

        let changed = patient.apply_input(&PatientInput {
            date_of_birth: Some("2000-01-01".into()),
            id: Some("other-id".into()),
            ..PatientInput::default()
        });

        assert!(changed);
        assert_ne!(patient.id, "other-id");
        assert_eq!(patient.created_at, created);
        assert_ne!(patient.updated_at, "2000-01-01T00:00:00+00:00");
        let expected = today().year() - 2000;
        let age = patient.age.unwrap() as i32;
        assert!(age == expected || age == expected - 1);
    }

    #[test]
    fn test_apply_input_noop() {
        let mut patient = john();
        let stamp = patient.updated_at.clone();
        assert!(!patient.apply_input(&PatientInput::default()));
        assert_eq!(patient.updated_at, stamp);
    }

    #[test]
    fn test_clearing_birth_date_clears_age() {
        let mut patient = john();
        patient.apply_input(&PatientInput {
            date_of_birth: Some(String::new()),
            ..PatientInput::default()
        });
        assert_eq!(patient.date_of_birth, None);
        assert_eq!(patient.age, None);
    }

    #[test]
    fn test_latest_visit() {
        let mut patient = john();
        assert!(patient.latest_visit().is_none());
        assert!(patient.visits_sorted_by_date().is_empty());

        let first = patient.add_visit(&VisitInput::on("2024-01-15").with_medications("Aspirin"));
        assert_eq!(patient.latest_visit().unwrap().id, first.id);
        assert_eq!(first.medications, "Aspirin");

        patient.add_visit(&VisitInput::on("2023-06-01"));
        assert_eq!(patient.visits_sorted_by_date()[0].id, first.id);
        assert_eq!(patient.latest_visit().unwrap().id, first.id);
    }

    #[test]
    fn test_sort_is_stable_and_unparsed_last() {
        let mut patient = john();
        let a = patient.add_visit(&VisitInput::on("2024-03-01"));
        let broken = patient.add_visit(&VisitInput::on("garbage"));
        let b = patient.add_visit(&VisitInput::on("2024-03-01"));
        let newest = patient.add_visit(&VisitInput::on("2024-05-01"));

        let order: Vec<&str> = patient
            .visits_sorted_by_date()
            .iter()
            .map(|v| v.id.as_str())
            .collect();
        assert_eq!(order, vec![newest.id.as_str(), a.id.as_str(), b.id.as_str(), broken.id.as_str()]);
    }

    #[test]
    fn test_update_visit() {
        let mut patient = john();
        let visit = patient.add_visit(&VisitInput::on("2024-01-15"));

        let updated = patient
            .update_visit(&visit.id, &VisitInput::default().with_medications("Salbutamol"))
            .unwrap();
        assert_eq!(updated.id, visit.id);
        assert_eq!(updated.medications, "Salbutamol");
        assert_eq!(patient.find_visit(&visit.id).unwrap().medications, "Salbutamol");

        assert!(patient.update_visit("missing", &VisitInput::default()).is_none());
    }

    #[test]
    fn test_remove_visit() {
        let mut patient = john();
        let visit = patient.add_visit(&VisitInput::on("2024-01-15"));

        patient.updated_at = "2000-01-01T00:00:00+00:00".into();
        assert!(!patient.remove_visit("missing"));
        assert_eq!(patient.updated_at, "2000-01-01T00:00:00+00:00");

        assert!(patient.remove_visit(&visit.id));
        assert!(patient.visits.is_empty());
        assert_ne!(patient.updated_at, "2000-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_sanitize() {
        let mut patient = Patient::from_input(
            &PatientInput::named("<script>alert(1)</script>John", "Doe")
                .with_gender(" MALE ")
                .with_place_of_residence("<i>Rabat</i>"),
        );
        patient.add_visit(&VisitInput::on("2024-01-15").with_observations("<img src=x>"));

        patient.sanitize();

        assert!(!patient.first_name.contains('<'));
        assert!(patient.first_name.contains("John"));
        assert_eq!(patient.gender, "male");
        assert_eq!(patient.place_of_residence.as_deref(), Some("&lt;i&gt;Rabat&lt;/i&gt;"));
        assert_eq!(patient.visits[0].observations, "&lt;img src=x&gt;");
    }

    #[test]
    fn test_matches_search() {
        let patient = john();
        assert!(patient.matches_search(""));
        assert!(patient.matches_search("   "));
        assert!(patient.matches_search("joh"));
        assert!(patient.matches_search("DOE"));
        assert!(patient.matches_search("john doe"));
        assert!(patient.matches_search("casa"));
        assert!(!patient.matches_search("smith"));
    }

    #[test]
    fn test_matches_search_on_escaped_text() {
        let mut patient = john();
        patient.place_of_residence = Some("Sidi Bernoussi & Zenata".into());
        patient.sanitize();
        assert_eq!(
            patient.place_of_residence.as_deref(),
            Some("Sidi Bernoussi &amp; Zenata")
        );

        assert!(patient.matches_search("& zenata"));
        assert!(patient.matches_search("Bernoussi & Z"));
        assert!(!patient.matches_search("amp"));
    }

    #[test]
    fn test_json_round_trip_recomputes_age() {
        let mut patient = john();
        patient.add_visit(&VisitInput::on("2024-01-15").with_medications("Aspirin"));

        let mut stale = serde_json::to_value(&patient).unwrap();
        stale["age"] = serde_json::json!(999);
        let restored = Patient::from_json(&stale.to_string()).unwrap();

        assert_eq!(restored, patient);
        assert_eq!(restored.age, patient.age);

        let again = Patient::from_json(&patient.to_json().unwrap()).unwrap();
        assert_eq!(again, patient);
    }

    #[test]
    fn test_json_uses_camel_case() {
        let json = john().to_json().unwrap();
        assert!(json.contains("\"firstName\""));
        assert!(json.contains("\"dateOfBirth\""));
        assert!(json.contains("\"placeOfResidence\""));
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!(Gender::parse("Female"), Some(Gender::Female));
        assert_eq!(Gender::parse(" OTHER "), Some(Gender::Other));
        assert_eq!(Gender::parse("invalid"), None);
        assert_eq!(Gender::Male.to_string(), "male");
    }
}
