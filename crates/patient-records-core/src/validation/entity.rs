//! Whole-entity validation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::fields::*;
use crate::models::{today, Patient, Visit};

/// Errors for one entity, keyed by field name.
pub type FieldErrors = BTreeMap<String, Vec<FieldError>>;

/// Structured error set for a patient and its visits.
///
/// Ordered maps keep the output deterministic for identical input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    /// Patient-level errors keyed by field name (`firstName`, `gender`, ...)
    pub fields: FieldErrors,
    /// Visit errors keyed by the visit's position in `Patient::visits`
    pub visits: BTreeMap<usize, FieldErrors>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.visits.is_empty()
    }

    /// Total number of individual problems.
    pub fn error_count(&self) -> usize {
        let field_count: usize = self.fields.values().map(Vec::len).sum();
        let visit_count: usize = self
            .visits
            .values()
            .flat_map(|f| f.values())
            .map(Vec::len)
            .sum();
        field_count + visit_count
    }

    pub fn field(&self, name: &str) -> &[FieldError] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn visit_field(&self, index: usize, name: &str) -> &[FieldError] {
        self.visits
            .get(&index)
            .and_then(|f| f.get(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn insert(map: &mut FieldErrors, field: &str, errors: Vec<FieldError>) {
        if !errors.is_empty() {
            map.insert(field.to_string(), errors);
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (field, errors) in &self.fields {
            for error in errors {
                parts.push(format!("{}: {}", field, error));
            }
        }
        for (index, fields) in &self.visits {
            for (field, errors) in fields {
                for error in errors {
                    parts.push(format!("visits[{}].{}: {}", index, field, error));
                }
            }
        }
        f.write_str(&parts.join("; "))
    }
}

/// Outcome of a validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: ValidationErrors,
}

impl From<ValidationErrors> for ValidationResult {
    fn from(errors: ValidationErrors) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validate a patient and all of its visits as of today.
pub fn validate_patient(patient: &Patient) -> ValidationResult {
    validate_patient_on(patient, today())
}

/// Validate a patient and all of its visits against a fixed `today`.
///
/// Every field and every visit is checked; nothing short-circuits.
pub fn validate_patient_on(patient: &Patient, today: NaiveDate) -> ValidationResult {
    let mut errors = ValidationErrors::default();

    ValidationErrors::insert(
        &mut errors.fields,
        "firstName",
        validate_name(&patient.first_name, "First name"),
    );
    ValidationErrors::insert(
        &mut errors.fields,
        "lastName",
        validate_name(&patient.last_name, "Last name"),
    );
    ValidationErrors::insert(
        &mut errors.fields,
        "dateOfBirth",
        validate_date_of_birth(patient.date_of_birth.as_deref(), today),
    );
    ValidationErrors::insert(
        &mut errors.fields,
        "placeOfResidence",
        validate_place_of_residence(patient.place_of_residence.as_deref()),
    );
    ValidationErrors::insert(&mut errors.fields, "gender", validate_gender(&patient.gender));

    for (index, visit) in patient.visits.iter().enumerate() {
        let visit_errors = validate_visit_fields(visit, today);
        if !visit_errors.is_empty() {
            errors.visits.insert(index, visit_errors);
        }
    }

    errors.into()
}

/// Validate a single visit as of today. Errors land in `fields`.
pub fn validate_visit(visit: &Visit) -> ValidationResult {
    ValidationErrors {
        fields: validate_visit_fields(visit, today()),
        visits: BTreeMap::new(),
    }
    .into()
}

/// Per-field errors for one visit.
pub fn validate_visit_fields(visit: &Visit, today: NaiveDate) -> FieldErrors {
    let mut errors = FieldErrors::new();
    ValidationErrors::insert(
        &mut errors,
        "visitDate",
        validate_visit_date(&visit.visit_date, today),
    );
    ValidationErrors::insert(
        &mut errors,
        "medications",
        validate_max_length(&visit.medications, "Medications", MEDICATIONS_MAX_LENGTH),
    );
    ValidationErrors::insert(
        &mut errors,
        "observations",
        validate_max_length(&visit.observations, "Observations", OBSERVATIONS_MAX_LENGTH),
    );
    ValidationErrors::insert(
        &mut errors,
        "additionalComments",
        validate_max_length(
            &visit.additional_comments,
            "Additional comments",
            COMMENTS_MAX_LENGTH,
        ),
    );
    errors
}
