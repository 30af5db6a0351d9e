//! Visit sub-records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::dates::{now_timestamp, parse_date};
use super::input::VisitInput;
use crate::sanitize::escape_markup;

/// A clinical visit note, owned by exactly one patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    /// Unique within the owning patient
    pub id: String,
    /// Date of the visit (`YYYY-MM-DD`)
    pub visit_date: String,
    /// Prescribed medications, free text
    #[serde(default)]
    pub medications: String,
    /// Clinical observations, free text
    #[serde(default)]
    pub observations: String,
    #[serde(default)]
    pub additional_comments: String,
    /// Set once when the visit is appended
    pub created_at: String,
}

impl Visit {
    /// Build a visit from form data, defaulting missing text to empty strings.
    pub fn from_input(input: &VisitInput) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            visit_date: input.visit_date.clone().unwrap_or_default(),
            medications: input.medications.clone().unwrap_or_default(),
            observations: input.observations.clone().unwrap_or_default(),
            additional_comments: input.additional_comments.clone().unwrap_or_default(),
            created_at: now_timestamp(),
        }
    }

    /// Apply the provided fields of `patch`. The ID is never replaced.
    pub fn apply(&mut self, patch: &VisitInput) {
        if let Some(date) = &patch.visit_date {
            self.visit_date = date.clone();
        }
        if let Some(text) = &patch.medications {
            self.medications = text.clone();
        }
        if let Some(text) = &patch.observations {
            self.observations = text.clone();
        }
        if let Some(text) = &patch.additional_comments {
            self.additional_comments = text.clone();
        }
    }

    /// Parsed visit date, `None` when the stored text is not a date.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_date(&self.visit_date)
    }

    pub(crate) fn sanitize(&mut self) {
        self.medications = escape_markup(&self.medications);
        self.observations = escape_markup(&self.observations);
        self.additional_comments = escape_markup(&self.additional_comments);
    }
}
