//! Field-keyed input records coming from the UI layer.
//!
//! Every field is optional so the same type serves as both a create payload
//! and an update patch: `None` leaves the current value alone, `Some("")`
//! clears an optional field.

use serde::{Deserialize, Serialize};

/// Patient form data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientInput {
    /// Caller-supplied ID (create only; ignored on update)
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// `YYYY-MM-DD`
    pub date_of_birth: Option<String>,
    pub place_of_residence: Option<String>,
    pub gender: Option<String>,
}

impl PatientInput {
    /// Convenience constructor for the two always-required names.
    pub fn named(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: Some(first_name.into()),
            last_name: Some(last_name.into()),
            ..Self::default()
        }
    }

    pub fn with_date_of_birth(mut self, date: impl Into<String>) -> Self {
        self.date_of_birth = Some(date.into());
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn with_place_of_residence(mut self, place: impl Into<String>) -> Self {
        self.place_of_residence = Some(place.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Visit form data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct VisitInput {
    /// Ignored: a visit keeps the ID it was created with
    pub id: Option<String>,
    pub visit_date: Option<String>,
    pub medications: Option<String>,
    pub observations: Option<String>,
    pub additional_comments: Option<String>,
}

impl VisitInput {
    pub fn on(date: impl Into<String>) -> Self {
        Self {
            visit_date: Some(date.into()),
            ..Self::default()
        }
    }

    pub fn with_medications(mut self, text: impl Into<String>) -> Self {
        self.medications = Some(text.into());
        self
    }

    pub fn with_observations(mut self, text: impl Into<String>) -> Self {
        self.observations = Some(text.into());
        self
    }

    pub fn with_additional_comments(mut self, text: impl Into<String>) -> Self {
        self.additional_comments = Some(text.into());
        self
    }
}
