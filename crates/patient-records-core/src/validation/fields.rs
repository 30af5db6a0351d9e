//! Single-field validators.
//!
//! Each validator returns every problem it finds with its input; an empty
//! vector means the value is acceptable. None of them panic or mutate.

use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{parse_date, Gender};
use crate::sanitize::decode_markup;

pub const NAME_MIN_LENGTH: usize = 2;
pub const NAME_MAX_LENGTH: usize = 50;
pub const RESIDENCE_MIN_LENGTH: usize = 2;
pub const RESIDENCE_MAX_LENGTH: usize = 100;
pub const MEDICATIONS_MAX_LENGTH: usize = 1000;
pub const OBSERVATIONS_MAX_LENGTH: usize = 2000;
pub const COMMENTS_MAX_LENGTH: usize = 1000;
/// Oldest accepted birth date, in years before today
pub const MAX_AGE_YEARS: u32 = 150;
/// How far ahead a visit may be scheduled
pub const VISIT_FUTURE_DAYS: i64 = 7;

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldErrorKind {
    Required,
    TooShort,
    TooLong,
    InvalidCharacters,
    InvalidDate,
    FutureDate,
    TooFarInPast,
    InvalidOption,
}

impl FieldErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            FieldErrorKind::Required => "required",
            FieldErrorKind::TooShort => "too-short",
            FieldErrorKind::TooLong => "too-long",
            FieldErrorKind::InvalidCharacters => "invalid-characters",
            FieldErrorKind::InvalidDate => "invalid-date",
            FieldErrorKind::FutureDate => "future-date",
            FieldErrorKind::TooFarInPast => "too-far-in-past",
            FieldErrorKind::InvalidOption => "invalid-option",
        }
    }
}

/// One problem with one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Length as typed. Escaped entities count as the one character they stand for.
fn char_len(value: &str) -> usize {
    decode_markup(value).chars().count()
}

fn is_name_char(c: char) -> bool {
    c.is_alphabetic() || c == ' ' || c == '-' || c == '\'' || c == '\u{2019}'
}

/// First or last name: required, 2–50 chars, letters/spaces/hyphens/apostrophes.
pub fn validate_name(value: &str, label: &str) -> Vec<FieldError> {
    let value = value.trim();
    if value.is_empty() {
        return vec![FieldError::new(
            FieldErrorKind::Required,
            format!("{} is required", label),
        )];
    }

    let mut errors = Vec::new();
    let len = char_len(value);
    if len < NAME_MIN_LENGTH {
        errors.push(FieldError::new(
            FieldErrorKind::TooShort,
            format!("{} must be at least {} characters", label, NAME_MIN_LENGTH),
        ));
    }
    if len > NAME_MAX_LENGTH {
        errors.push(FieldError::new(
            FieldErrorKind::TooLong,
            format!("{} must be at most {} characters", label, NAME_MAX_LENGTH),
        ));
    }
    if !value.chars().all(is_name_char) {
        errors.push(FieldError::new(
            FieldErrorKind::InvalidCharacters,
            format!(
                "{} may only contain letters, spaces, hyphens and apostrophes",
                label
            ),
        ));
    }
    errors
}

/// Optional birth date: parseable, not in the future, not older than 150 years.
pub fn validate_date_of_birth(value: Option<&str>, today: NaiveDate) -> Vec<FieldError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Vec::new();
    };

    let Some(date) = parse_date(raw) else {
        return vec![FieldError::new(
            FieldErrorKind::InvalidDate,
            "Date of birth is not a valid date",
        )];
    };

    let mut errors = Vec::new();
    if date > today {
        errors.push(FieldError::new(
            FieldErrorKind::FutureDate,
            "Date of birth cannot be in the future",
        ));
    }
    let oldest = today
        .checked_sub_months(Months::new(MAX_AGE_YEARS * 12))
        .unwrap_or(NaiveDate::MIN);
    if date < oldest {
        errors.push(FieldError::new(
            FieldErrorKind::TooFarInPast,
            format!(
                "Date of birth cannot be more than {} years ago",
                MAX_AGE_YEARS
            ),
        ));
    }
    errors
}

/// Optional place of residence: 2–100 chars when present.
pub fn validate_place_of_residence(value: Option<&str>) -> Vec<FieldError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Vec::new();
    };

    let len = char_len(value);
    if len < RESIDENCE_MIN_LENGTH {
        vec![FieldError::new(
            FieldErrorKind::TooShort,
            format!(
                "Place of residence must be at least {} characters",
                RESIDENCE_MIN_LENGTH
            ),
        )]
    } else if len > RESIDENCE_MAX_LENGTH {
        vec![FieldError::new(
            FieldErrorKind::TooLong,
            format!(
                "Place of residence must be at most {} characters",
                RESIDENCE_MAX_LENGTH
            ),
        )]
    } else {
        Vec::new()
    }
}

/// Required gender, compared case-insensitively.
pub fn validate_gender(value: &str) -> Vec<FieldError> {
    if value.trim().is_empty() {
        return vec![FieldError::new(FieldErrorKind::Required, "Gender is required")];
    }
    if Gender::parse(value).is_some() {
        return Vec::new();
    }

    let allowed: Vec<&str> = Gender::ALL.iter().map(Gender::as_str).collect();
    vec![FieldError::new(
        FieldErrorKind::InvalidOption,
        format!("Gender must be one of: {}", allowed.join(", ")),
    )]
}

/// Required visit date, at most 7 days ahead of `today`.
pub fn validate_visit_date(value: &str, today: NaiveDate) -> Vec<FieldError> {
    let value = value.trim();
    if value.is_empty() {
        return vec![FieldError::new(
            FieldErrorKind::Required,
            "Visit date is required",
        )];
    }

    match parse_date(value) {
        None => vec![FieldError::new(
            FieldErrorKind::InvalidDate,
            "Visit date is not a valid date",
        )],
        Some(date) if date > today + Duration::days(VISIT_FUTURE_DAYS) => {
            vec![FieldError::new(
                FieldErrorKind::FutureDate,
                format!(
                    "Visit date cannot be more than {} days in the future",
                    VISIT_FUTURE_DAYS
                ),
            )]
        }
        Some(_) => Vec::new(),
    }
}

/// Optional free text with an upper bound on length.
pub fn validate_max_length(value: &str, label: &str, max: usize) -> Vec<FieldError> {
    if char_len(value) > max {
        vec![FieldError::new(
            FieldErrorKind::TooLong,
            format!("{} must be at most {} characters", label, max),
        )]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn kinds(errors: &[FieldError]) -> Vec<FieldErrorKind> {
        errors.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_name_required_beats_length() {
        assert_eq!(kinds(&validate_name("", "First name")), vec![FieldErrorKind::Required]);
        assert_eq!(kinds(&validate_name("   ", "First name")), vec![FieldErrorKind::Required]);
    }

    #[test]
    fn test_name_rules() {
        assert!(validate_name("Jo", "First name").is_empty());
        assert!(validate_name("Jean-Luc O'Neil", "First name").is_empty());
        assert!(validate_name("Hélène", "First name").is_empty());
        assert_eq!(kinds(&validate_name("J", "First name")), vec![FieldErrorKind::TooShort]);
        assert_eq!(
            kinds(&validate_name(&"a".repeat(51), "First name")),
            vec![FieldErrorKind::TooLong]
        );
        assert_eq!(
            kinds(&validate_name("R2D2", "First name")),
            vec![FieldErrorKind::InvalidCharacters]
        );
        assert_eq!(
            kinds(&validate_name("&", "Last name")),
            vec![FieldErrorKind::TooShort, FieldErrorKind::InvalidCharacters]
        );
    }

    #[test]
    fn test_birth_date_optional() {
        assert!(validate_date_of_birth(None, today()).is_empty());
        assert!(validate_date_of_birth(Some(""), today()).is_empty());
        assert!(validate_date_of_birth(Some("1990-01-01"), today()).is_empty());
        assert!(validate_date_of_birth(Some("2024-06-01"), today()).is_empty());
    }

    #[test]
    fn test_birth_date_bounds() {
        assert_eq!(
            kinds(&validate_date_of_birth(Some("2099-01-01"), today())),
            vec![FieldErrorKind::FutureDate]
        );
        assert_eq!(
            kinds(&validate_date_of_birth(Some("1874-05-31"), today())),
            vec![FieldErrorKind::TooFarInPast]
        );
        assert!(validate_date_of_birth(Some("1874-06-01"), today()).is_empty());
        assert_eq!(
            kinds(&validate_date_of_birth(Some("yesterday"), today())),
            vec![FieldErrorKind::InvalidDate]
        );
    }

    #[test]
    fn test_residence() {
        assert!(validate_place_of_residence(None).is_empty());
        assert!(validate_place_of_residence(Some("  ")).is_empty());
        assert!(validate_place_of_residence(Some("Oujda")).is_empty());
        assert_eq!(
            kinds(&validate_place_of_residence(Some("X"))),
            vec![FieldErrorKind::TooShort]
        );
        assert_eq!(
            kinds(&validate_place_of_residence(Some(&"x".repeat(101)))),
            vec![FieldErrorKind::TooLong]
        );
    }

    #[test]
    fn test_gender() {
        assert!(validate_gender("male").is_empty());
        assert!(validate_gender("FEMALE").is_empty());
        assert_eq!(kinds(&validate_gender("")), vec![FieldErrorKind::Required]);
        let errors = validate_gender("invalid");
        assert_eq!(kinds(&errors), vec![FieldErrorKind::InvalidOption]);
        assert_eq!(errors[0].message, "Gender must be one of: male, female, other");
    }

    #[test]
    fn test_visit_date() {
        assert!(validate_visit_date("2024-01-15", today()).is_empty());
        assert!(validate_visit_date("2024-06-08", today()).is_empty());
        assert_eq!(
            kinds(&validate_visit_date("2024-06-09", today())),
            vec![FieldErrorKind::FutureDate]
        );
        assert_eq!(kinds(&validate_visit_date("", today())), vec![FieldErrorKind::Required]);
        assert_eq!(
            kinds(&validate_visit_date("13/13/2024", today())),
            vec![FieldErrorKind::InvalidDate]
        );
    }

    #[test]
    fn test_max_length() {
        assert!(validate_max_length("", "Medications", 1000).is_empty());
        assert!(validate_max_length(&"é".repeat(1000), "Medications", 1000).is_empty());
        assert_eq!(
            kinds(&validate_max_length(&"x".repeat(1001), "Medications", 1000)),
            vec![FieldErrorKind::TooLong]
        );
    }

    #[test]
    fn test_max_length_counts_escaped_text_as_typed() {
        let typed = format!("{}{}", "<&".repeat(50), "x".repeat(900));
        let stored = crate::sanitize::escape_markup(&typed);
        assert!(stored.chars().count() > 1000);
        assert!(validate_max_length(&stored, "Medications", 1000).is_empty());

        let over = crate::sanitize::escape_markup(&format!("{}<", typed));
        assert_eq!(
            kinds(&validate_max_length(&over, "Medications", 1000)),
            vec![FieldErrorKind::TooLong]
        );

        let residence = crate::sanitize::escape_markup(&format!("{}&", "x".repeat(99)));
        assert!(validate_place_of_residence(Some(&residence)).is_empty());
    }
}
