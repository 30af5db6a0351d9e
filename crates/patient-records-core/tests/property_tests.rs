//! Property-based tests for validation, sanitization and index consistency.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use proptest::prelude::*;

use patient_records_core::models::{Patient, PatientInput, VisitInput};
use patient_records_core::sanitize::escape_markup;
use patient_records_core::store::PatientStore;
use patient_records_core::validation::validate_patient_on;

fn fixed_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn gender() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("male"), Just("female"), Just("other")]
}

fn birth_date() -> impl Strategy<Value = String> {
    (1900i32..2024, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| format!("{:04}-{:02}-{:02}", y, m, d))
}

prop_compose! {
    fn valid_input()(
        first in "[A-Z][a-z]{1,20}",
        last in "[A-Z][a-z]{1,20}( [A-Z][a-z]{1,10})?",
        dob in birth_date(),
        sex in gender(),
        place in proptest::option::of("[A-Z][a-z]{2,30}"),
    ) -> PatientInput {
        let mut input = PatientInput::named(first, last)
            .with_date_of_birth(dob)
            .with_gender(sex);
        input.place_of_residence = place;
        input
    }
}

#[derive(Debug, Clone)]
enum Op {
    Save(usize),
    AddVisit(usize),
    Delete(usize),
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..6).prop_map(Op::Save),
        2 => (0usize..6).prop_map(Op::AddVisit),
        2 => (0usize..6).prop_map(Op::Delete),
        1 => Just(Op::Clear),
    ]
}

proptest! {
    #[test]
    fn prop_well_formed_patients_validate(input in valid_input()) {
        let mut patient = Patient::from_input(&input);
        patient.sanitize();
        let result = validate_patient_on(&patient, fixed_today());
        prop_assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn prop_validation_is_deterministic(
        first in ".{0,60}",
        last in ".{0,60}",
        dob in proptest::option::of(".{0,12}"),
        gender in ".{0,8}",
    ) {
        let mut input = PatientInput::named(first, last).with_gender(gender);
        input.date_of_birth = dob;
        let patient = Patient::from_input(&input);

        let first_run = validate_patient_on(&patient, fixed_today());
        let second_run = validate_patient_on(&patient, fixed_today());
        prop_assert_eq!(first_run.is_valid, first_run.errors.is_empty());
        prop_assert_eq!(first_run, second_run);
    }

    #[test]
    fn prop_escaping_is_idempotent(text in ".{0,80}") {
        let once = escape_markup(&text);
        prop_assert!(!once.contains('<') && !once.contains('>'));
        prop_assert_eq!(escape_markup(&once), once);
    }

    #[test]
    fn prop_json_round_trip(input in valid_input(), visit_dates in proptest::collection::vec(birth_date(), 0..4)) {
        let mut patient = Patient::from_input(&input);
        for date in &visit_dates {
            patient.add_visit(&VisitInput::on(date.clone()).with_observations("Routine check"));
        }

        let json = patient.to_json().unwrap();
        let parsed = Patient::from_json(&json).unwrap();
        prop_assert_eq!(parsed, patient);
    }

    #[test]
    fn prop_index_tracks_primary_map(ops in proptest::collection::vec(op(), 1..30)) {
        let mut store = PatientStore::open_in_memory().unwrap();
        store.initialize_storage().unwrap();

        let pool: Vec<Patient> = (0..6)
            .map(|i| {
                Patient::from_input(
                    &PatientInput::named(format!("Name{}", i), "Doe")
                        .with_gender("other")
                        .with_id(format!("patient-{}", i)),
                )
            })
            .collect();
        let mut present: BTreeSet<usize> = BTreeSet::new();
        let mut visits = [0u32; 6];

        for op in ops {
            match op {
                Op::Save(i) => {
                    let mut record = pool[i].clone();
                    if present.contains(&i) {
                        record = store.load_patient(&record.id).unwrap().unwrap();
                    }
                    store.save_patient(&record).unwrap();
                    present.insert(i);
                }
                Op::AddVisit(i) => {
                    if let Some(mut record) = store.load_patient(&pool[i].id).unwrap() {
                        record.add_visit(&VisitInput::on("2024-01-15"));
                        store.save_patient(&record).unwrap();
                        visits[i] += 1;
                    }
                }
                Op::Delete(i) => {
                    let deleted = store.delete_patient(&pool[i].id).is_ok();
                    prop_assert_eq!(deleted, present.remove(&i));
                    visits[i] = 0;
                }
                Op::Clear => {
                    store.clear_all_data().unwrap();
                    present.clear();
                    visits = [0; 6];
                }
            }

            let consistency = store.check_index_consistency().unwrap();
            prop_assert!(consistency.is_consistent(), "{:?}", consistency);

            let rows = store.get_all_patients().unwrap();
            prop_assert_eq!(rows.len(), present.len());
            for row in rows {
                let i: usize = row.id.trim_start_matches("patient-").parse().unwrap();
                prop_assert!(present.contains(&i));
                prop_assert_eq!(row.visit_count, visits[i]);
            }
        }
    }
}
