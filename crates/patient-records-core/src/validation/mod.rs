//! Validation engine.
//!
//! Pure functions only: validators return error descriptions and never fail
//! or touch their input. Callers decide what to do with a failed result.

mod entity;
mod fields;

pub use entity::*;
pub use fields::*;
