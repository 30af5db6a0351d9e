//! Domain models for the patient records system.

mod dates;
mod input;
mod patient;
mod summary;
mod visit;

pub use dates::*;
pub use input::*;
pub use patient::*;
pub use summary::*;
pub use visit::*;
