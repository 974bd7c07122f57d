//! Per-field self-validation.

mod answer;

pub use answer::*;
