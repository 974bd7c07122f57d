//! Pipeline module - schema extraction and self-validating quiz pipelines.

mod extraction;
mod quiz;

pub use extraction::*;
pub use quiz::*;
