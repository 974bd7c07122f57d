//! Core data models for dynaschema.
//!
//! - Property descriptors and schema proposals (what the model infers)
//! - Runtime record types and records (what gets extracted)
//! - The multiple-choice composite and its verification record
//! - Configuration, errors and run statistics

mod config;
mod error;
mod property;
mod question;
mod record;
mod stats;

pub use config::*;
pub use error::*;
pub use property::*;
pub use question::*;
pub use record::*;
pub use stats::*;
