//! Structured-output gateway and target descriptors.

mod request;
mod target;

pub use request::*;
pub use target::*;
