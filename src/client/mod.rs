//! Completion service boundary and its HTTP implementation.

mod llm_client;
mod service;

pub use llm_client::*;
pub use service::*;
