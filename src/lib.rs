//! dynaschema - Runtime schema inference and self-validating structured extraction.
//!
//! ## Architecture
//!
//! Every model call goes through the **Gateway**, which asks an opaque
//! completion service for output shaped like a target descriptor and re-asks
//! with the validation errors until the reply is valid or the retry budget is
//! spent.
//!
//! ## Pipelines
//!
//! - **Extraction Pipeline**: infer properties → synthesize a record type →
//!   extract records of that type
//! - **Quiz Pipeline**: generate a multiple choice question → verify each
//!   wrong answer with a second call → replace disputed answer text
//!
//! ## Runtime schemas
//!
//! Record types are values, not Rust types: a `RecordType` is a list of typed
//! fields with zero-value defaults, and a `Record` holds `FieldValue`s checked
//! against it.
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Static types and the synthesized field layout
//! - B_i (Beliefs): Model replies match the target (checked, re-asked on failure)
//! - I^R (Resolvable): Models, retry budgets and policies live in config
//! - I^B (Bounded): Service availability (transport retry, then surfaced)

pub mod client;
pub mod export;
pub mod gateway;
pub mod models;
pub mod pipeline;
pub mod schema;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use client::{CompletionService, LLMClient};
pub use export::{JsonlWriter, Projectable, Row};
pub use gateway::{Gateway, GatewayRequest, Many, Model, ResponseModel, ValidationContext};
pub use models::{Config, DynaschemaError, Record, RecordType, Result};
pub use pipeline::{ExtractionPipeline, QuizPipeline};
pub use schema::synthesize;
pub use validation::AnswerValidator;
