//! Schema construction: runtime record types from inferred properties, and
//! strict JSON Schemas for the static types sent to the model.

mod strict;
mod synthesizer;

pub use strict::*;
pub use synthesizer::*;
