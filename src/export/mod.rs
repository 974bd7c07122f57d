//! Export boundary: flat rows and JSONL output.

mod jsonl;
mod row;

pub use jsonl::*;
pub use row::*;
