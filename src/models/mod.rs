//! Data models served by the TDR backend.
//!
//! Field names match the JSON the frontend consumes and stay snake_case on the
//! wire.

mod commit;
mod pipeline;
mod project;

pub use commit::*;
pub use pipeline::*;
pub use project::*;
