//! Output formatting
//!
//! Live status lines and the final response, as text for a terminal or as
//! JSON for tooling.

pub mod json;
pub mod text;
