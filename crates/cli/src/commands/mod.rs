//! CLI command implementations.

pub mod dates;
pub mod migrate;
pub mod settings;
