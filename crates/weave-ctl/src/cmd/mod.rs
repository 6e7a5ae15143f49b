//! CLI command modules.

pub mod chunk;
pub mod upload;
