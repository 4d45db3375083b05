//! CLI command implementations.

pub mod handoff;
pub mod inject;
