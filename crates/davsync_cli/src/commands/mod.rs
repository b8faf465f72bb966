//! CLI command implementations.

pub mod changes;
pub mod ctag;
pub mod token;
