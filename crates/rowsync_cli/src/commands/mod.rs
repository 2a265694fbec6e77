//! CLI command implementations.

pub mod forget;
pub mod info;
pub mod provision;
pub mod retain;
pub mod serve;
pub mod sync;
