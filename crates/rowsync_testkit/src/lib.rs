//! # rowsync testkit
//!
//! Test utilities for rowsync.
//!
//! This crate provides:
//! - Provisioned SQLite fixture stores with a small application schema
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rowsync_testkit::prelude::*;
//!
//! #[test]
//! fn rows_reach_the_peer() {
//!     with_store_pair(|a, b| {
//!         a.insert_user(1, "Alice");
//!         agent(a, b).synchronize().unwrap();
//!         assert_eq!(b.user_name(1).as_deref(), Some("Alice"));
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::{agent, app_config, with_store_pair, TestStore, APP_SCHEMA};
    pub use crate::generators::*;
    pub use rowsync_engine::CancelToken;
}

pub use fixtures::*;
pub use generators::*;
