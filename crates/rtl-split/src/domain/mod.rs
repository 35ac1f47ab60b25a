//! Domain layer for rtl-split.
//!
//! Plain configuration types with no I/O.  The wire types (header, command
//! frames) live in `rtl-core` because the tests speak the protocol too.

pub mod config;

pub use config::{SplitterConfig, DEFAULT_CHUNK_SIZE, DEFAULT_PORT};
