//! Infrastructure layer for rtl-split.
//!
//! Everything that touches a socket lives here.
//!
//! # Responsibilities
//!
//! - Connecting to the upstream rtl_tcp server and capturing its header
//! - Reading the sample stream and writing commands upstream
//! - Binding the downstream listener and accepting clients
//! - Spawning and tearing down per-client session tasks
//! - Stopping on upstream EOF or the caller's shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Broadcast and pruning rules (application layer)
//! - Argument parsing (that is done in `main.rs`)

pub mod server;
pub mod upstream;

pub use server::{Splitter, StopReason};
pub use upstream::{UpstreamCommander, UpstreamLink, UpstreamReader};
