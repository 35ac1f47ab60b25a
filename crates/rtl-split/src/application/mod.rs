//! Application layer for rtl-split.
//!
//! # Responsibilities
//!
//! - Tracking downstream clients and fanning chunks out to them
//!   ([`registry`])
//! - Routing client commands to whatever owns the upstream write side
//!   ([`commands`])
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or accepting connections (infrastructure)
//! - Spawning tasks (infrastructure)

pub mod commands;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use commands::{forward_command, CommandSink};
pub use registry::{BroadcastReport, ClientHandle, ClientId, ClientRegistry};
