//! rtl-split library crate.
//!
//! Shares one rtl_tcp server between any number of SDR clients.  The
//! splitter holds the only upstream connection, replays the dongle header to
//! each client that connects, copies every sample chunk to every client, and
//! funnels the clients' tuning commands back upstream one frame at a time.
//!
//! # Architecture
//!
//! ```text
//! rtl_tcp server
//!         ↕  (header + samples down, 5-byte commands up)
//! [rtl-split]
//!   ├── domain/           SplitterConfig
//!   ├── application/
//!   │     ├── registry/   Client handles and chunk broadcast
//!   │     └── commands/   CommandSink seam and command forwarding
//!   └── infrastructure/
//!         ├── upstream/   The upstream TCP link
//!         └── server/     Relay loop, accept loop, client sessions
//!         ↕
//! SDR clients (gqrx, SDR++, rtl_tcp-aware tools)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` is generic over the writer type and never opens sockets.
//! - `infrastructure` owns every socket and spawned task.

/// Domain layer: configuration types.
pub mod domain;

/// Application layer: client registry and command forwarding.
pub mod application;

/// Infrastructure layer: upstream link and downstream server.
pub mod infrastructure;

/// Library error type.
pub mod error;

pub use error::SplitterError;
