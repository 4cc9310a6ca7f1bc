//! Relay subsystem.
//!
//! # Responsibilities
//! - Copy bytes between a client stream and a target stream in both directions
//! - Enforce an idle deadline on every read and write
//! - Close both legs exactly once when either direction ends
//!
//! # Data Flow
//! ```text
//! client ──read──► outbound pump ──write──► target
//! client ◄─write── inbound pump  ◄──read─── target
//!                      │
//!                      └─ first to end ──► CloseBarrier::fire ──► both pumps stop
//!                                                              ──► shutdown(client, target)
//! ```
//!
//! # Design Decisions
//! - No half-close: the first direction to end tears down the whole session
//! - Deadlines wrap the raw I/O future, so a cipher-wrapped stream sees the
//!   same idle policy as a plain socket

pub mod barrier;
pub mod engine;

pub use barrier::CloseBarrier;
pub use engine::{relay, Direction, RelayReport, Termination};
