//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Relayed socket I/O:
//!     → timeouts.rs (idle / handshake / connect deadlines)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every socket operation has a deadline

pub mod timeouts;
