//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection on a user port
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (conn-N id, active-session guard)
//!     → hand off to proxy::session
//!
//! Session needs its target leg
//!     → dialer.rs (resolve + connect under deadline, failure classification)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Dial failures carry enough shape to pick a SOCKS5 reply code

pub mod connection;
pub mod dialer;
pub mod listener;

pub use connection::{ConnectionId, SessionGuard, SessionTracker};
pub use dialer::{DialError, Dialer, TcpDialer};
pub use listener::{ConnectionPermit, ListenerError, PortListener};
