//! SOCKS5 protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted client stream
//!     → handshake.rs (greeting, request, reply frames)
//!     → address.rs (target address wire codec)
//!     → TargetAddress handed to the dialer
//! ```
//!
//! # Design Decisions
//! - Only CONNECT with "no authentication"; BIND and UDP ASSOCIATE are refused
//! - The address codec is shared with the encrypted listener, which carries
//!   a bare address instead of a handshake

pub mod address;
pub mod handshake;

pub use address::{AddressError, TargetAddress};
pub use handshake::{negotiate, send_reply, HandshakeError, HandshakeState, Negotiator, ReplyCode};
