//! Proxy subsystem: one port server per user slot.
//!
//! # Data Flow
//! ```text
//! PortServer(i) accept loop
//!     → spawn session task (conn-N, active-session guard, connection permit)
//!     → SessionHandler::serve
//!         → socks::negotiate            (socks5 mode)
//!         → crypto::CipherStream        (encrypted mode)
//!         → net::Dialer::dial           (connect deadline)
//!         → relay::relay                (idle deadline, single close)
//! ```
//!
//! # Design Decisions
//! - Sessions never report back to the accept loop; failures stay local
//! - The port server never touches the subscription store

pub mod server;
pub mod session;

pub use server::PortServer;
pub use session::{SessionError, SessionHandler, SessionMode};
