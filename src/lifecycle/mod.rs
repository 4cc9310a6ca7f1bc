//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Credentials → Store → Bind user ports → Bind publish port
//!     → Spawn port servers + scheduler → Serve publish HTTP
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain HTTP → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then store, then listeners
//! - In-flight relays are not drained; they end with the process

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Gateway, StartupError};
