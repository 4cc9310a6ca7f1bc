//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Sessions, scheduler passes, publish requests produce:
//!     → logging.rs (structured log events, conn-N / slot fields)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (text or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap (atomic increments) and off by default

pub mod logging;
pub mod metrics;
