//! HTTP publish surface.
//!
//! # Data Flow
//! ```text
//! TCP connection on the publish port
//!     → server.rs (Axum router)
//!     → request.rs (req-N id, echoed back)
//!     → middleware/access_log.rs (log + count once the status is known)
//!     → handler: status page | sub.yaml (PublishEndpoint) | clash.yaml (clash.rs)
//! ```

pub mod clash;
pub mod middleware;
pub mod request;
pub mod server;

pub use clash::ClientEndpoint;
pub use request::{SequentialRequestId, X_REQUEST_ID};
pub use server::{PublishServer, PublishState};
