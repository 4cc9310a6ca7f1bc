//! Multi-user relay gateway library.

pub mod config;
pub mod crypto;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod relay;
pub mod resilience;
pub mod socks;
pub mod subscription;

pub use config::schema::GatewayConfig;
pub use lifecycle::{Gateway, Shutdown};
pub use subscription::SubscriptionStore;
