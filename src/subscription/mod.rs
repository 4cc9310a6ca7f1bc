//! Subscription subsystem: per-user slots kept fresh in the background.
//!
//! # Data Flow
//! ```text
//! RenewalScheduler (one task, sequential passes)
//!     → Provisioner::provision(slot)      (http source, bounded retries)
//!     → SubscriptionStore::set(slot, ..)  (atomic swap per slot)
//!
//! HTTP request for /{user}/sub.yaml
//!     → PublishEndpoint::read(slot)       (lock-free load)
//!     → payload | NotReady
//! ```
//!
//! # Design Decisions
//! - The store is built once at startup and shared by `Arc`; no globals
//! - One writer (the scheduler), many readers (HTTP handlers)
//! - Credentials are fixed for the process lifetime

pub mod credentials;
pub mod provisioner;
pub mod publish;
pub mod scheduler;
pub mod store;

pub use credentials::{load_or_generate, CredentialError};
pub use provisioner::{
    build_provisioner, DisabledProvisioner, HttpProvisioner, ProvisionError, Provisioner,
    RetryingProvisioner,
};
pub use publish::{PublishEndpoint, PublishError};
pub use scheduler::{PassSummary, RenewalPolicy, RenewalScheduler};
pub use store::{Published, SubscriptionStore, UserSlot};
