//! Read-only per-user accessor used by the HTTP layer.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::subscription::store::SubscriptionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The slot exists but has never been populated.
    #[error("subscription not ready yet, try again later")]
    NotReady,

    /// No slot with this index.
    #[error("unknown user")]
    UnknownUser,
}

#[derive(Debug, Clone)]
pub struct PublishEndpoint {
    store: Arc<SubscriptionStore>,
}

impl PublishEndpoint {
    pub fn new(store: Arc<SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Current payload of slot `index`.
    pub fn read(&self, index: usize) -> Result<Bytes, PublishError> {
        if index >= self.store.len() {
            return Err(PublishError::UnknownUser);
        }
        self.store.get(index).ok_or(PublishError::NotReady)
    }

    pub fn store(&self) -> &SubscriptionStore {
        &self.store
    }
}
