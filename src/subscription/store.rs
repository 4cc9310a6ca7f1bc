//! Fixed-size table of per-user slots.

use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwapOption;
use bytes::Bytes;

/// A payload as last published, with its refresh time.
#[derive(Debug, Clone)]
pub struct Published {
    pub payload: Bytes,
    pub refreshed_at: SystemTime,
}

/// Per-user state. Port and credential are fixed at construction; only the
/// published payload changes.
#[derive(Debug)]
pub struct UserSlot {
    index: usize,
    listen_port: u16,
    credential: String,
    current: ArcSwapOption<Published>,
}

impl UserSlot {
    pub fn new(index: usize, listen_port: u16, credential: String) -> Self {
        Self {
            index,
            listen_port,
            credential,
            current: ArcSwapOption::empty(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based id used in paths and labels.
    pub fn user_id(&self) -> usize {
        self.index + 1
    }

    pub fn label(&self) -> String {
        format!("user{}", self.user_id())
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn published(&self) -> Option<Arc<Published>> {
        self.current.load_full()
    }
}

/// Shared between the renewal scheduler (writer) and the publish layer
/// (readers). Reads are lock-free and always see a whole payload.
#[derive(Debug)]
pub struct SubscriptionStore {
    slots: Vec<UserSlot>,
}

impl SubscriptionStore {
    pub fn new(slots: Vec<UserSlot>) -> Self {
        Self { slots }
    }

    /// One slot per credential, ports assigned from `start_port` upward.
    pub fn with_credentials(start_port: u16, credentials: Vec<String>) -> Self {
        let slots = credentials
            .into_iter()
            .enumerate()
            .map(|(index, credential)| {
                UserSlot::new(index, start_port.saturating_add(index as u16), credential)
            })
            .collect();
        Self::new(slots)
    }

    /// Replace the payload of `index`. Returns `false` for an unknown index.
    pub fn set(&self, index: usize, payload: Bytes) -> bool {
        match self.slots.get(index) {
            Some(slot) => {
                slot.current.store(Some(Arc::new(Published {
                    payload,
                    refreshed_at: SystemTime::now(),
                })));
                true
            }
            None => false,
        }
    }

    /// Current payload, or `None` when the slot is empty or out of range.
    pub fn get(&self, index: usize) -> Option<Bytes> {
        self.published(index).map(|p| p.payload.clone())
    }

    pub fn published(&self, index: usize) -> Option<Arc<Published>> {
        self.slots.get(index).and_then(UserSlot::published)
    }

    pub fn slot(&self, index: usize) -> Option<&UserSlot> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[UserSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn any_absent(&self) -> bool {
        self.slots.iter().any(|slot| slot.published().is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(users: usize) -> SubscriptionStore {
        SubscriptionStore::with_credentials(
            51801,
            (0..users).map(|i| format!("cred-{i}")).collect(),
        )
    }

    #[test]
    fn test_unset_and_out_of_range_are_absent() {
        let store = store(2);
        assert_eq!(store.len(), 2);
        assert!(store.get(0).is_none());
        assert!(store.get(2).is_none());
        assert!(store.get(usize::MAX).is_none());
        assert!(store.any_absent());
    }

    #[test]
    fn test_set_then_get_is_identical() {
        let store = store(3);
        let payload = Bytes::from_static(b"proxies:\n  - name: a\n");
        assert!(store.set(2, payload.clone()));
        assert_eq!(store.get(2).unwrap(), payload);
        assert!(!store.set(3, payload));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_ports_follow_index() {
        let store = store(3);
        let ports: Vec<u16> = store.slots().iter().map(UserSlot::listen_port).collect();
        assert_eq!(ports, vec![51801, 51802, 51803]);
        assert_eq!(store.slot(1).unwrap().label(), "user2");
        assert_eq!(store.slot(1).unwrap().credential(), "cred-1");
    }

    #[test]
    fn test_any_absent_tracks_population() {
        let store = store(2);
        store.set(0, Bytes::from_static(b"a"));
        assert!(store.any_absent());
        store.set(1, Bytes::from_static(b"b"));
        assert!(!store.any_absent());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_torn_payloads() {
        let store = Arc::new(store(1));
        store.set(0, Bytes::from(vec![0u8; 8192]));

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for round in 1..=200u32 {
                    store.set(0, Bytes::from(vec![(round % 256) as u8; 8192]));
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            readers.push(tokio::spawn(async move {
                for _ in 0..500 {
                    let payload = store.get(0).unwrap();
                    assert_eq!(payload.len(), 8192);
                    let first = payload[0];
                    assert!(payload.iter().all(|b| *b == first));
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
