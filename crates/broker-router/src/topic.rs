use std::future::Future;

use broker_core::limits::{MAX_SUBSCRIBERS_PER_TOPIC, MAX_TOPICS};
use broker_core::{BrokerError, ConnectionHandle};
use dashmap::DashMap;

/// Name -> ordered subscriber list, per §4.3.
///
/// # Why
/// `original_source/src/pubsub.c` protects one global `Topic topics[MAX_TOPICS]` array
/// with one mutex for subscribe/unsubscribe/publish. A single `std::sync::Mutex` over a
/// `HashMap` would be the direct translation; this uses [`DashMap`] instead (the same
/// concurrent-map crate the teacher's `spark-switch` pulls in for session indexing),
/// which shards its internal locking per key. The spec's binding contract is the
/// *behavior* at the index boundary (idempotent subscribe, fan-out order, capacity caps)
/// — the lock granularity behind that boundary is an implementation choice, and
/// `DashMap` lets concurrent `subscribe`s on different topics proceed without
/// contending on an index-wide lock.
///
/// # Deadlock avoidance
/// `publish` never takes a per-connection mutex itself — it is handed a `deliver`
/// closure and calls it once per subscriber, leaving all connection-level locking to the
/// caller (the event engine, through [`broker_registry`]). This keeps this crate free of
/// a dependency on the registry crate and preserves the canonical lock order from §9:
/// callers must have already dropped their own per-connection mutex before calling
/// `publish`, because `deliver` will attempt to acquire *other* connections' mutexes.
pub struct TopicIndex {
    topics: DashMap<String, Vec<ConnectionHandle>>,
}

impl Default for TopicIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicIndex {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Idempotent: re-subscribing an already-subscribed handle is a no-op.
    pub fn subscribe(&self, handle: ConnectionHandle, topic: &str) -> Result<(), BrokerError> {
        if !self.topics.contains_key(topic) && self.topics.len() >= MAX_TOPICS {
            return Err(BrokerError::Capacity(format!(
                "topic limit ({MAX_TOPICS}) reached, cannot create '{topic}'"
            )));
        }

        let mut subscribers = self.topics.entry(topic.to_owned()).or_default();
        if subscribers.contains(&handle) {
            return Ok(());
        }
        if subscribers.len() >= MAX_SUBSCRIBERS_PER_TOPIC {
            return Err(BrokerError::Capacity(format!(
                "subscriber limit ({MAX_SUBSCRIBERS_PER_TOPIC}) reached for topic '{topic}'"
            )));
        }
        subscribers.push(handle);
        Ok(())
    }

    pub fn unsubscribe(&self, handle: ConnectionHandle, topic: &str) {
        if let Some(mut subscribers) = self.topics.get_mut(topic) {
            subscribers.retain(|h| *h != handle);
        }
    }

    /// Removes `handle` from every topic it is subscribed to. Called before a
    /// connection is removed from the registry (§3 invariant: "Removal of a connection
    /// implies removal from every topic before release").
    pub fn unsubscribe_all(&self, handle: ConnectionHandle) {
        for mut entry in self.topics.iter_mut() {
            entry.value_mut().retain(|h| *h != handle);
        }
    }

    /// Delivers `payload` (already formatted as `[<topic>] <payload>\n` by the caller's
    /// `deliver` closure, or formatted here — see below) to every current subscriber of
    /// `topic`. Subscribers whose `deliver` call fails (stale registry entry, closed
    /// socket) are silently skipped; delivery continues to the rest.
    pub async fn publish<F, Fut>(&self, topic: &str, payload: &str, deliver: F)
    where
        F: Fn(ConnectionHandle, String) -> Fut,
        Fut: Future<Output = bool>,
    {
        let frame = format!("[{topic}] {payload}\n");
        let subscribers: Vec<ConnectionHandle> = match self.topics.get(topic) {
            Some(list) => list.clone(),
            None => return,
        };

        for handle in subscribers {
            if !deliver(handle, frame.clone()).await {
                tracing::debug!(%handle, topic, "skipped stale subscriber during fan-out");
            }
        }
    }

    pub fn snapshot(&self) -> Vec<(String, Vec<ConnectionHandle>)> {
        self.topics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_core::HandleAllocator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn subscribe_is_idempotent() {
        let index = TopicIndex::new();
        let allocator = HandleAllocator::new();
        let h = allocator.allocate();

        index.subscribe(h, "CMD-GRP-1").unwrap();
        index.subscribe(h, "CMD-GRP-1").unwrap();

        let snapshot = index.snapshot();
        let (_, subs) = snapshot.iter().find(|(name, _)| name == "CMD-GRP-1").unwrap();
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn unsubscribe_twice_is_safe() {
        let index = TopicIndex::new();
        let allocator = HandleAllocator::new();
        let h = allocator.allocate();

        index.subscribe(h, "t").unwrap();
        index.unsubscribe(h, "t");
        index.unsubscribe(h, "t"); // must not panic
    }

    #[tokio::test]
    async fn publish_delivers_to_every_subscriber_and_formats_frame() {
        let index = TopicIndex::new();
        let allocator = HandleAllocator::new();
        let a = allocator.allocate();
        let b = allocator.allocate();
        index.subscribe(a, "CMD-GRP-1").unwrap();
        index.subscribe(b, "CMD-GRP-1").unwrap();

        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);

        index
            .publish("CMD-GRP-1", "reboot now", move |handle, frame| {
                let received = Arc::clone(&received_clone);
                async move {
                    received.lock().unwrap().push((handle, frame));
                    true
                }
            })
            .await;

        let got = received.lock().unwrap();
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|(_, frame)| frame == "[CMD-GRP-1] reboot now\n"));
    }

    #[tokio::test]
    async fn publish_skips_stale_subscriber_without_aborting_others() {
        let index = TopicIndex::new();
        let allocator = HandleAllocator::new();
        let stale = allocator.allocate();
        let live = allocator.allocate();
        index.subscribe(stale, "t").unwrap();
        index.subscribe(live, "t").unwrap();

        let delivered = Arc::new(AtomicUsize::new(0));
        let delivered_clone = Arc::clone(&delivered);

        index
            .publish("t", "hi", move |handle, _frame| {
                let delivered = Arc::clone(&delivered_clone);
                async move {
                    if handle == stale {
                        false
                    } else {
                        delivered.fetch_add(1, Ordering::SeqCst);
                        true
                    }
                }
            })
            .await;

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_all_clears_handle_from_every_topic() {
        let index = TopicIndex::new();
        let allocator = HandleAllocator::new();
        let h = allocator.allocate();
        index.subscribe(h, "a").unwrap();
        index.subscribe(h, "b").unwrap();

        index.unsubscribe_all(h);

        for (_, subs) in index.snapshot() {
            assert!(!subs.contains(&h));
        }
    }
}
