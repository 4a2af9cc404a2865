//! The vault-port connection registry (§4.2).
//!
//! # Why
//! `original_source/src/client_manager.c` keeps per-connection state in parallel fixed
//! `MAX_CLIENTS`-sized C arrays indexed by slot, guarded by one global mutex, plus a
//! hand-rolled linear scan whenever something needs to be found by hostname. This crate
//! is the same data (state, identity, last-activity, tunnel session) and the same
//! concurrency contract (one reader-writer lock over the index, one mutex per
//! connection, identity lookups as a secondary index) rebuilt around typed, keyed maps
//! instead of arrays-plus-linear-scan. The inbound byte buffer is *not* stored here —
//! it belongs to whichever worker task owns the connection's read half, which is always
//! exactly one task for the connection's whole life (see `broker-daemon`'s engine and
//! the [`TlsWriteHalf`] doc below).
//!
//! # Locking discipline
//! `lookup_and_lock*` takes the registry read lock only long enough to clone an `Arc`,
//! then locks that connection's own `tokio::sync::Mutex` by consuming the `Arc`
//! (`lock_owned`) — so the returned guard owns its own keep-alive reference and the
//! registry read lock is never held across an `.await`. This preserves the spec's
//! externally observable contract ("the caller cannot observe a record that is
//! simultaneously being destroyed") without needing a lock type that is both
//! async-aware and held across suspension, which `std::sync::RwLock` is not meant for.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use broker_core::{ConnState, ConnectionHandle};
use tokio::io::WriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Only the write half of the TLS session lives behind the registry's per-connection
/// mutex. The owning worker task keeps the read half to itself (see `broker-daemon`'s
/// engine), since it is the sole reader for the connection's whole lifetime; splitting
/// this way means a worker blocked waiting for more bytes from its peer never blocks a
/// concurrent fan-out `PUBLISH` from writing to this same connection — the tokio
/// rendition of §4.3's "release own lock before fan-out" rule, applied so there is
/// nothing to release on the read path in the first place.
pub type TlsWriteHalf = WriteHalf<tokio_rustls::server::TlsStream<TcpStream>>;

/// Per-connection state, guarded by its own mutex once inside the registry.
pub struct ConnectionRecord {
    pub handle: ConnectionHandle,
    pub state: ConnState,
    pub identity: Option<String>,
    pub tls: Option<TlsWriteHalf>,
    pub last_activity: Instant,
}

impl ConnectionRecord {
    fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            state: ConnState::AwaitingHandshake,
            identity: None,
            tls: None,
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.elapsed()
    }
}

/// A short, read-only snapshot of one connection's status, for the admin `STATUS` verb.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub handle: ConnectionHandle,
    pub state: ConnState,
    pub identity: Option<String>,
}

type SharedRecord = Arc<Mutex<ConnectionRecord>>;

#[derive(Default)]
pub struct ConnectionRegistry {
    primary: RwLock<HashMap<ConnectionHandle, SharedRecord>>,
    by_identity: RwLock<HashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection in `awaiting-handshake` state.
    pub fn add(&self, handle: ConnectionHandle) {
        let record = Arc::new(Mutex::new(ConnectionRecord::new(handle)));
        self.primary.write().unwrap().insert(handle, record);
    }

    /// Acquires the per-connection mutex for `handle`, or `None` if it is not (or no
    /// longer) registered.
    pub async fn lookup_and_lock(&self, handle: ConnectionHandle) -> Option<OwnedMutexGuard<ConnectionRecord>> {
        let record = self.primary.read().unwrap().get(&handle).cloned()?;
        Some(record.lock_owned().await)
    }

    /// Same as [`Self::lookup_and_lock`] but resolved through the secondary identity
    /// index, used by the admin surface and by reconnect handling.
    pub async fn lookup_and_lock_by_identity(
        &self,
        name: &str,
    ) -> Option<OwnedMutexGuard<ConnectionRecord>> {
        let handle = *self.by_identity.read().unwrap().get(name)?;
        self.lookup_and_lock(handle).await
    }

    /// Names the "drop the guard" step explicitly so call sites read like the spec's
    /// operation table rather than relying on implicit `Drop`.
    pub fn unlock(&self, _guard: OwnedMutexGuard<ConnectionRecord>) {
        // Dropping `_guard` here releases the per-connection mutex.
    }

    /// Installs `name -> handle` in the secondary index. If `name` already mapped to a
    /// different connection, that mapping is silently replaced — the old connection is
    /// not torn down, it simply becomes unreachable by identity (reconnect semantics,
    /// §9 "Secondary indexing").
    pub fn bind_identity(&self, handle: ConnectionHandle, name: &str) {
        self.by_identity
            .write()
            .unwrap()
            .insert(name.to_owned(), handle);
    }

    /// Removes and tears down a connection. Waits for any in-flight holder of the
    /// per-connection mutex to release it (by acquiring the mutex itself) before
    /// freeing the record, matching §4.2's removal sequence. Callers are responsible
    /// for unsubscribing the handle from every topic *before* calling this, per the
    /// invariant "removal of a connection implies removal from every topic before
    /// release" — the registry has no notion of topics.
    pub async fn remove(&self, handle: ConnectionHandle) {
        let record = self.primary.write().unwrap().remove(&handle);
        let Some(record) = record else {
            return;
        };

        let mut guard = record.lock_owned().await;

        if guard.identity.as_deref().is_some_and(|id| {
            self.by_identity
                .read()
                .unwrap()
                .get(id)
                .is_some_and(|h| *h == handle)
        }) {
            let identity = guard.identity.clone().unwrap();
            self.by_identity.write().unwrap().remove(&identity);
        }

        if let Some(mut tls) = guard.tls.take() {
            use tokio::io::AsyncWriteExt;
            let _ = tls.shutdown().await;
        }
        guard.state = ConnState::Closing;
        tracing::info!(%handle, "connection removed");
    }

    /// Collects handles idle past `threshold` under a read lock, without removing them.
    /// Callers remove each one via [`Self::remove`] (after unsubscribing it from every
    /// topic), outside this lock.
    pub async fn sweep_idle(&self, threshold: std::time::Duration) -> Vec<ConnectionHandle> {
        let snapshot: Vec<SharedRecord> = self.primary.read().unwrap().values().cloned().collect();

        let mut candidates = Vec::new();
        for record in snapshot {
            let guard = record.lock().await;
            if guard.state == ConnState::Authenticated && guard.idle_for() >= threshold {
                candidates.push(guard.handle);
            }
        }
        candidates
    }

    /// Point-in-time snapshot for the admin surface's `STATUS` verb (§6). Briefly locks
    /// each connection in turn to read its current state; a connection mid-teardown
    /// when this runs simply reports whatever state it was in at the moment of locking.
    pub async fn snapshot_status(&self) -> Vec<ConnectionStatus> {
        let records: Vec<SharedRecord> = self.primary.read().unwrap().values().cloned().collect();
        let mut statuses = Vec::with_capacity(records.len());
        for record in records {
            let guard = record.lock().await;
            statuses.push(ConnectionStatus {
                handle: guard.handle,
                state: guard.state,
                identity: guard.identity.clone(),
            });
        }
        statuses
    }

    pub fn len(&self) -> usize {
        self.primary.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_core::HandleAllocator;

    #[tokio::test]
    async fn add_then_lookup_and_lock_round_trips() {
        let registry = ConnectionRegistry::new();
        let allocator = HandleAllocator::new();
        let handle = allocator.allocate();

        registry.add(handle);
        let guard = registry.lookup_and_lock(handle).await.expect("should be found");
        assert_eq!(guard.handle, handle);
        assert_eq!(guard.state, ConnState::AwaitingHandshake);
    }

    #[tokio::test]
    async fn remove_makes_future_lookups_return_none() {
        let registry = ConnectionRegistry::new();
        let allocator = HandleAllocator::new();
        let handle = allocator.allocate();

        registry.add(handle);
        registry.remove(handle).await;

        assert!(registry.lookup_and_lock(handle).await.is_none());
    }

    #[tokio::test]
    async fn bind_identity_then_lookup_by_identity() {
        let registry = ConnectionRegistry::new();
        let allocator = HandleAllocator::new();
        let handle = allocator.allocate();

        registry.add(handle);
        registry.bind_identity(handle, "agent-01.example");

        let guard = registry
            .lookup_and_lock_by_identity("agent-01.example")
            .await
            .expect("should resolve via secondary index");
        assert_eq!(guard.handle, handle);
    }

    #[tokio::test]
    async fn reconnect_orphans_old_mapping_without_double_free() {
        let registry = ConnectionRegistry::new();
        let allocator = HandleAllocator::new();
        let old = allocator.allocate();
        let new = allocator.allocate();

        registry.add(old);
        registry.bind_identity(old, "agent-01.example");

        registry.add(new);
        registry.bind_identity(new, "agent-01.example");

        let guard = registry
            .lookup_and_lock_by_identity("agent-01.example")
            .await
            .unwrap();
        assert_eq!(guard.handle, new);
        drop(guard);

        // The old connection is still independently reachable by handle and can still
        // be torn down through the normal path; this must not panic or double-free.
        assert!(registry.lookup_and_lock(old).await.is_some());
        registry.remove(old).await;
    }

    #[tokio::test]
    async fn sweep_idle_only_reports_authenticated_connections_past_threshold() {
        let registry = ConnectionRegistry::new();
        let allocator = HandleAllocator::new();
        let handle = allocator.allocate();
        registry.add(handle);

        // Still awaiting-handshake: never a sweep candidate regardless of idle time.
        let candidates = registry.sweep_idle(std::time::Duration::from_secs(0)).await;
        assert!(candidates.is_empty());

        {
            let mut guard = registry.lookup_and_lock(handle).await.unwrap();
            guard.state = ConnState::Authenticated;
        }

        let candidates = registry.sweep_idle(std::time::Duration::from_secs(0)).await;
        assert_eq!(candidates, vec![handle]);
    }
}
