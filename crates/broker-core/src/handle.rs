use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque, unique-while-open identifier for an accepted connection.
///
/// The original implementation used the slot index into a fixed `MAX_CLIENTS` array as
/// the connection's identity. That index is reused the moment a slot is freed, which is
/// fine for a single global mutex but is the wrong shape for a keyed map: two different
/// connections would compare equal by handle across their non-overlapping lifetimes.
/// Here the handle is a monotonically increasing counter instead, so a handle is never
/// reused for the lifetime of the process, matching the registry invariant "its handle
/// is unique and not reused by any other live connection" without relying on prompt
/// slot reclamation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    /// Only for tests that need a handle without going through an allocator.
    #[cfg(test)]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Issues unique [`ConnectionHandle`]s. Shared by the acceptor tasks for both listening
/// ports so handles never collide across the vault and lobby sides.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn allocate(&self) -> ConnectionHandle {
        ConnectionHandle(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_never_repeats() {
        let alloc = HandleAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_stable_format() {
        let h = ConnectionHandle::from_raw(7);
        assert_eq!(h.to_string(), "conn-7");
    }
}
