//! The spec's "bounded everything" constants, collected in one place (§9 DESIGN NOTES).

/// Capacity of one connection's [`crate::InboundBuffer`], in bytes.
pub const INBOUND_BUFFER_CAPACITY: usize = 2048;

/// Capacity of the acceptor-to-worker task queue.
pub const TASK_QUEUE_CAPACITY: usize = 100;

/// Default worker pool size.
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Upper bound on distinct topics the topic index will create.
pub const MAX_TOPICS: usize = 50;

/// Upper bound on subscribers accepted per topic.
pub const MAX_SUBSCRIBERS_PER_TOPIC: usize = 256;

/// Idle duration after which an authenticated connection is swept.
pub const IDLE_TIMEOUT_SECS: u64 = 60;

/// Interval between sweeper passes.
pub const SWEEP_INTERVAL_SECS: u64 = 10;

/// Default secure (mTLS) listening port.
pub const DEFAULT_VAULT_PORT: u16 = 35565;

/// Default plaintext enrollment listening port.
pub const DEFAULT_LOBBY_PORT: u16 = 35566;

/// Max bytes read in a single enrollment request.
pub const ENROLLMENT_READ_LIMIT: usize = 4096;

/// Default certificate validity period issued by the CA signer.
pub const CERTIFICATE_VALIDITY_DAYS: i64 = 365;

/// The always-reachable topic every agent may subscribe to.
pub const BROADCAST_TOPIC: &str = "BROADCAST";
