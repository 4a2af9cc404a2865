use broker_core::HandleAllocator;
use broker_pki::{CaSigner, IdentityResolver};
use broker_registry::ConnectionRegistry;
use broker_router::{AccessPolicy, TopicIndex};
use broker_store::Store;

/// Everything the event engine needs, shared across the acceptor, every worker task and
/// the sweeper via a single `Arc`.
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub topics: TopicIndex,
    pub access: AccessPolicy,
    pub store: Store,
    pub resolver: IdentityResolver,
    pub ca: CaSigner,
    pub allocator: HandleAllocator,
    pub vault_tls: std::sync::Arc<rustls::ServerConfig>,
}
