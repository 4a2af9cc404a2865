//! The acceptor, worker pool, and per-connection state machines (§4.5).
//!
//! # Tokio rendition of the worker pool
//! §10.6 resolves the scheduling model as a fixed pool of tokio tasks draining a bounded
//! `mpsc` channel, each worker owning one connection's full lifecycle for as long as it
//! holds a permit. [`vault_worker`] is exactly that: a loop that pulls the next accepted
//! socket off the shared channel and processes it start to finish before going back for
//! another — there is never more than [`broker_core::limits::DEFAULT_WORKER_COUNT`]
//! connections being actively driven at once, the same bound the spec's thread pool
//! enforces.
//!
//! `tokio_rustls::TlsAcceptor::accept` already loops internally over partial
//! reads/writes, suspending the task at each one; this is tokio's cooperative-scheduling
//! substitute for the spec's hand-rolled WANT_READ/WANT_WRITE re-arm loop, so no explicit
//! state machine is needed for the handshake phase.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use broker_core::limits::{ENROLLMENT_READ_LIMIT, IDLE_TIMEOUT_SECS, SWEEP_INTERVAL_SECS};
use broker_core::{BrokerError, ConnState, ConnectionHandle, InboundBuffer};
use broker_pki::CaSigner;
use broker_store::StateStore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::protocol::Command;
use crate::state::AppState;

/// One accepted vault-port socket, handed from the acceptor to a worker over the
/// bounded channel. This is the Rust rendition of the spec's task descriptor
/// `{connection handle, tunnel mode}` — the handle is allocated once a worker actually
/// picks the task up, since allocation and registration only matter once something is
/// about to process the connection.
pub struct Task {
    pub stream: TcpStream,
    pub peer_addr: SocketAddr,
}

/// A fixed pool of these, each draining the same receiver, is the tokio analogue of the
/// spec's worker-pool-plus-task-queue (§4.1, §4.5).
pub async fn vault_worker(state: Arc<AppState>, rx: Arc<AsyncMutex<mpsc::Receiver<Task>>>) {
    loop {
        let task = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(task) = task else {
            break; // channel closed: shutdown draining complete for this worker
        };
        handle_vault_connection(&state, task).await;
    }
}

pub async fn handle_vault_connection(state: &AppState, task: Task) {
    let handle = state.allocator.allocate();
    state.registry.add(handle);
    tracing::debug!(%handle, peer = %task.peer_addr, "accepted vault connection");

    let tls_stream = match broker_transport_tls::accept(state.vault_tls.clone(), task.stream).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(%handle, error = %err, "tls handshake failed");
            state.registry.remove(handle).await;
            return;
        }
    };

    let common_name = match broker_transport_tls::peer_common_name(&tls_stream) {
        Ok(cn) => cn,
        Err(_) => {
            tracing::warn!(%handle, "handshake succeeded with no usable peer identity");
            state.registry.remove(handle).await;
            return;
        }
    };

    if !verify_peer_identity(state, &common_name, task.peer_addr).await {
        tracing::warn!(%handle, identity = %common_name, "identity verification failed at handshake");
        state.registry.remove(handle).await;
        return;
    }

    state.registry.bind_identity(handle, &common_name);
    let (mut read_half, write_half) = tokio::io::split(tls_stream);
    if let Some(mut guard) = state.registry.lookup_and_lock(handle).await {
        guard.identity = Some(common_name.clone());
        guard.state = ConnState::Authenticated;
        guard.tls = Some(write_half);
        guard.touch();
    } else {
        return; // removed concurrently (e.g. shutdown) before we could finish arming it
    }

    let mut buffer = InboundBuffer::new();
    let mut read_buf = [0u8; 4096];

    'connection: loop {
        let n = match read_half.read(&mut read_buf).await {
            Ok(0) => break, // peer closed
            Ok(n) => n,
            Err(err) => {
                tracing::debug!(%handle, error = %err, "read failed, tearing down");
                break;
            }
        };

        let Some(mut guard) = state.registry.lookup_and_lock(handle).await else {
            break; // removed concurrently, e.g. by the idle sweeper
        };
        guard.touch();
        drop(guard);

        if !buffer.append(&read_buf[..n]) {
            tracing::warn!(%handle, "inbound buffer overflow, frame discarded");
            continue;
        }

        while let Some(line) = buffer.extract_line() {
            match dispatch(state, handle, &common_name, &line).await {
                DispatchOutcome::Reply(text) => {
                    if !write_reply(state, handle, &text).await {
                        break 'connection;
                    }
                }
                DispatchOutcome::NoReply => {}
                DispatchOutcome::Fatal => break 'connection,
            }
        }
    }

    state.topics.unsubscribe_all(handle);
    state.registry.remove(handle).await;
}

async fn verify_peer_identity(state: &AppState, hostname: &str, peer_addr: SocketAddr) -> bool {
    match peer_addr.ip() {
        IpAddr::V4(ip) => state.resolver.verify_identity(hostname, ip).await,
        // The resolver (§6) only speaks A records; an agent connecting over IPv6 can
        // never be corroborated and is rejected, matching the source's IPv4-only
        // `auth_verify_identity`.
        IpAddr::V6(_) => false,
    }
}

async fn write_reply(state: &AppState, handle: ConnectionHandle, text: &str) -> bool {
    let Some(mut guard) = state.registry.lookup_and_lock(handle).await else {
        return false;
    };
    let Some(tls) = guard.tls.as_mut() else {
        return false;
    };
    tls.write_all(text.as_bytes()).await.is_ok()
}

enum DispatchOutcome {
    Reply(String),
    NoReply,
    Fatal,
}

async fn dispatch(state: &AppState, handle: ConnectionHandle, identity: &str, line: &str) -> DispatchOutcome {
    let line = line.trim_end_matches('\r');
    let Some(parsed) = Command::parse(line) else {
        return DispatchOutcome::NoReply; // blank line, skipped per §4.5
    };

    let command = match parsed {
        Ok(command) => command,
        Err(err) => return reply_for(&err),
    };

    match command {
        Command::Subscribe { topic } => {
            if !state.access.can_subscribe(identity, &topic) {
                return DispatchOutcome::Reply(access_denied());
            }
            match state.topics.subscribe(handle, &topic) {
                Ok(()) => DispatchOutcome::Reply(format!("Subscribed to {topic}\n")),
                Err(BrokerError::Capacity(reason)) => {
                    tracing::warn!(%handle, topic, reason, "subscription silently dropped at capacity");
                    DispatchOutcome::NoReply
                }
                Err(err) => reply_for(&err),
            }
        }
        Command::Unsubscribe { topic } => {
            if !state.access.can_unsubscribe(identity, &topic) {
                return DispatchOutcome::Reply(access_denied());
            }
            state.topics.unsubscribe(handle, &topic);
            DispatchOutcome::Reply(format!("Unsubscribed from {topic}\n"))
        }
        Command::Publish { topic, payload } => {
            if !state.access.can_publish(identity, &topic) {
                return DispatchOutcome::Reply(access_denied());
            }
            if let Err(err) = state.store.log(identity, &topic, &payload).await {
                tracing::error!(error = %err, "audit log write failed");
            }
            let registry = &state.registry;
            state
                .topics
                .publish(&topic, &payload, |target, frame| async move { deliver_frame(registry, target, frame).await })
                .await;
            DispatchOutcome::Reply(format!("Published to {topic}\n"))
        }
        Command::Set { key, value } => {
            if !state.access.can_set(identity, &key) {
                return DispatchOutcome::Reply(access_denied());
            }
            match state.store.set_state(identity, &key, &value).await {
                Ok(()) => DispatchOutcome::Reply(format!("SUCCESS: State '{key}' updated.\n")),
                Err(err) => {
                    tracing::error!(error = %err, "state write failed");
                    DispatchOutcome::Reply("ERROR: Invalid command.\n".to_owned())
                }
            }
        }
        Command::Get { key } => match state.store.get_state(identity, &key).await {
            Ok(Some(record)) => DispatchOutcome::Reply(format!("VALUE: {key}={}\n", record.value)),
            Ok(None) => reply_for(&BrokerError::NotFound(key)),
            Err(err) => {
                tracing::error!(error = %err, "state read failed");
                DispatchOutcome::Reply("ERROR: Invalid command.\n".to_owned())
            }
        },
        Command::Ping => DispatchOutcome::Reply("PONG\n".to_owned()),
        // Activity timestamp is already refreshed on every read; nothing else to do.
        Command::Pong => DispatchOutcome::NoReply,
    }
}

fn reply_for(err: &BrokerError) -> DispatchOutcome {
    match err.wire_reply() {
        Some(text) => DispatchOutcome::Reply(text),
        None => DispatchOutcome::Fatal,
    }
}

fn access_denied() -> String {
    BrokerError::AccessDenied.wire_reply().expect("access denied always has a wire reply")
}

async fn deliver_frame(registry: &broker_registry::ConnectionRegistry, handle: ConnectionHandle, frame: String) -> bool {
    let Some(mut guard) = registry.lookup_and_lock(handle).await else {
        return false; // stale subscriber
    };
    let Some(tls) = guard.tls.as_mut() else {
        return false;
    };
    tls.write_all(frame.as_bytes()).await.is_ok()
}

/// The enrollment (lobby) port's single synchronous request/response, per §4.5. Never
/// touches the registry, topic index, or state store.
pub async fn handle_enrollment_connection(state: &AppState, mut stream: TcpStream, peer_addr: SocketAddr) {
    let mut buf = vec![0u8; ENROLLMENT_READ_LIMIT];
    let n = match stream.read(&mut buf).await {
        Ok(n) if n > 0 => n,
        _ => return,
    };
    let request = String::from_utf8_lossy(&buf[..n]).into_owned();

    let Some(first_line_end) = request.find('\n') else {
        let _ = stream.write_all(b"ERROR: Malformed enrollment request.\n").await;
        return;
    };
    let first_line = request[..first_line_end].trim_end_matches('\r');
    let Some(hostname) = first_line.strip_prefix("ENROLL ") else {
        let _ = stream.write_all(b"ERROR: Malformed enrollment request.\n").await;
        return;
    };
    let hostname = hostname.trim();

    if !verify_peer_identity(state, hostname, peer_addr).await {
        let _ = stream
            .write_all(b"ERROR: Security violation. IP does not match DNS.\n")
            .await;
        return;
    }

    let remainder = &request[first_line_end + 1..];
    let csr_pem = match CaSigner::extract_csr_block(remainder) {
        Ok(block) => block,
        Err(_) => {
            let _ = stream.write_all(b"ERROR: No certificate request found.\n").await;
            return;
        }
    };

    match state.ca.sign_csr(csr_pem) {
        Ok(cert_pem) => {
            let mut response = String::from("SUCCESS: Certificate generated.\n");
            response.push_str(&cert_pem);
            let _ = stream.write_all(response.as_bytes()).await;
            tracing::info!(hostname, "issued certificate via enrollment");
        }
        Err(err) => {
            tracing::warn!(hostname, error = %err, "CSR signing failed");
            let _ = stream.write_all(format!("ERROR: {err}\n").as_bytes()).await;
        }
    }
}

/// Periodically evicts connections idle past the threshold (§5: every
/// `SWEEP_INTERVAL_SECS`, any `authenticated` connection idle more than
/// `IDLE_TIMEOUT_SECS` is removed).
pub async fn sweep_loop(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
    loop {
        ticker.tick().await;
        let idle = state.registry.sweep_idle(Duration::from_secs(IDLE_TIMEOUT_SECS)).await;
        for handle in idle {
            tracing::info!(%handle, "sweeping idle connection");
            state.topics.unsubscribe_all(handle);
            state.registry.remove(handle).await;
        }
    }
}
