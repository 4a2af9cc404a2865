use std::sync::Arc;
use std::time::Duration;

use broker_core::HandleAllocator;
use broker_core::limits::{DEFAULT_WORKER_COUNT, TASK_QUEUE_CAPACITY};
use broker_daemon::cli::Cli;
use broker_daemon::config::Config;
use broker_daemon::engine::{Task, handle_enrollment_connection, sweep_loop, vault_worker};
use broker_daemon::state::AppState;
use broker_pki::{CaSigner, IdentityResolver};
use broker_registry::ConnectionRegistry;
use broker_router::{AccessPolicy, TopicIndex};
use broker_store::Store;
use broker_transport_tcp::TcpListener;
use clap::Parser;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};

/// How long graceful shutdown waits for in-flight workers to drain before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let access = AccessPolicy::load(&config.access_policy_path)?;
    let vault_tls = broker_transport_tls::build_vault_server_config(&config.cert_path, &config.key_path, &config.ca_path)?;
    let store = Store::open(&config.db_path)?;
    let ca = CaSigner::load(&config.ca_path, &config.ca_key_path())?;
    let resolver = IdentityResolver::from_system_config();

    let state = Arc::new(AppState {
        registry: ConnectionRegistry::new(),
        topics: TopicIndex::new(),
        access,
        store,
        resolver,
        ca,
        allocator: HandleAllocator::new(),
        vault_tls,
    });

    let bind_addr = |port: u16| std::net::SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), port);
    let vault_listener = TcpListener::bind(bind_addr(config.vault_port)).await?;
    let lobby_listener = TcpListener::bind(bind_addr(config.lobby_port)).await?;
    tracing::info!(vault_port = config.vault_port, lobby_port = config.lobby_port, "brokerd started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (task_tx, task_rx) = mpsc::channel::<Task>(TASK_QUEUE_CAPACITY);
    let task_rx = Arc::new(AsyncMutex::new(task_rx));

    let mut worker_handles = Vec::new();
    for _ in 0..DEFAULT_WORKER_COUNT {
        let state = Arc::clone(&state);
        let rx = Arc::clone(&task_rx);
        worker_handles.push(tokio::spawn(vault_worker(state, rx)));
    }

    let sweeper = tokio::spawn(sweep_loop(Arc::clone(&state)));

    let vault_acceptor = tokio::spawn(run_vault_acceptor(vault_listener, task_tx, shutdown_rx.clone()));
    let lobby_acceptor = tokio::spawn(run_lobby_acceptor(lobby_listener, Arc::clone(&state), shutdown_rx.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining connections");
    let _ = shutdown_tx.send(true);

    let _ = vault_acceptor.await;
    let _ = lobby_acceptor.await;
    sweeper.abort();

    let abort_handles: Vec<_> = worker_handles.iter().map(|h| h.abort_handle()).collect();
    let drain = async {
        for handle in worker_handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!("grace period elapsed with workers still draining; aborting remaining workers");
        for abort_handle in abort_handles {
            abort_handle.abort();
        }
    }

    Ok(())
}

/// Accepts vault-port connections and hands each one to the worker pool's task queue,
/// backpressuring (per §4.1's "enqueue blocks when full") when every worker is busy.
async fn run_vault_acceptor(listener: TcpListener, task_tx: mpsc::Sender<Task>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        if task_tx.send(Task { stream, peer_addr }).await.is_err() {
                            break; // all workers gone
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "vault accept failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Accepts lobby-port connections and handles each enrollment request on its own task —
/// these are one-shot and synchronous, so they bypass the worker pool's task queue
/// entirely (§4.5: "Enrollment sessions are never registered with the topic index or
/// state store").
async fn run_lobby_acceptor(listener: TcpListener, state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            handle_enrollment_connection(&state, stream, peer_addr).await;
                        });
                    }
                    Err(err) => tracing::warn!(error = %err, "lobby accept failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
