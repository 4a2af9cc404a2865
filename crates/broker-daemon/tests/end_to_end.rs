//! Drives the event engine over real sockets with self-signed test certificates and a
//! static DNS table (§10.7): no live DNS, no real CA, no shelling out.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use broker_core::HandleAllocator;
use broker_daemon::engine::{Task, handle_vault_connection};
use broker_daemon::state::AppState;
use broker_pki::{CaSigner, IdentityResolver};
use broker_registry::ConnectionRegistry;
use broker_router::{AccessPolicy, TopicIndex};
use broker_store::{StateStore, Store};
use rcgen::{CertificateParams, DnType, Issuer, KeyPair};
use rustls_pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_rustls::TlsConnector;

struct TestFixture {
    state: Arc<AppState>,
    client_config: Arc<rustls::ClientConfig>,
}

fn write_temp(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn build_fixture(agent_common_name: &str, agent_ip: Ipv4Addr, policy_text: &str) -> TestFixture {
    let dir = std::env::temp_dir().join(format!(
        "broker-daemon-e2e-{}-{}",
        std::process::id(),
        agent_common_name.replace(['.', '-'], "_")
    ));
    std::fs::create_dir_all(&dir).unwrap();

    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();
    let ca_cert_path = write_temp(&dir, "ca.crt", &ca_cert.pem());
    let ca_key_path = write_temp(&dir, "ca.key", &ca_key.serialize_pem());
    let issuer = Issuer::from_ca_cert_pem(&ca_cert.pem(), &ca_key).unwrap();

    let server_key = KeyPair::generate().unwrap();
    let server_params = CertificateParams::new(vec!["localhost".into()]).unwrap();
    let server_cert = server_params.signed_by(&server_key, &issuer).unwrap();
    let server_cert_path = write_temp(&dir, "server.crt", &server_cert.pem());
    let server_key_path = write_temp(&dir, "server.key", &server_key.serialize_pem());

    let client_key = KeyPair::generate().unwrap();
    let mut client_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    client_params.distinguished_name.push(DnType::CommonName, agent_common_name);
    let client_cert = client_params.signed_by(&client_key, &issuer).unwrap();
    let client_cert_path = write_temp(&dir, "client.crt", &client_cert.pem());
    let client_key_path = write_temp(&dir, "client.key", &client_key.serialize_pem());

    let vault_tls = broker_transport_tls::build_vault_server_config(&server_cert_path, &server_key_path, &ca_cert_path).unwrap();
    let client_config = broker_transport_tls::build_agent_client_config(&client_cert_path, &client_key_path, &ca_cert_path).unwrap();
    let ca = CaSigner::load(&ca_cert_path, &ca_key_path).unwrap();

    let mut records = HashMap::new();
    records.insert(agent_common_name.to_owned(), vec![agent_ip]);

    let state = Arc::new(AppState {
        registry: ConnectionRegistry::new(),
        topics: TopicIndex::new(),
        access: AccessPolicy::from_str(policy_text),
        store: Store::open_in_memory().unwrap(),
        resolver: IdentityResolver::with_static_records(records),
        ca,
        allocator: HandleAllocator::new(),
        vault_tls,
    });

    TestFixture { state, client_config }
}

const POLICY: &str = r#"
[role:DEFAULT]
SUBSCRIBE = *
PUBLISH = a,b*
SET = uptime

[map]
agent-01.example = DEFAULT
"#;

/// Scenario 1 (§8): happy-path subscribe/publish between two authenticated agents.
#[tokio::test]
async fn happy_path_subscribe_and_publish() {
    let fixture = build_fixture("agent-01.example", Ipv4Addr::new(127, 0, 0, 1), POLICY);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let state = Arc::clone(&fixture.state);
    let server = tokio::spawn(async move {
        let (stream, peer_addr) = listener.accept().await.unwrap();
        handle_vault_connection(&state, Task { stream, peer_addr }).await;
    });

    let connector = TlsConnector::from(Arc::clone(&fixture.client_config));
    let tcp = tokio::net::TcpStream::connect(addr).await.unwrap();
    let tls = connector.connect(ServerName::try_from("localhost").unwrap(), tcp).await.unwrap();
    let (read_half, mut write_half) = tokio::io::split(tls);
    let mut lines = BufReader::new(read_half).lines();

    write_half.write_all(b"SUBSCRIBE b-topic\n").await.unwrap();
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("Subscribed to b-topic"));

    // Self-subscribed on the topic it publishes to: the fan-out delivery is written to
    // the wire before the PUBLISH acknowledgment (dispatch() fans out, then returns the
    // reply for the caller to write), so the frame arrives first.
    write_half.write_all(b"PUBLISH b-topic reboot now\n").await.unwrap();
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("[b-topic] reboot now"));
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("Published to b-topic"));

    drop(write_half);
    drop(lines);
    let _ = server.await;
}

/// Scenario 2 (§8): access denied, no audit record written.
#[tokio::test]
async fn access_denied_writes_no_audit_record() {
    let fixture = build_fixture("agent-01.example", Ipv4Addr::new(127, 0, 0, 1), POLICY);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let state = Arc::clone(&fixture.state);
    let server = tokio::spawn(async move {
        let (stream, peer_addr) = listener.accept().await.unwrap();
        handle_vault_connection(&state, Task { stream, peer_addr }).await;
    });

    let connector = TlsConnector::from(Arc::clone(&fixture.client_config));
    let tcp = tokio::net::TcpStream::connect(addr).await.unwrap();
    let tls = connector.connect(ServerName::try_from("localhost").unwrap(), tcp).await.unwrap();
    let (read_half, mut write_half) = tokio::io::split(tls);
    let mut lines = BufReader::new(read_half).lines();

    write_half.write_all(b"PUBLISH c hi\n").await.unwrap();
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ERROR: Access denied."));

    drop(write_half);
    drop(lines);
    let _ = server.await;
    assert_eq!(fixture.state.store.audit_len().await.unwrap(), 0);
}

/// Scenario 6 (§8): identity mismatch at the vault port tears the connection down with
/// no reply at all (the handshake-phase identity check is fatal, per §7).
#[tokio::test]
async fn identity_mismatch_closes_without_a_reply() {
    let fixture = build_fixture("agent-01.example", Ipv4Addr::new(10, 0, 0, 9), POLICY);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let state = Arc::clone(&fixture.state);
    let server = tokio::spawn(async move {
        let (stream, peer_addr) = listener.accept().await.unwrap();
        handle_vault_connection(&state, Task { stream, peer_addr }).await;
    });

    let connector = TlsConnector::from(Arc::clone(&fixture.client_config));
    let tcp = tokio::net::TcpStream::connect(addr).await.unwrap();
    let tls = connector.connect(ServerName::try_from("localhost").unwrap(), tcp).await.unwrap();
    let (read_half, mut write_half) = tokio::io::split(tls);
    let mut lines = BufReader::new(read_half).lines();

    let _ = write_half.write_all(b"PING\n").await;
    assert_eq!(lines.next_line().await.unwrap(), None);

    let _ = server.await;
    assert_eq!(fixture.state.registry.len(), 0);
}
