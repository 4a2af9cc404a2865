mod cli;
mod config;

use broker_core::limits::BROADCAST_TOPIC;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::cli::{Action, Cli};
use crate::config::AgentConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = AgentConfig::load(&cli.config)?;

    let client_config = broker_transport_tls::build_agent_client_config(&config.cert_path, &config.key_path, &config.ca_path)?;
    let connector = TlsConnector::from(client_config);

    let addr = format!("{}:{}", config.broker_ip, config.broker_port);
    let tcp = TcpStream::connect(&addr).await?;

    let server_name = rustls_pki_types::ServerName::try_from(config.broker_ip.clone())
        .map_err(|_| format!("'{}' is not a valid TLS server name", config.broker_ip))?;
    let tls = connector.connect(server_name, tcp).await?;

    match cli.action {
        Action::Set { key, value } => one_shot(tls, format!("SET {key} {value}\n")).await,
        Action::Get { key } => one_shot(tls, format!("GET {key}\n")).await,
        Action::Run => run(tls, &config.command_group).await,
    }
}

/// Sends one frame, prints exactly one reply line, exits — §6's "agent one-shot CLI".
async fn one_shot(
    tls: tokio_rustls::client::TlsStream<TcpStream>,
    frame: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let (read_half, mut write_half) = tokio::io::split(tls);
    write_half.write_all(frame.as_bytes()).await?;

    let mut lines = BufReader::new(read_half).lines();
    if let Some(line) = lines.next_line().await? {
        println!("{line}");
    }
    Ok(())
}

/// Long-lived subscribe mode: subscribes to `command_group` and the distinguished
/// `BROADCAST` topic on connect, then prints every inbound `[topic] payload` frame until
/// the process is interrupted.
async fn run(tls: tokio_rustls::client::TlsStream<TcpStream>, command_group: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (read_half, mut write_half) = tokio::io::split(tls);
    write_half.write_all(format!("SUBSCRIBE {command_group}\n").as_bytes()).await?;
    write_half.write_all(format!("SUBSCRIBE {BROADCAST_TOPIC}\n").as_bytes()).await?;

    let mut lines = BufReader::new(read_half).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => println!("{line}"),
                    None => break, // broker closed the connection
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("caught ctrl-c, disconnecting");
                break;
            }
        }
    }
    Ok(())
}
