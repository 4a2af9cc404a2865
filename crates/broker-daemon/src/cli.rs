use std::path::PathBuf;

use clap::Parser;

/// brokerd — the vault/lobby pub-sub broker.
#[derive(Debug, Parser)]
#[command(name = "brokerd", version, about)]
pub struct Cli {
    /// Path to the broker's `key=value` configuration file.
    #[arg(long, default_value = "broker.conf")]
    pub config: PathBuf,
}
