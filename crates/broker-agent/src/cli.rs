use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// agent — connects to a broker's vault port over mTLS and issues commands.
#[derive(Debug, Parser)]
#[command(name = "agent", version, about)]
pub struct Cli {
    /// Path to the agent's `key=value` configuration file.
    #[arg(long, default_value = "agent.conf")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Debug, Subcommand)]
pub enum Action {
    /// One-shot: SET a state key, print the reply, exit.
    Set {
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
    },
    /// One-shot: GET a state key, print the reply, exit.
    Get {
        #[arg(long)]
        key: String,
    },
    /// Long-lived: subscribe to `command_group` and print inbound frames until killed.
    Run,
}
