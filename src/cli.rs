use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, long_about = None)]
#[command(about = "Passively discover network assets from a mirror port or a capture file.")]
pub struct Cli {
    /// Path to the YAML config file (./config.yaml is used when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen on a network interface in real time
    Live {
        /// Network interface to capture on (e.g. eth0); lists available
        /// devices when omitted
        #[arg(short, long, env = "SPANWATCH_INTERFACE")]
        interface: Option<String>,
    },
    /// Replay a capture file to end of file
    Offline {
        /// Path to the capture file
        #[arg(short, long)]
        file: PathBuf,
    },
}
