use std::process;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use spanwatch::cli::{Cli, Command};
use spanwatch::config::Config;
use spanwatch::engine::Engine;
use spanwatch::network::capture;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    // RUST_LOG wins when set; --verbose only lifts the default level.
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    match args.command {
        Command::Live { interface } => {
            if let Some(interface) = interface {
                config.capture.interface = interface;
            }

            if config.capture.interface.is_empty() {
                if let Err(e) = capture::list_interfaces() {
                    error!("{e}");
                    process::exit(1);
                }
                return;
            }

            info!("starting live capture on {}", config.capture.interface);
            if let Err(e) = Engine::new(config).run_live().await {
                error!("live capture failed: {e}");
                process::exit(1);
            }
        }
        Command::Offline { file } => {
            if let Err(e) = Engine::new(config).run_offline(&file).await {
                error!("offline analysis failed: {e}");
                process::exit(1);
            }
        }
    }
}
