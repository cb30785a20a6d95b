use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mecanum_can_runtime::config::VehicleConfig;
use mecanum_can_runtime::runtime::{self, Mode, RunOptions};

/// Mecanum base runtime: CAN motor control with manual and vision alignment modes
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON vehicle config (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where motion commands come from
    #[arg(long, value_enum, default_value_t = Mode::Manual)]
    mode: Mode,

    /// Use loopback transports instead of SocketCAN
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let config = match args.config {
        Some(path) => match VehicleConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => VehicleConfig::default(),
    };

    let options = RunOptions {
        config,
        mode: args.mode,
        simulate: args.simulate,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
