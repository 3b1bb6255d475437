use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use roboclaw_zenoh_runtime::config::Cli;

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let cli = Cli::parse();
    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting roboclaw runtime with params:");
    info!("Port:\t{} @ {} baud", config.port, config.baud_rate);
    info!("Base Width:\t{}", config.wheel_base_meters);
    info!("Ticks Per Metre:\t{}", config.ticks_per_meter);
    info!("KP:\t{}  KI:\t{}  KD:\t{}", config.kp, config.ki, config.kd);
    info!("QPPS:\t{}", config.qpps);

    if let Err(e) = roboclaw_zenoh_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
