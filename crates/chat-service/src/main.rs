//! Chat service entry point.
//!
//! Run with:
//! ```bash
//! cargo run -p chat-service
//! ```
//!
//! Configuration comes from the YAML file named by `CHAT_CONFIG`
//! (default `configs/chat.yaml`).

use chat_common::{try_init_tracing, AppConfig, TracingConfig};
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "configs/chat.yaml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Chat service failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(DEFAULT_CONFIG_PATH)?;

    let tracing_config = TracingConfig::for_production(config.server.env.is_production());
    if let Err(e) = try_init_tracing(tracing_config) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.server.env,
        games = config.games.len(),
        "Starting chat service"
    );

    chat_service::server::run(config).await?;

    Ok(())
}
