use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use prompt_scoring::network::http_api;
use prompt_scoring::ServiceConfig;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match ServiceConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let scorer = match config.build_scorer() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to build scorer: {}", e);
            std::process::exit(1);
        }
    };
    info!("Grading with model {} via {}", config.model, config.base_url);

    if let Err(e) = http_api::start(&config.bind_addr, scorer).await {
        error!("Failed to bind HTTP API on {}: {}", config.bind_addr, e);
        std::process::exit(1);
    }
}
