use std::net::TcpListener;

use log::{info, warn};

use curldrop::app_state::AppState;
use curldrop::config::AppConfig;
use curldrop::{logging, server};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config_path = AppConfig::source_path();
    let config = AppConfig::load_from(&config_path).map_err(|e| std::io::Error::other(e.to_string()))?;
    logging::init(&config.logging);
    if config_path.exists() {
        info!("Loaded configuration from {}", config_path.display());
    } else {
        warn!("Config file {} not found, using defaults", config_path.display());
    }

    let app_state = AppState::from_config(config.clone()).map_err(std::io::Error::other)?;

    if config.expiration.enabled {
        app_state.expiration_worker().start_background();
    } else {
        warn!("Expiration worker disabled, uploads are kept forever");
    }

    info!("Starting server on {}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port))?;
    server::build(listener, app_state, config.server.workers)?.await
}
