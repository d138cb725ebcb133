//! Logger setup: log4rs from a YAML file, env_logger when that is unavailable.

use std::path::Path;

use crate::config::LoggingConfig;

pub fn init(config: &LoggingConfig) {
    if Path::new(&config.config_file).exists() {
        match log4rs::init_file(&config.config_file, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!("Failed to load log config {}: {}", config.config_file, e),
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
