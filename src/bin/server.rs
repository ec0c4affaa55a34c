use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use clinic_gate::app::AppState;
use clinic_gate::config::AuthConfig;
use clinic_gate::handlers::routes;
use clinic_gate::notify::LogNotifier;
use clinic_gate::security_logger::{init_security_logger, log_security_event, SecurityEvent};
use clinic_gate::storage::{MemoryStore, SessionRevocationStore};

#[tokio::main]
async fn main() {
    // Initialize env
    match dotenvy::dotenv() {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    // Initialize logging
    env_logger::init();
    init_security_logger();

    // Secrets are resolved once here; a production misconfiguration stops startup
    let config = match AuthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log_security_event(SecurityEvent::ConfigurationError {
                component: "auth_config".to_string(),
                error: e.to_string(),
            })
            .await;
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, environment={}",
        config.host, config.port, config.environment
    );

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    if config.production {
        warn!("Running with the in-memory store; all state is lost on restart");
    }

    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(LogNotifier::new(config.development_mode));
    let state = match AppState::new(store.clone(), notifier, config) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize services: {}", e);
            std::process::exit(1);
        }
    };

    spawn_revocation_cleanup(store);

    info!("Starting clinic-gate on {}", addr);
    warp::serve(routes(state)).run(addr).await;
}

// Periodically drop revocations whose tokens have expired anyway
fn spawn_revocation_cleanup(store: Arc<MemoryStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match store.purge_expired_revocations(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => info!("Purged {} expired session revocations", purged),
                Err(e) => error!("Revocation cleanup failed: {}", e),
            }
        }
    });
}
