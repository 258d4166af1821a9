//! Stand-alone admin server for the Google Drive node.
//!
//! Serves the authorization handshake and the editor's file lookups over a
//! file-backed credential store. Configured through `DRIVE_NODE_*`
//! environment variables; set `DRIVE_NODE_LOG_FORMAT=json` for JSON logs.

use std::sync::Arc;

use integrations_google_drive_node::admin::{router, AdminState};
use integrations_google_drive_node::config::AdminConfig;
use integrations_google_drive_node::credentials::{FileCredentialStore, TokenStore};
use integrations_google_drive_node::transport::ReqwestTransport;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,integrations_google_drive_node=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("DRIVE_NODE_LOG_FORMAT").as_deref() == Ok("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AdminConfig::from_env()?;

    let backend = FileCredentialStore::open(config.store_dir.clone()).await?;
    let store = Arc::new(TokenStore::new(Arc::new(backend)));
    let http = reqwest::Client::builder().timeout(config.drive.timeout).build()?;
    let transport = Arc::new(ReqwestTransport::new(http.clone()));

    let state = AdminState::new(store, config.oauth, http, config.drive, transport);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(
        addr = %config.bind_addr,
        store_dir = %config.store_dir.display(),
        "Drive node admin server listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        error!(error = %e, "Admin server failed");
        std::process::exit(1);
    }
}
