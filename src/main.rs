use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port = std::env::var("DOORMAN_HTTP_PORT").unwrap_or_else(|_| "8080".to_string());
    let issuer = std::env::var("DOORMAN_AUTH_ISSUER").unwrap_or_else(|_| "doorman".to_string());
    let store_url = std::env::var("DOORMAN_SESSION_REDIS_URL").unwrap_or_else(|_| "<in-process>".to_string());
    let relaxed = std::env::var("DOORMAN_AUTH_RELAXED").unwrap_or_else(|_| "false".to_string());
    info!(
        target: "doorman",
        "doorman starting: RUST_LOG='{}', http_port={}, issuer='{}', session_store='{}', relaxed={}",
        rust_log, http_port, issuer, store_url, relaxed
    );

    doorman::server::run().await
}
