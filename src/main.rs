use fingerpost::{config::ServerConfig, context::AppContext, error::DirectoryResult, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> DirectoryResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fingerpost=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load and validate configuration
    let config = ServerConfig::from_env()?;
    config.validate()?;

    // Build the storage backend, indices, and caches
    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await
}
