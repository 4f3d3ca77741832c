/// HTTP server setup
use crate::{api, context::AppContext, error::DirectoryResult};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub async fn serve(ctx: AppContext) -> DirectoryResult<()> {
    let addr = format!(
        "{}:{}",
        ctx.config.service.hostname, ctx.config.service.port
    );

    let app = api::router(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
