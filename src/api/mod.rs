/// HTTP API surface
///
/// A thin boundary over the record store and the directory service: the
/// WebFinger discovery endpoint, person management routes, and a health
/// probe. All domain behavior lives below this layer.

pub mod person;
pub mod webfinger;

use crate::context::AppContext;
use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

/// Health probe payload
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub version: String,
    pub status: String,
}

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .merge(webfinger::routes())
        .nest("/api/person", person::routes())
        .route("/health", get(health))
        .with_state(ctx)
}

async fn health(State(ctx): State<AppContext>) -> Json<ServiceStatus> {
    Json(ServiceStatus {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: ctx.config.service.version.clone(),
        status: "ok".to_string(),
    })
}
