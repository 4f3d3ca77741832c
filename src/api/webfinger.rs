/// WebFinger discovery and profile management endpoints
use crate::{
    context::AppContext,
    error::{DirectoryError, DirectoryResult},
    model::{normalize_locator, rel, Account, ProfileRecord, RecordFilter},
    service::UpsertProfileRequest,
};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use axum_extra::extract::Query;
use serde::{Deserialize, Serialize};

/// Content type mandated for JRD responses
pub const JRD_CONTENT_TYPE: &str = "application/jrd+json";

/// Query string of a discovery request: a resource locator plus zero or
/// more `rel` filters
#[derive(Debug, Deserialize)]
pub struct WebFingerQuery {
    pub resource: String,
    #[serde(default)]
    pub rel: Vec<String>,
}

/// Management payload: the account plus the locators that should resolve
/// to its profile
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpsertDto {
    pub server: String,
    pub handle: String,
    #[serde(default)]
    pub locators: Vec<String>,
}

impl ProfileUpsertDto {
    fn into_request(self) -> UpsertProfileRequest {
        UpsertProfileRequest {
            account: Account::new(self.server, self.handle),
            locators: self.locators,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub server: String,
    pub handle: String,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/.well-known/webfinger", get(resolve))
        .route("/:handle", get(profile_redirect))
        .route(
            "/api/webfinger",
            axum::routing::post(add_profile)
                .patch(update_profile)
                .delete(delete_profile),
        )
}

/// `GET /.well-known/webfinger?resource=acct:...&rel=...`
///
/// Resolved against the record store; the only outcomes at this boundary
/// are a (possibly link-filtered) document or not-found.
async fn resolve(
    State(ctx): State<AppContext>,
    Query(query): Query<WebFingerQuery>,
) -> DirectoryResult<Response> {
    let filter =
        RecordFilter::by_locator(normalize_locator(&query.resource)).with_relationships(query.rel);

    let person = ctx.store.get(&filter).ok_or_else(|| {
        DirectoryError::NotFound("Cannot find the requested resource".to_string())
    })?;

    Ok(jrd_response(person.profile()))
}

/// `GET /@handle` — redirect to the profile page published for
/// `acct:handle@{public domain}`
async fn profile_redirect(
    State(ctx): State<AppContext>,
    Path(handle): Path<String>,
) -> DirectoryResult<Response> {
    let handle = handle
        .strip_prefix('@')
        .ok_or_else(|| DirectoryError::NotFound("Unknown route".to_string()))?;

    let locator = normalize_locator(&format!(
        "{}@{}",
        handle, ctx.config.service.public_domain
    ));

    let profile_href = ctx
        .directory
        .lookup(&locator, &[rel::PROFILE_PAGE.to_string()])
        .await?
        .and_then(|record| record.links)
        .and_then(|links| links.into_iter().next())
        .and_then(|link| link.href);

    match profile_href {
        Some(href) => Ok(Redirect::temporary(&href).into_response()),
        None => Err(DirectoryError::NotFound(format!(
            "no profile page for {}",
            locator
        ))),
    }
}

async fn add_profile(
    State(ctx): State<AppContext>,
    Json(dto): Json<ProfileUpsertDto>,
) -> DirectoryResult<Response> {
    let record = ctx.directory.add(dto.into_request()).await?;
    let location = format!("/.well-known/webfinger?resource={}", record.subject);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(record),
    )
        .into_response())
}

async fn update_profile(
    State(ctx): State<AppContext>,
    Json(dto): Json<ProfileUpsertDto>,
) -> DirectoryResult<Response> {
    let record = ctx.directory.update(dto.into_request()).await?;
    Ok((StatusCode::ACCEPTED, Json(record)).into_response())
}

async fn delete_profile(
    State(ctx): State<AppContext>,
    Json(dto): Json<AccountDto>,
) -> DirectoryResult<Response> {
    let account = Account::new(dto.server, dto.handle);

    if ctx.directory.delete(&account).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(DirectoryError::NotFound(format!(
            "no profile for account [{}]",
            account.key()
        )))
    }
}

fn jrd_response(record: ProfileRecord) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, JRD_CONTENT_TYPE)],
        Json(record),
    )
        .into_response()
}
