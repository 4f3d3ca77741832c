/// Person management endpoints
///
/// CRUD over the record store. Internal sequential ids never appear on the
/// wire; routes take the hashid-encoded public form.
use crate::{
    context::AppContext,
    error::{DirectoryError, DirectoryResult},
    model::{normalize_locator, Account, Link, Person, RecordFilter},
};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonDto {
    pub id: String,
    pub name: String,
    pub email: String,
    pub locators: Vec<String>,
    pub aliases: Vec<String>,
    pub links: Vec<Link>,
    pub account: Account,
}

impl PersonDto {
    fn from_person(person: &Person, ctx: &AppContext) -> Self {
        Self {
            id: ctx.id_codec.encode(person.id),
            name: person.name.clone(),
            email: person.email.clone(),
            locators: person.locators.iter().cloned().collect(),
            aliases: person.aliases.iter().cloned().collect(),
            links: person.links.clone(),
            account: person.account.clone(),
        }
    }
}

/// Create/replace payload; canonical aliases and links are regenerated
/// from the account, never taken from the caller
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertPersonDto {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub locators: Vec<String>,
    pub server: String,
    pub handle: String,
}

impl UpsertPersonDto {
    fn into_person(self) -> Person {
        let account = Account::new(self.server, self.handle);

        Person {
            id: 0,
            name: self.name,
            email: self.email,
            locators: self
                .locators
                .iter()
                .map(|loc| normalize_locator(loc))
                .collect::<BTreeSet<_>>(),
            aliases: account.aliases().into_iter().collect(),
            links: account.links(),
            account,
        }
    }
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(get_by_id).put(update).delete(remove))
}

async fn list(State(ctx): State<AppContext>) -> Json<Vec<PersonDto>> {
    let people = ctx
        .store
        .list_all()
        .iter()
        .map(|person| PersonDto::from_person(person, &ctx))
        .collect();

    Json(people)
}

async fn get_by_id(
    State(ctx): State<AppContext>,
    Path(public_id): Path<String>,
) -> DirectoryResult<Json<PersonDto>> {
    let person = decode_id(&ctx, &public_id)
        .and_then(|id| ctx.store.get(&RecordFilter::by_id(id)))
        .ok_or_else(|| DirectoryError::NotFound(format!("person {} not found", public_id)))?;

    Ok(Json(PersonDto::from_person(&person, &ctx)))
}

async fn create(
    State(ctx): State<AppContext>,
    Json(dto): Json<UpsertPersonDto>,
) -> DirectoryResult<Response> {
    let inserted = ctx.store.insert(dto.into_person()).await?;
    let location = format!("/api/person/{}", ctx.id_codec.encode(inserted.id));

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(PersonDto::from_person(&inserted, &ctx)),
    )
        .into_response())
}

async fn update(
    State(ctx): State<AppContext>,
    Path(public_id): Path<String>,
    Json(dto): Json<UpsertPersonDto>,
) -> DirectoryResult<Response> {
    let id = decode_id(&ctx, &public_id)
        .ok_or_else(|| DirectoryError::NotFound(format!("person {} not found", public_id)))?;

    ctx.store.update(dto.into_person().with_id(id)).await?;
    Ok(StatusCode::ACCEPTED.into_response())
}

async fn remove(
    State(ctx): State<AppContext>,
    Path(public_id): Path<String>,
) -> DirectoryResult<Response> {
    let person = decode_id(&ctx, &public_id)
        .and_then(|id| ctx.store.get(&RecordFilter::by_id(id)))
        .ok_or_else(|| DirectoryError::NotFound(format!("person {} not found", public_id)))?;

    ctx.store.delete(&person).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn decode_id(ctx: &AppContext, public_id: &str) -> Option<i64> {
    ctx.id_codec.decode(public_id)
}
