use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::documents::remove_stored_objects;
use super::projects::{ProjectWithSummary, with_summaries};
use crate::db::Page;
use crate::error::{AppError, AppResult};
use crate::models::{Client, ClientPatch, NewClient};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/clients", get(list_clients).post(create_client))
        .route(
            "/clients/{id}",
            get(get_client).put(update_client).delete(delete_client),
        )
}

#[derive(Debug, Deserialize)]
struct ClientQuery {
    search: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientDetail {
    #[serde(flatten)]
    client: Client,
    projects: Vec<ProjectWithSummary>,
}

async fn list_clients(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClientQuery>,
) -> AppResult<Json<Vec<Client>>> {
    let page = Page::new(query.page, query.limit);
    let clients = state.db.list_clients(query.search.as_deref(), page).await?;
    Ok(Json(clients))
}

async fn get_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<ClientDetail>> {
    let client = state.db.get_client(id).await?.ok_or(AppError::NotFound("Client"))?;
    let projects = state.db.projects_for_client(id).await?;
    let projects = with_summaries(&state.db, projects).await?;

    Ok(Json(ClientDetail { client, projects }))
}

async fn create_client(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewClient>,
) -> AppResult<(StatusCode, Json<Client>)> {
    body.validate().map_err(AppError::BadRequest)?;

    let client = state.db.create_client(&body).await?;
    info!(client_id = client.id, "Created client");

    Ok((StatusCode::CREATED, Json(client)))
}

async fn update_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(patch): Json<ClientPatch>,
) -> AppResult<Json<Client>> {
    patch.validate().map_err(AppError::BadRequest)?;

    let mut client = state.db.get_client(id).await?.ok_or(AppError::NotFound("Client"))?;
    patch.apply(&mut client);

    let updated = state
        .db
        .update_client(&client)
        .await?
        .ok_or(AppError::NotFound("Client"))?;

    Ok(Json(updated))
}

async fn delete_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.db.get_client(id).await?.ok_or(AppError::NotFound("Client"))?;

    // Rows cascade; stored files have to be removed by hand
    let documents = state.db.documents_for_client(id).await?;
    remove_stored_objects(state.store.as_ref(), &documents).await;

    state.db.delete_client(id).await?;
    info!(client_id = id, documents = documents.len(), "Deleted client");

    Ok(StatusCode::NO_CONTENT)
}
