//! Project endpoints. Every project leaves the API with its financial summary
//! attached, computed from its payments at request time.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studio_finance::{FinancialSummary, Payment, Project, ProjectStatus};
use tracing::info;

use super::documents::remove_stored_objects;
use crate::db::{Database, Page, ProjectFilter};
use crate::error::{AppError, AppResult};
use crate::models::{Client, Document, NewProject, ProjectPatch, check_dates};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
}

/// Project with its derived summary
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithSummary {
    #[serde(flatten)]
    pub project: Project,
    pub financial_summary: FinancialSummary,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectDetail {
    #[serde(flatten)]
    project: Project,
    financial_summary: FinancialSummary,
    client: Option<Client>,
    payments: Vec<Payment>,
    documents: Vec<Document>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectQuery {
    page: Option<u32>,
    limit: Option<u32>,
    status: Option<String>,
    client_id: Option<i64>,
}

/// Attach summaries using one payment query for the whole batch
pub async fn with_summaries(
    db: &Database,
    projects: Vec<Project>,
) -> AppResult<Vec<ProjectWithSummary>> {
    let ids: Vec<i64> = projects.iter().map(|p| p.id).collect();
    let payments = db.payments_for_projects(&ids).await?;

    Ok(projects
        .into_iter()
        .map(|project| ProjectWithSummary {
            financial_summary: FinancialSummary::for_project(&project, &payments),
            project,
        })
        .collect())
}

async fn list_projects(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProjectQuery>,
) -> AppResult<Json<Vec<ProjectWithSummary>>> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<ProjectStatus>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let filter = ProjectFilter {
        status,
        client_id: query.client_id,
        page: Page::new(query.page, query.limit),
    };

    let projects = state.db.list_projects(&filter).await?;
    Ok(Json(with_summaries(&state.db, projects).await?))
}

async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<ProjectDetail>> {
    let project = state.db.get_project(id).await?.ok_or(AppError::NotFound("Project"))?;

    let payments = state.db.list_payments(Some(id)).await?;
    let client = state.db.get_client(project.client_id).await?;
    let documents = state.db.documents_for_project(id).await?;

    Ok(Json(ProjectDetail {
        financial_summary: FinancialSummary::for_project(&project, &payments),
        project,
        client,
        payments,
        documents,
    }))
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewProject>,
) -> AppResult<(StatusCode, Json<ProjectWithSummary>)> {
    body.validate().map_err(AppError::BadRequest)?;

    state
        .db
        .get_client(body.client_id)
        .await?
        .ok_or(AppError::NotFound("Client"))?;

    let project = state.db.create_project(&body).await?;
    info!(project_id = project.id, client_id = project.client_id, "Created project");

    Ok((
        StatusCode::CREATED,
        Json(ProjectWithSummary {
            financial_summary: FinancialSummary::for_project(&project, &[]),
            project,
        }),
    ))
}

async fn update_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(patch): Json<ProjectPatch>,
) -> AppResult<Json<ProjectWithSummary>> {
    patch.validate().map_err(AppError::BadRequest)?;

    let mut project = state.db.get_project(id).await?.ok_or(AppError::NotFound("Project"))?;

    if let Some(client_id) = patch.client_id.filter(|c| *c != project.client_id) {
        state
            .db
            .get_client(client_id)
            .await?
            .ok_or(AppError::NotFound("Client"))?;
    }

    patch.apply(&mut project);
    check_dates(project.start_date, project.end_date).map_err(AppError::BadRequest)?;

    let project = state
        .db
        .update_project(&project)
        .await?
        .ok_or(AppError::NotFound("Project"))?;
    let payments = state.db.list_payments(Some(id)).await?;

    Ok(Json(ProjectWithSummary {
        financial_summary: FinancialSummary::for_project(&project, &payments),
        project,
    }))
}

async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.db.get_project(id).await?.ok_or(AppError::NotFound("Project"))?;

    let documents = state.db.documents_for_project(id).await?;
    remove_stored_objects(state.store.as_ref(), &documents).await;

    state.db.delete_project(id).await?;
    info!(project_id = id, "Deleted project");

    Ok(StatusCode::NO_CONTENT)
}
