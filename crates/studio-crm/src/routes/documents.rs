use axum::{
    Json, Router,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    routing::get,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{Document, NewDocument};
use crate::state::AppState;
use crate::storage::{self, ObjectStore, StoredObject};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/projects/{id}/documents",
            get(project_documents).post(upload_document),
        )
        .route("/documents/{id}", get(get_document).delete(delete_document))
}

/// Parts of the multipart upload we care about
struct Upload {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
    display_name: Option<String>,
}

fn stored_object(document: &Document) -> StoredObject {
    StoredObject {
        key: document.storage_key.clone(),
        id: document.storage_id.clone(),
        url: document.url.clone(),
    }
}

/// Best-effort removal of stored files for deleted (or soon deleted) rows
pub async fn remove_stored_objects(store: &dyn ObjectStore, documents: &[Document]) {
    for document in documents {
        if let Err(e) = store.delete(&stored_object(document)).await {
            warn!(key = %document.storage_key, error = %e, "Failed to remove stored document");
        }
    }
}

fn multipart_error(err: MultipartError, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(limit)
    } else {
        AppError::BadRequest(err.body_text())
    }
}

async fn read_upload(mut multipart: Multipart, limit: usize) -> AppResult<Upload> {
    let mut file = None;
    let mut display_name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            Some("name") => {
                let text = field.text().await.map_err(|e| multipart_error(e, limit))?;
                display_name = Some(text.trim().to_string()).filter(|t| !t.is_empty());
            }
            _ => {}
        }
    }

    let (file_name, content_type, bytes) =
        file.ok_or_else(|| AppError::BadRequest("Missing file field".to_string()))?;

    if bytes.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }
    if bytes.len() > limit {
        return Err(AppError::PayloadTooLarge(limit));
    }

    Ok(Upload {
        file_name,
        content_type,
        bytes,
        display_name,
    })
}

async fn project_documents(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
) -> AppResult<Json<Vec<Document>>> {
    state
        .db
        .get_project(project_id)
        .await?
        .ok_or(AppError::NotFound("Project"))?;

    Ok(Json(state.db.documents_for_project(project_id).await?))
}

async fn upload_document(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Document>)> {
    state
        .db
        .get_project(project_id)
        .await?
        .ok_or(AppError::NotFound("Project"))?;

    let upload = read_upload(multipart, state.config.max_upload_bytes).await?;
    let key = storage::build_key(project_id, &upload.file_name);
    let size_bytes = upload.bytes.len() as i64;

    let object = state
        .store
        .put(&key, &upload.content_type, upload.bytes)
        .await
        .map_err(AppError::Storage)?;

    let new_document = NewDocument {
        project_id,
        name: upload.display_name.unwrap_or(upload.file_name),
        storage_key: object.key.clone(),
        storage_id: object.id.clone(),
        content_type: upload.content_type,
        size_bytes,
        url: object.url.clone(),
    };

    let document = match state.db.create_document(&new_document).await {
        Ok(document) => document,
        Err(e) => {
            // Don't leave an orphaned file behind
            if let Err(cleanup) = state.store.delete(&object).await {
                warn!(key = %object.key, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    info!(
        document_id = document.id,
        project_id,
        size_bytes,
        backend = state.store.name(),
        "Stored document"
    );

    Ok((StatusCode::CREATED, Json(document)))
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Document>> {
    let document = state.db.get_document(id).await?.ok_or(AppError::NotFound("Document"))?;
    Ok(Json(document))
}

async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let document = state.db.get_document(id).await?.ok_or(AppError::NotFound("Document"))?;

    // Row first, then the stored file best-effort
    state.db.delete_document(id).await?;
    remove_stored_objects(state.store.as_ref(), std::slice::from_ref(&document)).await;

    info!(document_id = id, "Deleted document");
    Ok(StatusCode::NO_CONTENT)
}
