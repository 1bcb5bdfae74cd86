use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;
use studio_finance::Payment;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{NewPayment, PaymentPatch};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/projects/{id}/payments",
            get(project_payments).post(create_payment),
        )
        .route("/payments", get(list_payments))
        .route(
            "/payments/{id}",
            get(get_payment).put(update_payment).delete(delete_payment),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentQuery {
    project_id: Option<i64>,
}

async fn list_payments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PaymentQuery>,
) -> AppResult<Json<Vec<Payment>>> {
    Ok(Json(state.db.list_payments(query.project_id).await?))
}

async fn project_payments(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
) -> AppResult<Json<Vec<Payment>>> {
    state
        .db
        .get_project(project_id)
        .await?
        .ok_or(AppError::NotFound("Project"))?;

    Ok(Json(state.db.list_payments(Some(project_id)).await?))
}

async fn create_payment(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    Json(body): Json<NewPayment>,
) -> AppResult<(StatusCode, Json<Payment>)> {
    body.validate().map_err(AppError::BadRequest)?;

    state
        .db
        .get_project(project_id)
        .await?
        .ok_or(AppError::NotFound("Project"))?;

    let payment = state.db.create_payment(project_id, &body).await?;
    info!(
        payment_id = payment.id,
        project_id,
        amount = payment.amount,
        status = payment.status.as_str(),
        "Recorded payment"
    );

    Ok((StatusCode::CREATED, Json(payment)))
}

async fn get_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Payment>> {
    let payment = state.db.get_payment(id).await?.ok_or(AppError::NotFound("Payment"))?;
    Ok(Json(payment))
}

async fn update_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(patch): Json<PaymentPatch>,
) -> AppResult<Json<Payment>> {
    patch.validate().map_err(AppError::BadRequest)?;

    let mut payment = state.db.get_payment(id).await?.ok_or(AppError::NotFound("Payment"))?;
    patch.apply(&mut payment);

    let updated = state
        .db
        .update_payment(&payment)
        .await?
        .ok_or(AppError::NotFound("Payment"))?;

    Ok(Json(updated))
}

async fn delete_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    if !state.db.delete_payment(id).await? {
        return Err(AppError::NotFound("Payment"));
    }

    info!(payment_id = id, "Deleted payment");
    Ok(StatusCode::NO_CONTENT)
}
