use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::{error::AppResult, middleware::AuthUser, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings/{id}/pay", post(create_payment))
        .route("/bookings/{id}/refund", post(refund_payment))
        .route("/payments/callback", post(payment_callback))
        .route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct PaymentLinkResponse {
    pub payment_url: String,
}

/// POST /bookings/{id}/pay
async fn create_payment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let payment_url = state
        .payments
        .create_payment_for_user(booking_id, user.user_id)
        .await?;
    Ok(Json(PaymentLinkResponse { payment_url }))
}

/// POST /bookings/{id}/refund
async fn refund_payment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    state.payments.refund_payment(booking_id, user.user_id).await?;
    Ok(Json(json!({ "message": "Возврат оформлен, бронирование снято" })))
}

/// POST /payments/callback
/// Тело разбирается вручную: формат уведомления проверяется по полям.
async fn payment_callback(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let booking = state.webhooks.handle_callback(&body).await?;
    Ok(Json(json!({
        "message": "Статус оплаты обновлён",
        "booking_id": booking.id,
        "payment_status": booking.payment_status,
    })))
}

async fn health() -> &'static str {
    "OK"
}
