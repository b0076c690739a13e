pub mod bookings;
pub mod payment;

use axum::{extract::rejection::JsonRejection, Json, Router};
use std::sync::Arc;

use crate::error::{AppError, AppResult};

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(bookings::routes())
        .merge(payment::routes())
}

// Ошибки разбора тела отдаются в общем формате {"error"}
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    body.map(|Json(value)| value).map_err(|e| {
        tracing::debug!("Rejected request body: {}", e.body_text());
        AppError::validation("Некорректные данные запроса")
    })
}
