use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use super::json_body;
use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::Role,
    services::booking::OfflineGuest,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/my", get(get_my_bookings))
        .route("/booking/offline", post(create_offline_booking))
        .route("/bookings/{id}", delete(cancel_booking))
        .route("/rooms/{id}/bookings", get(get_room_bookings))
        .route("/owners/bookings", get(get_owner_bookings))
}

/* ---------- DTO ---------- */

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub room_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OfflineBookingRequest {
    pub room_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[validate(length(min = 1, max = 100, message = "Имя гостя обязательно"))]
    pub name: String,
    #[validate(length(min = 5, max = 15, message = "Некорректный номер телефона"))]
    pub phone_number: String,
}

/* ---------- BOOKINGS ---------- */

// POST /bookings
async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let req = json_body(body)?;
    let booking = state
        .bookings
        .create_booking(user.user_id, req.room_id, req.start_date, req.end_date)
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /bookings/my
async fn get_my_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let bookings = state.bookings.list_for_user(user.user_id).await?;
    Ok(Json(bookings))
}

// POST /booking/offline
async fn create_offline_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<OfflineBookingRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let req = json_body(body)?;
    if let Err(errors) = req.validate() {
        tracing::debug!("Offline booking request rejected: {}", errors);
        return Err(AppError::validation("Некорректные данные гостя"));
    }

    let guest = OfflineGuest {
        name: req.name.trim().to_string(),
        phone: req.phone_number.trim().to_string(),
    };
    let booking = state
        .bookings
        .create_offline_booking(user.role, req.room_id, req.start_date, req.end_date, &guest)
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

// DELETE /bookings/{id}
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    state.bookings.cancel_booking(booking_id, user.user_id).await?;
    Ok(Json(json!({ "message": "Бронирование отменено" })))
}

// GET /rooms/{id}/bookings
async fn get_room_bookings(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let bookings = state.bookings.list_for_room(room_id).await?;
    Ok(Json(bookings))
}

// GET /owners/bookings
async fn get_owner_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    if user.role != Role::Owner {
        return Err(AppError::forbidden("Список доступен только владельцам отелей"));
    }
    let bookings = state.bookings.list_for_owner(user.user_id).await?;
    Ok(Json(bookings))
}
