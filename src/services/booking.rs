//! Жизненный цикл бронирования: создание (онлайн и офлайн), отмена и выборки.
//!
//! Проверка пересечений выполняется дважды: сначала через
//! `AvailabilityChecker` для понятного ответа клиенту, затем атомарно внутри
//! хранилища при вставке, что закрывает гонку двух одновременных запросов.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{Booking, NewBooking, Role, Room};
use crate::services::availability::{AvailabilityChecker, DateRange};
use crate::services::notification::NotificationDispatcher;
use crate::store::BookingStore;

const SECONDS_PER_DAY: i64 = 86_400;

/// Стоимость = прошедшее время / 24ч * цена за ночь.
/// Для дат без времени это ровно количество ночей.
pub fn total_cost(dates: &DateRange, nightly_price: Decimal) -> Decimal {
    let nights = Decimal::from(dates.duration().num_seconds()) / Decimal::from(SECONDS_PER_DAY);
    (nights * nightly_price).round_dp(2)
}

/// Гость, за которого персонал оформляет офлайн бронь.
#[derive(Debug, Clone)]
pub struct OfflineGuest {
    pub name: String,
    pub phone: String,
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    availability: AvailabilityChecker,
    notifications: NotificationDispatcher,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, notifications: NotificationDispatcher) -> Self {
        Self {
            availability: AvailabilityChecker::new(store.clone()),
            store,
            notifications,
        }
    }

    pub async fn create_booking(
        &self,
        user_id: i64,
        room_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> AppResult<Booking> {
        let dates = validate_dates(start_date, end_date)?;
        let room = self.load_room(room_id).await?;
        self.ensure_available(room_id, &dates).await?;

        let booking = self
            .store
            .insert_booking(NewBooking {
                room_id,
                user_id,
                dates,
                total_cost: total_cost(&dates, room.price),
                is_offline: false,
                created_at: Utc::now(),
            })
            .await?;

        info!(
            "Booking {} created: room={}, user={}, {}..{}, cost={}",
            booking.id, room_id, user_id, booking.start_date, booking.end_date, booking.total_cost
        );

        // Уже после фиксации: сбой уведомления не влияет на результат создания
        self.notifications.booking_created(&booking);
        Ok(booking)
    }

    pub async fn create_offline_booking(
        &self,
        staff_role: Role,
        room_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
        guest: &OfflineGuest,
    ) -> AppResult<Booking> {
        if !staff_role.is_hotel_staff() {
            return Err(AppError::forbidden(
                "Только менеджеры и владельцы могут создавать офлайн бронирования",
            ));
        }

        let dates = validate_dates(start_date, end_date)?;
        let room = self.load_room(room_id).await?;
        self.ensure_available(room_id, &dates).await?;

        let guest_user = self
            .store
            .find_or_create_user_by_phone(&guest.phone, &guest.name)
            .await?;

        let booking = self
            .store
            .insert_booking(NewBooking {
                room_id,
                user_id: guest_user.id,
                dates,
                total_cost: total_cost(&dates, room.price),
                is_offline: true,
                created_at: Utc::now(),
            })
            .await?;

        info!(
            "Offline booking {} created by {} for guest {}: room={}",
            booking.id, staff_role, guest_user.id, room_id
        );
        Ok(booking)
    }

    pub async fn cancel_booking(&self, booking_id: i64, user_id: i64) -> AppResult<()> {
        let booking = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| AppError::not_found("Бронирование не найдено"))?;

        if booking.user_id != user_id {
            return Err(AppError::forbidden(
                "Вы не можете отменить бронирование, которое не принадлежит вам",
            ));
        }

        // Оплаченные брони снимаются только через возврат
        if booking.is_paid() {
            return Err(AppError::conflict(
                "Бронирование уже оплачено и не может быть отменено",
            ));
        }

        // Webhook мог отметить оплату после проверки выше
        if !self.store.delete_unpaid_booking(booking_id).await? {
            return match self.store.find_booking(booking_id).await? {
                Some(_) => Err(AppError::conflict(
                    "Бронирование уже оплачено и не может быть отменено",
                )),
                None => Err(AppError::not_found("Бронирование не найдено")),
            };
        }
        info!("Booking {} cancelled by user {}", booking_id, user_id);
        Ok(())
    }

    pub async fn list_for_room(&self, room_id: i64) -> AppResult<Vec<Booking>> {
        Ok(self.store.bookings_for_room(room_id).await?)
    }

    pub async fn list_for_user(&self, user_id: i64) -> AppResult<Vec<Booking>> {
        Ok(self.store.bookings_for_user(user_id).await?)
    }

    pub async fn list_for_owner(&self, owner_id: i64) -> AppResult<Vec<Booking>> {
        Ok(self.store.bookings_for_owner(owner_id).await?)
    }

    async fn load_room(&self, room_id: i64) -> AppResult<Room> {
        self.store
            .find_room(room_id)
            .await?
            .ok_or_else(|| AppError::not_found("Номер не найден"))
    }

    async fn ensure_available(&self, room_id: i64, dates: &DateRange) -> AppResult<()> {
        if self.availability.is_available(room_id, dates).await? {
            Ok(())
        } else {
            Err(AppError::conflict("Номер уже забронирован в этот период"))
        }
    }
}

fn validate_dates(start_date: NaiveDate, end_date: NaiveDate) -> AppResult<DateRange> {
    let dates = DateRange::new(start_date, end_date).ok_or_else(|| {
        AppError::validation("Дата заезда должна быть раньше даты выезда")
    })?;

    if start_date < Utc::now().date_naive() {
        return Err(AppError::validation("Дата заезда не может быть в прошлом"));
    }

    Ok(dates)
}
