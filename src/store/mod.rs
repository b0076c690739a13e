//! Хранилище бронирований.
//!
//! `BookingStore` - единственная точка доступа ядра к данным. Основная
//! реализация работает с PostgreSQL, `MemoryStore` используется в тестах
//! и для локального запуска без базы.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Booking, NewBooking, Room, User};
use crate::services::availability::DateRange;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgBookingStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Вставка нарушила бы запрет на пересечение дат для номера.
    #[error("booking overlaps an existing reservation")]
    Overlap,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_room(&self, room_id: i64) -> StoreResult<Option<Room>>;

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>>;

    /// Ищет пользователя по телефону, при отсутствии создаёт клиента без пароля.
    async fn find_or_create_user_by_phone(&self, phone: &str, name: &str) -> StoreResult<User>;

    async fn find_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>>;

    async fn find_booking_by_payment_id(&self, payment_id: &str) -> StoreResult<Option<Booking>>;

    /// Все брони номера, пересекающиеся с `[start, end)`.
    async fn overlapping_bookings(&self, room_id: i64, dates: &DateRange) -> StoreResult<Vec<Booking>>;

    /// Атомарно перепроверяет пересечения и вставляет бронь.
    /// Возвращает `StoreError::Overlap`, если номер уже занят.
    async fn insert_booking(&self, booking: NewBooking) -> StoreResult<Booking>;

    /// Удаляет бронь, если она не оплачена (`payment_status <> 'succeeded'`).
    /// Статус проверяется тем же запросом, что и удаление.
    /// `false` - строки нет или она уже оплачена.
    async fn delete_unpaid_booking(&self, booking_id: i64) -> StoreResult<bool>;

    /// Удаляет бронь, только если она всё ещё `pending` и не офлайн.
    async fn delete_expired_booking(&self, booking_id: i64) -> StoreResult<bool>;

    async fn set_payment_id(&self, booking_id: i64, payment_id: &str) -> StoreResult<()>;

    async fn set_payment_status(&self, booking_id: i64, status: &str) -> StoreResult<()>;

    /// Помечает бронь как `refunded` и удаляет её в одной транзакции.
    async fn release_refunded(&self, booking_id: i64) -> StoreResult<()>;

    /// Неоплаченные онлайн-брони, созданные не позже `cutoff`.
    async fn expired_online_bookings(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Booking>>;

    async fn bookings_for_room(&self, room_id: i64) -> StoreResult<Vec<Booking>>;

    async fn bookings_for_user(&self, user_id: i64) -> StoreResult<Vec<Booking>>;

    /// Брони во всех отелях владельца (room -> hotel -> owner).
    async fn bookings_for_owner(&self, owner_id: i64) -> StoreResult<Vec<Booking>>;
}
