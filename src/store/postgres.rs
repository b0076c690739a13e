use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, warn};

use super::{BookingStore, StoreError, StoreResult};
use crate::database::Database;
use crate::models::{booking::payment_status, Booking, NewBooking, Room, User};
use crate::services::availability::DateRange;

const BOOKING_COLUMNS: &str = "id, room_id, user_id, start_date, end_date, total_cost, \
     payment_status, payment_id, is_offline, created_at";

// exclusion_violation и serialization_failure означают гонку за те же даты
const EXCLUSION_VIOLATION: &str = "23P01";
const SERIALIZATION_FAILURE: &str = "40001";

#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }
}

fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(
            db_err.code().as_deref(),
            Some(EXCLUSION_VIOLATION) | Some(SERIALIZATION_FAILURE)
        ) {
            warn!("booking insert lost a race: {}", db_err);
            return StoreError::Overlap;
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn find_room(&self, room_id: i64) -> StoreResult<Option<Room>> {
        let room = sqlx::query_as::<_, Room>(
            "SELECT id, hotel_id, room_type, price, capacity, available FROM rooms WHERE id = $1",
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(room)
    }

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, phone, role FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_or_create_user_by_phone(&self, phone: &str, name: &str) -> StoreResult<User> {
        // DO UPDATE без реальных изменений нужен, чтобы RETURNING вернул уже существующую строку
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, phone, role)
            VALUES ($1, $2, 'client')
            ON CONFLICT (phone) DO UPDATE SET phone = EXCLUDED.phone
            RETURNING id, name, email, phone, role
            "#,
        )
        .bind(name)
        .bind(phone)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn find_booking_by_payment_id(&self, payment_id: &str) -> StoreResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {} FROM bookings WHERE payment_id = $1",
            BOOKING_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn overlapping_bookings(&self, room_id: i64, dates: &DateRange) -> StoreResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {} FROM bookings
             WHERE room_id = $1 AND NOT (end_date <= $2 OR start_date >= $3)",
            BOOKING_COLUMNS
        ))
        .bind(room_id)
        .bind(dates.start())
        .bind(dates.end())
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn insert_booking(&self, booking: NewBooking) -> StoreResult<Booking> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        // Повторная проверка непосредственно перед вставкой
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(
                SELECT 1 FROM bookings
                WHERE room_id = $1 AND NOT (end_date <= $2 OR start_date >= $3)
             )",
        )
        .bind(booking.room_id)
        .bind(booking.dates.start())
        .bind(booking.dates.end())
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        if taken {
            tx.rollback().await?;
            return Err(StoreError::Overlap);
        }

        let inserted = sqlx::query_as::<_, Booking>(&format!(
            "INSERT INTO bookings (room_id, user_id, start_date, end_date, total_cost, payment_status, is_offline, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(booking.room_id)
        .bind(booking.user_id)
        .bind(booking.dates.start())
        .bind(booking.dates.end())
        .bind(booking.total_cost)
        .bind(payment_status::PENDING)
        .bind(booking.is_offline)
        .bind(booking.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        debug!("booking {} inserted for room {}", inserted.id, inserted.room_id);
        Ok(inserted)
    }

    async fn delete_unpaid_booking(&self, booking_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = $1 AND payment_status <> $2")
            .bind(booking_id)
            .bind(payment_status::SUCCEEDED)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_booking(&self, booking_id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM bookings WHERE id = $1 AND payment_status = $2 AND is_offline = FALSE",
        )
        .bind(booking_id)
        .bind(payment_status::PENDING)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_payment_id(&self, booking_id: i64, payment_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE bookings SET payment_id = $2 WHERE id = $1")
            .bind(booking_id)
            .bind(payment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_payment_status(&self, booking_id: i64, status: &str) -> StoreResult<()> {
        sqlx::query("UPDATE bookings SET payment_status = $2 WHERE id = $1")
            .bind(booking_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release_refunded(&self, booking_id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // 1) Фиксируем возврат
        sqlx::query("UPDATE bookings SET payment_status = $2 WHERE id = $1")
            .bind(booking_id)
            .bind(payment_status::REFUNDED)
            .execute(&mut *tx)
            .await?;

        // 2) Освобождаем номер
        sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn expired_online_bookings(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {} FROM bookings
             WHERE created_at <= $1 AND payment_status = $2 AND is_offline = FALSE
             ORDER BY created_at",
            BOOKING_COLUMNS
        ))
        .bind(cutoff)
        .bind(payment_status::PENDING)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn bookings_for_room(&self, room_id: i64) -> StoreResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {} FROM bookings WHERE room_id = $1 ORDER BY start_date",
            BOOKING_COLUMNS
        ))
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn bookings_for_user(&self, user_id: i64) -> StoreResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY start_date",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn bookings_for_owner(&self, owner_id: i64) -> StoreResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT b.id, b.room_id, b.user_id, b.start_date, b.end_date, b.total_cost,
                   b.payment_status, b.payment_id, b.is_offline, b.created_at
            FROM bookings b
            JOIN rooms r ON b.room_id = r.id
            JOIN hotels h ON r.hotel_id = h.id
            WHERE h.owner_id = $1
            ORDER BY b.start_date
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }
}
