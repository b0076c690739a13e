use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;

use super::{BookingStore, StoreError, StoreResult};
use crate::models::{booking::payment_status, Booking, Hotel, NewBooking, Room, User};
use crate::services::availability::DateRange;

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    hotels: BTreeMap<i64, Hotel>,
    rooms: BTreeMap<i64, Room>,
    bookings: BTreeMap<i64, Booking>,
    next_user_id: i64,
    next_booking_id: i64,
    failing_deletes: HashSet<i64>,
}

/// Хранилище в памяти с той же семантикой, что и PostgreSQL-версия.
/// Весь набор таблиц защищён одним мьютексом, поэтому проверка пересечений
/// и вставка выполняются атомарно.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user: User) {
        let mut t = self.tables.lock().await;
        t.next_user_id = t.next_user_id.max(user.id);
        t.users.insert(user.id, user);
    }

    pub async fn add_hotel(&self, hotel: Hotel) {
        self.tables.lock().await.hotels.insert(hotel.id, hotel);
    }

    pub async fn add_room(&self, room: Room) {
        self.tables.lock().await.rooms.insert(room.id, room);
    }

    /// Следующие попытки удалить эту бронь будут завершаться ошибкой.
    pub async fn fail_deletes_of(&self, booking_id: i64) {
        self.tables.lock().await.failing_deletes.insert(booking_id);
    }

    pub async fn booking_count(&self) -> usize {
        self.tables.lock().await.bookings.len()
    }

    // Условие проверяется под тем же локом, что и удаление
    async fn delete_where(&self, booking_id: i64, allowed: impl Fn(&Booking) -> bool) -> StoreResult<bool> {
        let mut t = self.tables.lock().await;
        if t.failing_deletes.contains(&booking_id) {
            return Err(StoreError::Database(sqlx::Error::Protocol(format!(
                "delete of booking {} rejected",
                booking_id
            ))));
        }
        match t.bookings.get(&booking_id) {
            Some(b) if allowed(b) => Ok(t.bookings.remove(&booking_id).is_some()),
            _ => Ok(false),
        }
    }

    fn sorted(mut bookings: Vec<Booking>) -> Vec<Booking> {
        bookings.sort_by_key(|b| (b.start_date, b.id));
        bookings
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn find_room(&self, room_id: i64) -> StoreResult<Option<Room>> {
        Ok(self.tables.lock().await.rooms.get(&room_id).cloned())
    }

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn find_or_create_user_by_phone(&self, phone: &str, name: &str) -> StoreResult<User> {
        let mut t = self.tables.lock().await;
        if let Some(user) = t.users.values().find(|u| u.phone == phone) {
            return Ok(user.clone());
        }

        t.next_user_id += 1;
        let user = User {
            id: t.next_user_id,
            name: name.to_string(),
            email: None,
            phone: phone.to_string(),
            role: "client".to_string(),
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>> {
        Ok(self.tables.lock().await.bookings.get(&booking_id).cloned())
    }

    async fn find_booking_by_payment_id(&self, payment_id: &str) -> StoreResult<Option<Booking>> {
        let t = self.tables.lock().await;
        Ok(t.bookings
            .values()
            .find(|b| b.payment_id.as_deref() == Some(payment_id))
            .cloned())
    }

    async fn overlapping_bookings(&self, room_id: i64, dates: &DateRange) -> StoreResult<Vec<Booking>> {
        let t = self.tables.lock().await;
        Ok(t.bookings
            .values()
            .filter(|b| b.room_id == room_id && b.dates().overlaps(dates))
            .cloned()
            .collect())
    }

    async fn insert_booking(&self, booking: NewBooking) -> StoreResult<Booking> {
        let mut t = self.tables.lock().await;

        let taken = t
            .bookings
            .values()
            .any(|b| b.room_id == booking.room_id && b.dates().overlaps(&booking.dates));
        if taken {
            return Err(StoreError::Overlap);
        }

        t.next_booking_id += 1;
        let stored = Booking {
            id: t.next_booking_id,
            room_id: booking.room_id,
            user_id: booking.user_id,
            start_date: booking.dates.start(),
            end_date: booking.dates.end(),
            total_cost: booking.total_cost,
            payment_status: payment_status::PENDING.to_string(),
            payment_id: None,
            is_offline: booking.is_offline,
            created_at: booking.created_at,
        };
        t.bookings.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete_unpaid_booking(&self, booking_id: i64) -> StoreResult<bool> {
        self.delete_where(booking_id, |b| !b.is_paid()).await
    }

    async fn delete_expired_booking(&self, booking_id: i64) -> StoreResult<bool> {
        self.delete_where(booking_id, |b| b.is_pending() && !b.is_offline).await
    }

    async fn set_payment_id(&self, booking_id: i64, payment_id: &str) -> StoreResult<()> {
        if let Some(b) = self.tables.lock().await.bookings.get_mut(&booking_id) {
            b.payment_id = Some(payment_id.to_string());
        }
        Ok(())
    }

    async fn set_payment_status(&self, booking_id: i64, status: &str) -> StoreResult<()> {
        if let Some(b) = self.tables.lock().await.bookings.get_mut(&booking_id) {
            b.payment_status = status.to_string();
        }
        Ok(())
    }

    async fn release_refunded(&self, booking_id: i64) -> StoreResult<()> {
        self.tables.lock().await.bookings.remove(&booking_id);
        Ok(())
    }

    async fn expired_online_bookings(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let t = self.tables.lock().await;
        let mut expired: Vec<Booking> = t
            .bookings
            .values()
            .filter(|b| b.created_at <= cutoff && b.is_pending() && !b.is_offline)
            .cloned()
            .collect();
        expired.sort_by_key(|b| b.created_at);
        Ok(expired)
    }

    async fn bookings_for_room(&self, room_id: i64) -> StoreResult<Vec<Booking>> {
        let t = self.tables.lock().await;
        Ok(Self::sorted(
            t.bookings.values().filter(|b| b.room_id == room_id).cloned().collect(),
        ))
    }

    async fn bookings_for_user(&self, user_id: i64) -> StoreResult<Vec<Booking>> {
        let t = self.tables.lock().await;
        Ok(Self::sorted(
            t.bookings.values().filter(|b| b.user_id == user_id).cloned().collect(),
        ))
    }

    async fn bookings_for_owner(&self, owner_id: i64) -> StoreResult<Vec<Booking>> {
        let t = self.tables.lock().await;
        let owned = t
            .bookings
            .values()
            .filter(|b| {
                t.rooms
                    .get(&b.room_id)
                    .and_then(|room| t.hotels.get(&room.hotel_id))
                    .map(|hotel| hotel.owner_id == owner_id)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        Ok(Self::sorted(owned))
    }
}
