use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::Booking;
use crate::store::BookingStore;

/// Полуоткрытый интервал дат `[start, end)`, всегда `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// `None`, если дата заезда не раньше даты выезда.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    // Для строк из БД: порядок дат гарантирован CHECK-ограничением
    pub(crate) fn from_trusted(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Касание границ (`self.end == other.start`) пересечением не считается.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        !(other.end <= self.start || other.start >= self.end)
    }
}

/// Проверка доступности номера на заданные даты.
#[derive(Clone)]
pub struct AvailabilityChecker {
    store: Arc<dyn BookingStore>,
}

impl AvailabilityChecker {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Все брони номера, мешающие интервалу. Пустой список - номер свободен.
    pub async fn conflicts(&self, room_id: i64, dates: &DateRange) -> AppResult<Vec<Booking>> {
        Ok(self.store.overlapping_bookings(room_id, dates).await?)
    }

    pub async fn is_available(&self, room_id: i64, dates: &DateRange) -> AppResult<bool> {
        Ok(self.conflicts(room_id, dates).await?.is_empty())
    }
}
