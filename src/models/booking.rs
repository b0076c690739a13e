use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::services::availability::DateRange;

/// Статусы оплаты, которые выставляет само приложение.
/// Остальные значения приходят от платёжного шлюза как есть.
pub mod payment_status {
    pub const PENDING: &str = "pending";
    pub const SUCCEEDED: &str = "succeeded";
    pub const REFUNDED: &str = "refunded";
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub room_id: i64,
    pub user_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_cost: Decimal,
    pub payment_status: String,
    pub payment_id: Option<String>,
    pub is_offline: bool,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn dates(&self) -> DateRange {
        DateRange::from_trusted(self.start_date, self.end_date)
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == payment_status::SUCCEEDED
    }

    pub fn is_pending(&self) -> bool {
        self.payment_status == payment_status::PENDING
    }
}

/// Данные для вставки новой брони. Статус всегда `pending`.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub room_id: i64,
    pub user_id: i64,
    pub dates: DateRange,
    pub total_cost: Decimal,
    pub is_offline: bool,
    pub created_at: DateTime<Utc>,
}
