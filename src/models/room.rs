use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub hotel_id: i64,
    pub room_type: String,
    /// Цена за ночь
    pub price: Decimal,
    pub capacity: i32,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Hotel {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub owner_id: i64,
}
