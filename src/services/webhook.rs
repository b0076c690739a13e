//! Обработка уведомлений (webhook) платёжного шлюза.
//!
//! Тело уведомления сначала разбирается в типизированное
//! `PaymentNotification`; обязательные поля проверяются явно. Бронь ищется
//! по идентификатору платежа (`object.id`), а если его нет или он не найден -
//! по `metadata.booking_id`. Статус записывается как есть, поэтому повторная
//! доставка того же уведомления даёт то же состояние.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::Booking;
use crate::store::BookingStore;

/// Разобранное уведомление о статусе платежа.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentNotification {
    /// Имя события провайдера, например `payment.succeeded`.
    pub event: Option<String>,
    pub payment_id: Option<String>,
    pub status: String,
    pub booking_id: Option<i64>,
}

impl PaymentNotification {
    pub fn parse(raw: &[u8]) -> AppResult<Self> {
        let envelope: Value = serde_json::from_slice(raw)
            .map_err(|_| AppError::validation("Некорректные данные"))?;
        Self::from_value(&envelope)
    }

    pub fn from_value(envelope: &Value) -> AppResult<Self> {
        let object = envelope
            .get("object")
            .and_then(Value::as_object)
            .ok_or_else(|| AppError::validation("Некорректный формат 'object'"))?;

        let status = object
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::validation("Некорректный формат поля 'status'"))?
            .to_string();

        let metadata = object
            .get("metadata")
            .and_then(Value::as_object)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| AppError::validation("Поле 'metadata' отсутствует или пусто"))?;

        let payment_id = object
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let booking_id = booking_id_from(metadata)?;

        if payment_id.is_none() && booking_id.is_none() {
            return Err(AppError::validation("Поле 'booking_id' отсутствует в 'metadata'"));
        }

        Ok(Self {
            event: envelope.get("event").and_then(Value::as_str).map(str::to_string),
            payment_id,
            status,
            booking_id,
        })
    }
}

// booking_id приходит строкой ("12"), но старые интеграции присылали число
fn booking_id_from(metadata: &Map<String, Value>) -> AppResult<Option<i64>> {
    let invalid = || AppError::validation("Некорректный 'booking_id' в 'metadata'");
    match metadata.get("booking_id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(invalid),
        Some(_) => Err(invalid()),
    }
}

#[derive(Clone)]
pub struct WebhookReconciler {
    store: Arc<dyn BookingStore>,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Применяет уведомление и возвращает обновлённую бронь.
    pub async fn handle_callback(&self, raw: &[u8]) -> AppResult<Booking> {
        let notification = PaymentNotification::parse(raw)?;
        self.apply(&notification).await
    }

    pub async fn apply(&self, notification: &PaymentNotification) -> AppResult<Booking> {
        info!(
            "Webhook: event={:?}, payment_id={:?}, booking_id={:?}, status={}",
            notification.event, notification.payment_id, notification.booking_id, notification.status
        );

        let mut booking = self
            .resolve(notification)
            .await?
            .ok_or_else(|| AppError::not_found("Бронирование не найдено"))?;

        self.store
            .set_payment_status(booking.id, &notification.status)
            .await?;
        booking.payment_status = notification.status.clone();

        // Бронь найдена по metadata, а id платежа у неё ещё не сохранён
        if booking.payment_id.is_none() {
            if let Some(payment_id) = &notification.payment_id {
                self.store.set_payment_id(booking.id, payment_id).await?;
                booking.payment_id = Some(payment_id.clone());
            }
        }

        info!("Booking {} payment status set to '{}'", booking.id, booking.payment_status);
        Ok(booking)
    }

    async fn resolve(&self, notification: &PaymentNotification) -> AppResult<Option<Booking>> {
        if let Some(payment_id) = &notification.payment_id {
            if let Some(booking) = self.store.find_booking_by_payment_id(payment_id).await? {
                return Ok(Some(booking));
            }
        }

        match notification.booking_id {
            Some(booking_id) => {
                let booking = self.store.find_booking(booking_id).await?;
                if booking.is_none() {
                    warn!("Webhook references unknown booking {}", booking_id);
                }
                Ok(booking)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> AppResult<PaymentNotification> {
        PaymentNotification::from_value(&value)
    }

    #[test]
    fn full_notification_is_decoded() {
        let n = parse(json!({
            "type": "notification",
            "event": "payment.succeeded",
            "object": {
                "id": "2c5d-pay",
                "status": "succeeded",
                "metadata": { "booking_id": "42" }
            }
        }))
        .unwrap();

        assert_eq!(n.event.as_deref(), Some("payment.succeeded"));
        assert_eq!(n.payment_id.as_deref(), Some("2c5d-pay"));
        assert_eq!(n.status, "succeeded");
        assert_eq!(n.booking_id, Some(42));
    }

    #[test]
    fn numeric_booking_id_is_accepted() {
        let n = parse(json!({
            "object": { "status": "canceled", "metadata": { "booking_id": 7 } }
        }))
        .unwrap();
        assert_eq!(n.booking_id, Some(7));
        assert_eq!(n.payment_id, None);
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        let cases = [
            json!({}),
            json!({ "object": "oops" }),
            json!({ "object": { "metadata": { "booking_id": "1" } } }),
            json!({ "object": { "status": 5, "metadata": { "booking_id": "1" } } }),
            json!({ "object": { "status": "succeeded" } }),
            json!({ "object": { "status": "succeeded", "metadata": {} } }),
            json!({ "object": { "status": "succeeded", "metadata": { "other": "x" } } }),
            json!({ "object": { "id": "p", "status": "succeeded", "metadata": { "booking_id": "abc" } } }),
        ];

        for case in cases {
            assert!(
                matches!(parse(case.clone()), Err(AppError::Validation(_))),
                "expected validation error for {}",
                case
            );
        }
    }

    #[test]
    fn invalid_json_is_a_validation_error() {
        assert!(matches!(
            PaymentNotification::parse(b"not json"),
            Err(AppError::Validation(_))
        ));
    }
}
