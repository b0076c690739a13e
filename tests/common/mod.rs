#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hotel_booking::{
    config::Config,
    middleware::Claims,
    models::{Hotel, Role, Room, User},
    services::{
        notification::{MailError, Mailer, NotificationDispatcher},
        payment::{GatewayError, PaymentGateway, PaymentIntent, PaymentIntentRequest, Refund, RefundRequest},
    },
    store::MemoryStore,
    AppState,
};

pub const JWT_SECRET: &str = "test-secret";

pub const CLIENT_ID: i64 = 1;
pub const OTHER_CLIENT_ID: i64 = 2;
pub const OWNER_ID: i64 = 3;
pub const MANAGER_ID: i64 = 4;

pub const ROOM_ID: i64 = 10;
pub const OTHER_ROOM_ID: i64 = 11;

pub fn test_config(gateway_url: &str, extra: &[(&'static str, &'static str)]) -> Config {
    let mut vars: HashMap<&str, String> = HashMap::from([
        ("DATABASE_URL", "postgres://localhost/hotel_test".to_string()),
        ("JWT_SECRET", JWT_SECRET.to_string()),
        ("YOOKASSA_SHOP_ID", "shop-42".to_string()),
        ("YOOKASSA_SECRET_KEY", "live_secret".to_string()),
        ("PAYMENT_GATEWAY_URL", gateway_url.to_string()),
        ("PAYMENT_RETURN_URL", "https://hotel.test/payment/success".to_string()),
    ]);
    for (key, value) in extra {
        vars.insert(*key, value.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).expect("test config is valid")
}

/// Токен в том формате, который выдаёт внешний сервис авторизации.
pub fn issue_token(secret: &str, user_id: i64, role: Role, ttl: Duration) -> String {
    let claims = Claims {
        user_id,
        role: role.to_string(),
        exp: (Utc::now() + ttl).timestamp(),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .expect("token is encodable")
}

/// n дней от сегодняшней даты (UTC).
pub fn day(n: i64) -> NaiveDate {
    Utc::now().date_naive() + Duration::days(n)
}

fn user(id: i64, name: &str, email: Option<&str>, role: &str) -> User {
    User {
        id,
        name: name.to_string(),
        email: email.map(str::to_string),
        phone: format!("+7900000000{}", id),
        role: role.to_string(),
    }
}

pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_user(user(CLIENT_ID, "Анна", Some("anna@example.com"), "client")).await;
    store.add_user(user(OTHER_CLIENT_ID, "Борис", None, "client")).await;
    store.add_user(user(OWNER_ID, "Владелец", Some("owner@example.com"), "owner")).await;
    store.add_user(user(MANAGER_ID, "Менеджер", None, "manager")).await;
    store
        .add_hotel(Hotel {
            id: 1,
            name: "Волна".to_string(),
            address: "Сочи, Приморская 1".to_string(),
            owner_id: OWNER_ID,
        })
        .await;
    for (id, price) in [(ROOM_ID, dec!(3000.00)), (OTHER_ROOM_ID, dec!(4500.50))] {
        store
            .add_room(Room {
                id,
                hotel_id: 1,
                room_type: "standard".to_string(),
                price,
                capacity: 2,
                available: true,
            })
            .await;
    }
    store
}

/// Шлюз в памяти: запоминает запросы, может изображать отказ.
#[derive(Default)]
pub struct FakeGateway {
    pub payments: Mutex<Vec<PaymentIntentRequest>>,
    pub refunds: Mutex<Vec<RefundRequest>>,
    pub failing: AtomicBool,
    issued: AtomicUsize,
}

impl FakeGateway {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn payment_count(&self) -> usize {
        self.payments.lock().unwrap().len()
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentIntent, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected { status: 503, body: "unavailable".to_string() });
        }
        self.payments.lock().unwrap().push(request.clone());
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("pay-{}", n);
        Ok(PaymentIntent {
            confirmation_url: format!("https://pay.test/checkout/{}", id),
            status: "pending".to_string(),
            id,
        })
    }

    async fn create_refund(&self, request: &RefundRequest) -> Result<Refund, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected { status: 503, body: "unavailable".to_string() });
        }
        self.refunds.lock().unwrap().push(request.clone());
        Ok(Refund { id: "refund-1".to_string(), status: "succeeded".to_string() })
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<SentMail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: html_body.to_string(),
        });
        Ok(())
    }
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub state: Arc<AppState>,
}

pub async fn test_app() -> TestApp {
    let store = seeded_store().await;
    let gateway = Arc::new(FakeGateway::default());
    let state = AppState::new(
        test_config("http://gateway.invalid", &[]),
        store.clone(),
        gateway.clone(),
        NotificationDispatcher::disabled(),
    );
    TestApp { store, gateway, state }
}

pub fn succeeded_callback(payment_id: &str, booking_id: i64) -> Vec<u8> {
    serde_json::json!({
        "type": "notification",
        "event": "payment.succeeded",
        "object": {
            "id": payment_id,
            "status": "succeeded",
            "metadata": { "booking_id": booking_id.to_string() }
        }
    })
    .to_string()
    .into_bytes()
}
