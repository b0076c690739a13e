//! payment.rs
//!
//! Сервисный слой для работы с внешним платёжным шлюзом (API в стиле ЮKassa).
//!
//! Ключевые компоненты:
//! 1.  **PaymentGateway**: трейт-граница с провайдером. Создание платежа
//!     и возврат средств.
//! 2.  **PaymentGatewayClient**: HTTP-клиент шлюза. Basic-auth, новый
//!     `Idempotence-Key` на каждый вызов, ограниченный таймаут. Все сетевые
//!     вызовы проходят через автоматический выключатель (`failsafe`).
//! 3.  **PaymentService**: операции над бронью - создать платёж и вернуть
//!     ссылку на оплату, оформить возврат и освободить номер.

use async_trait::async_trait;
use failsafe::futures::CircuitBreaker;
use failsafe::{backoff, failure_policy, Config as BreakerConfig, StateMachine};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{CircuitBreakerConfig, PaymentConfig};
use crate::error::{AppError, AppResult};
use crate::models::Booking;
use crate::store::BookingStore;

const IDEMPOTENCE_HEADER: &str = "Idempotence-Key";

/// Ошибки обращения к платёжному шлюзу.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Выключатель разомкнут, запрос не отправлялся.
    #[error("circuit breaker is open - payment gateway temporarily unavailable")]
    CircuitOpen,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway responded {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed gateway response: {0}")]
    Malformed(String),
    #[error("refund {0} was canceled by the gateway")]
    RefundCanceled(String),
}

// --- Модели данных для API платёжного шлюза ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub return_url: String,
}

/// Запрос на создание платежа.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    pub amount: Amount,
    pub capture: bool,
    pub confirmation: ConfirmationRequest,
    pub description: String,
    /// Метаданные провайдера нетипизированы, поэтому id брони передаётся строкой.
    pub metadata: HashMap<String, String>,
}

/// Созданный платёж. Нужны только id и ссылка на оплату.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    pub confirmation_url: String,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    id: Option<String>,
    status: Option<String>,
    confirmation: Option<ConfirmationResponse>,
}

#[derive(Debug, Deserialize)]
struct ConfirmationResponse {
    confirmation_url: Option<String>,
}

/// Запрос на возврат средств.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub payment_id: String,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Refund {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: Option<String>,
    status: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentIntent, GatewayError>;

    async fn create_refund(&self, request: &RefundRequest) -> Result<Refund, GatewayError>;
}

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::Constant>, ()>;

/// Клиент для взаимодействия с API платёжного шлюза.
#[derive(Clone)]
pub struct PaymentGatewayClient {
    /// Идентификатор магазина.
    shop_id: String,
    /// Секретный ключ для basic-auth.
    secret_key: String,
    /// Базовый URL платёжного шлюза.
    base_url: String,
    /// Асинхронный HTTP-клиент.
    http_client: reqwest::Client,
    /// Выключатель: после N подряд сбоев запросы блокируются на время таймаута.
    circuit_breaker: Breaker,
}

impl PaymentGatewayClient {
    /// Создает и конфигурирует клиент на основе настроек приложения.
    pub fn from_config(config: &PaymentConfig, breaker: &CircuitBreakerConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        let policy = failure_policy::consecutive_failures(
            breaker.failure_threshold,
            backoff::constant(Duration::from_secs(breaker.timeout_seconds)),
        );

        Ok(Self {
            shop_id: config.shop_id.clone(),
            secret_key: config.secret_key.clone(),
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
            http_client,
            circuit_breaker: BreakerConfig::new().failure_policy(policy).build(),
        })
    }

    /// Отправляет POST с новым ключом идемпотентности через выключатель.
    /// Сбоем для выключателя считаются только сетевые ошибки и 5xx.
    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let idempotence_key = Uuid::new_v4().to_string();
        let request = self
            .http_client
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header(IDEMPOTENCE_HEADER, &idempotence_key)
            .json(body);

        let operation = async move {
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            if status.is_server_error() {
                return Err(GatewayError::Rejected { status: status.as_u16(), body: text });
            }
            Ok((status, text))
        };

        let (status, text) = match self.circuit_breaker.call(operation).await {
            Ok(result) => result,
            Err(failsafe::Error::Rejected) => {
                warn!("Circuit breaker is OPEN - blocking payment gateway request to {}", path);
                return Err(GatewayError::CircuitOpen);
            }
            Err(failsafe::Error::Inner(e)) => {
                error!("Payment gateway request to {} failed: {}", path, e);
                return Err(e);
            }
        };

        if status != StatusCode::OK && status != StatusCode::CREATED {
            error!("Payment gateway rejected {} with {}: {}", path, status, text);
            return Err(GatewayError::Rejected { status: status.as_u16(), body: text });
        }

        serde_json::from_str(&text).map_err(|e| {
            error!("Unparseable payment gateway response from {}: {} ({})", path, text, e);
            GatewayError::Malformed(e.to_string())
        })
    }
}

#[async_trait]
impl PaymentGateway for PaymentGatewayClient {
    async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentIntent, GatewayError> {
        info!(
            "Creating payment: amount={} {}, metadata={:?}",
            request.amount.value, request.amount.currency, request.metadata
        );

        let response: PaymentIntentResponse = self.post_json("/payments", request).await?;

        let id = response
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::Malformed("payment id is missing".to_string()))?;
        let confirmation_url = response
            .confirmation
            .and_then(|c| c.confirmation_url)
            .ok_or_else(|| GatewayError::Malformed(format!("payment {} has no confirmation_url", id)))?;

        Ok(PaymentIntent {
            id,
            status: response.status.unwrap_or_default(),
            confirmation_url,
        })
    }

    async fn create_refund(&self, request: &RefundRequest) -> Result<Refund, GatewayError> {
        info!(
            "Creating refund: payment_id={}, amount={} {}",
            request.payment_id, request.amount.value, request.amount.currency
        );

        let response: RefundResponse = self.post_json("/refunds", request).await?;

        let id = response
            .id
            .ok_or_else(|| GatewayError::Malformed("refund id is missing".to_string()))?;
        let status = response.status.unwrap_or_default();
        if status == "canceled" {
            return Err(GatewayError::RefundCanceled(id));
        }

        Ok(Refund { id, status })
    }
}

/// Операции оплаты и возврата над бронированиями.
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
    return_url: String,
}

impl PaymentService {
    pub fn new(store: Arc<dyn BookingStore>, gateway: Arc<dyn PaymentGateway>, config: &PaymentConfig) -> Self {
        Self {
            store,
            gateway,
            currency: config.currency.clone(),
            return_url: config.return_url.clone(),
        }
    }

    /// Создаёт платёж для брони и возвращает ссылку на оплату.
    ///
    /// Каждый вызов создаёт новый платёж у провайдера: локальной защиты от
    /// повторов нет, повторять вызов имеет смысл только после ошибки.
    pub async fn create_payment(&self, booking_id: i64) -> AppResult<String> {
        let booking = self.load_booking(booking_id).await?;
        self.start_payment(&booking).await
    }

    /// То же, что `create_payment`, но только для владельца брони.
    pub async fn create_payment_for_user(&self, booking_id: i64, user_id: i64) -> AppResult<String> {
        let booking = self.load_booking(booking_id).await?;
        if booking.user_id != user_id {
            return Err(AppError::forbidden(
                "Вы не можете оплатить бронирование, которое не принадлежит вам",
            ));
        }
        self.start_payment(&booking).await
    }

    /// Возвращает полную стоимость и освобождает номер.
    pub async fn refund_payment(&self, booking_id: i64, user_id: i64) -> AppResult<()> {
        let booking = self.load_booking(booking_id).await?;

        if booking.user_id != user_id {
            return Err(AppError::forbidden(
                "Вы не можете оформить возврат по чужому бронированию",
            ));
        }
        if !booking.is_paid() {
            return Err(AppError::conflict("Возврат возможен только для оплаченного бронирования"));
        }
        let payment_id = booking
            .payment_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::validation("У бронирования нет идентификатора платежа"))?;

        let refund = self
            .gateway
            .create_refund(&RefundRequest {
                payment_id: payment_id.clone(),
                amount: self.amount(&booking),
            })
            .await?;

        info!(
            "Refund {} ({}) issued for booking {}, payment {}",
            refund.id, refund.status, booking_id, payment_id
        );

        self.store.release_refunded(booking_id).await.map_err(|e| {
            error!(
                "Refund {} succeeded but booking {} was not released: {:?}",
                refund.id, booking_id, e
            );
            AppError::from(e)
        })?;

        Ok(())
    }

    async fn start_payment(&self, booking: &Booking) -> AppResult<String> {
        if booking.is_paid() {
            return Err(AppError::conflict("Бронирование уже оплачено"));
        }

        let request = PaymentIntentRequest {
            amount: self.amount(booking),
            capture: true,
            confirmation: ConfirmationRequest {
                kind: "redirect".to_string(),
                return_url: self.return_url.clone(),
            },
            description: format!("Оплата бронирования {}", booking.id),
            metadata: HashMap::from([("booking_id".to_string(), booking.id.to_string())]),
        };

        let intent = self.gateway.create_payment_intent(&request).await?;

        self.store.set_payment_id(booking.id, &intent.id).await.map_err(|e| {
            error!(
                "Payment {} created but not stored on booking {}: {:?}",
                intent.id, booking.id, e
            );
            AppError::from(e)
        })?;

        info!("Payment {} created for booking {}", intent.id, booking.id);
        Ok(intent.confirmation_url)
    }

    fn amount(&self, booking: &Booking) -> Amount {
        Amount {
            value: format!("{:.2}", booking.total_cost),
            currency: self.currency.clone(),
        }
    }

    async fn load_booking(&self, booking_id: i64) -> AppResult<Booking> {
        self.store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| AppError::not_found("Бронирование не найдено"))
    }
}
