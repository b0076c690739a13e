//! Уведомления о созданных бронированиях.
//!
//! После фиксации брони `BookingService` кладёт событие в канал. Фоновый
//! `NotificationWorker` создаёт платёж и отправляет клиенту письмо со ссылкой
//! на оплату. Любая ошибка на этом пути только логируется.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::config::SmtpConfig;
use crate::models::{Booking, User};
use crate::services::payment::PaymentService;
use crate::store::BookingStore;

#[derive(Debug, Clone, PartialEq)]
pub enum BookingEvent {
    Created(Booking),
}

/// Отправляющая сторона канала уведомлений.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: Option<mpsc::Sender<BookingEvent>>,
}

impl NotificationDispatcher {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BookingEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// Диспетчер, который молча отбрасывает события.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn booking_created(&self, booking: &Booking) {
        let Some(tx) = &self.tx else { return };
        if let Err(e) = tx.try_send(BookingEvent::Created(booking.clone())) {
            warn!("Booking {} notification dropped: {}", booking.id, e);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("message build error: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError>;
}

/// Отправка писем через SMTP (STARTTLS).
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .build();
        let from = format!("{} <{}>", config.from_name, config.from_email).parse()?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())?;

        self.transport.send(message).await?;
        Ok(())
    }
}

/// Используется, когда SMTP не настроен: письмо только попадает в лог.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> Result<(), MailError> {
        info!("SMTP is not configured, email '{}' to {} was not sent", subject, to);
        Ok(())
    }
}

pub struct NotificationWorker {
    rx: mpsc::Receiver<BookingEvent>,
    store: Arc<dyn BookingStore>,
    payments: PaymentService,
    mailer: Arc<dyn Mailer>,
    my_bookings_url: String,
    grace_minutes: i64,
}

impl NotificationWorker {
    pub fn new(
        rx: mpsc::Receiver<BookingEvent>,
        store: Arc<dyn BookingStore>,
        payments: PaymentService,
        mailer: Arc<dyn Mailer>,
        my_bookings_url: String,
        grace_minutes: i64,
    ) -> Self {
        Self { rx, store, payments, mailer, my_bookings_url, grace_minutes }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Notification worker started");
        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        info!("Notification worker stopped");
    }

    pub async fn handle(&self, event: BookingEvent) {
        match event {
            BookingEvent::Created(booking) => self.booking_created(&booking).await,
        }
    }

    async fn booking_created(&self, booking: &Booking) {
        let user = match self.store.find_user(booking.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!("Booking {} belongs to unknown user {}", booking.id, booking.user_id);
                return;
            }
            Err(e) => {
                error!("Failed to load user {} for booking {}: {:?}", booking.user_id, booking.id, e);
                return;
            }
        };

        // Без ссылки письмо всё равно уходит: оплатить можно из списка бронирований
        let payment_url = match self.payments.create_payment(booking.id).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Payment for booking {} was not created: {}", booking.id, e);
                None
            }
        };

        let Some(email) = user.email.as_deref().filter(|e| !e.is_empty()) else {
            info!("User {} has no email, booking {} notification skipped", user.id, booking.id);
            return;
        };

        let body = self.render_booking_created(&user, booking, payment_url.as_deref());
        match self.mailer.send(email, BOOKING_CREATED_SUBJECT, &body).await {
            Ok(()) => info!("Booking {} notification sent to {}", booking.id, email),
            Err(e) => error!("Failed to send booking {} notification: {}", booking.id, e),
        }
    }

    fn render_booking_created(&self, user: &User, booking: &Booking, payment_url: Option<&str>) -> String {
        let pay_button = payment_url
            .map(escape_html)
            .map(|url| format!(r#"<p><a href="{url}" style="display:inline-block;padding:10px 20px;background:#00c85e;color:#fff;text-decoration:none;border-radius:5px;">Перейти к оплате</a></p>"#))
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html lang="ru">
<head><meta charset="UTF-8"><title>{subject}</title></head>
<body style="font-family: Arial, sans-serif; color: #333;">
  <div style="max-width: 600px; margin: 20px auto;">
    <h1>{subject}</h1>
    <p>Здравствуйте, {name}</p>
    <p>Номер: {room}</p>
    <p>Дата заезда: {start}</p>
    <p>Дата выезда: {end}</p>
    <p>Стоимость: {cost}</p>
    <p>Пожалуйста, оплатите бронирование в течение {grace} минут. Оплатить можно по кнопке ниже или в списке бронирований: {my_bookings}</p>
    {pay_button}
    <p>Если бронирование оформлено случайно, отмените его в списке бронирований, иначе оно удалится само через {grace} минут.</p>
  </div>
</body>
</html>"#,
            subject = BOOKING_CREATED_SUBJECT,
            name = escape_html(&user.name),
            room = booking.room_id,
            start = booking.start_date.format("%d.%m.%Y"),
            end = booking.end_date.format("%d.%m.%Y"),
            cost = booking.total_cost,
            grace = self.grace_minutes,
            my_bookings = escape_html(&self.my_bookings_url),
            pay_button = pay_button,
        )
    }
}

const BOOKING_CREATED_SUBJECT: &str = "Вами было создано бронирование";

// Имя гостя вводится персоналом вручную и попадает в HTML как есть
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
