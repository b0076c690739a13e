pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use services::{
    booking::BookingService,
    cleanup::ExpirationSweeper,
    notification::{Mailer, NotificationDispatcher, NotificationWorker},
    payment::{PaymentGateway, PaymentService},
    webhook::WebhookReconciler,
};
use store::BookingStore;

const NOTIFICATION_QUEUE_CAPACITY: usize = 256;

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub bookings: BookingService,
    pub payments: PaymentService,
    pub webhooks: WebhookReconciler,
}

/// Фоновые задачи процесса: очистка просроченных броней и рассылка уведомлений.
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    sweeper: JoinHandle<()>,
    notifications: JoinHandle<()>,
}

impl BackgroundTasks {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.sweeper.await {
            tracing::error!("Expiration sweeper task failed: {:?}", e);
        }
        if let Err(e) = self.notifications.await {
            tracing::error!("Notification task failed: {:?}", e);
        }
    }
}

impl AppState {
    /// Собирает состояние из готовых зависимостей без фоновых задач.
    pub fn new(
        config: config::Config,
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifications: NotificationDispatcher,
    ) -> Arc<Self> {
        let payments = PaymentService::new(store.clone(), gateway, &config.payment);
        Arc::new(Self {
            bookings: BookingService::new(store.clone(), notifications),
            webhooks: WebhookReconciler::new(store),
            payments,
            config,
        })
    }

    /// Собирает состояние и запускает фоновые задачи.
    /// Вызывается один раз за время жизни процесса.
    pub fn start(
        config: config::Config,
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
    ) -> (Arc<Self>, BackgroundTasks) {
        let (dispatcher, rx) = NotificationDispatcher::channel(NOTIFICATION_QUEUE_CAPACITY);
        let state = Self::new(config, store.clone(), gateway, dispatcher);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = NotificationWorker::new(
            rx,
            store.clone(),
            state.payments.clone(),
            mailer,
            state.config.booking.my_bookings_url.clone(),
            state.config.booking.expiration_grace_minutes,
        );
        let notifications = tokio::spawn(worker.run(shutdown_rx.clone()));
        let sweeper = ExpirationSweeper::new(store, &state.config.booking).spawn(shutdown_rx);

        (state, BackgroundTasks { shutdown, sweeper, notifications })
    }
}
