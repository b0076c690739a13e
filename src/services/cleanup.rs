use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::BookingConfig;
use crate::store::BookingStore;

/// Итог одного прохода очистки
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub found: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Удаляет онлайн-брони, которые не были оплачены в течение льготного срока.
/// Офлайн брони не трогает.
#[derive(Clone)]
pub struct ExpirationSweeper {
    store: Arc<dyn BookingStore>,
    grace: ChronoDuration,
    interval: Duration,
}

impl ExpirationSweeper {
    pub fn new(store: Arc<dyn BookingStore>, config: &BookingConfig) -> Self {
        Self {
            store,
            grace: ChronoDuration::minutes(config.expiration_grace_minutes),
            interval: Duration::from_secs(config.sweep_interval_seconds),
        }
    }

    /// Запускает фоновый цикл. Вызывается один раз при старте приложения,
    /// цикл живёт до сигнала остановки.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "🧹 Expiration sweeper started: every {:?}, grace {} min",
                self.interval,
                self.grace.num_minutes()
            );
            let mut ticker = tokio::time::interval(self.interval);
            // Первый тик interval срабатывает сразу, первый проход - через полный период
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once(Utc::now()).await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
            info!("🧹 Expiration sweeper stopped");
        })
    }

    /// Один проход: выбирает просроченные брони и удаляет их по одной.
    /// Ошибка удаления одной брони не прерывает обработку остальных.
    pub async fn run_once(&self, now: DateTime<Utc>) -> SweepReport {
        let cutoff = now - self.grace;

        let expired = match self.store.expired_online_bookings(cutoff).await {
            Ok(bookings) => bookings,
            Err(e) => {
                error!("🧹 Failed to select expired bookings: {:?}", e);
                return SweepReport::default();
            }
        };

        let mut report = SweepReport { found: expired.len(), ..SweepReport::default() };
        if expired.is_empty() {
            return report;
        }

        info!("🧹 Found {} unpaid bookings created before {}", expired.len(), cutoff);

        for booking in expired {
            // Между выборкой и удалением бронь могли оплатить или отменить
            match self.store.delete_expired_booking(booking.id).await {
                Ok(true) => {
                    report.deleted += 1;
                    info!("🧹 Expired booking {} deleted", booking.id);
                }
                Ok(false) => {
                    warn!("🧹 Booking {} was paid or removed meanwhile, skipped", booking.id);
                }
                Err(e) => {
                    report.failed += 1;
                    error!("🧹 Failed to delete expired booking {}: {:?}", booking.id, e);
                }
            }
        }

        info!(
            "🧹 Sweep finished: found={}, deleted={}, failed={}",
            report.found, report.deleted, report.failed
        );
        report
    }
}
