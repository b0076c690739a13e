use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

/// Пул соединений PostgreSQL, общий для хранилища бронирований.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!(
            "Database pool ready: max {} connections, acquire timeout {}s",
            config.pool_size, config.acquire_timeout_seconds
        );
        Ok(Database { pool })
    }

    /// Схема включает exclusion constraint на даты броней, поэтому миграции
    /// обязательны до приёма запросов.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Applying booking schema migrations...");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Booking schema is up to date");
        Ok(())
    }
}
