use serde::Deserialize;
use std::env;
use std::fmt;
use std::str::FromStr;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub payment: PaymentConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub booking: BookingConfig,
    pub smtp: Option<SmtpConfig>,
    pub cors: CorsConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    /// `json` включает структурированные логи, всё остальное - человекочитаемый формат.
    pub log_format: String,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub acquire_timeout_seconds: u64,
}

// Настройки JWT
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

// Настройки платежного шлюза
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub shop_id: String,
    pub secret_key: String,
    pub gateway_url: String,
    pub return_url: String,
    pub currency: String,
    pub request_timeout_seconds: u64,
}

// Настройки Circuit Breaker
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

// Сроки жизни неоплаченных бронирований
#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    pub expiration_grace_minutes: i64,
    pub sweep_interval_seconds: u64,
    /// Ссылка на список бронирований во фронтенде, подставляется в письма.
    pub my_bookings_url: String,
}

// Настройки SMTP. Если SMTP_HOST не задан, письма только логируются.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origin: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Собирает конфигурацию из произвольного источника ключей.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let smtp = match vars.optional("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: vars.parsed_or("SMTP_PORT", 587)?,
                username: vars.required("SMTP_USERNAME")?,
                password: vars.required("SMTP_PASSWORD")?,
                from_email: vars.required("SMTP_EMAIL")?,
                from_name: vars.or("SMTP_FROM_NAME", "Hotel Booking"),
            }),
            None => None,
        };

        Ok(Config {
            app: AppConfig {
                host: vars.or("HOST", "0.0.0.0"),
                port: vars.parsed_or("PORT", 8080)?,
                environment: vars.or("ENVIRONMENT", "development"),
                rust_log: vars.or("RUST_LOG", "hotel_booking=debug,tower_http=debug"),
                log_format: vars.or("LOG_FORMAT", "pretty"),
            },
            database: DatabaseConfig {
                url: vars.required("DATABASE_URL")?,
                pool_size: vars.parsed_at_least("DB_POOL_SIZE", 20, 1)?,
                acquire_timeout_seconds: vars.parsed_at_least("DB_ACQUIRE_TIMEOUT_SECONDS", 5, 1)?,
            },
            jwt: JwtConfig {
                secret: vars.required("JWT_SECRET")?,
            },
            payment: PaymentConfig {
                shop_id: vars.required("YOOKASSA_SHOP_ID")?,
                secret_key: vars.required("YOOKASSA_SECRET_KEY")?,
                gateway_url: vars.or("PAYMENT_GATEWAY_URL", "https://api.yookassa.ru/v3"),
                return_url: vars.or("PAYMENT_RETURN_URL", "http://localhost:8080/payment/success"),
                currency: vars.or("PAYMENT_CURRENCY", "RUB"),
                request_timeout_seconds: vars.parsed_at_least("PAYMENT_TIMEOUT_SECONDS", 10, 1)?,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: vars.parsed_at_least("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5, 1)?,
                timeout_seconds: vars.parsed_or("CIRCUIT_BREAKER_TIMEOUT_SECONDS", 60)?,
            },
            booking: BookingConfig {
                expiration_grace_minutes: vars.parsed_at_least("BOOKING_EXPIRATION_MINUTES", 30, 0)?,
                sweep_interval_seconds: vars.parsed_at_least("BOOKING_SWEEP_INTERVAL_SECONDS", 180, 1)?,
                my_bookings_url: vars.or("MY_BOOKINGS_URL", "http://localhost:3000/my-bookings"),
            },
            smtp,
            cors: CorsConfig {
                allowed_origin: vars.or("CORS_ALLOWED_ORIGIN", "http://localhost:3000"),
            },
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
            None => Ok(default),
        }
    }

    // Нулевой период у tokio::time::interval - паника в фоновой задаче
    fn parsed_at_least<T>(&self, key: &'static str, default: T, min: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + fmt::Display,
    {
        let value = self.parsed_or(key, default)?;
        if value < min {
            return Err(ConfigError::Invalid { key, value: value.to_string() });
        }
        Ok(value)
    }
}
