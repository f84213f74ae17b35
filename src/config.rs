use std::{env, time::Duration};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub idempotency_ttl: Duration,
    pub payment_webhook_secret: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let idempotency_ttl = env::var("IDEMPOTENCY_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(24 * 60 * 60));
        let payment_webhook_secret = env::var("PAYMENT_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty());
        Ok(Self {
            port,
            database_url,
            host,
            idempotency_ttl,
            payment_webhook_secret,
        })
    }
}
