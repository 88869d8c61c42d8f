use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// URL the client loader script is served from (returned by validate-key)
    pub loader_url: String,
    /// Bearer token required on /admin routes (None disables the admin surface)
    pub admin_token: Option<String>,
    /// Shared secret for verifying gateway webhook signatures
    pub gateway_webhook_secret: String,
    pub gateway_base_url: String,
    pub gateway_api_key: String,
    /// Chat-ops webhook for order/payment notifications (None disables)
    pub notify_webhook_url: Option<String>,
    /// Minutes a pending transaction stays payable
    pub payment_window_minutes: i64,
    /// Seconds between server-side reconciliation passes over pending transactions
    pub reconcile_poll_secs: u64,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("KEYSHOP_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let payment_window_minutes: i64 = env::var("PAYMENT_WINDOW_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15);

        let reconcile_poll_secs: u64 = env::var("RECONCILE_POLL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "keyshop.db".to_string()),
            base_url,
            loader_url: env::var("LOADER_URL").unwrap_or_default(),
            admin_token: env::var("ADMIN_TOKEN").ok(),
            gateway_webhook_secret: env::var("GATEWAY_WEBHOOK_SECRET").unwrap_or_default(),
            gateway_base_url: env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.qris-gateway.example".to_string()),
            gateway_api_key: env::var("GATEWAY_API_KEY").unwrap_or_default(),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok(),
            payment_window_minutes,
            reconcile_poll_secs,
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
