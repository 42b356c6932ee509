/// Broadcast server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8765`).
    pub port: u16,
    /// Redis connection string (default: `redis://127.0.0.1/`).
    pub redis_url: String,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// Seconds between keepalive pings to connected clients (default: `30`).
    pub heartbeat_interval_secs: u64,
}

impl BroadcastConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                    |
    /// |---------------------------|----------------------------|
    /// | `HOST`                    | `0.0.0.0`                  |
    /// | `PORT`                    | `8765`                     |
    /// | `REDIS_URL`               | `redis://127.0.0.1/`       |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`    |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8765".into())
            .parse()
            .expect("PORT must be a valid u16");

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let heartbeat_interval_secs: u64 = std::env::var("HEARTBEAT_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("HEARTBEAT_INTERVAL_SECS must be a valid u64");

        Self {
            host,
            port,
            redis_url,
            cors_origins,
            heartbeat_interval_secs,
        }
    }
}
