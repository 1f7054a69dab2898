use anyhow::{Context, Result};
use std::env;
use std::time::Duration;
use url::Url;

/// Heading printed on challans
const DEFAULT_COMPANY_NAME: &str = "FMCG Distribution";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Backend REST API
    pub backend_url: String,
    pub backend_timeout_seconds: u64,
    pub backend_retry_max_elapsed_ms: u64,

    // Local store (in-memory when unset)
    pub redis_url: Option<String>,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Auth
    pub auth_jwt_secret: Option<String>,

    // Offline queue
    pub offline_replay_interval_seconds: u64,

    // Views
    pub low_stock_threshold: i64,
    pub import_max_bytes: usize,
    pub company_name: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Backend
        let backend_url = env::var("BACKEND_URL").context("BACKEND_URL must be set")?;
        Url::parse(&backend_url).context("BACKEND_URL is not a valid URL")?;
        let backend_timeout_seconds = parse_or("BACKEND_TIMEOUT_SECONDS", 30);
        let backend_retry_max_elapsed_ms = parse_or("BACKEND_RETRY_MAX_ELAPSED_MS", 2000);

        // Store
        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty());

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Auth
        let auth_jwt_secret = env::var("AUTH_JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        let offline_replay_interval_seconds = parse_or("OFFLINE_REPLAY_INTERVAL_SECONDS", 60);
        let low_stock_threshold = parse_or("LOW_STOCK_THRESHOLD", 50);
        let import_max_bytes = parse_or("IMPORT_MAX_BYTES", 5 * 1024 * 1024);
        let company_name = env::var("COMPANY_NAME").unwrap_or_else(|_| DEFAULT_COMPANY_NAME.to_string());

        Ok(Settings {
            env,
            server_addr,
            backend_url,
            backend_timeout_seconds,
            backend_retry_max_elapsed_ms,
            redis_url,
            cors_allow_origins,
            auth_jwt_secret,
            offline_replay_interval_seconds,
            low_stock_threshold,
            import_max_bytes,
            company_name,
        })
    }

    /// Settings pointed at `backend_url` with every other value at its default.
    pub fn with_backend(backend_url: impl Into<String>) -> Self {
        Self {
            env: Environment::Dev,
            server_addr: "127.0.0.1:0".to_string(),
            backend_url: backend_url.into(),
            backend_timeout_seconds: 30,
            backend_retry_max_elapsed_ms: 2000,
            redis_url: None,
            cors_allow_origins: vec!["http://localhost:3000".to_string()],
            auth_jwt_secret: None,
            offline_replay_interval_seconds: 60,
            low_stock_threshold: 50,
            import_max_bytes: 5 * 1024 * 1024,
            company_name: DEFAULT_COMPANY_NAME.to_string(),
        }
    }

    pub fn offline_replay_interval(&self) -> Option<Duration> {
        (self.offline_replay_interval_seconds > 0)
            .then(|| Duration::from_secs(self.offline_replay_interval_seconds))
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_defaults_to_dev() {
        assert_eq!(Environment::from_str("PRODUCTION"), Environment::Prod);
        assert_eq!(Environment::from_str("staging"), Environment::Staging);
        assert_eq!(Environment::from_str("anything"), Environment::Dev);
    }

    #[test]
    fn replay_interval_zero_disables_loop() {
        let mut settings = Settings::with_backend("http://localhost:8000");
        assert_eq!(
            settings.offline_replay_interval(),
            Some(Duration::from_secs(60))
        );
        settings.offline_replay_interval_seconds = 0;
        assert!(settings.offline_replay_interval().is_none());
    }
}
