use crate::error::AppError;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
    /// Prefix of every stored attachment reference, without trailing slash
    pub public_base_url: String,
    pub max_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Unset runs the service against the in-memory store
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub client_url: String,
    pub uploads: UploadConfig,
    pub ws: WsConfig,
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Config("JWT_SECRET missing".into()))?;

        let port = parsed("PORT", 5000u16);
        let host = env::var("BIND_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let client_url =
            env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:3000".into());

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();
        let uploads = UploadConfig {
            dir: PathBuf::from(env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into())),
            public_base_url,
            max_bytes: parsed("MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
        };

        let ws = WsConfig {
            heartbeat_interval: Duration::from_secs(parsed("WS_HEARTBEAT_INTERVAL_SECS", 5)),
            client_timeout: Duration::from_secs(parsed("WS_CLIENT_TIMEOUT_SECS", 30)),
        };
        if ws.client_timeout <= ws.heartbeat_interval {
            return Err(AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must exceed WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        Ok(Self {
            host,
            port,
            database_url,
            jwt_secret,
            client_url,
            uploads,
            ws,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "JWT_SECRET",
        "PORT",
        "BIND_HOST",
        "DATABASE_URL",
        "CLIENT_URL",
        "UPLOAD_DIR",
        "PUBLIC_BASE_URL",
        "MAX_UPLOAD_BYTES",
        "WS_HEARTBEAT_INTERVAL_SECS",
        "WS_CLIENT_TIMEOUT_SECS",
    ];

    fn clear() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        env::set_var("JWT_SECRET", "secret");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:5000");
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.client_url, "http://localhost:3000");
        assert_eq!(cfg.uploads.public_base_url, "http://localhost:5000");
        assert_eq!(cfg.uploads.max_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.ws.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(cfg.ws.client_timeout, Duration::from_secs(30));

        clear();
    }

    #[test]
    #[serial]
    fn test_missing_secret_is_config_error() {
        clear();
        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear();
        env::set_var("JWT_SECRET", "secret");
        env::set_var("PORT", "8081");
        env::set_var("DATABASE_URL", "postgres://localhost/chat");
        env::set_var("PUBLIC_BASE_URL", "https://cdn.example.com/");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/chat"));
        assert_eq!(cfg.uploads.public_base_url, "https://cdn.example.com");

        clear();
    }

    #[test]
    #[serial]
    fn test_heartbeat_must_be_shorter_than_timeout() {
        clear();
        env::set_var("JWT_SECRET", "secret");
        env::set_var("WS_HEARTBEAT_INTERVAL_SECS", "30");
        env::set_var("WS_CLIENT_TIMEOUT_SECS", "10");

        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));
        clear();
    }
}
