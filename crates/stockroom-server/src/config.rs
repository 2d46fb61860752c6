use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, time::Duration};

/// Top-level server configuration, loaded from `stockroom.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Seed data applied at startup (initial holders and resources)
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file, or defaults when `path` is None.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let cfg: Self = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        // Engine validations
        if self.engine.max_attempts == 0 {
            return Err("engine.max_attempts must be > 0".into());
        }
        // Events validations
        if self.events.max_page_size == 0 {
            return Err("events.max_page_size must be > 0".into());
        }
        if self.events.default_lookback.is_zero() {
            return Err("events.default_lookback must be > 0".into());
        }
        // Rate limit validations
        if self.rate_limit.enabled {
            if self.rate_limit.requests_per_window == 0 {
                return Err("rate_limit.requests_per_window must be > 0".into());
            }
            if self.rate_limit.window.is_zero() {
                return Err("rate_limit.window must be > 0".into());
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Bootstrap validation
        for seed in &self.bootstrap.software {
            if seed.id.is_empty() {
                return Err("bootstrap.software entries need an id".into());
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Returns the base URL for the server.
    /// If `base_url` is configured, returns that; otherwise computes from host:port.
    pub fn base_url(&self) -> String {
        self.server
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.server.host, self.server.port))
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally visible base URL, used in Location headers.
    pub base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            base_url: None,
        }
    }
}

/// Assignment engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound for the optimistic-concurrency retry loop.
    pub max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Audit event feed tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Window used when a catch-up request has no usable `since`.
    #[serde(with = "humantime_serde")]
    pub default_lookback: Duration,
    /// Clamp for the `take` query parameter.
    pub max_page_size: u32,
    /// Broadcast channel buffer; slow subscribers past it lose events.
    pub buffer_size: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            default_lookback: Duration::from_secs(24 * 60 * 60),
            max_page_size: 200,
            buffer_size: 1024,
        }
    }
}

/// Rate limiting configuration.
///
/// Controls the per-client fixed window on the catch-up endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests allowed per client per window.
    pub requests_per_window: u32,
    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 60,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Seed data applied at startup. The asset directories are owned by an
/// external system in production; these records make a fresh instance
/// usable for development and tests.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BootstrapConfig {
    pub holders: Vec<HolderSeed>,
    pub hardware: Vec<HardwareSeed>,
    pub software: Vec<SoftwareSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderSeed {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareSeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareSeed {
    pub id: String,
    pub name: String,
    pub total_seats: u32,
    #[serde(default)]
    pub archived: bool,
}
