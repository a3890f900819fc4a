//! Viewgate configuration.
//!
//! The defaults carry the production policy: 10 distinct fingerprints per IP
//! per 24h, 30 requests per IP per minute, 5 free articles per 30 days.

use crate::ViewgateError;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default number of articles an anonymous visitor may read per window.
pub const MAX_FREE_ARTICLES: u64 = 5;

/// Default metering window, in days.
pub const VIEW_WINDOW_DAYS: u32 = 30;

/// Thresholds for promoting an IP to the blocked state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityPolicy {
    /// Distinct fingerprints from one IP that mark it as suspicious.
    pub fanout_threshold: u64,

    /// Trailing window for the fan-out signal.
    pub fanout_window: Duration,

    /// Tracked requests from one IP that mark it as suspicious.
    pub rate_threshold: u64,

    /// Trailing window for the rate signal.
    pub rate_window: Duration,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            fanout_threshold: 10,
            fanout_window: Duration::from_secs(24 * 60 * 60),
            rate_threshold: 30,
            rate_window: Duration::from_secs(60),
        }
    }
}

impl SecurityPolicy {
    /// Validate thresholds and windows.
    pub fn validate(&self) -> Result<(), ViewgateError> {
        if self.fanout_threshold == 0 || self.rate_threshold == 0 {
            return Err(ViewgateError::ConfigError(
                "security thresholds must be at least 1".to_string(),
            ));
        }
        if self.fanout_window.is_zero() || self.rate_window.is_zero() {
            return Err(ViewgateError::ConfigError(
                "security windows cannot be zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Free-view allowance for anonymous visitors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterPolicy {
    /// Distinct articles a fingerprint may view before the upsell shows.
    pub max_free_articles: u64,

    /// Rolling window the allowance applies to.
    pub window_days: u32,
}

impl Default for MeterPolicy {
    fn default() -> Self {
        Self {
            max_free_articles: MAX_FREE_ARTICLES,
            window_days: VIEW_WINDOW_DAYS,
        }
    }
}

impl MeterPolicy {
    /// Validate the allowance.
    pub fn validate(&self) -> Result<(), ViewgateError> {
        if self.max_free_articles == 0 {
            return Err(ViewgateError::ConfigError(
                "max_free_articles must be at least 1".to_string(),
            ));
        }
        if self.window_days == 0 {
            return Err(ViewgateError::ConfigError(
                "window_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the HTTP client used by visitors' sessions.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the viewgate server (e.g., "https://example.com").
    pub base_url: String,

    /// Application name sent in the User-Agent (e.g., "newsroom/2.1.0").
    pub app_name: String,

    /// User-Agent product identifier.
    pub user_agent_product: String,

    /// Request timeout. Timeouts fail open on the pre-flight check.
    pub timeout: Duration,

    /// Client-side copy of the free-article allowance.
    pub max_free_articles: u64,
}

impl ClientConfig {
    /// Create a client config for the given server with default settings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            app_name: "viewgate".to_string(),
            user_agent_product: "viewgate-client".to_string(),
            timeout: Duration::from_secs(10),
            max_free_articles: MAX_FREE_ARTICLES,
        }
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), ViewgateError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ViewgateError::ConfigError(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.max_free_articles == 0 {
            return Err(ViewgateError::ConfigError(
                "max_free_articles must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ViewgateError::ConfigError(
                "timeout cannot be zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the gate server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub bind_addr: SocketAddr,

    /// Snapshot file for the persistent store; its logs sit beside it. In-memory when unset.
    pub data_path: Option<PathBuf>,

    /// Key required by the admin routes. Admin routes are disabled when unset.
    pub admin_api_key: Option<String>,

    /// IP blocking thresholds.
    pub security: SecurityPolicy,

    /// Article metering allowance.
    pub meter: MeterPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_path: None,
            admin_api_key: None,
            security: SecurityPolicy::default(),
            meter: MeterPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `VIEWGATE_*` environment variables, defaulting what is unset.
    pub fn from_env() -> Result<Self, ViewgateError> {
        let defaults = Self::default();
        let security = SecurityPolicy {
            fanout_threshold: env_parse("VIEWGATE_FANOUT_THRESHOLD")?
                .unwrap_or(defaults.security.fanout_threshold),
            fanout_window: env_parse("VIEWGATE_FANOUT_WINDOW_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.security.fanout_window),
            rate_threshold: env_parse("VIEWGATE_RATE_THRESHOLD")?
                .unwrap_or(defaults.security.rate_threshold),
            rate_window: env_parse("VIEWGATE_RATE_WINDOW_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.security.rate_window),
        };
        let meter = MeterPolicy {
            max_free_articles: env_parse("VIEWGATE_MAX_FREE_ARTICLES")?
                .unwrap_or(defaults.meter.max_free_articles),
            window_days: env_parse("VIEWGATE_VIEW_WINDOW_DAYS")?
                .unwrap_or(defaults.meter.window_days),
        };

        let config = Self {
            bind_addr: env_parse("VIEWGATE_BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            data_path: env::var("VIEWGATE_DATA_PATH").ok().map(PathBuf::from),
            admin_api_key: env::var("VIEWGATE_ADMIN_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            security,
            meter,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate nested policies.
    pub fn validate(&self) -> Result<(), ViewgateError> {
        self.security.validate()?;
        self.meter.validate()
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ViewgateError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ViewgateError::ConfigError(format!("{} is invalid: {}", key, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policies_are_valid() {
        assert!(SecurityPolicy::default().validate().is_ok());
        assert!(MeterPolicy::default().validate().is_ok());
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let policy = SecurityPolicy {
            rate_threshold: 0,
            ..SecurityPolicy::default()
        };
        assert!(matches!(policy.validate(), Err(ViewgateError::ConfigError(_))));
    }

    #[test]
    fn zero_allowance_is_rejected() {
        let policy = MeterPolicy {
            max_free_articles: 0,
            ..MeterPolicy::default()
        };
        assert!(matches!(policy.validate(), Err(ViewgateError::ConfigError(_))));
    }

    #[test]
    fn client_config_requires_http_url() {
        assert!(ClientConfig::new("https://example.com").validate().is_ok());
        assert!(ClientConfig::new("example.com").validate().is_err());
    }

    #[test]
    fn env_parse_reports_bad_values() {
        env::set_var("VIEWGATE_TEST_BAD_NUMBER", "ten");
        let parsed: Result<Option<u64>, _> = env_parse("VIEWGATE_TEST_BAD_NUMBER");
        assert!(matches!(parsed, Err(ViewgateError::ConfigError(_))));

        let missing: Option<u64> = env_parse("VIEWGATE_TEST_UNSET_NUMBER").unwrap();
        assert!(missing.is_none());
    }
}
