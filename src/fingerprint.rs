//! Visitor fingerprinting.
//!
//! A fingerprint is a best-effort, self-reported identifier derived from
//! device signals. It is spoofable and carries no server-side binding; the
//! abuse signals that matter are keyed on the client IP.

use crate::ViewgateError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Longest fingerprint accepted from a client.
pub const MAX_FINGERPRINT_LEN: usize = 128;

/// Opaque visitor identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Validate a fingerprint received from an untrusted client.
    ///
    /// Accepts 1..=128 characters of `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Result<Self, ViewgateError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ViewgateError::InvalidRequest(
                "fingerprint cannot be empty".to_string(),
            ));
        }
        if raw.len() > MAX_FINGERPRINT_LEN {
            return Err(ViewgateError::InvalidRequest(format!(
                "fingerprint longer than {} characters",
                MAX_FINGERPRINT_LEN
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ViewgateError::InvalidRequest(
                "fingerprint contains invalid characters".to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Device signals a fingerprint is derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSignals {
    /// Browser or client User-Agent.
    pub user_agent: String,
    /// Preferred languages, most preferred first.
    pub languages: Vec<String>,
    /// IANA timezone name.
    pub timezone: Option<String>,
    /// Screen width in pixels.
    pub screen_width: Option<u32>,
    /// Screen height in pixels.
    pub screen_height: Option<u32>,
    /// Color depth in bits.
    pub color_depth: Option<u8>,
    /// OS / platform string.
    pub platform: Option<String>,
    /// Logical CPU count.
    pub hardware_concurrency: Option<u32>,
}

impl DeviceSignals {
    /// Stable, field-ordered encoding used as hash input.
    fn canonical(&self) -> String {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(ToString::to_string).unwrap_or_default()
        }
        [
            format!("ua={}", self.user_agent),
            format!("lang={}", self.languages.join(",")),
            format!("tz={}", opt(&self.timezone)),
            format!("screen={}x{}", opt(&self.screen_width), opt(&self.screen_height)),
            format!("depth={}", opt(&self.color_depth)),
            format!("platform={}", opt(&self.platform)),
            format!("cores={}", opt(&self.hardware_concurrency)),
        ]
        .join("\n")
    }
}

/// Derive a fingerprint from device signals.
///
/// SHA-256 over the canonical signal encoding, first 128 bits, hex.
pub fn fingerprint_from_signals(signals: &DeviceSignals) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(b"viewgate-fingerprint:");
    hasher.update(signals.canonical().as_bytes());
    let hash = hasher.finalize();
    Fingerprint(hex::encode(&hash[..16]))
}

/// Where device signals come from (a browser bridge, a native probe, a fixture).
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Collect the current device signals.
    async fn collect(&self) -> Result<DeviceSignals, ViewgateError>;
}

/// Signal source returning a fixed set of signals.
#[derive(Debug, Clone)]
pub struct StaticSignals(pub DeviceSignals);

#[async_trait]
impl SignalSource for StaticSignals {
    async fn collect(&self) -> Result<DeviceSignals, ViewgateError> {
        Ok(self.0.clone())
    }
}

/// Lazily-initialized fingerprint engine.
///
/// Signals are collected at most once per service instance. Concurrent
/// callers during initialization wait on the same in-flight collection. A
/// failed collection is returned to the caller and retried on the next call.
pub struct FingerprintService {
    source: Arc<dyn SignalSource>,
    engine: OnceCell<Fingerprint>,
}

impl FingerprintService {
    /// Create a service over the given signal source.
    pub fn new(source: Arc<dyn SignalSource>) -> Self {
        Self {
            source,
            engine: OnceCell::new(),
        }
    }

    /// Get this visitor's fingerprint, collecting signals on first use.
    ///
    /// # Errors
    /// `FingerprintUnavailable` (or whatever the source reports) when signal
    /// collection fails. The caller decides how to degrade.
    pub async fn get_fingerprint(&self) -> Result<Fingerprint, ViewgateError> {
        self.engine
            .get_or_try_init(|| async {
                let signals = self.source.collect().await?;
                let fingerprint = fingerprint_from_signals(&signals);
                debug!(fingerprint = %fingerprint, "fingerprint engine initialized");
                Ok::<_, ViewgateError>(fingerprint)
            })
            .await
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn desktop_signals() -> DeviceSignals {
        DeviceSignals {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
            languages: vec!["en-US".to_string(), "en".to_string()],
            timezone: Some("America/Chicago".to_string()),
            screen_width: Some(2560),
            screen_height: Some(1440),
            color_depth: Some(24),
            platform: Some("Linux x86_64".to_string()),
            hardware_concurrency: Some(16),
        }
    }

    struct CountingSource {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl SignalSource for CountingSource {
        async fn collect(&self) -> Result<DeviceSignals, ViewgateError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first && call == 0 {
                return Err(ViewgateError::FingerprintUnavailable("canvas blocked".into()));
            }
            Ok(desktop_signals())
        }
    }

    #[test]
    fn same_signals_same_fingerprint() {
        let a = fingerprint_from_signals(&desktop_signals());
        let b = fingerprint_from_signals(&desktop_signals());
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn different_signals_different_fingerprint() {
        let mut other = desktop_signals();
        other.timezone = Some("Europe/Berlin".to_string());
        assert_ne!(
            fingerprint_from_signals(&desktop_signals()),
            fingerprint_from_signals(&other)
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Fingerprint::parse("").is_err());
        assert!(Fingerprint::parse("abc def").is_err());
        assert!(Fingerprint::parse(&"a".repeat(MAX_FINGERPRINT_LEN + 1)).is_err());
        assert_eq!(Fingerprint::parse(" fp_01-x ").unwrap().as_str(), "fp_01-x");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_collection() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail_first: false,
        });
        let service = FingerprintService::new(source.clone());

        let (a, b, c) = tokio::join!(
            service.get_fingerprint(),
            service.get_fingerprint(),
            service.get_fingerprint()
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert!(c.is_ok());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_collection_propagates_then_retries() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail_first: true,
        });
        let service = FingerprintService::new(source.clone());

        assert!(matches!(
            service.get_fingerprint().await,
            Err(ViewgateError::FingerprintUnavailable(_))
        ));
        assert!(service.get_fingerprint().await.is_ok());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
