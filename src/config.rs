//! Runtime configuration.
//!
//! Business constants (fare rates, expiry thresholds) live here rather than
//! in the lifecycles so deployments can tune them. The defaults reproduce
//! the long-standing production values.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DB_URL: &str = "sqlite:taxishift.db?mode=rwc";

/// Fare formula: `base + minutes * time_rate + km * distance_rate`, in cents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FareConfig {
    pub base_fare_cents: f64,
    pub time_rate_cents_per_min: f64,
    pub distance_rate_cents_per_km: f64,
}

impl Default for FareConfig {
    fn default() -> Self {
        Self {
            base_fare_cents: 440.0,
            time_rate_cents_per_min: 46.0,
            distance_rate_cents_per_km: 132.0,
        }
    }
}

/// Thresholds used by the expiry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryConfig {
    /// Rides open longer than this are force-ended unpaid.
    pub ride_max_age: Duration,

    /// Shifts without a signal for longer than this are closed or removed.
    pub shift_max_idle: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            ride_max_age: Duration::from_secs(4 * 60 * 60),
            shift_max_idle: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Where and how to reach the trip scoring service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringConfig {
    /// `None` disables scoring; rides are then evaluated to a null score.
    pub url: Option<String>,
    pub timeout: Duration,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_millis(2000),
        }
    }
}

/// Configuration for the whole service.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    pub port: u16,
    pub database_url: String,
    pub fare: FareConfig,
    pub expiry: ExpiryConfig,
    pub scoring: ScoringConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DB_URL.to_string(),
            fare: FareConfig::default(),
            expiry: ExpiryConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from `TAXISHIFT_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparsable ones are logged and
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = CoreConfig::default();

        let parsed = |key: &str| -> Option<String> { lookup(key).filter(|v| !v.trim().is_empty()) };

        let fare = FareConfig {
            base_fare_cents: parse_rate(
                parsed("TAXISHIFT_BASE_FARE_CENTS"),
                "TAXISHIFT_BASE_FARE_CENTS",
                defaults.fare.base_fare_cents,
            ),
            time_rate_cents_per_min: parse_rate(
                parsed("TAXISHIFT_TIME_RATE_CENTS_PER_MIN"),
                "TAXISHIFT_TIME_RATE_CENTS_PER_MIN",
                defaults.fare.time_rate_cents_per_min,
            ),
            distance_rate_cents_per_km: parse_rate(
                parsed("TAXISHIFT_DISTANCE_RATE_CENTS_PER_KM"),
                "TAXISHIFT_DISTANCE_RATE_CENTS_PER_KM",
                defaults.fare.distance_rate_cents_per_km,
            ),
        };

        let expiry = ExpiryConfig {
            ride_max_age: Duration::from_secs(parse_or(
                parsed("TAXISHIFT_RIDE_EXPIRY_SECS"),
                "TAXISHIFT_RIDE_EXPIRY_SECS",
                defaults.expiry.ride_max_age.as_secs(),
            )),
            shift_max_idle: Duration::from_secs(parse_or(
                parsed("TAXISHIFT_SHIFT_EXPIRY_SECS"),
                "TAXISHIFT_SHIFT_EXPIRY_SECS",
                defaults.expiry.shift_max_idle.as_secs(),
            )),
        };

        let scoring = ScoringConfig {
            url: parsed("TAXISHIFT_SCORER_URL"),
            timeout: Duration::from_millis(parse_or(
                parsed("TAXISHIFT_SCORER_TIMEOUT_MS"),
                "TAXISHIFT_SCORER_TIMEOUT_MS",
                defaults.scoring.timeout.as_millis() as u64,
            )),
        };

        Self {
            port: parse_or(parsed("TAXISHIFT_PORT"), "TAXISHIFT_PORT", defaults.port),
            database_url: parsed("TAXISHIFT_DATABASE_URL").unwrap_or(defaults.database_url),
            fare,
            expiry,
            scoring,
        }
    }
}

fn parse_or<T: FromStr + Copy>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        None => default,
        Some(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(key, value = %value, "Ignoring unparsable configuration value");
                default
            }
        },
    }
}

/// Fare rates must be finite and non-negative.
fn parse_rate(raw: Option<String>, key: &str, default: f64) -> f64 {
    let rate = parse_or(raw, key, default);
    if rate.is_finite() && rate >= 0.0 {
        rate
    } else {
        warn!(key, value = rate, "Ignoring out-of-range fare rate");
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> CoreConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CoreConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.expiry.ride_max_age, Duration::from_secs(14_400));
        assert_eq!(config.expiry.shift_max_idle, Duration::from_secs(86_400));
        assert!(config.scoring.url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("TAXISHIFT_PORT", "8080"),
            ("TAXISHIFT_BASE_FARE_CENTS", "500"),
            ("TAXISHIFT_RIDE_EXPIRY_SECS", "60"),
            ("TAXISHIFT_SCORER_URL", "http://scorer.local/score"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.fare.base_fare_cents, 500.0);
        assert_eq!(config.expiry.ride_max_age, Duration::from_secs(60));
        assert_eq!(
            config.scoring.url.as_deref(),
            Some("http://scorer.local/score")
        );
    }

    #[test]
    fn test_garbage_falls_back_to_default() {
        let config = config_from(&[("TAXISHIFT_PORT", "not-a-port"), ("TAXISHIFT_SCORER_URL", "  ")]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.scoring.url.is_none());
    }

    #[test]
    fn test_unusable_fare_rates_fall_back_to_default() {
        let defaults = FareConfig::default();
        for bad in ["NaN", "inf", "-inf", "-5"] {
            let config = config_from(&[
                ("TAXISHIFT_BASE_FARE_CENTS", bad),
                ("TAXISHIFT_TIME_RATE_CENTS_PER_MIN", bad),
                ("TAXISHIFT_DISTANCE_RATE_CENTS_PER_KM", bad),
            ]);
            assert_eq!(config.fare, defaults, "{bad}");
        }

        let config = config_from(&[("TAXISHIFT_TIME_RATE_CENTS_PER_MIN", "0")]);
        assert_eq!(config.fare.time_rate_cents_per_min, 0.0);
    }
}
