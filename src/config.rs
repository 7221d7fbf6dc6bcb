//! Runtime settings read from environment variables with defaults
use chrono::Duration as Span;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory of the sled database
    pub db_path: String,
    /// Age after which a still-pending booking is swept
    pub stale_booking_hours: i64,
    /// Seconds between sweeps
    pub sweep_interval_secs: u64,
    /// Lifetime of an issued OTP code
    pub otp_ttl_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "travel.db".to_string(),
            stale_booking_hours: 24,
            sweep_interval_secs: 86_400,
            otp_ttl_secs: 300,
        }
    }
}

impl Config {
    /// Load from `TRAVEL_DB_PATH`, `STALE_BOOKING_HOURS`,
    /// `SWEEP_INTERVAL_SECS` and `OTP_TTL_SECS`. Missing or unparsable values
    /// fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: env::var("TRAVEL_DB_PATH").unwrap_or(defaults.db_path),
            stale_booking_hours: env::var("STALE_BOOKING_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|h: &i64| *h > 0)
                .unwrap_or(defaults.stale_booking_hours),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|s: &u64| *s > 0)
                .unwrap_or(defaults.sweep_interval_secs),
            otp_ttl_secs: env::var("OTP_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|s: &i64| *s > 0)
                .unwrap_or(defaults.otp_ttl_secs),
        }
    }

    /// Out-of-range hour counts fall back to the default.
    pub fn stale_after(&self) -> Span {
        Span::try_hours(self.stale_booking_hours)
            .or_else(|| Span::try_hours(Self::default().stale_booking_hours))
            .unwrap_or_default()
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn otp_ttl(&self) -> Span {
        Span::try_seconds(self.otp_ttl_secs)
            .or_else(|| Span::try_seconds(Self::default().otp_ttl_secs))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_daily_sweep() {
        let config = Config::default();
        assert_eq!(config.stale_after(), Span::hours(24));
        assert_eq!(config.sweep_interval(), Duration::from_secs(86_400));
        assert_eq!(config.otp_ttl(), Span::minutes(5));
    }

    #[test]
    fn huge_spans_fall_back_to_defaults() {
        let config = Config {
            stale_booking_hours: i64::MAX,
            otp_ttl_secs: i64::MAX,
            ..Config::default()
        };
        assert_eq!(config.stale_after(), Span::hours(24));
        assert_eq!(config.otp_ttl(), Span::minutes(5));
    }

    #[test]
    fn round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<Config>(&json).unwrap(), config);
    }
}
