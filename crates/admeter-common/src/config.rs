//! Billing configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable business constants for the billing platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Impressions per billing batch
    pub batch_size: u64,
    /// Fraction of planned budget required as upfront deposit
    pub deposit_fraction: Decimal,
    /// Hours after launch or pause during which stopping waives the fee
    pub grace_period_hours: i64,
    /// Percentage fee applied to unspent budget on late cancellation
    pub cancellation_fee_percent: Decimal,
    /// Minutes within which a repeated fingerprint counts once
    pub dedup_window_mins: i64,
    /// Milliseconds to wait for the balance lock before giving up
    pub lock_deadline_ms: u64,
    /// Balance below this triggers a low-balance notification
    pub low_balance_threshold: Decimal,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            deposit_fraction: dec!(0.20),
            grace_period_hours: 24,
            cancellation_fee_percent: dec!(5),
            dedup_window_mins: 10,
            lock_deadline_ms: 250,
            low_balance_threshold: dec!(100),
        }
    }
}

impl BillingConfig {
    /// Load defaults with environment overrides
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse("ADMETER_BATCH_SIZE") {
            cfg.batch_size = v;
        }
        if let Some(v) = env_parse("ADMETER_GRACE_PERIOD_HOURS") {
            cfg.grace_period_hours = v;
        }
        if let Some(v) = env_parse("ADMETER_DEDUP_WINDOW_MINS") {
            cfg.dedup_window_mins = v;
        }
        if let Some(v) = env_parse("ADMETER_LOCK_DEADLINE_MS") {
            cfg.lock_deadline_ms = v;
        }
        if let Some(v) = env_parse::<Decimal>("ADMETER_DEPOSIT_FRACTION") {
            cfg.deposit_fraction = v;
        }
        if let Some(v) = env_parse::<Decimal>("ADMETER_CANCELLATION_FEE_PERCENT") {
            cfg.cancellation_fee_percent = v;
        }
        if let Some(v) = env_parse::<Decimal>("ADMETER_LOW_BALANCE_THRESHOLD") {
            cfg.low_balance_threshold = v;
        }
        cfg
    }

    /// Deadline for balance lock acquisition
    pub fn lock_deadline(&self) -> Duration {
        Duration::from_millis(self.lock_deadline_ms)
    }

    /// Dedup window as a chrono duration
    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.dedup_window_mins)
    }

    /// Grace period as a chrono duration
    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::hours(self.grace_period_hours)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
