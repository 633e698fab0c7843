use serde::Deserialize;
use std::time::Duration;
use config::{Config as ConfigLoader, Environment};

use crate::error::{AppError, Result};

pub const DEFAULT_ENDPOINT: &str = "https://ismp.crpt.ru/api/v3/1k/documents/create";

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Length of one rate-limit window.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn as_duration(self) -> Duration {
        match self {
            TimeUnit::Milliseconds => Duration::from_millis(1),
            TimeUnit::Seconds => Duration::from_secs(1),
            TimeUnit::Minutes => Duration::from_secs(60),
            TimeUnit::Hours => Duration::from_secs(60 * 60),
            TimeUnit::Days => Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// What the replenisher does to the pool on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefillPolicy {
    /// Top the pool back up to capacity. Unused permits never carry over.
    #[default]
    Reset,
    /// Return this many permits, capped at capacity.
    Additive(u32),
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubmitMode {
    /// Only permit accounting is serialized; network calls overlap.
    #[default]
    AdmissionOnly,
    /// One submission at a time, from acquire through the response.
    Serialized,
}

#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub interval: Duration,
    pub request_limit: u32,
    pub refill_policy: RefillPolicy,
    pub submit_mode: SubmitMode,
}

impl LimiterConfig {
    /// `request_limit` permits per one `time_unit`.
    pub fn new(time_unit: TimeUnit, request_limit: u32) -> Self {
        Self {
            interval: time_unit.as_duration(),
            request_limit,
            refill_policy: RefillPolicy::Reset,
            submit_mode: SubmitMode::AdmissionOnly,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_refill_policy(mut self, policy: RefillPolicy) -> Self {
        self.refill_policy = policy;
        self
    }

    pub fn with_submit_mode(mut self, mode: SubmitMode) -> Self {
        self.submit_mode = mode;
        self
    }

    pub fn capacity(&self) -> usize {
        self.request_limit as usize
    }

    /// Permits handed back to the pool on each replenisher tick.
    pub fn refill_amount(&self) -> usize {
        match self.refill_policy {
            RefillPolicy::Reset => self.capacity(),
            RefillPolicy::Additive(n) => n as usize,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_limit == 0 {
            return Err(AppError::InvalidConfig("request_limit must be positive".into()));
        }
        if self.interval.is_zero() {
            return Err(AppError::InvalidConfig("refill interval must be positive".into()));
        }
        if let RefillPolicy::Additive(0) = self.refill_policy {
            return Err(AppError::InvalidConfig("additive refill amount must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub https_only: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: CONNECTION_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            https_only: true,
        }
    }
}

/// Settings for the demonstration driver, read from `CRPT_*` variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub log_level: String,
    pub endpoint: String,
    pub time_unit: TimeUnit,
    pub request_limit: u32,
    pub submit_mode: SubmitMode,
    pub documents: usize,
    pub signature: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let settings = ConfigLoader::builder()
            .set_default("log_level", "info")?
            .set_default("endpoint", DEFAULT_ENDPOINT)?
            .set_default("time_unit", "seconds")?
            .set_default("request_limit", 15_i64)?
            .set_default("submit_mode", "admission_only")?
            .set_default("documents", 1000_i64)?
            .set_default("signature", "signature")?
            .add_source(Environment::with_prefix("CRPT").try_parsing(true))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.limiter().validate()?;
        Ok(config)
    }

    pub fn limiter(&self) -> LimiterConfig {
        LimiterConfig::new(self.time_unit, self.request_limit).with_submit_mode(self.submit_mode)
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            endpoint: self.endpoint.clone(),
            ..GatewayConfig::default()
        }
    }
}
