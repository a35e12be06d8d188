//! Bridge controller configuration.

use std::time::Duration;

/// Delay policy between retransmissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryBackoff {
    /// Wait `retry_delay` before every retransmission
    #[default]
    Fixed,
    /// Wait `retry_delay * n` before the n-th retransmission
    Linear,
}

/// Configuration for timeout, retry and queue behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeOptions {
    /// Reply window, measured from the most recent transmission
    pub timeout: Duration,
    /// Retransmissions before giving up (0 = single attempt)
    pub max_retries: u32,
    /// Base pause between a timeout and the retransmission
    pub retry_delay: Duration,
    pub backoff: RetryBackoff,
    /// When false, ACK-awaiting sends resolve as soon as they are posted
    pub use_acknowledgment: bool,
    /// Pause between `READY` and flushing the queue
    pub settle_delay: Duration,
    /// Log every inbound and outbound message
    pub debug: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            backoff: RetryBackoff::Fixed,
            use_acknowledgment: true,
            settle_delay: Duration::from_millis(100),
            debug: false,
        }
    }
}

impl BridgeOptions {
    /// Pause before retransmission number `retry` (1-based).
    pub fn retry_delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            RetryBackoff::Fixed => self.retry_delay,
            RetryBackoff::Linear => self.retry_delay.saturating_mul(retry.max(1)),
        }
    }

    /// Time from first transmission until an unanswered request is rejected.
    pub fn worst_case_latency(&self) -> Duration {
        let windows = self.timeout.saturating_mul(self.max_retries.saturating_add(1));
        (1..=self.max_retries).fold(windows, |total, retry| {
            total.saturating_add(self.retry_delay_for(retry))
        })
    }

    /// Load options from the process environment, falling back to defaults.
    ///
    /// Supported environment variables:
    /// - AVABRIDGE_TIMEOUT_MS
    /// - AVABRIDGE_MAX_RETRIES
    /// - AVABRIDGE_RETRY_DELAY_MS
    /// - AVABRIDGE_BACKOFF: `fixed` or `linear`
    /// - AVABRIDGE_USE_ACK: boolean
    /// - AVABRIDGE_SETTLE_DELAY_MS
    /// - AVABRIDGE_DEBUG: boolean
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();

        if let Some(ms) = read_parsed::<u64>(&lookup, "AVABRIDGE_TIMEOUT_MS") {
            options.timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = read_parsed::<u32>(&lookup, "AVABRIDGE_MAX_RETRIES") {
            options.max_retries = retries;
        }
        if let Some(ms) = read_parsed::<u64>(&lookup, "AVABRIDGE_RETRY_DELAY_MS") {
            options.retry_delay = Duration::from_millis(ms);
        }
        if let Some(val) = lookup("AVABRIDGE_BACKOFF") {
            match val.trim().to_ascii_lowercase().as_str() {
                "fixed" => options.backoff = RetryBackoff::Fixed,
                "linear" => options.backoff = RetryBackoff::Linear,
                _ => tracing::warn!(val = %val, "AVABRIDGE_BACKOFF must be `fixed` or `linear`, ignoring"),
            }
        }
        if let Some(flag) = read_flag(&lookup, "AVABRIDGE_USE_ACK") {
            options.use_acknowledgment = flag;
        }
        if let Some(ms) = read_parsed::<u64>(&lookup, "AVABRIDGE_SETTLE_DELAY_MS") {
            options.settle_delay = Duration::from_millis(ms);
        }
        if let Some(flag) = read_flag(&lookup, "AVABRIDGE_DEBUG") {
            options.debug = flag;
        }

        options
    }
}

fn read_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let val = lookup(key)?;
    match val.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, val = %val, "Invalid numeric environment value, ignoring");
            None
        }
    }
}

fn read_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let val = lookup(key)?;
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, val = %val, "Invalid boolean environment value, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_protocol_constants() {
        let options = BridgeOptions::default();
        assert_eq!(options.timeout, Duration::from_millis(5000));
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.retry_delay, Duration::from_millis(1000));
        assert!(options.use_acknowledgment);
        assert_eq!(options.settle_delay, Duration::from_millis(100));
    }

    #[test]
    fn worst_case_latency_fixed() {
        let options = BridgeOptions {
            timeout: Duration::from_millis(100),
            max_retries: 2,
            retry_delay: Duration::from_millis(50),
            ..Default::default()
        };
        assert_eq!(options.worst_case_latency(), Duration::from_millis(400));
    }

    #[test]
    fn linear_backoff_grows_per_retry() {
        let options = BridgeOptions {
            retry_delay: Duration::from_millis(200),
            backoff: RetryBackoff::Linear,
            ..Default::default()
        };
        assert_eq!(options.retry_delay_for(1), Duration::from_millis(200));
        assert_eq!(options.retry_delay_for(3), Duration::from_millis(600));
    }

    #[test]
    fn env_overrides_and_bad_values_fall_back() {
        let options = BridgeOptions::from_lookup(lookup(&[
            ("AVABRIDGE_TIMEOUT_MS", "250"),
            ("AVABRIDGE_MAX_RETRIES", "many"),
            ("AVABRIDGE_BACKOFF", "Linear"),
            ("AVABRIDGE_USE_ACK", "false"),
            ("AVABRIDGE_DEBUG", "sometimes"),
        ]));

        assert_eq!(options.timeout, Duration::from_millis(250));
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.backoff, RetryBackoff::Linear);
        assert!(!options.use_acknowledgment);
        assert!(!options.debug);
    }
}
