//! Engine configuration - retry/backoff policy, dispatcher tuning, approval
//! policy. Layered `serde`-derived structs, each with sane defaults and a
//! `validate()`.

use serde::{Deserialize, Serialize};

/// Exponential backoff for dispatcher retries: `base_delay_ms * 2^retryCount`,
/// jittered, capped at `max_delay_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub default_max_retry_count: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            default_max_retry_count: 3,
        }
    }
}

impl RetryPolicy {
    /// `base * 2^retry_count`, jittered +/-20%, capped at `max_delay_ms`.
    pub fn backoff_for(&self, retry_count: u32, jitter_unit: f64) -> std::time::Duration {
        let exp = self.base_delay_ms.saturating_mul(1u64 << retry_count.min(20));
        let capped = exp.min(self.max_delay_ms);
        let jitter = 1.0 + (jitter_unit.clamp(0.0, 1.0) - 0.5) * 0.4;
        std::time::Duration::from_millis((capped as f64 * jitter) as u64)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay_ms == 0 {
            return Err("retry.base_delay_ms must be > 0".into());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("retry.max_delay_ms must be >= base_delay_ms".into());
        }
        if self.default_max_retry_count == 0 {
            return Err("retry.default_max_retry_count must be > 0".into());
        }
        Ok(())
    }
}

/// Dispatcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub tick_interval_ms: u64,
    pub worker_pool_size: usize,
    pub claim_batch_size: usize,
    pub driver_call_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            worker_pool_size: 8,
            claim_batch_size: 32,
            driver_call_timeout_ms: 15_000,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_pool_size == 0 {
            return Err("dispatcher.worker_pool_size must be > 0".into());
        }
        if self.claim_batch_size == 0 {
            return Err("dispatcher.claim_batch_size must be > 0".into());
        }
        Ok(())
    }
}

/// Whether `seal` requires `approvalStatus=approved` project-wide, left as a
/// default for projects that don't set `require_approval_to_seal`
/// themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalPolicy {
    NeverRequired,
    AlwaysRequired,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        ApprovalPolicy::NeverRequired
    }
}

/// Top-level engine configuration, loaded by `forge-server` and handed to
/// core services by construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub dispatcher: DispatcherConfig,
    pub default_approval_policy: ApprovalPolicy,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if let Err(e) = self.retry.validate() {
            errors.push(e);
        }
        if let Err(e) = self.dispatcher.validate() {
            errors.push(e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn backoff_caps_and_grows() {
        let policy = RetryPolicy::default();
        let d0 = policy.backoff_for(0, 0.5);
        let d5 = policy.backoff_for(5, 0.5);
        assert!(d5 >= d0);
        assert!(d5.as_millis() as u64 <= policy.max_delay_ms + 1);
    }

    #[test]
    fn rejects_zero_base_delay() {
        let mut policy = RetryPolicy::default();
        policy.base_delay_ms = 0;
        assert!(policy.validate().is_err());
    }
}
