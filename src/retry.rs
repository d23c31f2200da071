//! Retry loop for upstream fetches.
//!
//! Failures fall into two recoverable classes: flood control, which waits out a
//! long cool-down, and transient failures (undecodable payloads, network errors),
//! which wait the short inter-request delay. Both retry the same request and are
//! unbounded unless the policy carries an attempt ceiling.

use crate::config::Config;
use crate::delay_manager::Sleeper;
use crate::error::{Error, Result};
use log::{error, info, warn};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    FixedDelay,
    LongCooldown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub kind: RetryKind,
    pub delay: Duration,
    /// `None` keeps retrying until the request succeeds.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        RetryPolicy {
            kind: RetryKind::FixedDelay,
            delay,
            max_attempts: None,
        }
    }

    pub fn cooldown(delay: Duration) -> Self {
        RetryPolicy {
            kind: RetryKind::LongCooldown,
            delay,
            max_attempts: None,
        }
    }

    pub fn bounded(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    fn allows(&self, retries_so_far: u32) -> bool {
        self.max_attempts.map_or(true, |max| retries_so_far < max)
    }
}

/// The pair of policies a fetch runs under.
#[derive(Debug, Clone)]
pub struct RetryPolicies {
    pub transient: RetryPolicy,
    /// `None` means the endpoint has no flood branch; flood errors are then
    /// handled as transient.
    pub flood: Option<RetryPolicy>,
}

impl RetryPolicies {
    pub fn from_config(config: &Config) -> Self {
        let mut transient = RetryPolicy::fixed(config.delay);
        let mut flood = RetryPolicy::cooldown(config.flood_cooldown);
        if let Some(max) = config.max_retries {
            transient = transient.bounded(max);
            flood = flood.bounded(max);
        }
        RetryPolicies {
            transient,
            flood: Some(flood),
        }
    }

    pub fn without_flood(mut self) -> Self {
        self.flood = None;
        self
    }
}

/// Runs `op` until it succeeds, a non-recoverable error occurs, or a bounded
/// policy runs out.
pub fn run_with_retry<T, F>(
    policies: &RetryPolicies,
    sleeper: &dyn Sleeper,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut transient_retries = 0u32;
    let mut flood_retries = 0u32;

    loop {
        let err = match op() {
            Ok(value) => {
                let total = transient_retries + flood_retries;
                if total > 0 {
                    info!("{} succeeded after {} retries", operation, total);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let (policy, counter) = match (&policies.flood, err.is_flood_control()) {
            (Some(flood), true) => (flood, &mut flood_retries),
            _ if err.is_retryable() || err.is_flood_control() => {
                (&policies.transient, &mut transient_retries)
            }
            _ => return Err(err),
        };

        if !policy.allows(*counter) {
            error!("{}: giving up after {} retries: {}", operation, *counter, err);
            return Err(Error::RetriesExhausted {
                operation: operation.to_string(),
                attempts: *counter + 1,
                last_error: Box::new(err),
            });
        }
        *counter += 1;

        match policy.kind {
            RetryKind::LongCooldown => {
                warn!("Flood wait.. ({}, retry #{})", operation, *counter)
            }
            RetryKind::FixedDelay => {
                error!("{}", err);
                error!("Unknown response. Retrying {} (retry #{})...", operation, *counter);
            }
        }
        sleeper.sleep(policy.delay);
    }
}
