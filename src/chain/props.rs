//! Channel properties: capacity, overflow policy, send timeout.
//!
//! These are fixed at creation. They serialize with the same field names used
//! in the demo's TOML configuration (`capacity`, `policy`, `send_timeout_ms`).

use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reaction of a bounded channel to a send while it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Discard the incoming message
    #[default]
    DropNewest,
    /// Discard the head of the queue, then enqueue the incoming message
    RemoveOldest,
    /// Wait for space; fail with a send timeout when the wait elapses
    BlockWithTimeout,
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverflowPolicy::DropNewest => write!(f, "drop-newest"),
            OverflowPolicy::RemoveOldest => write!(f, "remove-oldest"),
            OverflowPolicy::BlockWithTimeout => write!(f, "block-with-timeout"),
        }
    }
}

/// What `close` does with messages still in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseMode {
    /// Discard pending messages at once
    #[default]
    DropContent,
    /// Keep pending messages; receivers drain them before seeing closure
    RetainContent,
}

/// Creation-time configuration of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    /// Maximum queued messages (0 = unbounded)
    #[serde(default)]
    pub capacity: usize,

    /// Reaction to a send on a full channel
    #[serde(default)]
    pub policy: OverflowPolicy,

    /// How long a send waits for space before the policy applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_timeout_ms: Option<u64>,
}

impl ChannelConfig {
    /// An unbounded channel; the policy never triggers
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A bounded channel that applies `policy` immediately when full
    pub fn bounded(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            capacity,
            policy,
            send_timeout_ms: None,
        }
    }

    /// Wait up to `timeout` for space before applying the policy.
    ///
    /// The timeout is kept in whole milliseconds, rounded up, so a non-zero
    /// sub-millisecond wait never becomes an immediate decision.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        let ms = timeout.as_nanos().div_ceil(1_000_000);
        self.send_timeout_ms = Some(u64::try_from(ms).unwrap_or(u64::MAX));
        self
    }

    /// Configured send timeout as a duration
    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }

    /// Whether the channel has no capacity limit
    pub fn is_unbounded(&self) -> bool {
        self.capacity == 0
    }

    /// Reject combinations that cannot behave as configured
    pub fn validate(&self) -> Result<()> {
        if self.is_unbounded() {
            if self.send_timeout_ms.is_some() {
                return Err(ChainError::InvalidConfig(
                    "send_timeout_ms has no effect on an unbounded channel".to_string(),
                ));
            }
            if self.policy == OverflowPolicy::BlockWithTimeout {
                return Err(ChainError::InvalidConfig(
                    "block-with-timeout requires a capacity above 0".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded() {
        let config = ChannelConfig::default();
        assert!(config.is_unbounded());
        assert!(config.send_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_on_unbounded_rejected() {
        let config = ChannelConfig::unbounded().with_send_timeout(Duration::from_millis(10));
        assert!(matches!(
            config.validate(),
            Err(ChainError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bounded_with_timeout_is_valid() {
        let config = ChannelConfig::bounded(2, OverflowPolicy::RemoveOldest)
            .with_send_timeout(Duration::from_millis(300));
        assert!(config.validate().is_ok());
        assert_eq!(config.send_timeout(), Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_sub_millisecond_timeout_rounds_up() {
        let policy = OverflowPolicy::RemoveOldest;
        let config = ChannelConfig::bounded(1, policy).with_send_timeout(Duration::from_micros(500));
        assert_eq!(config.send_timeout_ms, Some(1));

        let config = ChannelConfig::bounded(1, policy).with_send_timeout(Duration::from_micros(1500));
        assert_eq!(config.send_timeout_ms, Some(2));

        let config = ChannelConfig::bounded(1, policy).with_send_timeout(Duration::ZERO);
        assert_eq!(config.send_timeout_ms, Some(0));
    }

    #[test]
    fn test_policy_toml_names() {
        let config: ChannelConfig =
            toml::from_str("capacity = 2\npolicy = \"remove-oldest\"\nsend_timeout_ms = 300\n")
                .unwrap();
        assert_eq!(config.capacity, 2);
        assert_eq!(config.policy, OverflowPolicy::RemoveOldest);
        assert_eq!(config.send_timeout_ms, Some(300));

        assert_eq!(OverflowPolicy::BlockWithTimeout.to_string(), "block-with-timeout");
    }
}
