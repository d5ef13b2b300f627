//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

use msgchain_rs::config::{DemoConfig, MeterConfig, Scenario, WriterConfig};
use msgchain_rs::{Channel, ChannelConfig, OverflowPolicy};
use std::time::{Duration, Instant};

/// Upper bound for anything that should happen "promptly"
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Scenario preset with millisecond-scale work so tests run fast
pub fn fast_config(scenario: Scenario) -> DemoConfig {
    let mut config = DemoConfig::preset(scenario);
    config.meter = MeterConfig {
        read_ms: 1,
        period_ms: 20,
        min_period_ms: 5,
        max_period_ms: 200,
        scale: 1.5,
    };
    config.writer = WriterConfig::fixed(1);
    config
}

/// Capacity-1 drop-newest channel, the shape of the timer channel
pub fn tick_channel<M: Send + 'static>(name: &str) -> Channel<M> {
    Channel::new(name, ChannelConfig::bounded(1, OverflowPolicy::DropNewest))
        .expect("valid channel config")
}

/// Receive everything that arrives within `window`
pub fn collect_for<M>(channel: &Channel<M>, window: Duration) -> Vec<(Instant, M)> {
    let deadline = Instant::now() + window;
    let mut received = Vec::new();
    loop {
        let now = Instant::now();
        if now >= deadline {
            return received;
        }
        match channel.receive(Some(deadline - now)) {
            Ok(msg) => received.push((Instant::now(), msg)),
            Err(_) => return received,
        }
    }
}

/// Assert a duration lies within `[low, high]`
pub fn assert_between(actual: Duration, low: Duration, high: Duration) {
    assert!(
        actual >= low && actual <= high,
        "Expected {:?} to be within [{:?}, {:?}]",
        actual,
        low,
        high
    );
}
