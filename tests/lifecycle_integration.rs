//! Integration tests for channel closing and lifecycle shutdown
//!
//! These tests validate:
//! - Close releases receivers, selects and blocked senders
//! - Shutdown order (close before join) with real worker threads
//! - Shutdown runs once on every exit path

mod common;

use common::{assert_between, test_timeout};
use msgchain_rs::worker::receive_all;
use msgchain_rs::{
    Case, ChainError, Channel, ChannelConfig, CloseMode, Lifecycle, Message, OverflowPolicy,
    Select, Selected,
};
use serial_test::serial;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
enum Job {
    Run(u32),
}

impl Message for Job {
    fn kind(&self) -> &'static str {
        "run"
    }
}

#[test]
#[serial]
fn test_close_releases_blocked_receiver() {
    let ch: Channel<u32> = Channel::unbounded("idle");
    let closer = ch.clone();

    let handle = thread::spawn(move || {
        let started = Instant::now();
        let result = closer.receive(None);
        (started.elapsed(), result)
    });

    thread::sleep(Duration::from_millis(30));
    ch.close();

    let (waited, result) = handle.join().unwrap();
    assert!(result.unwrap_err().is_closed());
    assert_between(waited, Duration::from_millis(20), test_timeout());
}

#[test]
#[serial]
fn test_close_releases_blocked_select() {
    let a: Channel<Job> = Channel::unbounded("a");
    let b: Channel<Job> = Channel::unbounded("b");
    let (ra, rb) = (a.clone(), b.clone());

    let handle = thread::spawn(move || {
        let mut select = Select::new()
            .case(Case::new(&ra).on("run", |_: &mut (), _| Ok(())))
            .case(Case::new(&rb).on("run", |_: &mut (), _| Ok(())));
        select.select(&mut ())
    });

    thread::sleep(Duration::from_millis(30));
    a.close();
    b.close();
    assert_eq!(handle.join().unwrap().unwrap(), Selected::Closed);
}

#[test]
#[serial]
fn test_close_wakes_blocked_sender() {
    let ch = Channel::new("full", ChannelConfig::bounded(1, OverflowPolicy::BlockWithTimeout))
        .unwrap();
    ch.send(1u32).unwrap();
    let sender = ch.clone();

    let handle = thread::spawn(move || sender.send(2));
    thread::sleep(Duration::from_millis(30));
    ch.close();

    assert!(handle.join().unwrap().unwrap_err().is_closed());
}

#[test]
#[serial]
fn test_block_with_timeout_reports_send_timeout() {
    let ch = Channel::new(
        "slow",
        ChannelConfig::bounded(1, OverflowPolicy::BlockWithTimeout)
            .with_send_timeout(Duration::from_millis(50)),
    )
    .unwrap();
    ch.send(1u32).unwrap();

    let started = Instant::now();
    let err = ch.send(2).unwrap_err();
    assert!(matches!(err, ChainError::SendTimeout { timeout_ms: 50, .. }));
    assert_between(started.elapsed(), Duration::from_millis(45), test_timeout());
    assert_eq!(ch.stats().timed_out_sends, 1);
}

#[test]
fn test_retain_content_lets_receiver_drain() {
    let ch = Channel::unbounded("retained");
    for i in 0..3u32 {
        ch.send(i).unwrap();
    }
    assert!(ch.close_with(CloseMode::RetainContent));
    assert!(ch.send(9).unwrap_err().is_closed());

    let drained: Vec<u32> = std::iter::from_fn(|| ch.receive(None).ok()).collect();
    assert_eq!(drained, vec![0, 1, 2]);
}

#[test]
#[serial]
fn test_lifecycle_pipeline_shutdown() {
    let mut lifecycle = Lifecycle::new();
    let jobs: Channel<Job> = lifecycle
        .channel("jobs", ChannelConfig::bounded(2, OverflowPolicy::RemoveOldest))
        .unwrap();
    let results: Channel<u32> = lifecycle.channel("results", ChannelConfig::unbounded()).unwrap();

    let (rx, tx) = (jobs.clone(), results.clone());
    lifecycle
        .spawn_worker("doubler", move || {
            receive_all(&rx, &mut (), |_, Job::Run(n)| {
                tx.send(n * 2)?;
                Ok(())
            })
        })
        .unwrap();
    let sink = results.clone();
    lifecycle
        .spawn_worker("sink", move || receive_all(&sink, &mut (), |_, _| Ok(())))
        .unwrap();

    for n in 0..5 {
        jobs.send(Job::Run(n)).unwrap();
        thread::sleep(Duration::from_millis(2));
    }
    thread::sleep(Duration::from_millis(30));

    let started = Instant::now();
    let report = lifecycle.shutdown();
    assert!(started.elapsed() < test_timeout());

    assert_eq!(report.channels_closed, 2);
    assert_eq!(report.workers_completed, 2);
    let (name, stats) = &report.channel_stats[0];
    assert_eq!(name, "jobs");
    assert_eq!(stats.sent, 5);
    assert_eq!(stats.received + stats.evicted_oldest + stats.discarded_on_close, 5);

    // Second call is a no-op with the same outcome
    let again = lifecycle.shutdown();
    assert_eq!(again.workers_completed, 2);
}

#[test]
#[serial]
fn test_lifecycle_shuts_down_on_unwind() {
    let ch: Channel<u32> = Channel::unbounded("unwind");
    let observed = ch.clone();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        let mut lifecycle = Lifecycle::new();
        lifecycle.track_channel(&ch);
        let rx = ch.clone();
        lifecycle
            .spawn_worker("waiter", move || receive_all(&rx, &mut (), |_, _| Ok(())))
            .unwrap();
        panic!("control loop failed");
    }));

    assert!(result.is_err());
    assert!(observed.is_closed());
}
