//! Lifecycle manager: ordered startup and teardown
//!
//! The [`Lifecycle`] owns every channel, timer schedule and worker thread of a
//! program. Teardown runs in a fixed order:
//!
//! 1. cancel registered timer schedules
//! 2. close every channel (dropping pending content)
//! 3. join every worker
//! 4. stop the timer thread
//!
//! Closing before joining matters: a worker legitimately blocks in `receive`
//! or `select` until its channels close, so joining first would deadlock.
//!
//! [`Lifecycle::shutdown`] is idempotent and also runs from `Drop`, so the
//! teardown happens exactly once whether the program leaves through a normal
//! command, end of input, or an unwinding panic.

use crate::chain::{Channel, ChannelConfig, ChannelStats, Closable, CloseMode};
use crate::error::Result;
use crate::timer::{TimerHandle, TimerScheduler, TimerService};
use crate::worker::{Worker, WorkerExit};
use serde::Serialize;

/// Summary of one shutdown
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    /// Channels closed by this shutdown (already-closed ones are not counted)
    pub channels_closed: usize,
    /// Timer schedules cancelled
    pub timers_cancelled: usize,
    /// Workers that saw their channels close
    pub workers_completed: usize,
    /// Workers that returned an error
    pub workers_failed: usize,
    /// Workers that panicked
    pub workers_panicked: usize,
    /// Final counters of every channel
    pub channel_stats: Vec<(String, ChannelStats)>,
}

/// Owner of channels, timers and worker threads
pub struct Lifecycle {
    channels: Vec<Box<dyn Closable>>,
    timers: Vec<TimerHandle>,
    timer_service: Option<TimerService>,
    workers: Vec<Worker>,
    close_mode: CloseMode,
    report: Option<ShutdownReport>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Create an empty lifecycle; channels close with [`CloseMode::DropContent`]
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            timers: Vec::new(),
            timer_service: None,
            workers: Vec::new(),
            close_mode: CloseMode::DropContent,
            report: None,
        }
    }

    /// Override how channels are closed at shutdown
    pub fn with_close_mode(mut self, mode: CloseMode) -> Self {
        self.close_mode = mode;
        self
    }

    /// Create a channel and register it for shutdown
    pub fn channel<M: Send + 'static>(
        &mut self,
        name: impl Into<String>,
        config: ChannelConfig,
    ) -> Result<Channel<M>> {
        let channel = Channel::new(name, config)?;
        self.track_channel(&channel);
        Ok(channel)
    }

    /// Register an existing channel for shutdown
    pub fn track_channel<M: Send + 'static>(&mut self, channel: &Channel<M>) {
        self.channels.push(Box::new(channel.clone()));
    }

    /// Start the timer thread if needed and return a scheduling handle
    pub fn timers(&mut self) -> Result<TimerScheduler> {
        if let Some(service) = &self.timer_service {
            return Ok(service.scheduler());
        }
        let service = TimerService::start()?;
        let scheduler = service.scheduler();
        self.timer_service = Some(service);
        Ok(scheduler)
    }

    /// Register a timer schedule to cancel at shutdown
    pub fn track_timer(&mut self, handle: TimerHandle) {
        self.timers.push(handle);
    }

    /// Spawn a named worker thread and register it for joining
    pub fn spawn_worker<F>(&mut self, name: impl Into<String>, body: F) -> Result<()>
    where
        F: FnOnce() -> Result<u64> + Send + 'static,
    {
        let worker = Worker::spawn(name, body)?;
        self.workers.push(worker);
        Ok(())
    }

    /// Number of registered channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of workers not yet joined
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Whether shutdown has already run
    pub fn is_shut_down(&self) -> bool {
        self.report.is_some()
    }

    /// Cancel timers, close channels, join workers, stop the timer thread.
    ///
    /// The first call performs the teardown; later calls return the same report.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if let Some(report) = &self.report {
            return report.clone();
        }

        tracing::info!(
            "Shutting down: {} channels, {} workers",
            self.channels.len(),
            self.workers.len()
        );
        let mut report = ShutdownReport::default();

        for timer in self.timers.drain(..) {
            if !timer.is_cancelled() {
                timer.cancel();
                report.timers_cancelled += 1;
            }
        }

        for channel in &self.channels {
            if channel.close_with(self.close_mode) {
                report.channels_closed += 1;
            }
        }

        for worker in self.workers.drain(..) {
            let name = worker.name().to_string();
            match worker.join() {
                WorkerExit::Completed { .. } => report.workers_completed += 1,
                WorkerExit::Failed(e) => {
                    tracing::error!("Worker '{}' failed: {}", name, e);
                    report.workers_failed += 1;
                }
                WorkerExit::Panicked => {
                    tracing::error!("Worker '{}' panicked", name);
                    report.workers_panicked += 1;
                }
            }
        }

        if let Some(mut service) = self.timer_service.take() {
            service.shutdown();
        }

        report.channel_stats = self
            .channels
            .iter()
            .map(|c| (c.name().to_string(), c.stats()))
            .collect();

        for (name, stats) in &report.channel_stats {
            tracing::info!(
                "Channel '{}': sent={} received={} dropped={} evicted={}",
                name,
                stats.sent,
                stats.received,
                stats.dropped_newest,
                stats.evicted_oldest
            );
        }
        if let Ok(json) = serde_json::to_string(&report) {
            tracing::debug!("Shutdown report: {}", json);
        }

        self.report = Some(report.clone());
        report
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
