//! Timer service: delayed and periodic message delivery
//!
//! The service runs on its own thread. Schedules and cancellations reach it
//! through a crossbeam command channel; pending deliveries sit in a min-heap
//! keyed by monotonic deadline. The thread sleeps in `recv_deadline` until
//! either a command arrives or the earliest deadline is due.
//!
//! # Delivery
//!
//! A delivery calls the message factory and hands the result to
//! [`Channel::try_send`], so a full channel never stalls the timer thread.
//! Whether the message was enqueued, dropped or rejected is not reported back;
//! the service only guarantees the attempt. A schedule retires itself once its
//! target channel is closed.
//!
//! # Periodic schedules
//!
//! Periodic deliveries keep a fixed-rate grid (`start + k * interval`). When the
//! thread falls behind, missed ticks are skipped instead of replayed.
//!
//! Because the grid is fixed, a tick delivered late is followed by the next
//! grid point, which can be less than one `interval` after the late delivery.
//! Deliveries are at least `interval` apart only while the thread keeps up.
//!
//! # Example
//!
//! ```ignore
//! let mut timers = TimerService::start()?;
//! let tick = timers.scheduler().schedule_periodic(&ch, || Tick, Duration::ZERO, Duration::from_millis(750))?;
//! // ...
//! tick.cancel();
//! timers.shutdown();
//! ```

use crate::chain::Channel;
use crate::error::{ChainError, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Delay until the next run of a self-rescheduling worker.
///
/// Zero when the work already took at least one full `period`, otherwise the
/// remainder of the period.
pub fn rearm_delay(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

type Deliver = Box<dyn FnMut() -> bool + Send>;

struct Entry {
    deadline: Instant,
    interval: Option<Duration>,
    deliver: Deliver,
    cancelled: Arc<AtomicBool>,
}

enum TimerCommand {
    Schedule { id: u64, entry: Entry },
    Cancel(u64),
    Shutdown,
}

/// Handle to one scheduled delivery
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
    commands: Sender<TimerCommand>,
}

impl TimerHandle {
    /// Schedule identifier, unique per service
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop future deliveries. Already enqueued messages stay queued.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(TimerCommand::Cancel(self.id));
        }
    }

    /// Whether [`TimerHandle::cancel`] has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cloneable scheduling handle for worker threads
#[derive(Debug, Clone)]
pub struct TimerScheduler {
    commands: Sender<TimerCommand>,
    next_id: Arc<AtomicU64>,
}

impl TimerScheduler {
    fn submit<M, F>(
        &self,
        channel: &Channel<M>,
        factory: F,
        delay: Duration,
        interval: Option<Duration>,
    ) -> Result<TimerHandle>
    where
        M: Send + 'static,
        F: Fn() -> M + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        let target = channel.clone();

        let deliver: Deliver = Box::new(move || match target.try_send(factory()) {
            Ok(outcome) => {
                if !outcome.is_enqueued() {
                    tracing::trace!("Timer delivery to '{}' not enqueued: {:?}", target.name(), outcome);
                }
                true
            }
            Err(_) => false,
        });

        let entry = Entry {
            deadline: Instant::now() + delay,
            interval,
            deliver,
            cancelled: cancelled.clone(),
        };

        self.commands
            .send(TimerCommand::Schedule { id, entry })
            .map_err(|_| ChainError::TimerStopped)?;

        Ok(TimerHandle {
            id,
            cancelled,
            commands: self.commands.clone(),
        })
    }

    /// Deliver `factory()` once, `delay` after this call
    pub fn schedule_delayed<M, F>(&self, channel: &Channel<M>, factory: F, delay: Duration) -> Result<TimerHandle>
    where
        M: Send + 'static,
        F: Fn() -> M + Send + 'static,
    {
        self.submit(channel, factory, delay, None)
    }

    /// Deliver `factory()` after `initial_delay`, then every `interval`.
    ///
    /// A zero `interval` makes this a one-shot schedule.
    pub fn schedule_periodic<M, F>(
        &self,
        channel: &Channel<M>,
        factory: F,
        initial_delay: Duration,
        interval: Duration,
    ) -> Result<TimerHandle>
    where
        M: Send + 'static,
        F: Fn() -> M + Send + 'static,
    {
        let interval = (!interval.is_zero()).then_some(interval);
        self.submit(channel, factory, initial_delay, interval)
    }
}

/// Owner of the timer thread
pub struct TimerService {
    scheduler: TimerScheduler,
    thread: Option<JoinHandle<()>>,
}

impl TimerService {
    /// Spawn the timer thread
    pub fn start() -> Result<Self> {
        let (commands, command_rx) = unbounded();
        let thread = std::thread::Builder::new()
            .name("timer".to_string())
            .spawn(move || TimerWorker::new(command_rx).run())?;

        Ok(Self {
            scheduler: TimerScheduler {
                commands,
                next_id: Arc::new(AtomicU64::new(0)),
            },
            thread: Some(thread),
        })
    }

    /// Cloneable handle for scheduling from other threads
    pub fn scheduler(&self) -> TimerScheduler {
        self.scheduler.clone()
    }

    /// See [`TimerScheduler::schedule_delayed`]
    pub fn schedule_delayed<M, F>(&self, channel: &Channel<M>, factory: F, delay: Duration) -> Result<TimerHandle>
    where
        M: Send + 'static,
        F: Fn() -> M + Send + 'static,
    {
        self.scheduler.schedule_delayed(channel, factory, delay)
    }

    /// See [`TimerScheduler::schedule_periodic`]
    pub fn schedule_periodic<M, F>(
        &self,
        channel: &Channel<M>,
        factory: F,
        initial_delay: Duration,
        interval: Duration,
    ) -> Result<TimerHandle>
    where
        M: Send + 'static,
        F: Fn() -> M + Send + 'static,
    {
        self.scheduler
            .schedule_periodic(channel, factory, initial_delay, interval)
    }

    /// Whether the timer thread is still running
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the timer thread and wait for it. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.scheduler.commands.send(TimerCommand::Shutdown);
            if thread.join().is_err() {
                tracing::error!("Timer thread panicked");
            }
            tracing::debug!("Timer service stopped");
        }
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct TimerWorker {
    commands: Receiver<TimerCommand>,
    entries: HashMap<u64, Entry>,
    queue: BinaryHeap<Reverse<(Instant, u64)>>,
}

impl TimerWorker {
    fn new(commands: Receiver<TimerCommand>) -> Self {
        Self {
            commands,
            entries: HashMap::new(),
            queue: BinaryHeap::new(),
        }
    }

    fn run(&mut self) {
        tracing::debug!("Timer thread started");

        loop {
            let command = match self.queue.peek() {
                Some(Reverse((deadline, _))) => self.commands.recv_deadline(*deadline),
                None => self
                    .commands
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match command {
                Ok(TimerCommand::Schedule { id, entry }) => {
                    self.queue.push(Reverse((entry.deadline, id)));
                    self.entries.insert(id, entry);
                }
                Ok(TimerCommand::Cancel(id)) => {
                    self.entries.remove(&id);
                }
                Ok(TimerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            self.fire_due(Instant::now());
        }

        tracing::debug!("Timer thread exiting with {} live schedules", self.entries.len());
    }

    fn fire_due(&mut self, now: Instant) {
        while let Some(Reverse((deadline, id))) = self.queue.peek().copied() {
            if deadline > now {
                break;
            }
            self.queue.pop();

            let Some(mut entry) = self.entries.remove(&id) else {
                continue;
            };
            if entry.cancelled.load(Ordering::SeqCst) {
                continue;
            }

            if !(entry.deliver)() {
                tracing::debug!("Timer {} retired: target channel closed", id);
                continue;
            }

            if let Some(interval) = entry.interval {
                entry.deadline = next_tick(deadline, interval, now);
                self.queue.push(Reverse((entry.deadline, id)));
                self.entries.insert(id, entry);
            }
        }
    }
}

/// Next grid point strictly after `now`, skipping ticks that were missed
fn next_tick(deadline: Instant, interval: Duration, now: Instant) -> Instant {
    let next = deadline + interval;
    if next > now {
        return next;
    }
    let behind = now.duration_since(next).as_nanos();
    let skipped = behind / interval.as_nanos() + 1;
    next + Duration::from_nanos((interval.as_nanos() * skipped) as u64)
}
