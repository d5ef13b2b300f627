//! Message chains: typed FIFO channels with overflow policies
//!
//! A [`Channel`] is a multi-producer, multi-consumer queue guarded by one mutex
//! and two condvars (`not_empty`, `not_full`). Every clone of a `Channel`
//! shares the same queue; closing any clone closes the channel for all of them.
//!
//! # Overflow
//!
//! A bounded channel resolves a send on a full queue according to its
//! [`OverflowPolicy`]:
//!
//! | Policy | No send timeout | Send timeout elapsed |
//! |---|---|---|
//! | `DropNewest` | discard incoming | discard incoming |
//! | `RemoveOldest` | evict head, enqueue | evict head, enqueue |
//! | `BlockWithTimeout` | wait until space or close | `SendTimeout` error |
//!
//! # Closing
//!
//! [`Channel::close`] is idempotent. It wakes every blocked sender, receiver
//! and select watcher. With [`CloseMode::DropContent`] pending messages are
//! discarded; with [`CloseMode::RetainContent`] receivers drain them first.
//!
//! # Example
//!
//! ```
//! use msgchain_rs::chain::{Channel, ChannelConfig, OverflowPolicy, SendOutcome};
//!
//! let ch = Channel::new("writer", ChannelConfig::bounded(1, OverflowPolicy::DropNewest)).unwrap();
//! assert_eq!(ch.send(1u32).unwrap(), SendOutcome::Enqueued);
//! assert_eq!(ch.send(2u32).unwrap(), SendOutcome::DroppedNewest);
//! assert_eq!(ch.try_receive(), Some(1));
//! ```

pub mod notify;
pub mod props;

pub use notify::Notifier;
pub use props::{ChannelConfig, CloseMode, OverflowPolicy};

use crate::error::{ChainError, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// How a successful send was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The message was appended to the queue
    Enqueued,
    /// The channel was full; the incoming message was discarded
    DroppedNewest,
    /// The channel was full; the head was discarded and the message appended
    EvictedOldest,
    /// The channel was full and `try_send` does not wait (block policy only)
    Full,
}

impl SendOutcome {
    /// Whether the sent message is now in the queue
    pub fn is_enqueued(&self) -> bool {
        matches!(self, SendOutcome::Enqueued | SendOutcome::EvictedOldest)
    }
}

/// Result of a non-blocking poll, used by select
#[derive(Debug, PartialEq, Eq)]
pub enum Poll<M> {
    /// A message was taken from the head of the queue
    Ready(M),
    /// The channel is open but empty
    Empty,
    /// The channel is closed and has nothing left to deliver
    Closed,
}

/// Per-channel counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// Messages accepted into the queue
    pub sent: u64,
    /// Messages handed to receivers
    pub received: u64,
    /// Incoming messages discarded because the channel was full
    pub dropped_newest: u64,
    /// Queued messages evicted to make room
    pub evicted_oldest: u64,
    /// Sends whose wait for space elapsed
    pub timed_out_sends: u64,
    /// Pending messages discarded by `close`
    pub discarded_on_close: u64,
}

/// Object-safe view of a channel used by the lifecycle manager
pub trait Closable: Send + Sync {
    /// Channel name given at creation
    fn name(&self) -> &str;

    /// Close the channel; returns `true` if this call performed the close
    fn close_with(&self, mode: CloseMode) -> bool;

    /// Whether the channel is closed
    fn is_closed(&self) -> bool;

    /// Snapshot of the channel's counters
    fn stats(&self) -> ChannelStats;
}

struct State<M> {
    queue: VecDeque<M>,
    closed: bool,
    watchers: Vec<(u64, Arc<Notifier>)>,
    next_watcher_id: u64,
    stats: ChannelStats,
}

impl<M> State<M> {
    fn push(&mut self, msg: M) {
        self.queue.push_back(msg);
        self.stats.sent += 1;
        for (_, watcher) in &self.watchers {
            watcher.notify();
        }
    }
}

struct Shared<M> {
    name: String,
    config: ChannelConfig,
    state: Mutex<State<M>>,
    not_empty: Condvar,
    not_full: Condvar,
}

/// A typed, closable FIFO channel
pub struct Channel<M> {
    shared: Arc<Shared<M>>,
}

impl<M> Clone for Channel<M> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<M> std::fmt::Debug for Channel<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.shared.name)
            .field("config", &self.shared.config)
            .finish()
    }
}

impl<M> Channel<M> {
    /// Create a channel after validating its configuration
    pub fn new(name: impl Into<String>, config: ChannelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(name.into(), config))
    }

    /// Create an unbounded channel
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::build(name.into(), ChannelConfig::unbounded())
    }

    fn build(name: String, config: ChannelConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                config,
                state: Mutex::new(State {
                    queue: VecDeque::with_capacity(config.capacity),
                    closed: false,
                    watchers: Vec::new(),
                    next_watcher_id: 0,
                    stats: ChannelStats::default(),
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
            }),
        }
    }

    /// Channel name given at creation
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Creation-time configuration
    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Capacity (0 = unbounded)
    pub fn capacity(&self) -> usize {
        self.shared.config.capacity
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Whether the channel is closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Snapshot of the channel's counters
    pub fn stats(&self) -> ChannelStats {
        self.lock().stats
    }

    /// Whether two handles refer to the same channel
    pub fn same_channel(&self, other: &Channel<M>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn lock(&self) -> MutexGuard<'_, State<M>> {
        // Handlers never run under this lock, so a poisoned guard still holds a
        // consistent queue.
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_full(&self, state: &State<M>) -> bool {
        !self.shared.config.is_unbounded() && state.queue.len() >= self.shared.config.capacity
    }

    fn closed_error(&self) -> ChainError {
        ChainError::Closed(self.shared.name.clone())
    }

    fn enqueue(&self, state: &mut State<M>, msg: M) {
        state.push(msg);
        self.shared.not_empty.notify_one();
    }

    /// Send a message, waiting for space if the configuration says so.
    ///
    /// Overflow is resolved per [`OverflowPolicy`]; only a closed channel and
    /// an elapsed `BlockWithTimeout` wait are errors.
    pub fn send(&self, msg: M) -> Result<SendOutcome> {
        let mut state = self.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        if !self.is_full(&state) {
            self.enqueue(&mut state, msg);
            return Ok(SendOutcome::Enqueued);
        }

        let config = self.shared.config;
        let wait = match (config.policy, config.send_timeout()) {
            (_, Some(timeout)) => Some(Some(Instant::now() + timeout)),
            (OverflowPolicy::BlockWithTimeout, None) => Some(None),
            _ => None,
        };

        if let Some(deadline) = wait {
            loop {
                let now = Instant::now();
                match deadline {
                    None => {
                        state = self
                            .shared
                            .not_full
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    Some(deadline) if now < deadline => {
                        state = self
                            .shared
                            .not_full
                            .wait_timeout(state, deadline - now)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0;
                    }
                    Some(_) => {
                        state.stats.timed_out_sends += 1;
                        break;
                    }
                }

                if state.closed {
                    return Err(self.closed_error());
                }
                if !self.is_full(&state) {
                    self.enqueue(&mut state, msg);
                    return Ok(SendOutcome::Enqueued);
                }
            }
        }

        match config.policy {
            OverflowPolicy::BlockWithTimeout => Err(ChainError::SendTimeout {
                channel: self.shared.name.clone(),
                timeout_ms: config.send_timeout_ms.unwrap_or_default(),
            }),
            _ => Ok(self.resolve_overflow(&mut state, msg)),
        }
    }

    /// Send without waiting.
    ///
    /// A full `BlockWithTimeout` channel yields [`SendOutcome::Full`]; the other
    /// policies apply at once as if no timeout were configured.
    pub fn try_send(&self, msg: M) -> Result<SendOutcome> {
        let mut state = self.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        if !self.is_full(&state) {
            self.enqueue(&mut state, msg);
            return Ok(SendOutcome::Enqueued);
        }

        match self.shared.config.policy {
            OverflowPolicy::BlockWithTimeout => Ok(SendOutcome::Full),
            _ => Ok(self.resolve_overflow(&mut state, msg)),
        }
    }

    fn resolve_overflow(&self, state: &mut State<M>, msg: M) -> SendOutcome {
        match self.shared.config.policy {
            OverflowPolicy::RemoveOldest => {
                state.queue.pop_front();
                state.stats.evicted_oldest += 1;
                self.enqueue(state, msg);
                tracing::debug!("Channel '{}' full, evicted oldest message", self.shared.name);
                SendOutcome::EvictedOldest
            }
            _ => {
                state.stats.dropped_newest += 1;
                tracing::debug!("Channel '{}' full, dropped newest message", self.shared.name);
                SendOutcome::DroppedNewest
            }
        }
    }

    fn take(&self, state: &mut State<M>) -> Option<M> {
        let msg = state.queue.pop_front()?;
        state.stats.received += 1;
        self.shared.not_full.notify_one();
        Some(msg)
    }

    /// Take the head message without blocking
    pub fn try_receive(&self) -> Option<M> {
        let mut state = self.lock();
        self.take(&mut state)
    }

    /// Take the head message, distinguishing an empty queue from a closed one
    pub fn poll(&self) -> Poll<M> {
        let mut state = self.lock();
        match self.take(&mut state) {
            Some(msg) => Poll::Ready(msg),
            None if state.closed => Poll::Closed,
            None => Poll::Empty,
        }
    }

    /// Block until a message arrives, the channel closes or `timeout` elapses.
    ///
    /// `Err(Closed)` is returned once the channel is closed and nothing is left
    /// to deliver; `Err(ReceiveTimeout)` when the timeout elapses first.
    pub fn receive(&self, timeout: Option<Duration>) -> Result<M> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();

        loop {
            if let Some(msg) = self.take(&mut state) {
                return Ok(msg);
            }
            if state.closed {
                return Err(self.closed_error());
            }

            match deadline {
                None => {
                    state = self
                        .shared
                        .not_empty
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ChainError::ReceiveTimeout);
                    }
                    state = self
                        .shared
                        .not_empty
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    /// Close and drop pending content
    pub fn close(&self) -> bool {
        self.close_with(CloseMode::DropContent)
    }

    /// Close the channel; returns `true` if this call performed the close
    pub fn close_with(&self, mode: CloseMode) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }

        state.closed = true;
        if mode == CloseMode::DropContent {
            state.stats.discarded_on_close += state.queue.len() as u64;
            state.queue.clear();
        }

        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();
        for (_, watcher) in &state.watchers {
            watcher.notify();
        }

        tracing::debug!(
            "Channel '{}' closed ({:?}, {} pending)",
            self.shared.name,
            mode,
            state.queue.len()
        );
        true
    }

    /// Register a notifier signalled on every enqueue and on close
    pub fn register_watcher(&self, notifier: &Arc<Notifier>) -> u64 {
        let mut state = self.lock();
        let id = state.next_watcher_id;
        state.next_watcher_id += 1;
        state.watchers.push((id, notifier.clone()));
        id
    }

    /// Remove a notifier previously registered with [`Channel::register_watcher`]
    pub fn unregister_watcher(&self, id: u64) {
        self.lock().watchers.retain(|(watcher_id, _)| *watcher_id != id);
    }
}

impl<M: Send> Closable for Channel<M> {
    fn name(&self) -> &str {
        Channel::name(self)
    }

    fn close_with(&self, mode: CloseMode) -> bool {
        Channel::close_with(self, mode)
    }

    fn is_closed(&self) -> bool {
        Channel::is_closed(self)
    }

    fn stats(&self) -> ChannelStats {
        Channel::stats(self)
    }
}
