//! Select: wait on several channels and dispatch the first ready message
//!
//! A [`Select`] holds a set of [`Case`]s. Each case borrows one channel and maps
//! message kinds (see [`Message::kind`]) to handlers. One call to
//! [`Select::select`] blocks until some case has a message, runs exactly one
//! handler and returns.
//!
//! # Fairness
//!
//! Cases are scanned round-robin: each call starts at the case after the one
//! that dispatched last. A case that is always ready therefore cannot keep
//! another ready case waiting for more than one round.
//!
//! # Blocking
//!
//! Every case registers the select's [`Notifier`] with its channel. Channels
//! signal it on enqueue and on close, so the select sleeps on one condvar
//! instead of polling. Registrations are removed when the `Select` is dropped.
//!
//! # Termination
//!
//! Closed cases are skipped. Once every case is closed and drained,
//! `select` returns [`Selected::Closed`]. A ready message whose kind has no
//! handler fails with [`ChainError::UnhandledMessageKind`].

use crate::chain::{Channel, Notifier, Poll};
use crate::error::{ChainError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A message type that select can dispatch by kind
///
/// Implemented by the message enums of each channel; `kind` names the variant.
pub trait Message: Send + 'static {
    /// Stable name of this message's kind
    fn kind(&self) -> &'static str;
}

/// Outcome of one select call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selected {
    /// A handler of the case at this index ran
    Handled(usize),
    /// Every case is closed
    Closed,
    /// Nothing became ready before the deadline
    Timeout,
}

type Handler<'a, M, S> = Box<dyn FnMut(&mut S, M) -> Result<()> + 'a>;

enum ArmPoll {
    Dispatched,
    Empty,
    Closed,
}

trait Arm<S> {
    fn register(&mut self, notifier: &Arc<Notifier>);
    fn unregister(&mut self);
    fn poll_dispatch(&mut self, state: &mut S) -> Result<ArmPoll>;
}

/// One channel of a select with its per-kind handlers
pub struct Case<'a, M, S> {
    channel: &'a Channel<M>,
    handlers: Vec<(&'static str, Handler<'a, M, S>)>,
    watcher_id: Option<u64>,
}

impl<'a, M: Message, S> Case<'a, M, S> {
    /// Start a case for `channel` with no handlers
    pub fn new(channel: &'a Channel<M>) -> Self {
        Self {
            channel,
            handlers: Vec::new(),
            watcher_id: None,
        }
    }

    /// Handle messages of `kind` with `handler`
    pub fn on<F>(mut self, kind: &'static str, handler: F) -> Self
    where
        F: FnMut(&mut S, M) -> Result<()> + 'a,
    {
        self.handlers.push((kind, Box::new(handler)));
        self
    }

    fn dispatch(&mut self, state: &mut S, msg: M) -> Result<()> {
        let kind = msg.kind();
        match self.handlers.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, handler)) => handler(state, msg),
            None => Err(ChainError::UnhandledMessageKind {
                channel: self.channel.name().to_string(),
                kind,
            }),
        }
    }
}

impl<'a, M: Message, S> Arm<S> for Case<'a, M, S> {
    fn register(&mut self, notifier: &Arc<Notifier>) {
        self.watcher_id = Some(self.channel.register_watcher(notifier));
    }

    fn unregister(&mut self) {
        if let Some(id) = self.watcher_id.take() {
            self.channel.unregister_watcher(id);
        }
    }

    fn poll_dispatch(&mut self, state: &mut S) -> Result<ArmPoll> {
        match self.channel.poll() {
            Poll::Ready(msg) => {
                self.dispatch(state, msg)?;
                Ok(ArmPoll::Dispatched)
            }
            Poll::Empty => Ok(ArmPoll::Empty),
            Poll::Closed => Ok(ArmPoll::Closed),
        }
    }
}

enum Scan {
    Handled(usize),
    Idle,
    AllClosed,
}

/// Multiplexed receive over a set of cases
pub struct Select<'a, S> {
    cases: Vec<Box<dyn Arm<S> + 'a>>,
    notifier: Arc<Notifier>,
    next_start: usize,
}

impl<'a, S: 'a> Default for Select<'a, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, S: 'a> Select<'a, S> {
    /// Create an empty select
    pub fn new() -> Self {
        Self {
            cases: Vec::new(),
            notifier: Arc::new(Notifier::new()),
            next_start: 0,
        }
    }

    /// Add a case; its channel starts signalling this select immediately
    pub fn case<M: Message>(mut self, mut case: Case<'a, M, S>) -> Self {
        case.register(&self.notifier);
        self.cases.push(Box::new(case));
        self
    }

    /// Number of cases
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Whether there are no cases
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    fn scan(&mut self, state: &mut S) -> Result<Scan> {
        let count = self.cases.len();
        let mut closed = 0;

        for offset in 0..count {
            let index = (self.next_start + offset) % count;
            match self.cases[index].poll_dispatch(state)? {
                ArmPoll::Dispatched => {
                    self.next_start = (index + 1) % count;
                    return Ok(Scan::Handled(index));
                }
                ArmPoll::Closed => closed += 1,
                ArmPoll::Empty => {}
            }
        }

        if closed == count {
            Ok(Scan::AllClosed)
        } else {
            Ok(Scan::Idle)
        }
    }

    fn select_until(&mut self, state: &mut S, deadline: Option<Instant>) -> Result<Selected> {
        loop {
            let seen = self.notifier.generation();
            match self.scan(state)? {
                Scan::Handled(index) => return Ok(Selected::Handled(index)),
                Scan::AllClosed => return Ok(Selected::Closed),
                Scan::Idle => {
                    if !self.notifier.wait_past(seen, deadline) {
                        return Ok(Selected::Timeout);
                    }
                }
            }
        }
    }

    /// Block until one message is dispatched or every case is closed
    pub fn select(&mut self, state: &mut S) -> Result<Selected> {
        self.select_until(state, None)
    }

    /// Like [`Select::select`], giving up after `timeout`
    pub fn select_timeout(&mut self, state: &mut S, timeout: Duration) -> Result<Selected> {
        self.select_until(state, Some(Instant::now() + timeout))
    }

    /// Dispatch messages until every case is closed.
    ///
    /// Returns the number of handled messages.
    pub fn run(&mut self, state: &mut S) -> Result<u64> {
        let mut handled = 0;
        loop {
            match self.select(state)? {
                Selected::Handled(_) => handled += 1,
                Selected::Closed => return Ok(handled),
                Selected::Timeout => {}
            }
        }
    }
}

impl<'a, S> Drop for Select<'a, S> {
    fn drop(&mut self) {
        for case in &mut self.cases {
            case.unregister();
        }
    }
}
