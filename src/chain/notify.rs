//! Wake-up primitive shared between channels and a select call.
//!
//! A [`Notifier`] is a generation counter behind a mutex plus a condvar.
//! Channels bump the generation on every enqueue and on close; a waiter
//! records the generation before polling and sleeps only while it is
//! unchanged, so a notification that lands between the poll and the wait is
//! never lost.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Instant;

/// Generation-counting wake-up signal
#[derive(Debug, Default)]
pub struct Notifier {
    generation: Mutex<u64>,
    cond: Condvar,
}

impl Notifier {
    /// Create a new notifier at generation 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation
    pub fn generation(&self) -> u64 {
        *self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the generation and wake every waiter
    pub fn notify(&self) {
        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Block until the generation differs from `seen` or `deadline` passes.
    ///
    /// Returns `false` only when the deadline elapsed with no notification.
    pub fn wait_past(&self, seen: u64, deadline: Option<Instant>) -> bool {
        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while *generation == seen {
            match deadline {
                None => {
                    generation = self
                        .cond
                        .wait(generation)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    generation = self
                        .cond
                        .wait_timeout(generation, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }

        true
    }
}
