//! # msgchain-rs: typed message chains between worker threads
//!
//! A small inter-thread messaging runtime. Worker threads talk through typed
//! FIFO channels that may be bounded, with a per-channel overflow policy and
//! send timeout. A timer thread injects delayed and periodic messages, and a
//! select multiplexer lets one worker wait on several channels at once.
//!
//! ## Architecture
//!
//! - **Chain**: [`Channel`] with overflow policies, close modes and stats
//! - **Timer**: [`TimerService`] thread fed by a crossbeam command queue
//! - **Select**: [`Select`] over [`Case`]s, dispatching by message kind
//! - **Worker**: named worker threads and the single-channel receive loop
//! - **Lifecycle**: [`Lifecycle`] closes channels before joining workers
//! - **Sensor**: the demo pipeline (meter reader and file writer)
//!
//! ## Example
//!
//! ```no_run
//! use msgchain_rs::{ChannelConfig, Lifecycle, OverflowPolicy};
//! use msgchain_rs::worker::receive_all;
//!
//! fn main() -> msgchain_rs::Result<()> {
//!     let mut lifecycle = Lifecycle::new();
//!     let jobs = lifecycle.channel::<String>(
//!         "jobs",
//!         ChannelConfig::bounded(4, OverflowPolicy::RemoveOldest),
//!     )?;
//!
//!     let rx = jobs.clone();
//!     lifecycle.spawn_worker("printer", move || {
//!         receive_all(&rx, &mut (), |_, job| {
//!             println!("{}", job);
//!             Ok(())
//!         })
//!     })?;
//!
//!     jobs.send("hello".to_string())?;
//!     lifecycle.shutdown();
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod chain;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod select;
pub mod sensor;
pub mod timer;
pub mod worker;

// Re-export commonly used types
pub use chain::{Channel, ChannelConfig, ChannelStats, CloseMode, OverflowPolicy, SendOutcome};
pub use config::{DemoConfig, Scenario};
pub use error::{ChainError, Result};
pub use lifecycle::{Lifecycle, ShutdownReport};
pub use select::{Case, Message, Select, Selected};
pub use timer::{TimerHandle, TimerScheduler, TimerService};
pub use worker::{receive_all, Worker, WorkerExit};
