//! Demo workers for the sensor pipeline
//!
//! A meter reader takes simulated readings and sends a `write_data` command
//! per reading to a file writer. In the adaptive scenario a control channel
//! changes the reader's period while it runs.

pub mod messages;
pub mod meter;
pub mod period;
pub mod writer;

pub use messages::{MeterSignal, PeriodControl, WriterCommand};
pub use meter::MeterReader;
pub use period::ReadPeriod;
pub use writer::FileWriter;
