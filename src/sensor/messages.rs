//! Message enums of the demo channels

use crate::select::Message;

/// Timer channel: time for the meter to take a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterSignal {
    AcquisitionTurn,
}

impl Message for MeterSignal {
    fn kind(&self) -> &'static str {
        match self {
            MeterSignal::AcquisitionTurn => MeterSignal::ACQUISITION_TURN,
        }
    }
}

impl MeterSignal {
    pub const ACQUISITION_TURN: &'static str = "acquisition_turn";
}

/// Control channel: change the adaptive read period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodControl {
    /// Read less often
    Increase,
    /// Read more often
    Decrease,
}

impl PeriodControl {
    pub const INCREASE: &'static str = "inc_read_period";
    pub const DECREASE: &'static str = "dec_read_period";
}

impl Message for PeriodControl {
    fn kind(&self) -> &'static str {
        match self {
            PeriodControl::Increase => PeriodControl::INCREASE,
            PeriodControl::Decrease => PeriodControl::DECREASE,
        }
    }
}

/// Writer channel: persist one reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterCommand {
    WriteData { file_name: String },
}

impl WriterCommand {
    pub const WRITE_DATA: &'static str = "write_data";

    /// File name of the reading with this ordinal
    pub fn for_ordinal(ordinal: u64) -> Self {
        WriterCommand::WriteData {
            file_name: format!("data_{}.dat", ordinal),
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            WriterCommand::WriteData { file_name } => file_name,
        }
    }
}

impl Message for WriterCommand {
    fn kind(&self) -> &'static str {
        match self {
            WriterCommand::WriteData { .. } => WriterCommand::WRITE_DATA,
        }
    }
}
