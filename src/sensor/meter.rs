//! Meter reader worker
//!
//! Two cadences are supported:
//!
//! - **periodic**: a timer schedule feeds the tick channel at a fixed rate and
//!   the reader handles every tick that survives the channel's policy.
//! - **adaptive**: the reader re-arms itself after each read, so the next turn
//!   is due one period after the previous one *started*. A read that took a
//!   full period or longer re-arms with no delay. The period is changed at
//!   runtime through the control channel.

use super::messages::{MeterSignal, PeriodControl, WriterCommand};
use super::period::ReadPeriod;
use crate::chain::{Channel, SendOutcome};
use crate::config::MeterConfig;
use crate::error::Result;
use crate::select::{Case, Select};
use crate::timer::{rearm_delay, TimerScheduler};
use crate::worker::receive_all;
use std::time::{Duration, Instant};

/// State of the meter-read worker loop
#[derive(Debug)]
pub struct MeterReader {
    ordinal: u64,
    period: ReadPeriod,
    read_duration: Duration,
    writer: Channel<WriterCommand>,
}

impl MeterReader {
    pub fn new(config: &MeterConfig, writer: Channel<WriterCommand>) -> Self {
        Self {
            ordinal: 0,
            period: ReadPeriod::from_config(config),
            read_duration: config.read_duration(),
            writer,
        }
    }

    /// Number of readings taken so far
    pub fn reads(&self) -> u64 {
        self.ordinal
    }

    pub fn period(&self) -> &ReadPeriod {
        &self.period
    }

    /// Take one reading and hand it to the writer
    pub fn acquire(&mut self) -> Result<()> {
        tracing::debug!("meter read started");
        std::thread::sleep(self.read_duration);
        tracing::debug!("meter read finished");

        let cmd = WriterCommand::for_ordinal(self.ordinal);
        self.ordinal += 1;

        match self.writer.send(cmd)? {
            SendOutcome::EvictedOldest => {
                tracing::warn!("Writer backlog full, oldest pending write discarded")
            }
            SendOutcome::DroppedNewest | SendOutcome::Full => {
                tracing::warn!("Writer backlog full, reading {} discarded", self.ordinal - 1)
            }
            SendOutcome::Enqueued => {}
        }
        Ok(())
    }

    fn adjust(&mut self, control: PeriodControl) {
        let period_ms = match control {
            PeriodControl::Increase => self.period.increase(),
            PeriodControl::Decrease => self.period.decrease(),
        };
        tracing::info!("Read period now {}ms", period_ms);
    }

    /// Read on every tick until the tick channel closes.
    ///
    /// Returns the number of readings taken.
    pub fn run_periodic(&mut self, ticks: &Channel<MeterSignal>) -> Result<u64> {
        let result = receive_all(ticks, self, |meter, signal| match signal {
            MeterSignal::AcquisitionTurn => meter.acquire(),
        });
        self.finish(result)
    }

    /// Self-rescheduling read loop with runtime period control.
    ///
    /// The first turn is sent immediately. Returns the number of readings
    /// taken once both channels are closed.
    pub fn run_adaptive(
        &mut self,
        control: &Channel<PeriodControl>,
        ticks: &Channel<MeterSignal>,
        timers: &TimerScheduler,
    ) -> Result<u64> {
        if let Err(e) = ticks.try_send(MeterSignal::AcquisitionTurn) {
            return self.finish(Err(e));
        }

        let result = {
            let mut select = Select::new()
                .case(Case::new(ticks).on(
                    MeterSignal::ACQUISITION_TURN,
                    |meter: &mut MeterReader, _| {
                        let started_at = Instant::now();
                        meter.acquire()?;

                        let period = meter.period.current();
                        let delay = rearm_delay(period, started_at.elapsed());
                        if delay.is_zero() {
                            tracing::debug!("period={}ms, no sleep", period.as_millis());
                            ticks.try_send(MeterSignal::AcquisitionTurn)?;
                        } else {
                            tracing::debug!(
                                "period={}ms, sleep={}ms",
                                period.as_millis(),
                                delay.as_millis()
                            );
                            timers.schedule_delayed(ticks, || MeterSignal::AcquisitionTurn, delay)?;
                        }
                        Ok(())
                    },
                ))
                .case(
                    Case::new(control)
                        .on(PeriodControl::INCREASE, |meter: &mut MeterReader, msg| {
                            meter.adjust(msg);
                            Ok(())
                        })
                        .on(PeriodControl::DECREASE, |meter: &mut MeterReader, msg| {
                            meter.adjust(msg);
                            Ok(())
                        }),
                );
            select.run(self)
        };
        self.finish(result)
    }

    // A closed channel anywhere in the chain is the normal way out
    fn finish(&self, result: Result<u64>) -> Result<u64> {
        match result {
            Ok(_) => Ok(self.ordinal),
            Err(e) if e.is_closed() => Ok(self.ordinal),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChannelConfig, CloseMode, OverflowPolicy};
    use crate::timer::TimerService;
    use std::thread;

    fn fast_config() -> MeterConfig {
        MeterConfig {
            read_ms: 1,
            period_ms: 20,
            min_period_ms: 5,
            max_period_ms: 100,
            scale: 1.5,
        }
    }

    #[test]
    fn test_acquire_sends_numbered_files() {
        let writer = Channel::unbounded("writer");
        let mut meter = MeterReader::new(&fast_config(), writer.clone());

        meter.acquire().unwrap();
        meter.acquire().unwrap();

        assert_eq!(meter.reads(), 2);
        assert_eq!(writer.try_receive().unwrap().file_name(), "data_0.dat");
        assert_eq!(writer.try_receive().unwrap().file_name(), "data_1.dat");
    }

    #[test]
    fn test_acquire_fails_when_writer_closed() {
        let writer: Channel<WriterCommand> = Channel::unbounded("writer");
        writer.close();
        let mut meter = MeterReader::new(&fast_config(), writer);
        assert!(meter.acquire().unwrap_err().is_closed());
    }

    #[test]
    fn test_run_periodic_stops_on_close() {
        let writer = Channel::unbounded("writer");
        let ticks = Channel::unbounded("timer");
        for _ in 0..3 {
            ticks.send(MeterSignal::AcquisitionTurn).unwrap();
        }
        ticks.close_with(CloseMode::RetainContent);

        let mut meter = MeterReader::new(&fast_config(), writer.clone());
        assert_eq!(meter.run_periodic(&ticks).unwrap(), 3);
        assert_eq!(writer.len(), 3);
    }

    #[test]
    fn test_run_periodic_ends_cleanly_when_writer_closed() {
        let writer: Channel<WriterCommand> = Channel::unbounded("writer");
        let ticks = Channel::unbounded("timer");
        ticks.send(MeterSignal::AcquisitionTurn).unwrap();
        writer.close();

        let mut meter = MeterReader::new(&fast_config(), writer);
        assert_eq!(meter.run_periodic(&ticks).unwrap(), 1);
    }

    #[test]
    fn test_run_adaptive_rearms_and_obeys_control() {
        let timers = TimerService::start().unwrap();
        let scheduler = timers.scheduler();
        let control = Channel::unbounded("control");
        let ticks = Channel::new("timer", ChannelConfig::bounded(1, OverflowPolicy::DropNewest)).unwrap();
        let writer = Channel::unbounded("writer");

        let (c, t, w) = (control.clone(), ticks.clone(), writer.clone());
        let handle = thread::spawn(move || {
            let mut meter = MeterReader::new(&fast_config(), w);
            let result = meter.run_adaptive(&c, &t, &scheduler);
            (result, meter)
        });

        thread::sleep(Duration::from_millis(100));
        control.send(PeriodControl::Increase).unwrap();
        control.send(PeriodControl::Increase).unwrap();
        control.send(PeriodControl::Decrease).unwrap();
        thread::sleep(Duration::from_millis(50));

        control.close();
        ticks.close();
        let (result, meter) = handle.join().unwrap();

        let reads = result.unwrap();
        assert!(reads >= 2, "only {} reads", reads);
        assert_eq!(meter.reads(), reads);
        // 20 -> 30 -> 45 -> 30
        assert_eq!(meter.period().as_millis(), 30);
        assert!(ticks.len() <= 1);
    }

    #[test]
    fn test_run_adaptive_slow_reads_rearm_without_delay() {
        let timers = TimerService::start().unwrap();
        let scheduler = timers.scheduler();
        let control: Channel<PeriodControl> = Channel::unbounded("control");
        let ticks = Channel::new("timer", ChannelConfig::bounded(1, OverflowPolicy::DropNewest)).unwrap();
        let writer = Channel::unbounded("writer");

        // Each read takes longer than the period
        let config = MeterConfig {
            read_ms: 30,
            period_ms: 20,
            ..fast_config()
        };
        let (c, t, w) = (control.clone(), ticks.clone(), writer.clone());
        let handle = thread::spawn(move || {
            let mut meter = MeterReader::new(&config, w);
            meter.run_adaptive(&c, &t, &scheduler)
        });

        let started = Instant::now();
        while started.elapsed() < Duration::from_millis(300) {
            assert!(ticks.len() <= 1);
            thread::sleep(Duration::from_millis(5));
        }
        control.close();
        ticks.close();

        let reads = handle.join().unwrap().unwrap();
        // Back to back: 300ms of 30ms reads, with slack for a loaded machine
        assert!(reads >= 6, "only {} reads", reads);
        assert_eq!(ticks.stats().dropped_newest, 0);
        let files: Vec<String> = std::iter::from_fn(|| writer.try_receive())
            .map(|cmd| cmd.file_name().to_string())
            .collect();
        assert_eq!(files.len() as u64, reads);
        assert_eq!(files[1], "data_1.dat");
    }

    #[test]
    fn test_run_adaptive_with_closed_ticks_returns_immediately() {
        let timers = TimerService::start().unwrap();
        let control: Channel<PeriodControl> = Channel::unbounded("control");
        let ticks: Channel<MeterSignal> = Channel::unbounded("timer");
        ticks.close();

        let mut meter = MeterReader::new(&fast_config(), Channel::unbounded("writer"));
        assert_eq!(meter.run_adaptive(&control, &ticks, &timers.scheduler()).unwrap(), 0);
    }
}
