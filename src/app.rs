//! Demo application: wires the sensor pipeline for a scenario and drives it
//! from console commands.

use crate::chain::Channel;
use crate::config::{DemoConfig, Scenario};
use crate::error::Result;
use crate::lifecycle::{Lifecycle, ShutdownReport};
use crate::sensor::{FileWriter, MeterReader, MeterSignal, PeriodControl, WriterCommand};
use std::io::{BufRead, Write};
use std::time::Duration;

/// One line of console input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Exit,
    Increase,
    Decrease,
    Unknown,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "exit" => ConsoleCommand::Exit,
            "inc" => ConsoleCommand::Increase,
            "dec" => ConsoleCommand::Decrease,
            _ => ConsoleCommand::Unknown,
        }
    }
}

/// A running sensor pipeline
pub struct SensorApp {
    scenario: Scenario,
    control: Option<Channel<PeriodControl>>,
    lifecycle: Lifecycle,
}

impl SensorApp {
    /// Create the channels, start the workers and the meter cadence
    pub fn launch(config: &DemoConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!("Launching '{}' scenario", config.scenario);

        let mut lifecycle = Lifecycle::new();
        let writer_ch: Channel<WriterCommand> =
            lifecycle.channel("writer", config.channels.writer)?;
        let ticks: Channel<MeterSignal> = lifecycle.channel("timer", config.channels.timer)?;
        let control: Option<Channel<PeriodControl>> = if config.scenario.has_control() {
            Some(lifecycle.channel("control", config.channels.control)?)
        } else {
            None
        };
        let timers = lifecycle.timers()?;

        let mut writer = FileWriter::new(&config.writer);
        let commands = writer_ch.clone();
        lifecycle.spawn_worker("file-writer", move || writer.run(&commands))?;

        let mut meter = MeterReader::new(&config.meter, writer_ch);
        match &control {
            Some(control_ch) => {
                let control_ch = control_ch.clone();
                let ticks = ticks.clone();
                lifecycle.spawn_worker("meter-reader", move || {
                    meter.run_adaptive(&control_ch, &ticks, &timers)
                })?;
            }
            None => {
                let turns = ticks.clone();
                lifecycle.spawn_worker("meter-reader", move || meter.run_periodic(&turns))?;
                let handle = timers.schedule_periodic(
                    &ticks,
                    || MeterSignal::AcquisitionTurn,
                    Duration::ZERO,
                    config.meter.period(),
                )?;
                lifecycle.track_timer(handle);
            }
        }

        Ok(Self {
            scenario: config.scenario,
            control,
            lifecycle,
        })
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    /// Control channel of the adaptive scenario
    pub fn control(&self) -> Option<&Channel<PeriodControl>> {
        self.control.as_ref()
    }

    /// Console prompt for this scenario
    pub fn prompt(&self) -> &'static str {
        if self.control.is_some() {
            "Type 'exit' to quit, 'inc' or 'dec':"
        } else {
            "Type 'exit' to quit:"
        }
    }

    /// Apply one command; returns whether the console should keep reading
    pub fn handle(&self, cmd: ConsoleCommand) -> Result<bool> {
        let signal = match cmd {
            ConsoleCommand::Exit => return Ok(false),
            ConsoleCommand::Unknown => return Ok(true),
            ConsoleCommand::Increase => PeriodControl::Increase,
            ConsoleCommand::Decrease => PeriodControl::Decrease,
        };

        match &self.control {
            Some(control) => {
                control.send(signal)?;
            }
            None => tracing::debug!("'{}' scenario has no period control", self.scenario),
        }
        Ok(true)
    }

    /// Prompt and read commands until `exit` or end of input
    pub fn run_console<R: BufRead, W: Write>(&self, input: R, mut output: W) -> Result<()> {
        let mut lines = input.lines();
        loop {
            writeln!(output, "{}", self.prompt())?;
            output.flush()?;

            let line = match lines.next() {
                Some(line) => line?,
                None => return Ok(()),
            };
            if !self.handle(ConsoleCommand::parse(&line))? {
                return Ok(());
            }
        }
    }

    /// Stop everything; see [`Lifecycle::shutdown`]
    pub fn shutdown(&mut self) -> ShutdownReport {
        self.lifecycle.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MeterConfig, WriterConfig};
    use std::io::Cursor;

    fn fast(scenario: Scenario) -> DemoConfig {
        let mut config = DemoConfig::preset(scenario);
        config.meter = MeterConfig {
            read_ms: 1,
            period_ms: 10,
            min_period_ms: 5,
            max_period_ms: 100,
            scale: 1.5,
        };
        config.writer = WriterConfig::fixed(1);
        config
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse("exit"), ConsoleCommand::Exit);
        assert_eq!(ConsoleCommand::parse("inc\r"), ConsoleCommand::Increase);
        assert_eq!(ConsoleCommand::parse(" dec "), ConsoleCommand::Decrease);
        assert_eq!(ConsoleCommand::parse("EXIT"), ConsoleCommand::Unknown);
        assert_eq!(ConsoleCommand::parse(""), ConsoleCommand::Unknown);
    }

    #[test]
    fn test_console_sends_control_until_exit() {
        let mut app = SensorApp::launch(&fast(Scenario::Adaptive)).unwrap();
        let mut output = Vec::new();
        app.run_console(Cursor::new("inc\nbogus\ndec\nexit\ninc\n"), &mut output)
            .unwrap();

        let control = app.control().unwrap().clone();
        assert_eq!(control.stats().sent, 2);

        let printed = String::from_utf8(output).unwrap();
        assert_eq!(printed.matches("'inc' or 'dec'").count(), 4);

        let report = app.shutdown();
        assert_eq!(report.workers_completed, 2);
        assert_eq!(report.channels_closed, 3);
    }

    #[test]
    fn test_end_of_input_stops_console() {
        let mut app = SensorApp::launch(&fast(Scenario::Basic)).unwrap();
        assert!(app.control().is_none());
        app.run_console(Cursor::new("inc\n"), Vec::new()).unwrap();

        let report = app.shutdown();
        assert_eq!(report.timers_cancelled, 1);
        assert_eq!(report.workers_completed, 2);
        assert_eq!(report.workers_failed + report.workers_panicked, 0);
    }

    #[test]
    fn test_prompt_depends_on_scenario() {
        let mut bounded = SensorApp::launch(&fast(Scenario::Bounded)).unwrap();
        assert_eq!(bounded.prompt(), "Type 'exit' to quit:");
        assert_eq!(bounded.scenario(), Scenario::Bounded);
        bounded.shutdown();
    }

    #[test]
    fn test_launch_rejects_invalid_config() {
        let mut config = fast(Scenario::Adaptive);
        config.meter.scale = 1.0;
        assert!(SensorApp::launch(&config).is_err());
    }
}
