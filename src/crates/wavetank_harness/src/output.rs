use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::engine::{LoadState, MotionState, SamplePoint};

/// Append-only writer for the aggregated channel table, one row per timestep.
pub trait ChannelSink {
    fn write(&mut self, time: f64, channels: &[f64]) -> io::Result<()>;
    fn end(&mut self) -> io::Result<()>;
}

/// Append-only writer for per-point query results.
pub trait RecordSink {
    fn write(&mut self, record: &ResultRecord) -> io::Result<()>;
    fn end(&mut self) -> io::Result<()>;
}

/// Field query results for one `(timestep, sample point)` pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub time: f64,
    pub point: SamplePoint,
    pub velocity: [f64; 3],
    pub acceleration: [f64; 3],
    pub in_fluid: bool,
    pub elevation: f64,
    pub normal: [f64; 3],
}

/// In-memory accumulator for run outputs, flushed to the sinks exactly once.
///
/// Rows for a step are committed together after the whole step has succeeded,
/// so an abort at step `k` leaves exactly `k` channel rows and only the
/// records of completed steps.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    series: Vec<(f64, Vec<f64>)>,
    records: Vec<ResultRecord>,
    flushed: bool,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit one completed step: its channel row plus all of its per-point
    /// records.
    pub fn record_step(&mut self, time: f64, channels: Vec<f64>, records: Vec<ResultRecord>) {
        debug_assert!(!self.flushed, "recording into a flushed aggregator");
        self.series.push((time, channels));
        self.records.extend(records);
    }

    /// Number of channel-series rows committed so far.
    pub fn steps_completed(&self) -> usize {
        self.series.len()
    }

    /// Number of per-point records committed so far.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Write everything to the sinks and close them. The first call performs
    /// the write; subsequent calls are no-ops.
    pub fn flush(
        &mut self,
        channel_sink: &mut dyn ChannelSink,
        record_sink: &mut dyn RecordSink,
    ) -> io::Result<()> {
        if self.flushed {
            return Ok(());
        }
        // Mark before writing so a failing sink cannot trigger a second,
        // partially duplicated flush from the error path.
        self.flushed = true;

        debug!(
            rows = self.series.len(),
            records = self.records.len(),
            "flushing run outputs"
        );
        for (time, channels) in &self.series {
            channel_sink.write(*time, channels)?;
        }
        channel_sink.end()?;

        for record in &self.records {
            record_sink.write(record)?;
        }
        record_sink.end()
    }

    /// Whether `flush` has already run.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }
}

/// Channel table writer producing a name row, a unit row, then data rows.
pub struct ChannelFileSink {
    writer: BufWriter<File>,
}

impl ChannelFileSink {
    pub fn create(
        path: impl AsRef<Path>,
        channel_names: &[String],
        channel_units: &[String],
    ) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "{:>14}", "Time")?;
        for name in channel_names {
            write!(writer, "{name:>14}")?;
        }
        writeln!(writer)?;

        write!(writer, "{:>14}", "(s)")?;
        for unit in channel_units {
            write!(writer, "{unit:>14}")?;
        }
        writeln!(writer)?;

        Ok(Self { writer })
    }
}

impl ChannelSink for ChannelFileSink {
    fn write(&mut self, time: f64, channels: &[f64]) -> io::Result<()> {
        write!(self.writer, "{time:>14.6}")?;
        for value in channels {
            write!(self.writer, "{value:>14.6e}")?;
        }
        writeln!(self.writer)
    }

    fn end(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Per-point results writer, one row per `(timestep, point)`.
pub struct RecordFileSink {
    writer: BufWriter<File>,
}

impl RecordFileSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "#{:>13}{:>42}{:>42}{:>42}{:>10}{:>14}{:>42}",
            "Time", "Position", "Velocity", "Acceleration", "InFluid", "Elevation", "Normal"
        )?;
        Ok(Self { writer })
    }
}

impl RecordSink for RecordFileSink {
    fn write(&mut self, record: &ResultRecord) -> io::Result<()> {
        write!(self.writer, "{:>14.6}", record.time)?;
        for value in record.point.0 {
            write!(self.writer, "{value:>14.6}")?;
        }
        for value in record.velocity {
            write!(self.writer, "{value:>14.6e}")?;
        }
        for value in record.acceleration {
            write!(self.writer, "{value:>14.6e}")?;
        }
        write!(self.writer, "{:>10}", u8::from(record.in_fluid))?;
        write!(self.writer, "{:>14.6e}", record.elevation)?;
        for value in record.normal {
            write!(self.writer, "{value:>14.6e}")?;
        }
        writeln!(self.writer)
    }

    fn end(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Debug writer recording everything crossing the engine interface, one row
/// of `(time, motion, loads)` per step.
pub struct DebugFileSink {
    writer: BufWriter<File>,
}

impl DebugFileSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "#{:>13}  position[6] velocity[6] acceleration[6] loads[6]", "Time")?;
        Ok(Self { writer })
    }

    pub fn write(&mut self, time: f64, motion: &MotionState, loads: &LoadState) -> io::Result<()> {
        write!(self.writer, "{time:>14.6}")?;
        for value in motion.position {
            write!(self.writer, "{value:>14.6e}")?;
        }
        for value in motion.velocity {
            write!(self.writer, "{value:>14.6e}")?;
        }
        for value in motion.acceleration {
            write!(self.writer, "{value:>14.6e}")?;
        }
        for value in loads.0 {
            write!(self.writer, "{value:>14.6e}")?;
        }
        writeln!(self.writer)
    }

    pub fn end(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
