//! Deterministic in-process engine and capture sinks for tests.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Deserialize;

use crate::engine::{
    Engine, EngineMetadata, FieldKind, FieldSample, FieldShape, InitContext, LoadState,
    MotionState, SamplePoint, SharedFieldHandle, StepOutput,
};
use crate::error::{HarnessError, HarnessResult};
use crate::output::{ChannelSink, RecordSink, ResultRecord};
use crate::timeline::Timeline;

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Settings payload format understood by the scripted engine.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptedSettings {
    channels: Vec<String>,
    units: Vec<String>,
    #[serde(default)]
    water_depth: Option<f64>,
}

/// Build a settings payload the scripted engine accepts.
pub fn scripted_settings(channels: &[(&str, &str)]) -> String {
    let names: Vec<&str> = channels.iter().map(|(name, _)| *name).collect();
    let units: Vec<&str> = channels.iter().map(|(_, unit)| *unit).collect();
    serde_json::json!({
        "channels": names,
        "units": units,
        "water_depth": 200.0,
    })
    .to_string()
}

/// Counters observed from outside the harness while it owns the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeSnapshot {
    pub steps: usize,
    pub queries: usize,
    pub end_calls: usize,
    pub adoptions: usize,
}

/// Shared view into a [`ScriptedEngine`]'s call counters.
#[derive(Debug, Clone)]
pub struct EngineProbe(Arc<Mutex<ProbeSnapshot>>);

impl EngineProbe {
    pub fn snapshot(&self) -> ProbeSnapshot {
        *self.0.lock().expect("probe lock")
    }
}

/// Stateful scripted engine whose outputs are pure functions of its inputs.
///
/// Channel values depend only on `(time, channel index, motion)`, field
/// samples only on `(time, point, kind)`, so reordering queries can never
/// change an individual result. Failures are injected by step index to
/// exercise abort paths.
pub struct ScriptedEngine {
    id: u64,
    shape: FieldShape,
    unavailable: bool,
    reject_settings: bool,
    fail_at_step: Option<usize>,
    fail_query_at_step: Option<usize>,
    debug_output: Option<PathBuf>,
    channel_count: usize,
    steps_taken: usize,
    field_token: u64,
    initialized: bool,
    probe: Arc<Mutex<ProbeSnapshot>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::SeqCst),
            shape: FieldShape {
                grid: [16, 16, 8],
                components: 3,
            },
            unavailable: false,
            reject_settings: false,
            fail_at_step: None,
            fail_query_at_step: None,
            debug_output: None,
            channel_count: 0,
            steps_taken: 0,
            field_token: 0,
            initialized: false,
            probe: Arc::new(Mutex::new(ProbeSnapshot::default())),
        }
    }

    /// Behave like an engine library that cannot be loaded at all.
    pub fn with_unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Refuse the settings payload at `initialize`.
    pub fn with_rejected_settings(mut self) -> Self {
        self.reject_settings = true;
        self
    }

    /// Fail the step call with this 0-based index.
    pub fn with_failure_at_step(mut self, step: usize) -> Self {
        self.fail_at_step = Some(step);
        self
    }

    /// Fail field queries issued after the step with this 0-based index.
    pub fn with_query_failure_at_step(mut self, step: usize) -> Self {
        self.fail_query_at_step = Some(step);
        self
    }

    /// Advertise a debug-output path in the engine metadata.
    pub fn with_debug_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_output = Some(path.into());
        self
    }

    /// Use a non-default wave field shape.
    pub fn with_field_shape(mut self, shape: FieldShape) -> Self {
        self.shape = shape;
        self
    }

    /// Observer for call counters, usable while the harness owns the engine.
    pub fn probe(&self) -> EngineProbe {
        EngineProbe(self.probe.clone())
    }

    fn elevation_at(time: f64, point: SamplePoint) -> f64 {
        let [x, y, _] = point.0;
        0.5 * (0.2 * time + 0.1 * x + 0.05 * y).sin()
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for ScriptedEngine {
    fn initialize(&mut self, context: &InitContext) -> HarnessResult<EngineMetadata> {
        if self.unavailable {
            return Err(HarnessError::resource("scripted engine is not loadable"));
        }
        if self.reject_settings {
            return Err(HarnessError::engine_init("scripted rejection"));
        }
        let settings: ScriptedSettings = serde_json::from_str(&context.settings)
            .map_err(|err| HarnessError::engine_init(format!("unparsable settings: {err}")))?;
        if settings.channels.len() != settings.units.len() {
            return Err(HarnessError::engine_init(
                "channel names and units differ in length",
            ));
        }
        if let Some(depth) = settings.water_depth {
            if depth <= 0.0 {
                return Err(HarnessError::engine_init("water depth must be positive"));
            }
        }

        let timeline = Timeline::new(context.t_start, context.t_final, context.dt)?;
        self.channel_count = settings.channels.len();
        self.field_token = self.id << 16 | 1;
        self.initialized = true;

        Ok(EngineMetadata {
            channel_names: settings.channels,
            channel_units: settings.units,
            total_steps: timeline.len(),
            debug_output: self.debug_output.clone(),
        })
    }

    fn step(&mut self, time: f64, motion: &MotionState) -> HarnessResult<StepOutput> {
        if self.fail_at_step == Some(self.steps_taken) {
            return Err(HarnessError::step(time, "scripted step failure"));
        }

        let channels = (0..self.channel_count)
            .map(|index| time * (index as f64 + 1.0) + 0.25 * motion.position[0])
            .collect();
        let mut loads = [0.0; 6];
        for (dof, load) in loads.iter_mut().enumerate() {
            *load = -1.0e3 * motion.acceleration[dof] - 10.0 * motion.velocity[dof];
        }

        self.steps_taken += 1;
        self.probe.lock().expect("probe lock").steps += 1;

        Ok(StepOutput {
            loads: LoadState(loads),
            channels,
        })
    }

    fn query_field(
        &mut self,
        time: f64,
        point: SamplePoint,
        kind: FieldKind,
    ) -> HarnessResult<FieldSample> {
        if let Some(step) = self.fail_query_at_step {
            if self.steps_taken == step + 1 {
                return Err(HarnessError::step(time, "scripted query failure"));
            }
        }
        self.probe.lock().expect("probe lock").queries += 1;

        let [x, y, z] = point.0;
        let elevation = Self::elevation_at(time, point);
        Ok(match kind {
            FieldKind::Kinematics => FieldSample::Kinematics {
                velocity: [0.1 * time + 0.01 * x, 0.02 * y, 0.05 * (time + z)],
                acceleration: [0.01 * time, 0.002 * x, 0.005 * y],
                in_fluid: z <= elevation,
            },
            FieldKind::Elevation => FieldSample::Elevation(elevation),
            FieldKind::SurfaceNormal => {
                let slope = 0.1 * (0.2 * time + 0.1 * x).cos();
                let norm = (1.0 + slope * slope).sqrt();
                FieldSample::SurfaceNormal([-slope / norm, 0.0, 1.0 / norm])
            }
        })
    }

    fn field_handle(&self) -> Option<SharedFieldHandle> {
        if !self.initialized {
            return None;
        }
        Some(SharedFieldHandle::new(self.id, self.shape, self.field_token))
    }

    fn adopt_field_handle(&mut self, handle: &SharedFieldHandle) -> HarnessResult<()> {
        if !self.initialized {
            return Err(HarnessError::HandleUnavailable);
        }
        if handle.engine_id() != self.id {
            return Err(HarnessError::handle_mismatch(
                "handle was minted by a different engine instance",
            ));
        }
        if handle.shape() != self.shape {
            return Err(HarnessError::handle_mismatch(format!(
                "expected shape {:?}, got {:?}",
                self.shape,
                handle.shape()
            )));
        }
        if handle.token() != self.field_token {
            return Err(HarnessError::handle_mismatch("stale wave field handle"));
        }
        self.probe.lock().expect("probe lock").adoptions += 1;
        Ok(())
    }

    fn end(&mut self) {
        self.initialized = false;
        self.probe.lock().expect("probe lock").end_calls += 1;
    }
}

/// Channel sink capturing rows in memory.
#[derive(Debug, Default)]
pub struct MemoryChannelSink {
    pub rows: Vec<(f64, Vec<f64>)>,
    pub end_calls: usize,
}

impl ChannelSink for MemoryChannelSink {
    fn write(&mut self, time: f64, channels: &[f64]) -> io::Result<()> {
        self.rows.push((time, channels.to_vec()));
        Ok(())
    }

    fn end(&mut self) -> io::Result<()> {
        self.end_calls += 1;
        Ok(())
    }
}

/// Record sink capturing rows in memory.
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    pub rows: Vec<ResultRecord>,
    pub end_calls: usize,
}

impl RecordSink for MemoryRecordSink {
    fn write(&mut self, record: &ResultRecord) -> io::Result<()> {
        self.rows.push(record.clone());
        Ok(())
    }

    fn end(&mut self) -> io::Result<()> {
        self.end_calls += 1;
        Ok(())
    }
}
