use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::config::SimulationConfig;
use crate::engine::{
    Engine, EngineMetadata, FieldKind, FieldSample, InitContext, MotionSource, MotionState,
    SamplePoint, SharedFieldHandle, StepOutput,
};
use crate::error::{HarnessError, HarnessResult};
use crate::output::{
    ChannelFileSink, ChannelSink, DebugFileSink, RecordFileSink, RecordSink, ResultAggregator,
    ResultRecord,
};
use crate::timeline::Timeline;

/// Ordered lifecycle of an engine handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    PreInitialized,
    Initialized,
    Stepping,
    Finalized,
}

/// Per-run inputs for the time-stepping loop.
#[derive(Clone, Copy)]
pub struct RunPlan<'a> {
    motion: &'a dyn MotionSource,
    sample_points: &'a [SamplePoint],
    stop: Option<&'a AtomicBool>,
}

impl<'a> RunPlan<'a> {
    /// Plan a run driven by the given motion source, with no sample points.
    pub fn new(motion: &'a dyn MotionSource) -> Self {
        Self {
            motion,
            sample_points: &[],
            stop: None,
        }
    }

    /// Query these points at every timestep.
    pub fn with_sample_points(mut self, points: &'a [SamplePoint]) -> Self {
        self.sample_points = points;
        self
    }

    /// Check this flag between steps and abort the run once it is set.
    pub fn with_stop_flag(mut self, stop: &'a AtomicBool) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// Outcome of a completed (or cleanly stopped) run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Steps that ran to completion, including their field queries.
    pub steps_completed: usize,
    /// Per-point records written to the record sink.
    pub records_written: usize,
    /// Whether the run ended early because the stop flag was raised.
    pub stopped: bool,
}

/// Owns one engine instance and enforces its lifecycle.
///
/// Operations are only accepted in the states the lifecycle permits; anything
/// else fails with [`HarnessError::LifecycleViolation`] before reaching the
/// engine. `finalize` is idempotent and also runs on drop, so the engine is
/// released exactly once on every exit path.
pub struct WaveTankHarness {
    engine: Box<dyn Engine>,
    config: SimulationConfig,
    state: LifecycleState,
    metadata: Option<EngineMetadata>,
}

impl WaveTankHarness {
    /// Wrap an engine instance. No engine call is made until `initialize`.
    pub fn new(config: SimulationConfig, engine: Box<dyn Engine>) -> Self {
        Self {
            engine,
            config,
            state: LifecycleState::Uninitialized,
            metadata: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Engine metadata, available once `initialize` has succeeded.
    pub fn metadata(&self) -> Option<&EngineMetadata> {
        self.metadata.as_ref()
    }

    /// Validate the configuration and establish everything needed before
    /// engine construction.
    pub fn preinit(&mut self) -> HarnessResult<()> {
        self.require("preinit", &[LifecycleState::Uninitialized])?;
        self.config.validate()?;
        debug!(debug_level = self.config.debug_level, "preinit complete");
        self.state = LifecycleState::PreInitialized;
        Ok(())
    }

    /// Construct the engine from the settings payload and expose its
    /// metadata.
    ///
    /// If the engine rejects the settings it has already released whatever it
    /// partially constructed, so the harness moves straight to `Finalized`;
    /// a later explicit `finalize` is then a no-op.
    pub fn initialize(&mut self) -> HarnessResult<&EngineMetadata> {
        self.require("initialize", &[LifecycleState::PreInitialized])?;

        let settings = self.config.settings.resolve()?;
        let timeline = self.timeline()?;
        let context = InitContext {
            settings,
            t_start: self.config.t_start,
            t_final: self.config.t_final,
            dt: self.config.dt,
            debug_level: self.config.debug_level,
        };

        match self.engine.initialize(&context) {
            Ok(metadata) => {
                debug!(
                    channels = metadata.channel_count(),
                    steps = timeline.len(),
                    "engine initialized"
                );
                self.state = LifecycleState::Initialized;
                Ok(&*self.metadata.insert(metadata))
            }
            Err(err) => {
                self.engine.end();
                self.state = LifecycleState::Finalized;
                Err(err)
            }
        }
    }

    /// Advance the engine one timestep.
    pub fn step(&mut self, time: f64, motion: &MotionState) -> HarnessResult<StepOutput> {
        self.require(
            "step",
            &[LifecycleState::Initialized, LifecycleState::Stepping],
        )?;
        self.state = LifecycleState::Stepping;
        debug!(time, "engine step");
        self.engine.step(time, motion)
    }

    /// Evaluate one field quantity at a point.
    pub fn query_field(
        &mut self,
        time: f64,
        point: SamplePoint,
        kind: FieldKind,
    ) -> HarnessResult<FieldSample> {
        self.require(
            "query_field",
            &[LifecycleState::Initialized, LifecycleState::Stepping],
        )?;
        self.engine.query_field(time, point, kind)
    }

    /// Fetch the engine's current wave field handle.
    pub fn field_handle(&self) -> HarnessResult<SharedFieldHandle> {
        self.require(
            "field_handle",
            &[LifecycleState::Initialized, LifecycleState::Stepping],
        )?;
        self.engine
            .field_handle()
            .ok_or(HarnessError::HandleUnavailable)
    }

    /// Hand a wave field handle back to the engine.
    pub fn set_field_handle(&mut self, handle: &SharedFieldHandle) -> HarnessResult<()> {
        self.require(
            "set_field_handle",
            &[LifecycleState::Initialized, LifecycleState::Stepping],
        )?;
        self.engine.adopt_field_handle(handle)
    }

    /// Release the engine. Idempotent: repeated calls, or a call after the
    /// engine already finalized itself on an internal error, do nothing.
    pub fn finalize(&mut self) -> HarnessResult<()> {
        self.release_engine();
        Ok(())
    }

    /// Run the full lifecycle: preinit and initialize as needed, step through
    /// the whole timeline, then tear down.
    ///
    /// On any failure the aggregator is flushed with the rows completed so
    /// far and the engine is released, then the original error propagates
    /// unchanged.
    pub fn run(
        &mut self,
        plan: RunPlan<'_>,
        channel_sink: &mut dyn ChannelSink,
        record_sink: &mut dyn RecordSink,
    ) -> HarnessResult<RunSummary> {
        if self.state == LifecycleState::Uninitialized {
            self.preinit()?;
        }
        if self.state == LifecycleState::PreInitialized {
            self.initialize()?;
        }
        self.require(
            "run",
            &[LifecycleState::Initialized, LifecycleState::Stepping],
        )?;

        let timeline = self.timeline()?;
        let mut aggregator = ResultAggregator::new();
        let mut debug_sink = match self.open_debug_sink() {
            Ok(sink) => sink,
            Err(err) => {
                // Same teardown routine as every other exit: the sinks still
                // get closed even though nothing was recorded.
                if let Err(teardown_err) =
                    self.teardown(&mut aggregator, channel_sink, record_sink, None)
                {
                    warn!(error = %teardown_err, "teardown failed after debug sink error");
                }
                return Err(err);
            }
        };

        let outcome = self.drive(&plan, &timeline, &mut aggregator, debug_sink.as_mut());
        let teardown = self.teardown(&mut aggregator, channel_sink, record_sink, debug_sink);

        match outcome {
            Ok(stopped) => {
                teardown?;
                Ok(RunSummary {
                    steps_completed: aggregator.steps_completed(),
                    records_written: aggregator.record_count(),
                    stopped,
                })
            }
            Err(err) => {
                if let Err(teardown_err) = teardown {
                    warn!(error = %teardown_err, "teardown failed after run error");
                }
                Err(err)
            }
        }
    }

    /// Like [`run`](Self::run), but writing to the file sinks named by the
    /// configuration's `output_path` and `results_path`.
    ///
    /// Both paths must be set. The engine is released if either sink cannot
    /// be opened; a failed run is not retryable against a stateful engine.
    pub fn run_to_files(&mut self, plan: RunPlan<'_>) -> HarnessResult<RunSummary> {
        if self.state == LifecycleState::Uninitialized {
            self.preinit()?;
        }
        if self.state == LifecycleState::PreInitialized {
            self.initialize()?;
        }
        self.require(
            "run_to_files",
            &[LifecycleState::Initialized, LifecycleState::Stepping],
        )?;

        match self.open_configured_sinks() {
            Ok((mut channel_sink, mut record_sink)) => {
                self.run(plan, &mut channel_sink, &mut record_sink)
            }
            Err(err) => {
                self.release_engine();
                Err(err)
            }
        }
    }

    fn open_configured_sinks(&self) -> HarnessResult<(ChannelFileSink, RecordFileSink)> {
        let output_path = self.config.output_path.as_ref().ok_or_else(|| {
            HarnessError::configuration("output_path is not set in the configuration")
        })?;
        let results_path = self.config.results_path.as_ref().ok_or_else(|| {
            HarnessError::configuration("results_path is not set in the configuration")
        })?;
        let metadata = self
            .metadata
            .as_ref()
            .ok_or_else(|| HarnessError::lifecycle("open_configured_sinks", self.state))?;

        let channel_sink =
            ChannelFileSink::create(output_path, &metadata.channel_names, &metadata.channel_units)?;
        let record_sink = RecordFileSink::create(results_path)?;
        Ok((channel_sink, record_sink))
    }

    /// Inner stepping loop. Returns whether the stop flag ended the run.
    fn drive(
        &mut self,
        plan: &RunPlan<'_>,
        timeline: &Timeline,
        aggregator: &mut ResultAggregator,
        mut debug_sink: Option<&mut DebugFileSink>,
    ) -> HarnessResult<bool> {
        for step in timeline.iter() {
            // Cancellation is only honored at step boundaries; the engine
            // call itself is atomic.
            if let Some(stop) = plan.stop {
                if stop.load(Ordering::SeqCst) {
                    debug!(step = step.index, "stop requested, ending run early");
                    return Ok(true);
                }
            }

            let motion = plan.motion.motion_at(&step);
            let output = self.step(step.time, &motion)?;
            if output.channels.len() != self.channel_count() {
                return Err(HarnessError::step(
                    step.time,
                    format!(
                        "engine returned {} channel values, metadata promised {}",
                        output.channels.len(),
                        self.channel_count()
                    ),
                ));
            }

            if let Some(sink) = debug_sink.as_deref_mut() {
                sink.write(step.time, &motion, &output.loads)?;
            }

            let mut records = Vec::with_capacity(plan.sample_points.len());
            for point in plan.sample_points {
                records.push(self.query_point(step.time, *point)?);
            }

            // The step only counts once its queries are done too, so an
            // abort leaves exactly the completed-step row count.
            aggregator.record_step(step.time, output.channels, records);
        }

        Ok(false)
    }

    /// Issue the three field queries for one point, in fixed order.
    fn query_point(&mut self, time: f64, point: SamplePoint) -> HarnessResult<ResultRecord> {
        let kinematics = self.query_field(time, point, FieldKind::Kinematics)?;
        let elevation = self.query_field(time, point, FieldKind::Elevation)?;
        let normal = self.query_field(time, point, FieldKind::SurfaceNormal)?;

        match (kinematics, elevation, normal) {
            (
                FieldSample::Kinematics {
                    velocity,
                    acceleration,
                    in_fluid,
                },
                FieldSample::Elevation(elevation),
                FieldSample::SurfaceNormal(normal),
            ) => Ok(ResultRecord {
                time,
                point,
                velocity,
                acceleration,
                in_fluid,
                elevation,
                normal,
            }),
            _ => Err(HarnessError::step(
                time,
                "engine returned a field sample of the wrong kind",
            )),
        }
    }

    /// Single teardown routine reachable from every exit path of `run`.
    fn teardown(
        &mut self,
        aggregator: &mut ResultAggregator,
        channel_sink: &mut dyn ChannelSink,
        record_sink: &mut dyn RecordSink,
        debug_sink: Option<DebugFileSink>,
    ) -> HarnessResult<()> {
        let flush = aggregator.flush(channel_sink, record_sink);
        let debug_close = match debug_sink {
            Some(mut sink) => sink.end(),
            None => Ok(()),
        };
        self.release_engine();
        flush?;
        debug_close?;
        Ok(())
    }

    fn open_debug_sink(&self) -> HarnessResult<Option<DebugFileSink>> {
        let path = self
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.debug_output.as_ref());
        match path {
            Some(path) => {
                let sink = DebugFileSink::create(path).map_err(|err| {
                    HarnessError::configuration(format!(
                        "failed to open debug output {}: {err}",
                        path.display()
                    ))
                })?;
                Ok(Some(sink))
            }
            None => Ok(None),
        }
    }

    fn channel_count(&self) -> usize {
        self.metadata
            .as_ref()
            .map(EngineMetadata::channel_count)
            .unwrap_or(0)
    }

    fn timeline(&self) -> HarnessResult<Timeline> {
        Timeline::new(self.config.t_start, self.config.t_final, self.config.dt)
    }

    fn require(&self, operation: &'static str, allowed: &[LifecycleState]) -> HarnessResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(HarnessError::lifecycle(operation, self.state))
        }
    }

    fn release_engine(&mut self) {
        if self.state == LifecycleState::Finalized {
            return;
        }
        if matches!(
            self.state,
            LifecycleState::Initialized | LifecycleState::Stepping
        ) {
            debug!("releasing engine");
            self.engine.end();
        }
        self.state = LifecycleState::Finalized;
    }
}

impl Drop for WaveTankHarness {
    fn drop(&mut self) {
        self.release_engine();
    }
}
