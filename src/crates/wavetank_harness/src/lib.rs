//! Coupling harness for driving a stateful wave-tank hydrodynamics engine
//! through its full lifecycle: preinit, initialize, step the time sequence,
//! query field values, finalize.
//!
//! The engine sits behind the [`Engine`] trait and is assumed single-threaded
//! and not reentrant; the harness drives it one synchronous call at a time
//! and guarantees the engine is released and the output sinks flushed on
//! every exit path, including mid-run failures.
//!
//! Typical usage:
//! ```no_run
//! use wavetank_harness::{
//!     ChannelFileSink, ConstantMotion, MotionState, RecordFileSink, RunPlan, SamplePoint,
//!     SettingsSource, SimulationConfig, WaveTankHarness,
//! };
//! # fn engine() -> Box<dyn wavetank_harness::Engine> { unimplemented!() }
//!
//! let config = SimulationConfig::new(
//!     30.0,
//!     48.0,
//!     1.375,
//!     SettingsSource::File("SeaState.dat".into()),
//! )
//! .with_debug_level(1);
//!
//! let mut harness = WaveTankHarness::new(config, engine());
//! harness.preinit().expect("config should validate");
//! let metadata = harness.initialize().expect("engine should accept settings");
//! let names = metadata.channel_names.clone();
//! let units = metadata.channel_units.clone();
//!
//! let motion = ConstantMotion(MotionState::at_rest());
//! let points = [SamplePoint([0.0, 0.0, -5.0])];
//! let mut channels = ChannelFileSink::create("channels.out", &names, &units).unwrap();
//! let mut records = RecordFileSink::create("points.results.dat").unwrap();
//!
//! let summary = harness
//!     .run(
//!         RunPlan::new(&motion).with_sample_points(&points),
//!         &mut channels,
//!         &mut records,
//!     )
//!     .expect("run should complete");
//! println!("completed {} steps", summary.steps_completed);
//! ```

mod config;
mod engine;
mod error;
mod harness;
mod output;
mod timeline;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{SettingsSource, SimulationConfig, MAX_DEBUG_LEVEL};
pub use engine::{
    ConstantMotion, Engine, EngineMetadata, FieldKind, FieldSample, FieldShape, InitContext,
    LoadState, MotionSource, MotionState, SamplePoint, SharedFieldHandle, StepOutput,
    TabulatedMotion, MOTION_DOF,
};
pub use error::{HarnessError, HarnessResult};
pub use harness::{LifecycleState, RunPlan, RunSummary, WaveTankHarness};
pub use output::{
    ChannelFileSink, ChannelSink, DebugFileSink, RecordFileSink, RecordSink, ResultAggregator,
    ResultRecord,
};
pub use timeline::{TimeStep, Timeline};
