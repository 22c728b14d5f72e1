use std::path::PathBuf;

use crate::error::HarnessResult;
use crate::timeline::TimeStep;

/// Degrees of freedom in a rigid-body motion vector.
pub const MOTION_DOF: usize = 6;

/// Rigid-body kinematics for one timestep: position/orientation, velocity and
/// acceleration, each as `[x, y, z, roll, pitch, yaw]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionState {
    pub position: [f64; MOTION_DOF],
    pub velocity: [f64; MOTION_DOF],
    pub acceleration: [f64; MOTION_DOF],
}

impl MotionState {
    /// Motion state with every component zero.
    pub fn at_rest() -> Self {
        Self {
            position: [0.0; MOTION_DOF],
            velocity: [0.0; MOTION_DOF],
            acceleration: [0.0; MOTION_DOF],
        }
    }
}

/// Forces and moments on the body, `[Fx, Fy, Fz, Mx, My, Mz]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoadState(pub [f64; MOTION_DOF]);

/// A 3-D query target for field values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint(pub [f64; 3]);

/// Outputs of one engine step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// Hydrodynamic loads on the body at this step.
    pub loads: LoadState,
    /// Values of the engine's named output channels, in metadata order.
    pub channels: Vec<f64>,
}

/// The field quantity a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Fluid velocity and acceleration at the point, plus the in-fluid flag.
    Kinematics,
    /// Free-surface elevation above the point.
    Elevation,
    /// Normal of the free surface above the point.
    SurfaceNormal,
}

/// Result of a single field query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldSample {
    Kinematics {
        velocity: [f64; 3],
        acceleration: [f64; 3],
        in_fluid: bool,
    },
    Elevation(f64),
    SurfaceNormal([f64; 3]),
}

/// Read-only engine facts exposed once `initialize` succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineMetadata {
    /// Names of the output channels, in reporting order.
    pub channel_names: Vec<String>,
    /// Units for each channel, parallel to `channel_names`.
    pub channel_units: Vec<String>,
    /// Number of timesteps the engine sized its internal buffers for.
    pub total_steps: usize,
    /// Destination for per-step debug rows, when debug output is enabled.
    pub debug_output: Option<PathBuf>,
}

impl EngineMetadata {
    pub fn channel_count(&self) -> usize {
        self.channel_names.len()
    }
}

/// Shape tag carried by a wave field handle.
///
/// Two handles are interchangeable only when their shapes match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldShape {
    /// Grid extent of the discretized field, `[nx, ny, nz]`.
    pub grid: [usize; 3],
    /// Number of field components stored per grid node.
    pub components: usize,
}

/// Opaque reference to an engine's internal wave field data.
///
/// The handle is a lookup capability, not an owned value: the harness never
/// dereferences it and it must not outlive the engine that minted it. A
/// handle is only accepted back by the engine that produced it, with an
/// identical shape tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedFieldHandle {
    engine_id: u64,
    shape: FieldShape,
    token: u64,
}

impl SharedFieldHandle {
    /// Mint a handle. Intended for engine implementations only.
    pub fn new(engine_id: u64, shape: FieldShape, token: u64) -> Self {
        Self {
            engine_id,
            shape,
            token,
        }
    }

    /// Identity of the engine instance that minted the handle.
    pub fn engine_id(&self) -> u64 {
        self.engine_id
    }

    /// Shape tag of the referenced field.
    pub fn shape(&self) -> FieldShape {
        self.shape
    }

    /// Engine-private lookup token.
    pub fn token(&self) -> u64 {
        self.token
    }
}

/// Everything the engine needs to construct itself, handed to `initialize`.
///
/// Scalar settings travel alongside the primary payload because the engine
/// sizes its channel buffers from the time window before parsing anything
/// else.
#[derive(Debug, Clone)]
pub struct InitContext {
    /// Contents of the engine's primary settings file.
    pub settings: String,
    pub t_start: f64,
    pub t_final: f64,
    pub dt: f64,
    pub debug_level: u8,
}

/// The seam between the harness and an external hydrodynamics engine.
///
/// Implementations are stateful and not reentrant: the harness never issues
/// two calls concurrently, and a step that fails must not be retried.
pub trait Engine {
    /// Construct engine-side state from the settings payload.
    fn initialize(&mut self, context: &InitContext) -> HarnessResult<EngineMetadata>;

    /// Advance the engine to `time` with the given body motion. Synchronous
    /// and blocking; no cancellation mid-call.
    fn step(&mut self, time: f64, motion: &MotionState) -> HarnessResult<StepOutput>;

    /// Evaluate one field quantity at a point. Queries are independent of
    /// each other: reordering kinds at the same `(time, point)` must not
    /// change any individual result.
    fn query_field(
        &mut self,
        time: f64,
        point: SamplePoint,
        kind: FieldKind,
    ) -> HarnessResult<FieldSample>;

    /// Current wave field handle, if the field has been constructed.
    fn field_handle(&self) -> Option<SharedFieldHandle>;

    /// Adopt an externally supplied wave field reference in place of the
    /// engine's own. The engine validates identity and shape before
    /// accepting.
    fn adopt_field_handle(&mut self, handle: &SharedFieldHandle) -> HarnessResult<()>;

    /// Release all engine-side state. Must be safe to call more than once.
    fn end(&mut self);
}

/// Per-step supplier of body motion, read-only to the harness.
///
/// Implementations must be deterministic in the step index so an aborted run
/// can be reproduced.
pub trait MotionSource {
    fn motion_at(&self, step: &TimeStep) -> MotionState;
}

/// Holds the body fixed in one motion state for the whole run.
#[derive(Debug, Clone)]
pub struct ConstantMotion(pub MotionState);

impl MotionSource for ConstantMotion {
    fn motion_at(&self, _step: &TimeStep) -> MotionState {
        self.0
    }
}

/// Replays a pre-recorded motion table, one row per step.
///
/// Steps beyond the end of the table hold the last row, matching how a
/// recorded tank run shorter than the simulation window is replayed.
#[derive(Debug, Clone)]
pub struct TabulatedMotion {
    rows: Vec<MotionState>,
}

impl TabulatedMotion {
    pub fn new(rows: Vec<MotionState>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl MotionSource for TabulatedMotion {
    fn motion_at(&self, step: &TimeStep) -> MotionState {
        match self.rows.get(step.index) {
            Some(row) => *row,
            None => self.rows.last().copied().unwrap_or_else(MotionState::at_rest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tabulated_motion_holds_last_row_past_the_end() {
        let mut moving = MotionState::at_rest();
        moving.position[0] = 2.5;
        let source = TabulatedMotion::new(vec![MotionState::at_rest(), moving]);

        let late = TimeStep {
            index: 7,
            time: 0.7,
        };
        assert_eq!(source.motion_at(&late), moving);
    }

    #[test]
    fn handles_compare_by_identity_shape_and_token() {
        let shape = FieldShape {
            grid: [8, 8, 4],
            components: 3,
        };
        let a = SharedFieldHandle::new(1, shape, 42);
        let b = SharedFieldHandle::new(1, shape, 42);
        assert_eq!(a, b);
        assert_ne!(a, SharedFieldHandle::new(2, shape, 42));
    }
}
