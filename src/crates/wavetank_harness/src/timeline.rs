use crate::error::{HarnessError, HarnessResult};

/// Relative tolerance for deciding whether a step lands on `t_final`.
const END_TOLERANCE: f64 = 1e-9;

/// One discrete simulation instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStep {
    /// Ordinal index, starting at zero.
    pub index: usize,
    /// Timestamp in seconds.
    pub time: f64,
}

/// Fixed-spacing sequence of timesteps covering `[t_start, t_final]`.
///
/// The sequence holds `floor((t_final - t_start) / dt) + 1` steps; a step
/// landing on `t_final` within floating tolerance is included. Timestamps are
/// computed as `t_start + index * dt`, so the first timestamp equals
/// `t_start` exactly.
#[derive(Debug, Clone)]
pub struct Timeline {
    t_start: f64,
    dt: f64,
    len: usize,
}

impl Timeline {
    pub fn new(t_start: f64, t_final: f64, dt: f64) -> HarnessResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(HarnessError::configuration(format!(
                "timestep must be positive and finite, got {dt}"
            )));
        }
        if !t_start.is_finite() || !t_final.is_finite() || t_final < t_start {
            return Err(HarnessError::configuration(format!(
                "invalid time window [{t_start}, {t_final}]"
            )));
        }

        let span = t_final - t_start;
        let steps = (span / dt * (1.0 + END_TOLERANCE)).floor() as usize;
        Ok(Self {
            t_start,
            dt,
            len: steps + 1,
        })
    }

    /// Number of timesteps in the sequence.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Spacing between consecutive timestamps.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Timestep at `index`, if within the sequence.
    pub fn step(&self, index: usize) -> Option<TimeStep> {
        if index >= self.len {
            return None;
        }
        Some(TimeStep {
            index,
            time: self.t_start + index as f64 * self.dt,
        })
    }

    /// Iterate the sequence in order.
    pub fn iter(&self) -> impl Iterator<Item = TimeStep> + '_ {
        (0..self.len).map(move |index| TimeStep {
            index,
            time: self.t_start + index as f64 * self.dt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_matches_floor_formula() {
        let timeline = Timeline::new(30.0, 48.0, 1.375).unwrap();
        assert_eq!(timeline.len(), 14);
    }

    #[test]
    fn first_timestamp_is_t_start_exactly() {
        let timeline = Timeline::new(30.0, 48.0, 1.375).unwrap();
        assert_eq!(timeline.step(0).unwrap().time, 30.0);
    }

    #[test]
    fn last_timestamp_stays_within_the_window() {
        let timeline = Timeline::new(30.0, 48.0, 1.375).unwrap();
        let last = timeline.step(timeline.len() - 1).unwrap();
        assert_eq!(last.index, 13);
        assert!((last.time - 47.875).abs() < 1e-12);
        assert!(last.time <= 48.0);
    }

    #[test]
    fn step_landing_on_t_final_is_included() {
        let timeline = Timeline::new(0.0, 1.0, 0.1).unwrap();
        assert_eq!(timeline.len(), 11);
        let last = timeline.step(10).unwrap();
        assert!((last.time - 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_window_yields_a_single_step() {
        let timeline = Timeline::new(5.0, 5.0, 0.5).unwrap();
        assert_eq!(timeline.len(), 1);
        assert!(!timeline.is_empty());
        assert_eq!(timeline.step(0).unwrap().time, 5.0);
    }

    #[test]
    fn spacing_is_uniform() {
        let timeline = Timeline::new(30.0, 48.0, 1.375).unwrap();
        let times: Vec<f64> = timeline.iter().map(|step| step.time).collect();
        for pair in times.windows(2) {
            assert!((pair[1] - pair[0] - 1.375).abs() < 1e-12);
        }
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(Timeline::new(0.0, 1.0, 0.0).is_err());
        assert!(Timeline::new(0.0, 1.0, -0.5).is_err());
        assert!(Timeline::new(2.0, 1.0, 0.1).is_err());
        assert!(Timeline::new(0.0, f64::NAN, 0.1).is_err());
    }
}
