//! Step handler trait and a ready-made trajectory recorder.

use crate::dense::StepInterpolator;
use crate::error::OdeResult;
use crate::ode::OdeStateAndDerivative;
use crate::scalar::Scalar;

/// Callback receiving every accepted (possibly event-restricted) step.
///
/// The interpolator can be sampled at any time inside the step it covers,
/// so a handler sees the continuous trajectory, not just step endpoints.
/// When an event splits a step, the handler is called once per part, in
/// chronological order.
pub trait OdeStepHandler<S: Scalar> {
    /// Called once at the start of an integration.
    fn init(&mut self, _state0: &OdeStateAndDerivative<S>, _t_target: S) {}

    /// Called after each accepted step part.
    fn handle_step(&mut self, interpolator: &StepInterpolator<S>) -> OdeResult<()>;

    /// Called once after the last step, with the final state.
    fn finish(&mut self, _final_state: &OdeStateAndDerivative<S>) {}
}

/// Step handler collecting the trajectory at step ends.
#[derive(Debug)]
pub struct SolutionRecorder<S: Scalar> {
    times: Vec<f64>,
    states: Vec<Vec<S>>,
}

impl<S: Scalar> Default for SolutionRecorder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Scalar> SolutionRecorder<S> {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self {
            times: Vec::new(),
            states: Vec::new(),
        }
    }

    /// Recorded times (real projections), one per accepted step part.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Recorded complete states, parallel to [`times`](Self::times).
    pub fn states(&self) -> &[Vec<S>] {
        &self.states
    }

    /// Last recorded state, if any step was delivered.
    pub fn last_state(&self) -> Option<&Vec<S>> {
        self.states.last()
    }
}

impl<S: Scalar> OdeStepHandler<S> for SolutionRecorder<S> {
    fn init(&mut self, state0: &OdeStateAndDerivative<S>, _t_target: S) {
        self.times.clear();
        self.states.clear();
        self.times.push(state0.time().real());
        self.states.push(state0.complete_state());
    }

    fn handle_step(&mut self, interpolator: &StepInterpolator<S>) -> OdeResult<()> {
        let current = interpolator.current_state();
        self.times.push(current.time().real());
        self.states.push(current.complete_state());
        Ok(())
    }
}
