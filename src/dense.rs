//! Dense output for accepted steps.
//!
//! Cubic Hermite interpolation over a completed step from the endpoint
//! states and derivatives:
//!
//! ```text
//! θ = (t - t_prev) / h,  h = t_curr - t_prev
//! y(θ) = y_prev + θ·h·f_prev + θ²·a + θ³·b
//!   a =  3·(y_curr - y_prev) - h·(2·f_prev + f_curr)
//!   b = -2·(y_curr - y_prev) + h·(f_prev + f_curr)
//! ```
//!
//! Interpolation always runs over the *global* step, so restricting an
//! interpolator to a sub-interval changes which part of the step it
//! advertises, never the values it produces.

use crate::error::OdeResult;
use crate::ode::{EquationsMapper, OdeStateAndDerivative};
use crate::scalar::Scalar;

/// Dense-output view of one accepted step.
///
/// Evaluable at any time inside the step; restrictable to a sub-interval
/// when events split the step into parts.
#[derive(Clone)]
pub struct StepInterpolator<S: Scalar> {
    global_previous: OdeStateAndDerivative<S>,
    global_current: OdeStateAndDerivative<S>,
    previous: OdeStateAndDerivative<S>,
    current: OdeStateAndDerivative<S>,
    forward: bool,
    mapper: EquationsMapper,
}

impl<S: Scalar> StepInterpolator<S> {
    pub(crate) fn new(
        previous: OdeStateAndDerivative<S>,
        current: OdeStateAndDerivative<S>,
        forward: bool,
        mapper: EquationsMapper,
    ) -> Self {
        Self {
            global_previous: previous.clone(),
            global_current: current.clone(),
            previous,
            current,
            forward,
            mapper,
        }
    }

    /// State at the start of the (possibly restricted) interval.
    pub fn previous_state(&self) -> &OdeStateAndDerivative<S> {
        &self.previous
    }

    /// State at the end of the (possibly restricted) interval.
    pub fn current_state(&self) -> &OdeStateAndDerivative<S> {
        &self.current
    }

    pub(crate) fn global_previous_state(&self) -> &OdeStateAndDerivative<S> {
        &self.global_previous
    }

    pub(crate) fn global_current_state(&self) -> &OdeStateAndDerivative<S> {
        &self.global_current
    }

    /// Whether integration time increases along this step.
    pub fn is_forward(&self) -> bool {
        self.forward
    }

    /// A view of the same step restricted to `[previous, current]`.
    ///
    /// Idempotent on the advertised interval; the interpolation data is
    /// shared with the original step.
    pub fn restrict(
        &self,
        previous: OdeStateAndDerivative<S>,
        current: OdeStateAndDerivative<S>,
    ) -> Self {
        Self {
            global_previous: self.global_previous.clone(),
            global_current: self.global_current.clone(),
            previous,
            current,
            forward: self.forward,
            mapper: self.mapper.clone(),
        }
    }

    /// State and derivative at time `t` inside the step.
    pub fn interpolated_state(&self, t: S) -> OdeResult<OdeStateAndDerivative<S>> {
        let t_prev = self.global_previous.time();
        let h = self.global_current.time() - t_prev;
        let theta = (t - t_prev) / h;

        let y_prev = self.global_previous.complete_state();
        let y_curr = self.global_current.complete_state();
        let f_prev = self.global_previous.complete_derivative();
        let f_curr = self.global_current.complete_derivative();

        let n = y_prev.len();
        let two = S::from_f64(2.0);
        let three = S::from_f64(3.0);
        let theta2 = theta * theta;
        let theta3 = theta2 * theta;

        let mut y = vec![S::zero(); n];
        let mut y_dot = vec![S::zero(); n];
        for i in 0..n {
            let dy = y_curr[i] - y_prev[i];
            let a = three * dy - h * (two * f_prev[i] + f_curr[i]);
            let b = -(two * dy) + h * (f_prev[i] + f_curr[i]);
            y[i] = y_prev[i] + theta * h * f_prev[i] + theta2 * a + theta3 * b;
            y_dot[i] = f_prev[i] + (two * theta * a + three * theta2 * b) / h;
        }

        self.mapper.map_state_and_derivative(t, &y, &y_dot)
    }
}
