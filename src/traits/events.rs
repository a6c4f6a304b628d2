//! Event detector and handler traits.
//!
//! An event function g(state) triggers when it crosses zero. During every
//! accepted step the engine watches each detector's sign, brackets any
//! crossing, and locates the root with the detector's solver before
//! reporting it to the handler in chronological order.

use crate::error::OdeResult;
use crate::ode::{OdeState, OdeStateAndDerivative};
use crate::rootfind::RootSolver;
use crate::scalar::Scalar;

/// Directive returned by an event handler.
#[derive(Debug, Clone)]
pub enum EventAction<S: Scalar> {
    /// Keep integrating; the event is informational.
    Continue,

    /// Stop the integration at (just past) the event.
    Stop,

    /// Replace the state and restart the stepper from it.
    ResetState(OdeState<S>),

    /// Keep the state but recompute its derivatives before continuing.
    ///
    /// Use when the handler changed something the right-hand side reads
    /// (a parameter, a switch) without touching the state itself.
    ResetDerivatives,

    /// Re-evaluate every event detector over the rest of the step.
    ///
    /// Use when the handler changed another detector's g function.
    ResetEvents,
}

/// User callback fired when a located event is reached.
pub trait OdeEventHandler<S: Scalar> {
    /// Handle an event.
    ///
    /// `increasing` tells whether g crosses zero upward with increasing
    /// physical time at this root.
    fn event_occurred(&self, state: &OdeStateAndDerivative<S>, increasing: bool) -> EventAction<S>;
}

/// An event detector: a continuous sign function plus location policy.
///
/// A detector is usually its own handler:
///
/// ```
/// use intgr::{EventAction, OdeEventDetector, OdeEventHandler, OdeResult, OdeStateAndDerivative};
///
/// /// Stops the integration when y[0] falls to zero.
/// struct GroundImpact;
///
/// impl OdeEventDetector<f64> for GroundImpact {
///     fn g(&self, state: &OdeStateAndDerivative<f64>) -> OdeResult<f64> {
///         Ok(state.primary_state()[0])
///     }
///
///     fn handler(&self) -> &dyn OdeEventHandler<f64> {
///         self
///     }
/// }
///
/// impl OdeEventHandler<f64> for GroundImpact {
///     fn event_occurred(&self, _state: &OdeStateAndDerivative<f64>, _incr: bool) -> EventAction<f64> {
///         EventAction::Stop
///     }
/// }
/// ```
pub trait OdeEventDetector<S: Scalar> {
    /// The switching function. Continuous; zero at the event.
    fn g(&self, state: &OdeStateAndDerivative<S>) -> OdeResult<S>;

    /// Maximal time between two sign checks inside one step.
    ///
    /// Bound this when g may cross zero and come back within a single step;
    /// the default assumes at most one crossing per step.
    fn max_check_interval(&self) -> f64 {
        f64::INFINITY
    }

    /// The bracketing solver used to locate roots of g, carrying the
    /// absolute accuracy of located event times and the iteration budget.
    fn root_solver(&self) -> RootSolver {
        RootSolver::default()
    }

    /// The handler notified when a root of g is reached.
    fn handler(&self) -> &dyn OdeEventHandler<S>;
}
