//! Adaptive ODE integration with dense output and event location.
//!
//! `intgr` solves initial value problems for systems of first-order
//! ordinary differential equations with an embedded Dormand-Prince 4(5)
//! pair, and adds the machinery real simulations need around the raw
//! stepper:
//!
//! - **Composite systems**: one primary equation set plus any number of
//!   secondary sets (variational equations, co-states) sharing a single
//!   integration without polluting error control.
//! - **Dense output**: every accepted step carries an interpolator, so
//!   step handlers see the continuous trajectory.
//! - **Event location**: user sign functions are watched during every
//!   step, their roots located to solver accuracy, and their handlers can
//!   stop the integration, reset the state or derivatives, or request a
//!   full re-evaluation of all detectors — delivered strictly in
//!   chronological order even when handlers rewrite each other's sign
//!   functions mid-step.
//! - **Scalar polymorphism**: the engine is generic over the scalar type;
//!   `f64` and the bundled [`Dual64`] dual number both work, so one
//!   integration can carry derivative information end to end.
//!
//! # Example
//!
//! ```
//! use intgr::{ExpandableOde, OdeFn, OdeState, Rk45Integrator};
//!
//! // harmonic oscillator: y0' = y1, y1' = -y0
//! let mut ode = ExpandableOde::new(Box::new(OdeFn::new(2, |_t, y: &[f64]| {
//!     Ok(vec![y[1], -y[0]])
//! })));
//!
//! let mut integrator = Rk45Integrator::with_tolerances(1e-10, 1e-12);
//! let s0 = OdeState::new(0.0, vec![0.0, 1.0]);
//! let final_state = integrator.integrate(&mut ode, &s0, 1.0).unwrap();
//!
//! assert!((final_state.primary_state()[0] - 1.0f64.sin()).abs() < 1e-9);
//! ```

pub mod dense;
pub mod error;
pub mod events;
pub mod integrator;
pub mod ode;
pub mod rootfind;
pub mod scalar;
pub mod step_control;
pub mod traits;

pub use dense::StepInterpolator;
pub use error::{OdeError, OdeResult};
pub use events::{EventOccurrence, EventState};
pub use integrator::{IntegratorOptions, Rk45Integrator, Stats};
pub use ode::{EquationsMapper, ExpandableOde, OdeState, OdeStateAndDerivative};
pub use rootfind::RootSolver;
pub use scalar::{Dual64, Scalar};
pub use step_control::StepSizeController;
pub use traits::{
    EventAction, OdeEventDetector, OdeEventHandler, OdeFn, OdeStepHandler, OrdinaryOde,
    SecondaryOde, SecondaryOdeFn, SolutionRecorder,
};
