//! Callback traits for ODE problems, events, and step sampling.

pub mod events;
pub mod ode;
pub mod sampling;

pub use events::{EventAction, OdeEventDetector, OdeEventHandler};
pub use ode::{OdeFn, OrdinaryOde, SecondaryOde, SecondaryOdeFn};
pub use sampling::{OdeStepHandler, SolutionRecorder};
