//! Per-detector event machinery: sign tracking, bracketing, root location.
//!
//! Each registered detector gets an [`EventState`] that survives the whole
//! integration. Between steps the tracked sign matches g at the current
//! anchor time; during a step at most one root is pending. The machine is
//! built to survive *other* events rewriting this detector's g function
//! mid-step: every bracket is re-checked with fresh evaluations before the
//! solver runs, and a sign flip that does not reproduce simply re-anchors
//! the tracked sign.

use std::rc::Rc;

use crate::dense::StepInterpolator;
use crate::error::OdeResult;
use crate::ode::OdeStateAndDerivative;
use crate::rootfind::RootSolver;
use crate::scalar::{Scalar, ulp};
use crate::traits::{EventAction, OdeEventDetector};

/// A located root waiting to be handled.
#[derive(Debug, Clone, Copy)]
struct PendingEvent {
    /// Located event time.
    event_time: f64,
    /// A time just past the root in the integration direction, used as the
    /// stop point so a stopped integration can restart without immediately
    /// re-triggering the same root.
    stop_time: f64,
    /// Whether g crosses zero upward with increasing physical time.
    increasing: bool,
    /// Sign of g just past the root, in integration order.
    positive_after: bool,
}

/// Outcome of handling one event.
pub struct EventOccurrence<S: Scalar> {
    /// The directive the handler returned.
    pub action: EventAction<S>,
    /// Where a STOP should place the final state (just past the root).
    pub stop_time: S,
}

/// State machine wrapping one event detector during an integration.
pub struct EventState<S: Scalar> {
    detector: Rc<dyn OdeEventDetector<S>>,
    solver: RootSolver,
    max_check: f64,
    forward: bool,
    /// Anchor: last time at which the sign of g is known.
    t0: S,
    /// Sign of g at the anchor (zero counts as positive).
    g0_positive: bool,
    pending: Option<PendingEvent>,
}

impl<S: Scalar> EventState<S> {
    pub(crate) fn new(detector: Rc<dyn OdeEventDetector<S>>) -> Self {
        let solver = detector.root_solver();
        let max_check = detector.max_check_interval();
        Self {
            detector,
            solver,
            max_check,
            forward: true,
            t0: S::zero(),
            g0_positive: false,
            pending: None,
        }
    }

    /// The wrapped detector.
    pub fn detector(&self) -> Rc<dyn OdeEventDetector<S>> {
        Rc::clone(&self.detector)
    }

    /// Time of the pending root, if one is waiting.
    pub(crate) fn pending_event_time(&self) -> Option<f64> {
        self.pending.map(|p| p.event_time)
    }

    /// Sample g at the initial state and record sign and direction.
    pub(crate) fn init(&mut self, s0: &OdeStateAndDerivative<S>, t_target: S) -> OdeResult<()> {
        let g0 = self.detector.g(s0)?;
        self.t0 = s0.time();
        self.g0_positive = g0.real() >= 0.0;
        self.forward = t_target.real() >= s0.time().real();
        self.pending = None;
        Ok(())
    }

    /// Seed the sign basis at the start of the first accepted step.
    ///
    /// A zero of g at the very start of the integration is not an event;
    /// the anchor is shifted just off it so the sign basis is well defined
    /// and the zero is not immediately reported.
    pub(crate) fn reinitialize_begin(
        &mut self,
        interpolator: &StepInterpolator<S>,
    ) -> OdeResult<()> {
        self.forward = interpolator.is_forward();
        self.pending = None;

        let s0 = interpolator.global_previous_state();
        let g0 = self.detector.g(s0)?;
        if g0.real() == 0.0 {
            let epsilon = 0.5 * self.solver.tol.max(ulp(s0.time().real()));
            let sigma = if self.forward { 1.0 } else { -1.0 };
            let t_start = S::from_f64(s0.time().real() + sigma * epsilon);
            let shifted = interpolator.interpolated_state(t_start)?;
            let g = self.detector.g(&shifted)?;
            self.t0 = t_start;
            self.g0_positive = g.real() >= 0.0;
        } else {
            self.t0 = s0.time();
            self.g0_positive = g0.real() >= 0.0;
        }
        Ok(())
    }

    /// Look for a root between the anchor and the end of the (possibly
    /// restricted) step.
    ///
    /// The interval is scanned in sub-intervals no longer than the
    /// detector's max check interval. Returns true when a root is pending.
    pub(crate) fn evaluate_step(&mut self, interpolator: &StepInterpolator<S>) -> OdeResult<bool> {
        self.pending = None;

        let t1 = interpolator.current_state().time();
        let dt = t1.real() - self.t0.real();
        if dt == 0.0 {
            return Ok(false);
        }

        let n = if self.max_check.is_finite() {
            ((dt.abs() / self.max_check).ceil() as usize).max(1)
        } else {
            1
        };
        let h = dt / n as f64;

        let mut ta = self.t0;
        for i in 0..n {
            let tb = if i == n - 1 {
                t1
            } else {
                S::from_f64(self.t0.real() + (i + 1) as f64 * h)
            };
            let sb = interpolator.interpolated_state(tb)?;
            let gb = self.detector.g(&sb)?;
            if (gb.real() >= 0.0) != self.g0_positive {
                // sign change against the tracked basis in [ta, tb]
                if self.find_root(interpolator, ta, tb)? {
                    return Ok(true);
                }
                // the flip did not reproduce (g was rewritten by another
                // handler); find_root re-anchored the basis, keep scanning
            }
            ta = tb;
        }
        Ok(false)
    }

    /// Try to advance the anchor to `state`.
    ///
    /// Returns true exactly when doing so uncovers a *new* root strictly
    /// between the previous anchor and `state` — the signature of another
    /// event's handler having changed this detector's g in-flight.
    pub(crate) fn try_advance(
        &mut self,
        state: &OdeStateAndDerivative<S>,
        interpolator: &StepInterpolator<S>,
    ) -> OdeResult<bool> {
        let t = state.time();

        if let Some(p) = &self.pending {
            // never advance through a root that is still waiting
            let not_after = if self.forward {
                p.event_time <= t.real()
            } else {
                p.event_time >= t.real()
            };
            if not_after {
                return Ok(false);
            }
        }

        let g = self.detector.g(state)?;
        if (g.real() >= 0.0) == self.g0_positive {
            // expected sign: advance the anchor
            self.t0 = t;
            return Ok(false);
        }

        // unexpected sign: a root hides in (anchor, state)
        let old = self.pending;
        if !self.find_root(interpolator, self.t0, t)? {
            return Ok(false);
        }
        let new_time = match self.pending {
            Some(p) => p.event_time,
            None => return Ok(false),
        };
        match old {
            None => Ok(true),
            Some(o) if (o.event_time - new_time).abs() > self.solver.tol => Ok(true),
            Some(o) => {
                // same root relocated within tolerance: keep the original
                // record so its queue entry stays valid
                self.pending = Some(o);
                Ok(false)
            }
        }
    }

    /// Notify the handler of the pending event at `state`.
    ///
    /// Clears the pending root and installs the post-crossing sign so the
    /// remainder of the step is scanned against the right basis. Returns
    /// `None` when no event was actually pending (a superseded queue entry).
    pub(crate) fn do_event(&mut self, state: &OdeStateAndDerivative<S>) -> Option<EventOccurrence<S>> {
        let p = self.pending.take()?;
        let action = self.detector.handler().event_occurred(state, p.increasing);
        self.t0 = state.time();
        self.g0_positive = p.positive_after;
        Some(EventOccurrence {
            action,
            stop_time: S::from_f64(p.stop_time),
        })
    }

    /// Locate a root of g in `[ta, tb]` with fresh endpoint evaluations.
    ///
    /// When the fresh endpoint signs no longer bracket a root (g was
    /// rewritten since the tracked sign was sampled), the anchor is moved
    /// to `tb` with the fresh sign and no root is recorded.
    fn find_root(
        &mut self,
        interpolator: &StepInterpolator<S>,
        ta: S,
        tb: S,
    ) -> OdeResult<bool> {
        let detector = Rc::clone(&self.detector);
        let mut eval = |t: f64| -> OdeResult<f64> {
            let state = interpolator.interpolated_state(S::from_f64(t))?;
            Ok(detector.g(&state)?.real())
        };

        let ga = eval(ta.real())?;
        let gb = eval(tb.real())?;
        let a_positive = ga >= 0.0;
        let b_positive = gb >= 0.0;
        if a_positive == b_positive {
            // the tracked sign was stale: g was rewritten since it was
            // sampled, and whatever root it promised is gone with it
            self.t0 = tb;
            self.g0_positive = b_positive;
            self.pending = None;
            return Ok(false);
        }

        let root = self.solver.find_root(&mut eval, ta.real(), tb.real())?;

        let sigma = if self.forward { 1.0 } else { -1.0 };
        let mut stop = root + sigma * self.solver.tol.max(ulp(root));
        stop = if self.forward {
            stop.min(tb.real())
        } else {
            stop.max(tb.real())
        };

        self.pending = Some(PendingEvent {
            event_time: root,
            stop_time: stop,
            increasing: (gb > ga) == self.forward,
            positive_after: b_positive,
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ode::{EquationsMapper, OdeState};
    use crate::traits::OdeEventHandler;

    /// g(state) = y[0] - threshold, CONTINUE on event.
    struct Threshold {
        value: f64,
    }

    impl OdeEventDetector<f64> for Threshold {
        fn g(&self, state: &OdeStateAndDerivative<f64>) -> OdeResult<f64> {
            Ok(state.primary_state()[0] - self.value)
        }

        fn handler(&self) -> &dyn OdeEventHandler<f64> {
            self
        }
    }

    impl OdeEventHandler<f64> for Threshold {
        fn event_occurred(
            &self,
            _state: &OdeStateAndDerivative<f64>,
            _increasing: bool,
        ) -> EventAction<f64> {
            EventAction::Continue
        }
    }

    /// Interpolator for y(t) = t over [t0, t1].
    fn identity_interpolator(t0: f64, t1: f64) -> StepInterpolator<f64> {
        let mapper = EquationsMapper::new(None, 1);
        let prev = OdeStateAndDerivative::new(OdeState::new(t0, vec![t0]), vec![1.0], vec![]);
        let curr = OdeStateAndDerivative::new(OdeState::new(t1, vec![t1]), vec![1.0], vec![]);
        StepInterpolator::new(prev, curr, t1 > t0, mapper)
    }

    fn state_at(interp: &StepInterpolator<f64>, t: f64) -> OdeStateAndDerivative<f64> {
        interp.interpolated_state(t).unwrap()
    }

    #[test]
    fn test_detects_and_locates_root() {
        let interp = identity_interpolator(0.0, 4.0);
        let mut es = EventState::new(Rc::new(Threshold { value: 2.0 }));
        es.init(interp.previous_state(), 4.0).unwrap();
        es.reinitialize_begin(&interp).unwrap();

        assert!(es.evaluate_step(&interp).unwrap());
        let t_event = es.pending_event_time().unwrap();
        assert!((t_event - 2.0).abs() < 1e-10, "t_event = {}", t_event);
    }

    #[test]
    fn test_no_root_no_pending() {
        let interp = identity_interpolator(0.0, 1.0);
        let mut es = EventState::new(Rc::new(Threshold { value: 2.0 }));
        es.init(interp.previous_state(), 1.0).unwrap();
        es.reinitialize_begin(&interp).unwrap();

        assert!(!es.evaluate_step(&interp).unwrap());
        assert!(es.pending_event_time().is_none());
    }

    #[test]
    fn test_do_event_clears_pending_and_installs_sign() {
        let interp = identity_interpolator(0.0, 4.0);
        let mut es = EventState::new(Rc::new(Threshold { value: 2.0 }));
        es.init(interp.previous_state(), 4.0).unwrap();
        es.reinitialize_begin(&interp).unwrap();
        assert!(es.evaluate_step(&interp).unwrap());

        let t_event = es.pending_event_time().unwrap();
        let occurrence = es.do_event(&state_at(&interp, t_event)).unwrap();
        assert!(matches!(occurrence.action, EventAction::Continue));
        // stop time sits just past the root
        assert!(occurrence.stop_time >= t_event);
        assert!(es.pending_event_time().is_none());

        // the remainder of the step has no further crossing
        let restricted = interp.restrict(
            state_at(&interp, t_event),
            interp.current_state().clone(),
        );
        assert!(!es.evaluate_step(&restricted).unwrap());
    }

    #[test]
    fn test_try_advance_consistent_sign() {
        let interp = identity_interpolator(0.0, 4.0);
        let mut es = EventState::new(Rc::new(Threshold { value: 3.5 }));
        es.init(interp.previous_state(), 4.0).unwrap();
        es.reinitialize_begin(&interp).unwrap();

        // advancing within the same sign region reports nothing
        assert!(!es.try_advance(&state_at(&interp, 1.0), &interp).unwrap());
        // a root between the anchor and the probe is a new discovery
        assert!(es.try_advance(&state_at(&interp, 3.9), &interp).unwrap());
        let t_event = es.pending_event_time().unwrap();
        assert!((t_event - 3.5).abs() < 1e-10);
    }

    #[test]
    fn test_reinitialize_nudges_off_zero() {
        // g = y[0], zero exactly at the step start
        let interp = identity_interpolator(0.0, 4.0);
        let mut es = EventState::new(Rc::new(Threshold { value: 0.0 }));
        es.init(interp.previous_state(), 4.0).unwrap();
        es.reinitialize_begin(&interp).unwrap();

        // the zero at t0 must not be reported as an event
        assert!(!es.evaluate_step(&interp).unwrap());
    }

    #[test]
    fn test_max_check_interval_subdivision() {
        // g dips below zero and comes back inside one step; only a scan
        // finer than the excursion can see the double crossing
        struct Dip;

        impl OdeEventDetector<f64> for Dip {
            fn g(&self, state: &OdeStateAndDerivative<f64>) -> OdeResult<f64> {
                let t = state.time();
                // negative only for t in (1.93, 2.07)
                Ok((t - 1.93) * (t - 2.07))
            }

            fn max_check_interval(&self) -> f64 {
                0.05
            }

            fn handler(&self) -> &dyn OdeEventHandler<f64> {
                self
            }
        }

        impl OdeEventHandler<f64> for Dip {
            fn event_occurred(
                &self,
                _state: &OdeStateAndDerivative<f64>,
                _increasing: bool,
            ) -> EventAction<f64> {
                EventAction::Continue
            }
        }

        let interp = identity_interpolator(0.0, 4.0);
        let mut es = EventState::new(Rc::new(Dip));
        es.init(interp.previous_state(), 4.0).unwrap();
        es.reinitialize_begin(&interp).unwrap();

        assert!(es.evaluate_step(&interp).unwrap());
        let t_event = es.pending_event_time().unwrap();
        assert!((t_event - 1.93).abs() < 1e-10, "t_event = {}", t_event);
    }
}
