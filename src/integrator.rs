//! Adaptive Dormand-Prince 4(5) integrator with event location.
//!
//! [`Rk45Integrator`] drives the classic 4(5) embedded pair (with FSAL)
//! over an [`ExpandableOde`], delivering dense output to step handlers and
//! locating event roots to each detector's solver accuracy. Error control
//! runs over the primary equation block only.
//!
//! The heart of the engine is [`Rk45Integrator::integrate`] together with
//! the step-acceptance routine: after every accepted step, pending events
//! are gathered into a queue ordered by occurrence time and dispatched one
//! by one; before an event fires, every other detector is given the chance
//! to veto it by reporting an earlier root under the partial advance. A
//! handler therefore never runs unless no other detector knows of an
//! earlier event, even when handlers rewrite each other's g functions
//! mid-step.

use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::rc::Rc;

use crate::dense::StepInterpolator;
use crate::error::{OdeError, OdeResult};
use crate::events::EventState;
use crate::ode::{EquationsMapper, ExpandableOde, OdeState, OdeStateAndDerivative};
use crate::scalar::{Scalar, ulp};
use crate::step_control::{EvaluationCounter, StepSizeController, error_norm, initial_step_size};
use crate::traits::{EventAction, OdeEventDetector, OdeStepHandler};

// Dormand-Prince 4(5) coefficients
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th order weights
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Error weights (5th - 4th order)
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// Options for the adaptive integrator.
#[derive(Debug, Clone)]
pub struct IntegratorOptions {
    /// Relative tolerance (default: 1e-3)
    pub rtol: f64,

    /// Absolute tolerance (default: 1e-6)
    pub atol: f64,

    /// Initial step size (default: auto-computed)
    pub h0: Option<f64>,

    /// Minimum step size (default: 1e-14)
    pub min_step: f64,

    /// Maximum step size (default: the integration span)
    pub max_step: Option<f64>,

    /// Maximum number of step attempts (default: 100000)
    pub max_steps: usize,
}

impl Default for IntegratorOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-3,
            atol: 1e-6,
            h0: None,
            min_step: 1e-14,
            max_step: None,
            max_steps: 100_000,
        }
    }
}

impl IntegratorOptions {
    /// Create options with specified tolerances.
    pub fn with_tolerances(rtol: f64, atol: f64) -> Self {
        Self {
            rtol,
            atol,
            ..Default::default()
        }
    }

    /// Set the tolerances.
    pub fn tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    /// Set the initial step size.
    pub fn initial_step(mut self, h0: f64) -> Self {
        self.h0 = Some(h0);
        self
    }

    /// Set step size bounds.
    pub fn step_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_step = min;
        self.max_step = Some(max);
        self
    }

    /// Set maximum number of step attempts.
    pub fn max_steps(mut self, n: usize) -> Self {
        self.max_steps = n;
        self
    }
}

/// Work counters for one integration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    /// Number of right-hand-side evaluations.
    pub evaluations: usize,
    /// Number of accepted steps.
    pub accepted_steps: usize,
    /// Number of rejected steps.
    pub rejected_steps: usize,
}

/// Heap entry for a pending event, ordered by signed occurrence time.
///
/// Entries are never updated in place: re-locating a root pushes a fresh
/// entry and the old one is dropped as superseded when popped.
#[derive(Debug, Clone, Copy)]
struct QueuedEvent {
    /// `sigma * event_time`, so chronological order works both directions.
    key: f64,
    /// Insertion sequence; breaks exact-time ties by registration order.
    seq: usize,
    index: usize,
    time: f64,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key.total_cmp(&other.key).is_eq() && self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.total_cmp(&other.key).then(self.seq.cmp(&other.seq))
    }
}

/// Adaptive Dormand-Prince 4(5) integrator.
///
/// # Example
///
/// ```
/// use intgr::{ExpandableOde, IntegratorOptions, OdeFn, OdeState, Rk45Integrator};
///
/// // y' = -y from t = 0 to t = 2
/// let mut ode = ExpandableOde::new(Box::new(OdeFn::new(1, |_t, y: &[f64]| Ok(vec![-y[0]]))));
/// let mut integrator =
///     Rk45Integrator::new(IntegratorOptions::with_tolerances(1e-10, 1e-12));
///
/// let s0 = OdeState::new(0.0, vec![1.0]);
/// let final_state = integrator.integrate(&mut ode, &s0, 2.0).unwrap();
/// assert!((final_state.primary_state()[0] - (-2.0f64).exp()).abs() < 1e-9);
/// ```
pub struct Rk45Integrator<S: Scalar> {
    options: IntegratorOptions,
    controller: StepSizeController,
    step_handlers: Vec<Rc<RefCell<dyn OdeStepHandler<S>>>>,
    event_states: Vec<EventState<S>>,
    evaluations: EvaluationCounter,
    step_start: Option<OdeStateAndDerivative<S>>,
    step_size: f64,
    is_last_step: bool,
    reset_occurred: bool,
    state_initialized: bool,
    accepted_steps: usize,
    rejected_steps: usize,
}

impl<S: Scalar> Rk45Integrator<S> {
    /// Create an integrator with the given options.
    pub fn new(options: IntegratorOptions) -> Self {
        Self {
            options,
            controller: StepSizeController::default(),
            step_handlers: Vec::new(),
            event_states: Vec::new(),
            evaluations: EvaluationCounter::new(),
            step_start: None,
            step_size: 0.0,
            is_last_step: false,
            reset_occurred: false,
            state_initialized: false,
            accepted_steps: 0,
            rejected_steps: 0,
        }
    }

    /// Create an integrator with the given tolerances and default options
    /// otherwise.
    pub fn with_tolerances(rtol: f64, atol: f64) -> Self {
        Self::new(IntegratorOptions::with_tolerances(rtol, atol))
    }

    /// Register a step handler, called after every accepted step part.
    pub fn add_step_handler<H: OdeStepHandler<S> + 'static>(&mut self, handler: Rc<RefCell<H>>) {
        self.step_handlers.push(handler);
    }

    /// Remove all step handlers.
    pub fn clear_step_handlers(&mut self) {
        self.step_handlers.clear();
    }

    /// Register an event detector.
    pub fn add_event_detector<D: OdeEventDetector<S> + 'static>(&mut self, detector: Rc<D>) {
        self.event_states.push(EventState::new(detector));
    }

    /// Remove all event detectors.
    pub fn clear_event_detectors(&mut self) {
        self.event_states.clear();
    }

    /// Snapshot of the registered detectors, in registration order.
    pub fn event_detectors(&self) -> Vec<Rc<dyn OdeEventDetector<S>>> {
        self.event_states.iter().map(|s| s.detector()).collect()
    }

    /// Cap the number of right-hand-side evaluations per integration.
    ///
    /// A negative value means unbounded.
    pub fn set_max_evaluations(&mut self, max_evaluations: i64) {
        if max_evaluations < 0 {
            self.evaluations.set_max(usize::MAX);
        } else {
            self.evaluations.set_max(max_evaluations as usize);
        }
    }

    /// Number of right-hand-side evaluations so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations.count()
    }

    /// Current evaluation cap.
    pub fn max_evaluations(&self) -> usize {
        self.evaluations.max()
    }

    /// Start of the current step, once an integration has begun.
    pub fn step_start(&self) -> Option<&OdeStateAndDerivative<S>> {
        self.step_start.as_ref()
    }

    /// Current signed step size; negative when integrating backward.
    pub fn current_signed_stepsize(&self) -> f64 {
        self.step_size
    }

    /// Work counters for the current/last integration.
    pub fn stats(&self) -> Stats {
        Stats {
            evaluations: self.evaluations.count(),
            accepted_steps: self.accepted_steps,
            rejected_steps: self.rejected_steps,
        }
    }

    /// Compute derivatives, counting the evaluation against the budget.
    pub fn compute_derivatives(
        &mut self,
        equations: &ExpandableOde<S>,
        t: S,
        y: &[S],
    ) -> OdeResult<Vec<S>> {
        self.evaluations.increment()?;
        equations.compute_derivatives(t, y)
    }

    /// Integrate `equations` from `initial_state` to `final_time`.
    ///
    /// Returns the state at the end of the integration: the target time,
    /// or just past an event whose handler returned
    /// [`EventAction::Stop`].
    pub fn integrate(
        &mut self,
        equations: &mut ExpandableOde<S>,
        initial_state: &OdeState<S>,
        final_time: S,
    ) -> OdeResult<OdeStateAndDerivative<S>> {
        self.sanity_checks(initial_state, final_time, equations.mapper())?;

        self.evaluations.reset();
        self.accepted_steps = 0;
        self.rejected_steps = 0;

        equations.init(initial_state, final_time)?;

        let mapper = equations.mapper().clone();
        let primary_dim = mapper.dimension(0)?;

        let t0 = initial_state.time();
        let y0 = initial_state.complete_state();
        let y0_dot = self.compute_derivatives(equations, t0, &y0)?;
        let mut step_start = mapper.map_state_and_derivative(t0, &y0, &y0_dot)?;

        for i in 0..self.event_states.len() {
            self.event_states[i].init(&step_start, final_time)?;
        }
        let handlers = self.step_handlers.clone();
        for handler in &handlers {
            handler.borrow_mut().init(&step_start, final_time);
        }

        self.state_initialized = false;
        self.is_last_step = false;
        self.reset_occurred = false;
        self.step_start = Some(step_start.clone());

        let forward = final_time.real() > t0.real();
        let sigma = if forward { 1.0 } else { -1.0 };
        let min_step = self.options.min_step;
        let max_step = self
            .options
            .max_step
            .unwrap_or((final_time.real() - t0.real()).abs());

        let mut h_abs = match self.options.h0 {
            Some(h0) => h0.abs(),
            None => {
                let rtol = self.options.rtol;
                let atol = self.options.atol;
                let mut f = |t: S, y: &[S]| self.compute_derivatives(equations, t, y);
                initial_step_size(
                    &mut f,
                    t0,
                    &y0,
                    &y0_dot,
                    primary_dim,
                    rtol,
                    atol,
                    forward,
                    max_step,
                )?
            }
        };
        h_abs = h_abs.max(min_step).min(max_step);

        let mut k1 = y0_dot;
        let mut steps = 0usize;

        loop {
            let t = step_start.time();

            steps += 1;
            if steps > self.options.max_steps {
                return Err(OdeError::MaxStepsExceeded {
                    steps: self.options.max_steps,
                    t: t.real(),
                });
            }

            // truncate so the last step lands on the target
            let remaining = final_time.real() - t.real();
            let h = if remaining.abs() <= h_abs {
                remaining
            } else {
                sigma * h_abs
            };

            let y = step_start.complete_state();
            let (y_new, k7, err) = self.propose_step(equations, t, &y, &k1, h, primary_dim)?;
            let (h_next, accept) = self.controller.next_step(h.abs(), err, 4);

            if !accept {
                self.rejected_steps += 1;
                if h.abs() <= min_step {
                    return Err(OdeError::StepSizeTooSmall {
                        step: h.abs(),
                        t: t.real(),
                    });
                }
                h_abs = h_next.max(min_step).min(max_step);
                continue;
            }

            self.accepted_steps += 1;
            self.step_size = h;

            let t_new = t + S::from_f64(h);
            let current = mapper.map_state_and_derivative(t_new, &y_new, &k7)?;
            let interpolator =
                StepInterpolator::new(step_start.clone(), current, forward, mapper.clone());

            let returned = self.accept_step(equations, &interpolator, final_time)?;
            step_start = returned;
            self.step_start = Some(step_start.clone());
            // FSAL; after an event reset this holds the freshly recomputed
            // derivatives instead, which is exactly what the restart needs
            k1 = step_start.complete_derivative();

            if self.is_last_step {
                return Ok(step_start);
            }

            h_abs = h_next.max(min_step).min(max_step);
        }
    }

    /// One Dormand-Prince 4(5) step attempt from `(t, y)` with FSAL stage
    /// `k1`. Returns the 5th-order solution, the last stage, and the
    /// normalized error over the primary block.
    fn propose_step(
        &mut self,
        equations: &ExpandableOde<S>,
        t: S,
        y: &[S],
        k1: &[S],
        h: f64,
        primary_dim: usize,
    ) -> OdeResult<(Vec<S>, Vec<S>, f64)> {
        let n = y.len();
        let hs = |c: f64| S::from_f64(h * c);

        let mut y_stage = vec![S::zero(); n];

        // k2
        for i in 0..n {
            y_stage[i] = y[i] + k1[i] * hs(A21);
        }
        let k2 = self.compute_derivatives(equations, t + S::from_f64(C2 * h), &y_stage)?;

        // k3
        for i in 0..n {
            y_stage[i] = y[i] + k1[i] * hs(A31) + k2[i] * hs(A32);
        }
        let k3 = self.compute_derivatives(equations, t + S::from_f64(C3 * h), &y_stage)?;

        // k4
        for i in 0..n {
            y_stage[i] = y[i] + k1[i] * hs(A41) + k2[i] * hs(A42) + k3[i] * hs(A43);
        }
        let k4 = self.compute_derivatives(equations, t + S::from_f64(C4 * h), &y_stage)?;

        // k5
        for i in 0..n {
            y_stage[i] =
                y[i] + k1[i] * hs(A51) + k2[i] * hs(A52) + k3[i] * hs(A53) + k4[i] * hs(A54);
        }
        let k5 = self.compute_derivatives(equations, t + S::from_f64(C5 * h), &y_stage)?;

        // k6
        for i in 0..n {
            y_stage[i] = y[i]
                + k1[i] * hs(A61)
                + k2[i] * hs(A62)
                + k3[i] * hs(A63)
                + k4[i] * hs(A64)
                + k5[i] * hs(A65);
        }
        let k6 = self.compute_derivatives(equations, t + S::from_f64(h), &y_stage)?;

        // 5th order solution (b2 = 0, k2 drops out)
        let mut y_new = vec![S::zero(); n];
        for i in 0..n {
            y_new[i] = y[i]
                + k1[i] * hs(B1)
                + k3[i] * hs(B3)
                + k4[i] * hs(B4)
                + k5[i] * hs(B5)
                + k6[i] * hs(B6);
        }

        // k7 (FSAL)
        let k7 = self.compute_derivatives(equations, t + S::from_f64(h), &y_new)?;

        let mut y_err = vec![S::zero(); n];
        for i in 0..n {
            y_err[i] = k1[i] * hs(E1)
                + k3[i] * hs(E3)
                + k4[i] * hs(E4)
                + k5[i] * hs(E5)
                + k6[i] * hs(E6)
                + k7[i] * hs(E7);
        }

        let err = error_norm(
            &y_new,
            &y_err,
            y,
            primary_dim,
            self.options.rtol,
            self.options.atol,
        );
        Ok((y_new, k7, err))
    }

    /// Accept a step: trigger events and step handlers in order.
    ///
    /// Returns the state at the end of the step — the step's own end, or an
    /// event-determined state when a handler stopped or reset the
    /// integration.
    fn accept_step(
        &mut self,
        equations: &ExpandableOde<S>,
        interpolator: &StepInterpolator<S>,
        t_end: S,
    ) -> OdeResult<OdeStateAndDerivative<S>> {
        let mapper = equations.mapper();
        let handlers = self.step_handlers.clone();

        let mut previous_state = interpolator.global_previous_state().clone();
        let current_state = interpolator.global_current_state().clone();
        let mut restricted = interpolator.clone();

        self.reset_occurred = false;

        // lazy initialization of the event states on the first accepted step
        if !self.state_initialized {
            for i in 0..self.event_states.len() {
                self.event_states[i].reinitialize_begin(interpolator)?;
            }
            self.state_initialized = true;
        }

        let sigma = if interpolator.is_forward() { 1.0 } else { -1.0 };
        let mut seq = 0usize;

        // restarted from scratch when a handler returns ResetEvents
        'reset_events: loop {
            // gather the events occurring during this (restricted) step
            let mut queue: BinaryHeap<Reverse<QueuedEvent>> = BinaryHeap::new();
            for i in 0..self.event_states.len() {
                if self.event_states[i].evaluate_step(&restricted)? {
                    if let Some(time) = self.event_states[i].pending_event_time() {
                        queue.push(Reverse(QueuedEvent {
                            key: sigma * time,
                            seq,
                            index: i,
                            time,
                        }));
                        seq += 1;
                    }
                }
            }

            loop {
                'event_loop: while let Some(Reverse(entry)) = queue.pop() {
                    let index = entry.index;

                    // superseded entry: the root moved or was handled
                    match self.event_states[index].pending_event_time() {
                        Some(time) if time == entry.time => {}
                        _ => continue,
                    }

                    let mut event_state =
                        restricted.interpolated_state(S::from_f64(entry.time))?;

                    // restrict to the part of the step up to the event
                    restricted = restricted.restrict(previous_state.clone(), event_state.clone());

                    // the event only fires if no other detector reports an
                    // earlier root under the partial advance to it
                    for j in 0..self.event_states.len() {
                        if j != index
                            && self.event_states[j].try_advance(&event_state, interpolator)?
                        {
                            if let Some(tj) = self.event_states[j].pending_event_time() {
                                queue.push(Reverse(QueuedEvent {
                                    key: sigma * tj,
                                    seq,
                                    index: j,
                                    time: tj,
                                }));
                                seq += 1;
                            }
                            // re-queue the event we were about to handle
                            queue.push(Reverse(QueuedEvent {
                                key: sigma * entry.time,
                                seq,
                                index,
                                time: entry.time,
                            }));
                            seq += 1;
                            continue 'event_loop;
                        }
                    }

                    // deliver the part of the step up to the event
                    for handler in &handlers {
                        handler.borrow_mut().handle_step(&restricted)?;
                    }

                    let Some(occurrence) = self.event_states[index].do_event(&event_state) else {
                        continue;
                    };

                    match occurrence.action {
                        EventAction::Stop => {
                            self.is_last_step = true;

                            // place the final state just past the root so the
                            // user can restart integration from it without
                            // re-triggering the same event
                            let saved = event_state.clone();
                            event_state = interpolator.interpolated_state(occurrence.stop_time)?;
                            let last_part = interpolator.restrict(saved, event_state.clone());
                            for handler in &handlers {
                                handler.borrow_mut().handle_step(&last_part)?;
                                handler.borrow_mut().finish(last_part.current_state());
                            }
                            return Ok(event_state);
                        }
                        EventAction::ResetState(new_state) => {
                            let y = new_state.complete_state();
                            let y_dot =
                                self.compute_derivatives(equations, new_state.time(), &y)?;
                            self.reset_occurred = true;
                            return mapper.map_state_and_derivative(new_state.time(), &y, &y_dot);
                        }
                        EventAction::ResetDerivatives => {
                            let y = event_state.complete_state();
                            let y_dot =
                                self.compute_derivatives(equations, event_state.time(), &y)?;
                            self.reset_occurred = true;
                            return mapper.map_state_and_derivative(
                                event_state.time(),
                                &y,
                                &y_dot,
                            );
                        }
                        EventAction::ResetEvents => {
                            previous_state = event_state.clone();
                            restricted = restricted.restrict(event_state, current_state.clone());
                            continue 'reset_events;
                        }
                        EventAction::Continue => {
                            previous_state = event_state.clone();
                            restricted = restricted.restrict(event_state, current_state.clone());
                            // the same g may cross again in this step
                            if self.event_states[index].evaluate_step(&restricted)? {
                                if let Some(time) =
                                    self.event_states[index].pending_event_time()
                                {
                                    queue.push(Reverse(QueuedEvent {
                                        key: sigma * time,
                                        seq,
                                        index,
                                        time,
                                    }));
                                    seq += 1;
                                }
                            }
                        }
                    }
                }

                // after the last event: a handler may have modified the g
                // function of another detector
                let mut found_new = false;
                for j in 0..self.event_states.len() {
                    if self.event_states[j].try_advance(&current_state, interpolator)? {
                        if let Some(tj) = self.event_states[j].pending_event_time() {
                            queue.push(Reverse(QueuedEvent {
                                key: sigma * tj,
                                seq,
                                index: j,
                                time: tj,
                            }));
                            seq += 1;
                            found_new = true;
                        }
                    }
                }
                if !found_new {
                    break;
                }
            }

            break;
        }

        if (current_state.time() - t_end).real().abs() < ulp(t_end.real()) {
            self.is_last_step = true;
        }

        // the remaining part of the step, after all events if any
        for handler in &handlers {
            handler.borrow_mut().handle_step(&restricted)?;
            if self.is_last_step {
                handler.borrow_mut().finish(restricted.current_state());
            }
        }

        Ok(current_state)
    }

    fn sanity_checks(
        &self,
        initial_state: &OdeState<S>,
        t: S,
        mapper: &EquationsMapper,
    ) -> OdeResult<()> {
        let threshold = 1000.0 * ulp(initial_state.time().real().abs().max(t.real().abs()));
        let dt = (initial_state.time().real() - t.real()).abs();
        if dt < threshold {
            return Err(OdeError::TooSmallInterval { dt, threshold });
        }
        if initial_state.complete_state_dimension() != mapper.total_dimension() {
            return Err(OdeError::DimensionMismatch {
                expected: mapper.total_dimension(),
                actual: initial_state.complete_state_dimension(),
                context: "integrate (initial state)".to_string(),
            });
        }
        Ok(())
    }
}
