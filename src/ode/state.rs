//! State containers for composite ODE systems.

use crate::scalar::Scalar;

/// State of an ODE at one instant: time, primary block, and zero or more
/// secondary blocks.
///
/// Immutable after construction. Block ordering is fixed: index 0 denotes
/// the primary block, secondary blocks start at index 1 in registration
/// order.
#[derive(Debug, Clone)]
pub struct OdeState<S: Scalar> {
    time: S,
    primary: Vec<S>,
    secondary: Vec<Vec<S>>,
}

impl<S: Scalar> OdeState<S> {
    /// State with a primary block only.
    pub fn new(time: S, primary: Vec<S>) -> Self {
        Self {
            time,
            primary,
            secondary: Vec::new(),
        }
    }

    /// State with primary and secondary blocks.
    pub fn new_with_secondary(time: S, primary: Vec<S>, secondary: Vec<Vec<S>>) -> Self {
        Self {
            time,
            primary,
            secondary,
        }
    }

    /// Time of the state.
    pub fn time(&self) -> S {
        self.time
    }

    /// Primary block.
    pub fn primary_state(&self) -> &[S] {
        &self.primary
    }

    /// Dimension of the primary block.
    pub fn primary_state_dimension(&self) -> usize {
        self.primary.len()
    }

    /// Number of secondary blocks.
    pub fn number_of_secondary_states(&self) -> usize {
        self.secondary.len()
    }

    /// Block at `index`; index 0 is the primary block.
    pub fn secondary_state(&self, index: usize) -> &[S] {
        if index == 0 {
            &self.primary
        } else {
            &self.secondary[index - 1]
        }
    }

    /// Complete state: primary followed by each secondary block in order.
    pub fn complete_state(&self) -> Vec<S> {
        let mut complete = Vec::with_capacity(self.complete_state_dimension());
        complete.extend_from_slice(&self.primary);
        for block in &self.secondary {
            complete.extend_from_slice(block);
        }
        complete
    }

    /// Total dimension across all blocks.
    pub fn complete_state_dimension(&self) -> usize {
        self.primary.len() + self.secondary.iter().map(Vec::len).sum::<usize>()
    }
}

/// An [`OdeState`] together with its time derivative, block for block.
#[derive(Debug, Clone)]
pub struct OdeStateAndDerivative<S: Scalar> {
    state: OdeState<S>,
    primary_derivative: Vec<S>,
    secondary_derivative: Vec<Vec<S>>,
}

impl<S: Scalar> OdeStateAndDerivative<S> {
    pub(crate) fn new(
        state: OdeState<S>,
        primary_derivative: Vec<S>,
        secondary_derivative: Vec<Vec<S>>,
    ) -> Self {
        Self {
            state,
            primary_derivative,
            secondary_derivative,
        }
    }

    /// Time of the state.
    pub fn time(&self) -> S {
        self.state.time()
    }

    /// The underlying state without derivatives.
    pub fn state(&self) -> &OdeState<S> {
        &self.state
    }

    /// Primary block.
    pub fn primary_state(&self) -> &[S] {
        self.state.primary_state()
    }

    /// Derivative of the primary block.
    pub fn primary_derivative(&self) -> &[S] {
        &self.primary_derivative
    }

    /// Dimension of the primary block.
    pub fn primary_state_dimension(&self) -> usize {
        self.state.primary_state_dimension()
    }

    /// Number of secondary blocks.
    pub fn number_of_secondary_states(&self) -> usize {
        self.state.number_of_secondary_states()
    }

    /// Block at `index`; index 0 is the primary block.
    pub fn secondary_state(&self, index: usize) -> &[S] {
        self.state.secondary_state(index)
    }

    /// Derivative of the block at `index`; index 0 is the primary block.
    pub fn secondary_derivative(&self, index: usize) -> &[S] {
        if index == 0 {
            &self.primary_derivative
        } else {
            &self.secondary_derivative[index - 1]
        }
    }

    /// Complete state vector.
    pub fn complete_state(&self) -> Vec<S> {
        self.state.complete_state()
    }

    /// Complete derivative vector, concatenated like the state.
    pub fn complete_derivative(&self) -> Vec<S> {
        let mut complete = Vec::with_capacity(self.complete_state_dimension());
        complete.extend_from_slice(&self.primary_derivative);
        for block in &self.secondary_derivative {
            complete.extend_from_slice(block);
        }
        complete
    }

    /// Total dimension across all blocks.
    pub fn complete_state_dimension(&self) -> usize {
        self.state.complete_state_dimension()
    }
}
