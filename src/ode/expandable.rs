//! Combined primary + secondary equation sets.

use crate::error::{OdeError, OdeResult};
use crate::ode::{EquationsMapper, OdeState};
use crate::scalar::Scalar;
use crate::traits::{OrdinaryOde, SecondaryOde};

/// A combined set of first-order differential equations: one primary set,
/// expandable by secondary sets integrated alongside it.
///
/// A typical use case is a variational (Jacobian) system: the primary set is
/// the raw ODE and a secondary set carries the sensitivity matrix. Only the
/// primary set participates in error estimation and hence step-size
/// selection; the mapper records where the primary block ends and the
/// secondary blocks begin.
pub struct ExpandableOde<S: Scalar> {
    primary: Box<dyn OrdinaryOde<S>>,
    components: Vec<Box<dyn SecondaryOde<S>>>,
    mapper: EquationsMapper,
}

impl<S: Scalar> ExpandableOde<S> {
    /// Build an expandable set from its primary equation set.
    pub fn new(primary: Box<dyn OrdinaryOde<S>>) -> Self {
        let mapper = EquationsMapper::new(None, primary.dimension());
        Self {
            primary,
            components: Vec::new(),
            mapper,
        }
    }

    /// Add a secondary equation set.
    ///
    /// Returns the index of the new set in the expanded state (index 0 is
    /// the primary set, so the first secondary set gets index 1).
    pub fn add_secondary_equations(&mut self, secondary: Box<dyn SecondaryOde<S>>) -> usize {
        self.mapper = EquationsMapper::new(Some(&self.mapper), secondary.dimension());
        self.components.push(secondary);
        self.components.len()
    }

    /// The mapper for the complete equation set.
    pub fn mapper(&self) -> &EquationsMapper {
        &self.mapper
    }

    /// Initialize all equation sets at the start of an integration.
    ///
    /// Checks that the initial state carries one block per registered
    /// equation set with matching dimensions.
    pub fn init(&mut self, s0: &OdeState<S>, final_time: S) -> OdeResult<()> {
        if s0.number_of_secondary_states() != self.components.len() {
            return Err(OdeError::DimensionMismatch {
                expected: self.components.len(),
                actual: s0.number_of_secondary_states(),
                context: "init (secondary block count)".to_string(),
            });
        }
        for index in 0..self.mapper.number_of_equations() {
            let expected = self.mapper.dimension(index)?;
            let actual = s0.secondary_state(index).len();
            if actual != expected {
                return Err(OdeError::DimensionMismatch {
                    expected,
                    actual,
                    context: format!("init (block {})", index),
                });
            }
        }

        let t0 = s0.time();
        self.primary.init(t0, s0.primary_state(), final_time);
        for (k, component) in self.components.iter_mut().enumerate() {
            component.init(t0, s0.primary_state(), s0.secondary_state(k + 1), final_time);
        }
        Ok(())
    }

    /// Time derivative of the complete state vector.
    ///
    /// Secondary derivatives are computed and inserted first; the primary
    /// block is inserted last, from the buffer the secondaries saw. A
    /// secondary set may therefore rewrite the primary derivatives
    /// (co-state feedback) and the rewrite wins.
    pub fn compute_derivatives(&self, t: S, y: &[S]) -> OdeResult<Vec<S>> {
        let total = self.mapper.total_dimension();
        if y.len() != total {
            return Err(OdeError::DimensionMismatch {
                expected: total,
                actual: y.len(),
                context: "compute_derivatives".to_string(),
            });
        }

        let mut y_dot = vec![S::zero(); total];

        let primary_state = self.mapper.extract_equation_data(0, y)?;
        let mut primary_dot = self.primary.derivatives(t, &primary_state)?;
        if primary_dot.len() != primary_state.len() {
            return Err(OdeError::DimensionMismatch {
                expected: primary_state.len(),
                actual: primary_dot.len(),
                context: "primary derivatives".to_string(),
            });
        }

        for (k, component) in self.components.iter().enumerate() {
            let index = k + 1;
            let component_state = self.mapper.extract_equation_data(index, y)?;
            let component_dot =
                component.derivatives(t, &primary_state, &mut primary_dot, &component_state)?;
            self.mapper
                .insert_equation_data(index, &component_dot, &mut y_dot)?;
        }

        // inserted after the secondary sets have run, so any primary
        // derivative they rewrote is what ends up in the complete vector
        self.mapper.insert_equation_data(0, &primary_dot, &mut y_dot)?;

        Ok(y_dot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{OdeFn, SecondaryOdeFn};

    /// Primary set with y'_i = i.
    fn ramp_primary(dim: usize) -> Box<dyn OrdinaryOde<f64>> {
        Box::new(OdeFn::new(dim, move |_t, _y: &[f64]| {
            Ok((0..dim).map(|i| i as f64).collect())
        }))
    }

    /// Secondary set with y'_i = -i.
    fn ramp_secondary(dim: usize) -> Box<dyn SecondaryOde<f64>> {
        Box::new(SecondaryOdeFn::new(
            dim,
            move |_t, _p: &[f64], _pd: &mut [f64], _s: &[f64]| {
                Ok((0..dim).map(|i| -(i as f64)).collect())
            },
        ))
    }

    #[test]
    fn test_primary_only() {
        let equation = ExpandableOde::new(ramp_primary(3));
        assert_eq!(equation.mapper().total_dimension(), 3);
        assert_eq!(equation.mapper().number_of_equations(), 1);

        let y_dot = equation.compute_derivatives(10.0, &[0.0, 1.0, 2.0]).unwrap();
        assert_eq!(y_dot, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_two_secondaries() {
        let mut equation = ExpandableOde::new(ramp_primary(3));
        let i1 = equation.add_secondary_equations(ramp_secondary(3));
        let i2 = equation.add_secondary_equations(ramp_secondary(5));

        assert_eq!(i1, 1);
        assert_eq!(i2, 2);
        assert_eq!(equation.mapper().total_dimension(), 11);
        assert_eq!(equation.mapper().number_of_equations(), 3);

        let complete: Vec<f64> = (0..11).map(|i| i as f64).collect();
        let y_dot = equation.compute_derivatives(10.0, &complete).unwrap();
        assert_eq!(
            y_dot,
            vec![0.0, 1.0, 2.0, 0.0, -1.0, -2.0, 0.0, -1.0, -2.0, -3.0, -4.0]
        );
    }

    #[test]
    fn test_secondary_rewrites_primary_derivatives() {
        // the co-state coupling: a secondary set scales the primary
        // derivatives, and the rewritten values must win in the complete
        // derivative vector
        let mut equation = ExpandableOde::new(ramp_primary(2));
        equation.add_secondary_equations(Box::new(SecondaryOdeFn::new(
            1,
            |_t, _p: &[f64], pd: &mut [f64], _s: &[f64]| {
                for v in pd.iter_mut() {
                    *v = *v * 2.0;
                }
                Ok(vec![0.5])
            },
        )));

        let y_dot = equation.compute_derivatives(0.0, &[9.0, 9.0, 9.0]).unwrap();
        assert_eq!(y_dot, vec![0.0, 2.0, 0.5]);
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let equation = ExpandableOde::new(ramp_primary(3));
        assert!(equation.compute_derivatives(0.0, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_init_validates_blocks() {
        let mut equation = ExpandableOde::new(ramp_primary(3));
        equation.add_secondary_equations(ramp_secondary(2));

        // missing the secondary block
        let bad = OdeState::new(0.0, vec![0.0, 1.0, 2.0]);
        assert!(equation.init(&bad, 1.0).is_err());

        // wrong secondary dimension
        let bad = OdeState::new_with_secondary(0.0, vec![0.0, 1.0, 2.0], vec![vec![0.0; 3]]);
        assert!(equation.init(&bad, 1.0).is_err());

        let good = OdeState::new_with_secondary(0.0, vec![0.0, 1.0, 2.0], vec![vec![0.0; 2]]);
        assert!(equation.init(&good, 1.0).is_ok());
    }
}
