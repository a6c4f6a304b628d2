//! Block bookkeeping for the concatenated state vector.

use crate::error::{OdeError, OdeResult};
use crate::ode::{OdeState, OdeStateAndDerivative};
use crate::scalar::Scalar;

/// Maps equation blocks to offsets inside the complete state vector.
///
/// Index 0 is the primary equation set; secondary sets are numbered from 1
/// in registration order. A mapper only ever grows: registering another
/// secondary set produces a new mapper extending the previous one.
#[derive(Debug, Clone)]
pub struct EquationsMapper {
    /// `start[i]..start[i + 1]` is the range of equation set `i`.
    start: Vec<usize>,
}

impl EquationsMapper {
    pub(crate) fn new(previous: Option<&EquationsMapper>, dimension: usize) -> Self {
        let mut start = match previous {
            Some(p) => p.start.clone(),
            None => vec![0],
        };
        let total = *start.last().unwrap_or(&0);
        start.push(total + dimension);
        Self { start }
    }

    /// Number of registered equation sets, primary included.
    pub fn number_of_equations(&self) -> usize {
        self.start.len() - 1
    }

    /// Total dimension of the complete state vector.
    pub fn total_dimension(&self) -> usize {
        *self.start.last().unwrap_or(&0)
    }

    /// Dimension of the equation set at `index`.
    pub fn dimension(&self, index: usize) -> OdeResult<usize> {
        self.check_index(index)?;
        Ok(self.start[index + 1] - self.start[index])
    }

    /// Extract the block of equation set `index` from a complete vector.
    pub fn extract_equation_data<S: Scalar>(
        &self,
        index: usize,
        complete: &[S],
    ) -> OdeResult<Vec<S>> {
        self.check_index(index)?;
        if complete.len() != self.total_dimension() {
            return Err(OdeError::DimensionMismatch {
                expected: self.total_dimension(),
                actual: complete.len(),
                context: "extract_equation_data".to_string(),
            });
        }
        Ok(complete[self.start[index]..self.start[index + 1]].to_vec())
    }

    /// Insert the block of equation set `index` into a complete vector.
    pub fn insert_equation_data<S: Scalar>(
        &self,
        index: usize,
        data: &[S],
        complete: &mut [S],
    ) -> OdeResult<()> {
        self.check_index(index)?;
        let begin = self.start[index];
        let end = self.start[index + 1];
        if data.len() != end - begin {
            return Err(OdeError::DimensionMismatch {
                expected: end - begin,
                actual: data.len(),
                context: "insert_equation_data".to_string(),
            });
        }
        if complete.len() != self.total_dimension() {
            return Err(OdeError::DimensionMismatch {
                expected: self.total_dimension(),
                actual: complete.len(),
                context: "insert_equation_data".to_string(),
            });
        }
        complete[begin..end].copy_from_slice(data);
        Ok(())
    }

    /// Split complete state and derivative vectors into a block-structured
    /// [`OdeStateAndDerivative`].
    pub fn map_state_and_derivative<S: Scalar>(
        &self,
        t: S,
        y: &[S],
        y_dot: &[S],
    ) -> OdeResult<OdeStateAndDerivative<S>> {
        if y.len() != self.total_dimension() {
            return Err(OdeError::DimensionMismatch {
                expected: self.total_dimension(),
                actual: y.len(),
                context: "map_state_and_derivative (state)".to_string(),
            });
        }
        if y_dot.len() != self.total_dimension() {
            return Err(OdeError::DimensionMismatch {
                expected: self.total_dimension(),
                actual: y_dot.len(),
                context: "map_state_and_derivative (derivative)".to_string(),
            });
        }

        let primary = self.extract_equation_data(0, y)?;
        let primary_dot = self.extract_equation_data(0, y_dot)?;
        let mut secondary = Vec::with_capacity(self.number_of_equations() - 1);
        let mut secondary_dot = Vec::with_capacity(self.number_of_equations() - 1);
        for index in 1..self.number_of_equations() {
            secondary.push(self.extract_equation_data(index, y)?);
            secondary_dot.push(self.extract_equation_data(index, y_dot)?);
        }

        Ok(OdeStateAndDerivative::new(
            OdeState::new_with_secondary(t, primary, secondary),
            primary_dot,
            secondary_dot,
        ))
    }

    fn check_index(&self, index: usize) -> OdeResult<()> {
        if index >= self.number_of_equations() {
            return Err(OdeError::IndexOutOfRange {
                index,
                max: self.number_of_equations() - 1,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OdeError;

    fn three_block_mapper() -> EquationsMapper {
        // primary dim 3, secondaries dim 3 and dim 5
        let m = EquationsMapper::new(None, 3);
        let m = EquationsMapper::new(Some(&m), 3);
        EquationsMapper::new(Some(&m), 5)
    }

    #[test]
    fn test_dimensions() {
        let mapper = three_block_mapper();
        assert_eq!(mapper.number_of_equations(), 3);
        assert_eq!(mapper.total_dimension(), 11);
        assert_eq!(mapper.dimension(0).unwrap(), 3);
        assert_eq!(mapper.dimension(1).unwrap(), 3);
        assert_eq!(mapper.dimension(2).unwrap(), 5);
    }

    #[test]
    fn test_extract_insert_round_trip() {
        let mapper = three_block_mapper();
        let complete: Vec<f64> = (0..11).map(|i| i as f64).collect();

        for index in 0..mapper.number_of_equations() {
            let block = mapper.extract_equation_data(index, &complete).unwrap();
            let mut copy = complete.clone();
            mapper.insert_equation_data(index, &block, &mut copy).unwrap();
            assert_eq!(copy, complete, "round trip failed for block {}", index);
        }
    }

    #[test]
    fn test_extract_offsets() {
        let mapper = three_block_mapper();
        let complete: Vec<f64> = (0..11).map(|i| i as f64).collect();

        assert_eq!(
            mapper.extract_equation_data(1, &complete).unwrap(),
            vec![3.0, 4.0, 5.0]
        );
        assert_eq!(
            mapper.extract_equation_data(2, &complete).unwrap(),
            vec![6.0, 7.0, 8.0, 9.0, 10.0]
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let mapper = three_block_mapper();
        let short = vec![0.0; 7];
        assert!(matches!(
            mapper.extract_equation_data(0, &short),
            Err(OdeError::DimensionMismatch { .. })
        ));

        let mut complete = vec![0.0; 11];
        assert!(matches!(
            mapper.insert_equation_data(1, &[1.0, 2.0], &mut complete),
            Err(OdeError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_index_out_of_range() {
        let mapper = three_block_mapper();
        let complete = vec![0.0; 11];
        assert!(matches!(
            mapper.extract_equation_data(3, &complete),
            Err(OdeError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_map_state_and_derivative() {
        let mapper = three_block_mapper();
        let y: Vec<f64> = (0..11).map(|i| i as f64).collect();
        let y_dot: Vec<f64> = (0..11).map(|i| -(i as f64)).collect();

        let sd = mapper.map_state_and_derivative(2.0, &y, &y_dot).unwrap();
        assert_eq!(sd.time(), 2.0);
        assert_eq!(sd.primary_state(), &[0.0, 1.0, 2.0]);
        assert_eq!(sd.secondary_state(2), &[6.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(sd.secondary_derivative(1), &[-3.0, -4.0, -5.0]);
        assert_eq!(sd.complete_state(), y);
        assert_eq!(sd.complete_derivative(), y_dot);

        let bad = mapper.map_state_and_derivative(2.0, &y[..10], &y_dot);
        assert!(matches!(bad, Err(OdeError::DimensionMismatch { .. })));
    }
}
