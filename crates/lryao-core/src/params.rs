//! Execution parameters of a cut-and-choose run.

use std::sync::Arc;

use derive_builder::Builder;

use crate::circuit::Circuit;

/// Parameters of one cut-and-choose execution.
///
/// The run garbles `total` circuits, of which `check` are opened and `eval = N·B` are evaluated in
/// `N` buckets of `B` circuits each.
#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ExecutionParameters {
    /// The circuit to garble.
    circuit: Arc<Circuit>,
    /// Number of buckets, `N`.
    buckets: usize,
    /// Number of circuits per bucket, `B`.
    bucket_size: usize,
    /// Statistical security parameter, `s`.
    statistical_parameter: usize,
    /// Probability that a circuit is evaluated, `p`.
    eval_probability: f64,
}

impl ExecutionParametersBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(p) = self.eval_probability {
            if !(p > 0.0 && p <= 1.0) {
                return Err(format!("evaluation probability must be in (0, 1], got {p}"));
            }
        }

        for (name, value) in [
            ("buckets", self.buckets),
            ("bucket_size", self.bucket_size),
            ("statistical_parameter", self.statistical_parameter),
        ] {
            if value == Some(0) {
                return Err(format!("{name} must be at least 1"));
            }
        }

        Ok(())
    }
}

impl ExecutionParameters {
    /// Creates a new builder for the execution parameters.
    pub fn builder() -> ExecutionParametersBuilder {
        ExecutionParametersBuilder::default()
    }

    /// Returns the circuit.
    pub fn circuit(&self) -> &Arc<Circuit> {
        &self.circuit
    }

    /// Returns the number of buckets.
    pub fn buckets(&self) -> usize {
        self.buckets
    }

    /// Returns the bucket size.
    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    /// Returns the statistical security parameter.
    pub fn statistical_parameter(&self) -> usize {
        self.statistical_parameter
    }

    /// Returns the evaluation probability.
    pub fn eval_probability(&self) -> f64 {
        self.eval_probability
    }

    /// Returns the number of evaluated circuits, `N·B`.
    pub fn eval_circuits(&self) -> usize {
        self.buckets * self.bucket_size
    }

    /// Returns the total number of garbled circuits, `ceil(eval / p)`.
    pub fn total_circuits(&self) -> usize {
        let total = (self.eval_circuits() as f64 / self.eval_probability).ceil() as usize;
        total.max(self.eval_circuits())
    }

    /// Returns the number of checked circuits.
    pub fn check_circuits(&self) -> usize {
        self.total_circuits() - self.eval_circuits()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::circuits::adder;

    #[rstest]
    #[case(2, 3, 0.75, 6, 8, 2)]
    #[case(10, 4, 0.5, 40, 80, 40)]
    #[case(1, 1, 1.0, 1, 1, 0)]
    #[case(3, 3, 0.25, 9, 36, 27)]
    fn test_derived_counts(
        #[case] buckets: usize,
        #[case] bucket_size: usize,
        #[case] p: f64,
        #[case] eval: usize,
        #[case] total: usize,
        #[case] check: usize,
    ) {
        let params = ExecutionParameters::builder()
            .circuit(Arc::new(adder(8)))
            .buckets(buckets)
            .bucket_size(bucket_size)
            .statistical_parameter(40)
            .eval_probability(p)
            .build()
            .unwrap();

        assert_eq!(params.eval_circuits(), eval);
        assert_eq!(params.total_circuits(), total);
        assert_eq!(params.check_circuits(), check);
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.5)]
    #[case(-0.1)]
    fn test_rejects_invalid_probability(#[case] p: f64) {
        let result = ExecutionParameters::builder()
            .circuit(Arc::new(adder(8)))
            .buckets(1)
            .bucket_size(1)
            .statistical_parameter(40)
            .eval_probability(p)
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_empty_buckets() {
        let result = ExecutionParameters::builder()
            .circuit(Arc::new(adder(8)))
            .buckets(0)
            .bucket_size(1)
            .statistical_parameter(40)
            .eval_probability(0.5)
            .build();

        assert!(result.is_err());
    }
}
