//! Cut-and-choose selection of checked and evaluated circuits.

use rand::{seq::index, Rng};
use serde::{Deserialize, Serialize};

/// Errors that can occur while building a selection.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum SelectionError {
    #[error("cannot check {check} out of {total} circuits")]
    TooManyChecked { check: usize, total: usize },
}

/// Which circuits are checked and which are evaluated.
///
/// Bit `j` is set when circuit `j` is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<bool>", into = "Vec<bool>")]
pub struct CutAndChooseSelection {
    selection: Vec<bool>,
    check: Vec<usize>,
    eval: Vec<usize>,
}

impl From<Vec<bool>> for CutAndChooseSelection {
    fn from(selection: Vec<bool>) -> Self {
        let (check, eval): (Vec<usize>, Vec<usize>) =
            (0..selection.len()).partition(|j| selection[*j]);

        Self {
            selection,
            check,
            eval,
        }
    }
}

impl From<CutAndChooseSelection> for Vec<bool> {
    fn from(selection: CutAndChooseSelection) -> Self {
        selection.selection
    }
}

impl CutAndChooseSelection {
    /// Returns the total number of circuits.
    pub fn len(&self) -> usize {
        self.selection.len()
    }

    /// Returns `true` if the selection covers no circuits.
    pub fn is_empty(&self) -> bool {
        self.selection.is_empty()
    }

    /// Returns `true` if circuit `j` is checked.
    pub fn is_checked(&self, j: usize) -> bool {
        self.selection.get(j).copied().unwrap_or(false)
    }

    /// Returns the checked circuit indices in ascending order.
    pub fn check_circuits(&self) -> &[usize] {
        &self.check
    }

    /// Returns the evaluated circuit indices in ascending order.
    pub fn eval_circuits(&self) -> &[usize] {
        &self.eval
    }

    /// Returns the selection bits.
    pub fn as_bits(&self) -> &[bool] {
        &self.selection
    }
}

/// Builds a cut-and-choose selection.
pub trait SelectionBuilder {
    /// Builds a selection over `total` circuits.
    fn build<R: Rng + ?Sized>(
        &self,
        total: usize,
        rng: &mut R,
    ) -> Result<CutAndChooseSelection, SelectionError>;
}

/// Checks a fixed number of circuits chosen uniformly at random.
#[derive(Debug, Clone, Copy)]
pub struct ChooseFractionSelectionBuilder {
    check: usize,
}

impl ChooseFractionSelectionBuilder {
    /// Creates a builder which checks `check` circuits.
    pub fn new(check: usize) -> Self {
        Self { check }
    }
}

impl SelectionBuilder for ChooseFractionSelectionBuilder {
    fn build<R: Rng + ?Sized>(
        &self,
        total: usize,
        rng: &mut R,
    ) -> Result<CutAndChooseSelection, SelectionError> {
        if self.check > total || (self.check == total && total > 0) {
            return Err(SelectionError::TooManyChecked {
                check: self.check,
                total,
            });
        }

        let mut selection = vec![false; total];
        for j in index::sample(rng, total, self.check) {
            selection[j] = true;
        }

        Ok(selection.into())
    }
}

/// Evaluates every circuit.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluateAllSelectionBuilder;

impl SelectionBuilder for EvaluateAllSelectionBuilder {
    fn build<R: Rng + ?Sized>(
        &self,
        total: usize,
        _rng: &mut R,
    ) -> Result<CutAndChooseSelection, SelectionError> {
        Ok(vec![false; total].into())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, 1)]
    #[case(2, 8)]
    #[case(40, 80)]
    #[case(99, 100)]
    fn test_choose_fraction(#[case] check: usize, #[case] total: usize) {
        let mut rng = StdRng::seed_from_u64(0);
        let selection = ChooseFractionSelectionBuilder::new(check)
            .build(total, &mut rng)
            .unwrap();

        assert_eq!(selection.len(), total);
        assert_eq!(selection.check_circuits().len(), check);
        assert_eq!(selection.eval_circuits().len(), total - check);

        let mut all: Vec<usize> = selection
            .check_circuits()
            .iter()
            .chain(selection.eval_circuits())
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..total).collect::<Vec<_>>());

        for j in selection.check_circuits() {
            assert!(selection.is_checked(*j));
        }
    }

    #[test]
    fn test_choose_fraction_rejects_checking_everything() {
        let mut rng = StdRng::seed_from_u64(0);

        assert!(ChooseFractionSelectionBuilder::new(4)
            .build(4, &mut rng)
            .is_err());
        assert!(ChooseFractionSelectionBuilder::new(5)
            .build(4, &mut rng)
            .is_err());
    }

    #[test]
    fn test_evaluate_all() {
        let mut rng = StdRng::seed_from_u64(0);
        let selection = EvaluateAllSelectionBuilder.build(5, &mut rng).unwrap();

        assert!(selection.check_circuits().is_empty());
        assert_eq!(selection.eval_circuits(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_selection_serde_keeps_index_sets() {
        let selection: CutAndChooseSelection = vec![true, false, false, true].into();
        let bytes = bincode::serialize(&selection).unwrap();
        let decoded: CutAndChooseSelection = bincode::deserialize(&bytes).unwrap();

        assert_eq!(decoded, selection);
        assert_eq!(decoded.check_circuits(), &[0, 3]);
        assert_eq!(decoded.eval_circuits(), &[1, 2]);
    }
}
