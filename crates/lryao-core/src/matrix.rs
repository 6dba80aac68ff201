//! k-probe-resistant matrices.
//!
//! P2 hides its real input `y` behind an extended input `y'` of length `m` such that `M · y' = y`.
//! The keys of the extended input are derived from the keys of `y` so that selecting the keys of
//! `y'` and XORing them row by row yields exactly the keys of `y`. Probing fewer than `k` extended
//! keys reveals nothing about any bit of `y`.

mod builder;

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};

pub use builder::ProbeResistantMatrixBuilder;

use crate::Block;

/// Errors that can occur while using a probe-resistant matrix.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum MatrixError {
    #[error("matrix is malformed: {0}")]
    Malformed(String),
    #[error("not a k-probe resistant matrix: row {row} has no free column")]
    NotProbeResistant { row: usize },
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("key pairs do not share a single offset")]
    InconsistentDelta,
    #[error("unsupported matrix dimensions: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] bincode::Error),
}

/// An `n × m` binary matrix used to extend the P2 input.
///
/// Deserialization applies the same checks as [`ProbeResistantMatrix::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedMatrix")]
pub struct ProbeResistantMatrix {
    rows: Vec<Vec<bool>>,
}

#[derive(Deserialize)]
struct UncheckedMatrix {
    rows: Vec<Vec<bool>>,
}

impl TryFrom<UncheckedMatrix> for ProbeResistantMatrix {
    type Error = MatrixError;

    fn try_from(matrix: UncheckedMatrix) -> Result<Self, Self::Error> {
        Self::new(matrix.rows)
    }
}

impl ProbeResistantMatrix {
    /// Creates a matrix from its rows.
    pub fn new(rows: Vec<Vec<bool>>) -> Result<Self, MatrixError> {
        let m = rows
            .first()
            .map(|row| row.len())
            .ok_or_else(|| MatrixError::Malformed("matrix has no rows".to_string()))?;

        if m == 0 || rows.iter().any(|row| row.len() != m) {
            return Err(MatrixError::Malformed(
                "rows must be non-empty and of equal length".to_string(),
            ));
        }

        Ok(Self { rows })
    }

    /// Returns the number of rows, the length of the original input.
    pub fn n(&self) -> usize {
        self.rows.len()
    }

    /// Returns the number of columns, the length of the extended input.
    pub fn m(&self) -> usize {
        self.rows[0].len()
    }

    /// Returns the labels of the extended input wires.
    pub fn labels(&self) -> Vec<usize> {
        (0..self.m()).collect()
    }

    /// Returns row `i`.
    pub fn row(&self, i: usize) -> &[bool] {
        &self.rows[i]
    }

    /// Derives the extended key pairs from the original key pairs.
    ///
    /// Every pair must be of the form `[k, k ^ Δ]` for a shared `Δ`. The extended pairs share the
    /// same `Δ`, and for every row `i` the XOR of the 0-keys over the significant columns of row `i`
    /// equals the 0-key of original wire `i`.
    pub fn transform_keys<R: Rng + CryptoRng + ?Sized>(
        &self,
        keys: &[[Block; 2]],
        rng: &mut R,
    ) -> Result<Vec<[Block; 2]>, MatrixError> {
        self.check_len(keys.len())?;

        let delta = keys[0][0] ^ keys[0][1];
        if keys.iter().any(|pair| pair[0] ^ pair[1] != delta) {
            return Err(MatrixError::InconsistentDelta);
        }

        let mut extended: Vec<Option<Block>> = vec![None; self.m()];
        for (i, row) in self.rows.iter().enumerate() {
            let mut acc = Block::ZERO;
            let mut last = None;
            for (j, _) in row.iter().enumerate().filter(|(_, bit)| **bit) {
                let key = *extended[j].get_or_insert_with(|| {
                    last = Some(j);
                    rng.gen()
                });
                acc ^= key;
            }

            // Fix the last column allocated by this row so the row XORs to the original key.
            let last = last.ok_or(MatrixError::NotProbeResistant { row: i })?;
            if let Some(key) = extended[last].as_mut() {
                *key ^= acc ^ keys[i][0];
            }
        }

        Ok(extended
            .into_iter()
            .map(|key| {
                let key = key.unwrap_or_else(|| rng.gen());
                [key, key ^ delta]
            })
            .collect())
    }

    /// Samples an extended input `y'` such that `M · y' = y`.
    pub fn transform_input<R: Rng + ?Sized>(
        &self,
        input: &[bool],
        rng: &mut R,
    ) -> Result<Vec<bool>, MatrixError> {
        self.check_len(input.len())?;

        let mut extended: Vec<Option<bool>> = vec![None; self.m()];
        for (i, row) in self.rows.iter().enumerate() {
            let mut acc = false;
            let mut last = None;
            for (j, _) in row.iter().enumerate().filter(|(_, bit)| **bit) {
                let bit = *extended[j].get_or_insert_with(|| {
                    last = Some(j);
                    rng.gen()
                });
                acc ^= bit;
            }

            let last = last.ok_or(MatrixError::NotProbeResistant { row: i })?;
            if acc != input[i] {
                if let Some(bit) = extended[last].as_mut() {
                    *bit = !*bit;
                }
            }
        }

        Ok(extended
            .into_iter()
            .map(|bit| bit.unwrap_or(false))
            .collect())
    }

    /// Restores the active keys of the original input from the active extended keys.
    pub fn restore_keys(&self, keys: &[Block]) -> Result<Vec<Block>, MatrixError> {
        if keys.len() != self.m() {
            return Err(MatrixError::InvalidLength {
                expected: self.m(),
                actual: keys.len(),
            });
        }

        Ok(self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(keys)
                    .filter(|(bit, _)| **bit)
                    .fold(Block::ZERO, |acc, (_, key)| acc ^ *key)
            })
            .collect())
    }

    /// Computes `M · y'`.
    pub fn multiply(&self, extended: &[bool]) -> Result<Vec<bool>, MatrixError> {
        if extended.len() != self.m() {
            return Err(MatrixError::InvalidLength {
                expected: self.m(),
                actual: extended.len(),
            });
        }

        Ok(self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(extended)
                    .fold(false, |acc, (a, b)| acc ^ (a & b))
            })
            .collect())
    }

    /// Writes the matrix to a file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), MatrixError> {
        let file = BufWriter::new(File::create(path)?);
        bincode::serialize_into(file, self)?;

        Ok(())
    }

    /// Reads a matrix from a file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, MatrixError> {
        let file = BufReader::new(File::open(path)?);
        Ok(bincode::deserialize_from(file)?)
    }

    fn check_len(&self, len: usize) -> Result<(), MatrixError> {
        if len != self.n() {
            return Err(MatrixError::InvalidLength {
                expected: self.n(),
                actual: len,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::garble::Delta;

    fn key_pairs(rng: &mut StdRng, n: usize) -> Vec<[Block; 2]> {
        let delta = Delta::random(rng).into_inner();
        (0..n)
            .map(|_| {
                let key: Block = rng.gen();
                [key, key ^ delta]
            })
            .collect()
    }

    #[test]
    fn test_transform_restore_keys() {
        let mut rng = StdRng::seed_from_u64(0);
        let matrix = ProbeResistantMatrixBuilder::new(32, 8)
            .unwrap()
            .build(&mut rng);

        let keys = key_pairs(&mut rng, 32);
        let extended = matrix.transform_keys(&keys, &mut rng).unwrap();
        assert_eq!(extended.len(), matrix.m());

        let input: Vec<bool> = (0..32).map(|_| rng.gen()).collect();
        let extended_input = matrix.transform_input(&input, &mut rng).unwrap();
        assert_eq!(matrix.multiply(&extended_input).unwrap(), input);

        let active: Vec<Block> = extended
            .iter()
            .zip(&extended_input)
            .map(|(pair, bit)| pair[*bit as usize])
            .collect();
        let restored = matrix.restore_keys(&active).unwrap();

        let expected: Vec<Block> = keys
            .iter()
            .zip(&input)
            .map(|(pair, bit)| pair[*bit as usize])
            .collect();
        assert_eq!(restored, expected);
    }

    #[test]
    fn test_deserialize_rejects_ragged_rows() {
        let mut rows = vec![vec![true; 12]; 8];
        rows[0].truncate(2);
        let bytes = bincode::serialize(&rows).unwrap();

        assert!(bincode::deserialize::<ProbeResistantMatrix>(&bytes).is_err());
    }

    #[test]
    fn test_deserialize_rejects_empty_matrix() {
        let bytes = bincode::serialize(&Vec::<Vec<bool>>::new()).unwrap();
        assert!(bincode::deserialize::<ProbeResistantMatrix>(&bytes).is_err());

        let bytes = bincode::serialize(&vec![Vec::<bool>::new(); 4]).unwrap();
        assert!(bincode::deserialize::<ProbeResistantMatrix>(&bytes).is_err());
    }

    #[test]
    fn test_rejects_row_without_free_column() {
        let mut rng = StdRng::seed_from_u64(0);
        let matrix = ProbeResistantMatrix::new(vec![
            vec![true, true, false],
            vec![true, true, false],
        ])
        .unwrap();

        assert!(matches!(
            matrix.transform_keys(&key_pairs(&mut rng, 2), &mut rng),
            Err(MatrixError::NotProbeResistant { row: 1 })
        ));
        assert!(matches!(
            matrix.transform_input(&[true, false], &mut rng),
            Err(MatrixError::NotProbeResistant { row: 1 })
        ));
    }

    #[test]
    fn test_rejects_inconsistent_delta() {
        let mut rng = StdRng::seed_from_u64(0);
        let matrix = ProbeResistantMatrix::new(vec![vec![true, false], vec![false, true]]).unwrap();
        let mut keys = key_pairs(&mut rng, 2);
        keys[1][1] = rng.gen();

        assert!(matches!(
            matrix.transform_keys(&keys, &mut rng),
            Err(MatrixError::InconsistentDelta)
        ));
    }

    #[test]
    fn test_save_load() {
        let mut rng = StdRng::seed_from_u64(0);
        let matrix = ProbeResistantMatrixBuilder::new(8, 4)
            .unwrap()
            .build(&mut rng);

        let path = std::env::temp_dir().join(format!("lryao-matrix-{}.bin", std::process::id()));
        matrix.save_to_file(&path).unwrap();
        let loaded = ProbeResistantMatrix::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, matrix);
    }
}
