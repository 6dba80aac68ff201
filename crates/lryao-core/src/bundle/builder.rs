use std::sync::Arc;

use rand::{CryptoRng, Rng};

use super::{Bundle, Labels};
use crate::{
    circuit::{Circuit, Party},
    commit::HashCommit,
    commitments::CommitmentBundle,
    garble::{garble, Delta},
    matrix::{MatrixError, ProbeResistantMatrix},
    randomness::SeededRandomness,
    Block,
};

/// Number of P2 share wires of a cheating-recovery bundle, one per bit of the proof of cheating.
pub const PROOF_LABELS: usize = 128;

/// How the P2 input keys of a bundle are produced.
#[derive(Clone, PartialEq, Eq)]
pub enum GarblingStrategy {
    /// The P2 input keys are the circuit's own input keys.
    Standard,
    /// The P2 input keys secret-share the 1-key of the circuit's first P2 input wire, such that
    /// selecting the keys by the bits of the proof XORs to it.
    CheatingRecovery {
        /// The proof of cheating.
        proof_of_cheating: Block,
    },
}

opaque_debug::implement!(GarblingStrategy);

/// Bundle builder error.
#[derive(Debug, thiserror::Error)]
#[error("bundle error: {0}")]
pub struct BundleError(#[from] ErrorRepr);

#[derive(Debug, thiserror::Error)]
enum ErrorRepr {
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error("matrix has {actual} rows, expected {expected}")]
    MatrixSize { expected: usize, actual: usize },
    #[error("cheating-recovery circuit must have a single P2 input, got {0}")]
    RecoveryInputs(usize),
}

impl From<MatrixError> for BundleError {
    fn from(err: MatrixError) -> Self {
        Self(ErrorRepr::Matrix(err))
    }
}

/// Builds bundles deterministically from seeds.
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    circuit: Arc<Circuit>,
    matrix: Arc<ProbeResistantMatrix>,
    strategy: GarblingStrategy,
}

impl BundleBuilder {
    /// Creates a builder for ordinary bundles.
    pub fn new(
        circuit: Arc<Circuit>,
        matrix: Arc<ProbeResistantMatrix>,
    ) -> Result<Self, BundleError> {
        Self::with_strategy(circuit, matrix, GarblingStrategy::Standard)
    }

    /// Creates a builder for cheating-recovery bundles.
    pub fn cheating_recovery(
        circuit: Arc<Circuit>,
        matrix: Arc<ProbeResistantMatrix>,
        proof_of_cheating: Block,
    ) -> Result<Self, BundleError> {
        Self::with_strategy(
            circuit,
            matrix,
            GarblingStrategy::CheatingRecovery { proof_of_cheating },
        )
    }

    /// Creates a builder with the given strategy.
    pub fn with_strategy(
        circuit: Arc<Circuit>,
        matrix: Arc<ProbeResistantMatrix>,
        strategy: GarblingStrategy,
    ) -> Result<Self, BundleError> {
        let p2_inputs = circuit.input_count(Party::P2);
        let expected = match strategy {
            GarblingStrategy::Standard => p2_inputs,
            GarblingStrategy::CheatingRecovery { .. } => {
                if p2_inputs != 1 {
                    return Err(ErrorRepr::RecoveryInputs(p2_inputs).into());
                }
                PROOF_LABELS
            }
        };

        if matrix.n() != expected {
            return Err(ErrorRepr::MatrixSize {
                expected,
                actual: matrix.n(),
            }
            .into());
        }

        Ok(Self {
            circuit,
            matrix,
            strategy,
        })
    }

    /// Returns the circuit.
    pub fn circuit(&self) -> &Arc<Circuit> {
        &self.circuit
    }

    /// Returns the matrix.
    pub fn matrix(&self) -> &Arc<ProbeResistantMatrix> {
        &self.matrix
    }

    /// Returns `true` if the builder produces cheating-recovery bundles.
    pub fn is_cheating_recovery(&self) -> bool {
        matches!(self.strategy, GarblingStrategy::CheatingRecovery { .. })
    }

    /// Returns the labels of the bundles built.
    pub fn labels(&self) -> Labels {
        let y2 = match self.strategy {
            GarblingStrategy::Standard => self.circuit.input_wires(Party::P2).to_vec(),
            GarblingStrategy::CheatingRecovery { .. } => (0..PROOF_LABELS).collect(),
        };

        Labels {
            x: self.circuit.input_wires(Party::P1).to_vec(),
            y1_extended: self.matrix.labels(),
            y2,
            output: self.circuit.outputs().to_vec(),
        }
    }

    /// Builds the bundle for a seed.
    pub fn build(&self, seed: Block) -> Result<Bundle, BundleError> {
        let randomness = SeededRandomness::new(seed);
        let gc = garble(&self.circuit, &mut randomness.garbling());

        let p1_inputs = self.circuit.input_count(Party::P1);
        let (keys_x, keys_y) = gc.input_keys.split_at(p1_inputs);

        let mut key_rng = randomness.p2_input_keys();
        let keys_y = match self.strategy {
            GarblingStrategy::Standard => keys_y.to_vec(),
            GarblingStrategy::CheatingRecovery { proof_of_cheating } => {
                share_master_key(proof_of_cheating, keys_y[0][1], gc.delta, &mut key_rng)
            }
        };

        let (keys_y1, keys_y2) = split_keys(&keys_y, gc.delta, &mut key_rng);
        let keys_y1_extended = self.matrix.transform_keys(&keys_y1, &mut key_rng)?;

        let placement_mask: Vec<bool> = keys_x.iter().map(|pair| pair[0].lsb()).collect();
        let mut mask_rng = randomness.masks();
        let commitment_mask: Block = mask_rng.gen();
        let (commitment_mask_decommitment, _) = commitment_mask.hash_commit_with(mask_rng.gen());

        let labels = self.labels();
        let mut commit_rng = randomness.commitments();
        let commitments_x = CommitmentBundle::commit(
            labels.x.clone(),
            keys_x,
            commitment_mask,
            Some(&placement_mask),
            &mut commit_rng,
        );
        let commitments_y1_extended = CommitmentBundle::commit(
            labels.y1_extended.clone(),
            &keys_y1_extended,
            commitment_mask,
            None,
            &mut commit_rng,
        );
        let commitments_y2 = CommitmentBundle::commit(
            labels.y2.clone(),
            &keys_y2,
            commitment_mask,
            None,
            &mut commit_rng,
        );
        let (output_decommitment, output_commitment) =
            gc.output_keys.clone().hash_commit_with(commit_rng.gen());

        let proof_of_cheating = match self.strategy {
            GarblingStrategy::Standard => None,
            GarblingStrategy::CheatingRecovery { proof_of_cheating } => Some(proof_of_cheating),
        };

        Ok(Bundle {
            seed,
            garbled_tables: gc.tables,
            translation_table: gc.translation_table,
            labels,
            placement_mask,
            commitment_mask: commitment_mask_decommitment,
            keys_x: keys_x.to_vec(),
            keys_y1_extended,
            keys_y2,
            output_keys: gc.output_keys,
            commitments_x,
            commitments_y1_extended,
            commitments_y2,
            output_commitment,
            output_decommitment,
            proof_of_cheating,
            difference: None,
        })
    }
}

/// Splits key pairs into two shares, `W_a ⊕ Z_b = Y_{a ⊕ b}`.
fn split_keys<R: Rng + CryptoRng + ?Sized>(
    keys: &[[Block; 2]],
    delta: Delta,
    rng: &mut R,
) -> (Vec<[Block; 2]>, Vec<[Block; 2]>) {
    let delta = delta.into_inner();
    keys.iter()
        .map(|pair| {
            let w: Block = rng.gen();
            let z = pair[0] ^ w;
            ([w, w ^ delta], [z, z ^ delta])
        })
        .unzip()
}

/// Shares `master` over [`PROOF_LABELS`] key pairs, such that XORing the keys selected by the bits
/// of `proof` yields `master`.
fn share_master_key<R: Rng + CryptoRng + ?Sized>(
    proof: Block,
    master: Block,
    delta: Delta,
    rng: &mut R,
) -> Vec<[Block; 2]> {
    let delta = delta.into_inner();
    let bits = proof.to_bits();
    let (last_bit, bits) = bits.split_last().expect("proof has 128 bits");

    let mut acc = Block::ZERO;
    let mut keys: Vec<[Block; 2]> = bits
        .iter()
        .map(|bit| {
            let key: Block = rng.gen();
            let pair = [key, key ^ delta];
            acc ^= pair[*bit as usize];
            pair
        })
        .collect();

    let mut last = [Block::ZERO; 2];
    last[*last_bit as usize] = acc ^ master;
    last[!*last_bit as usize] = acc ^ master ^ delta;
    keys.push(last);

    keys
}
