//! The evaluation package P1 sends for a bucket in the online phase.
//!
//! P2 first sends `D2 = y ⊕ y1`, its input masked by the random share `y1` it chose during the
//! offline OT. P1 answers, for every circuit of the bucket, with its input masked by the circuit's
//! placement mask and the decommitments of the keys selected by those signals and by `D2`. P2
//! recovers the active keys of every input wire without learning P1's input.

use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    bundle::{Bundle, LimitedBundle},
    commit::Decommitment,
    compute::ProofCiphers,
    difference::xor,
    matrix::{MatrixError, ProbeResistantMatrix},
    Block, CheatError,
};

/// Errors that can occur while building or opening an evaluation package.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum EvaluationError {
    #[error(transparent)]
    Cheat(#[from] CheatError),
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("bundle is missing {0}")]
    Incomplete(&'static str),
}

/// The openings of one circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitOpening {
    /// P1's input XOR the placement mask.
    pub signals: Vec<bool>,
    /// Opens the commitment mask.
    pub commitment_mask: Decommitment<Block>,
    /// Opens the P1 input keys at the signals.
    pub x: Vec<Decommitment<Block>>,
    /// Opens the second P2 share at `D2`.
    pub y2: Vec<Decommitment<Block>>,
    /// Opens the output keys.
    pub output: Decommitment<Vec<[Block; 2]>>,
}

/// Everything P2 needs to evaluate a bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationPackage {
    /// Per circuit openings, in bucket order.
    pub circuits: Vec<CircuitOpening>,
    /// Encrypted shares of the proof of cheating, absent for cheating-recovery buckets.
    pub proof: Option<ProofCiphers>,
}

impl EvaluationPackage {
    /// Builds the package for a bucket, P1's input `x` and P2's masked input `d2`.
    pub fn build<R: Rng + CryptoRng + ?Sized>(
        bucket: &[Bundle],
        x: &[bool],
        d2: &[bool],
        proof: Option<Block>,
        rng: &mut R,
    ) -> Result<Self, EvaluationError> {
        let circuits = bucket
            .iter()
            .map(|bundle| {
                let labels = bundle.labels();
                if x.len() != labels.x.len() {
                    return Err(EvaluationError::InvalidInput(format!(
                        "expected {} input bits, got {}",
                        labels.x.len(),
                        x.len()
                    )));
                }

                if d2.len() != labels.y2.len() {
                    return Err(CheatError::new(format!(
                        "D2 has {} bits, expected {}",
                        d2.len(),
                        labels.y2.len()
                    ))
                    .into());
                }

                let signals = xor(x, bundle.placement_mask());
                let x = signals
                    .iter()
                    .enumerate()
                    .map(|(i, sigma)| bundle.commitments_x().decommitment(i, *sigma).cloned())
                    .collect::<Option<Vec<_>>>()
                    .ok_or(EvaluationError::Incomplete("P1 input decommitments"))?;
                let y2 = d2
                    .iter()
                    .enumerate()
                    .map(|(i, sigma)| bundle.commitments_y2().decommitment(i, *sigma).cloned())
                    .collect::<Option<Vec<_>>>()
                    .ok_or(EvaluationError::Incomplete("P2 share decommitments"))?;

                Ok(CircuitOpening {
                    signals,
                    commitment_mask: bundle.commitment_mask_decommitment().clone(),
                    x,
                    y2,
                    output: bundle.output_decommitment().clone(),
                })
            })
            .collect::<Result<Vec<_>, EvaluationError>>()?;

        let proof = proof.map(|proof| {
            let output_keys: Vec<&[[Block; 2]]> =
                bucket.iter().map(|bundle| bundle.output_keys()).collect();
            ProofCiphers::new(proof, &output_keys, rng)
        });

        Ok(Self { circuits, proof })
    }

    /// Verifies the package against P2's bucket and recovers the active input keys of every
    /// circuit.
    pub fn open(
        &self,
        bucket: &[LimitedBundle],
        matrix: &ProbeResistantMatrix,
        d2: &[bool],
    ) -> Result<Vec<OpenedCircuit>, EvaluationError> {
        if self.circuits.len() != bucket.len() {
            return Err(CheatError::new(format!(
                "package covers {} circuits, expected {}",
                self.circuits.len(),
                bucket.len()
            ))
            .into());
        }

        if let Some(proof) = &self.proof {
            let wires = bucket
                .first()
                .map(|bundle| bundle.labels().output.len())
                .unwrap_or(0);
            proof.check_shape(wires, bucket.len())?;
        }

        for (j, pair) in self.circuits.windows(2).enumerate() {
            let difference = bucket[j]
                .placement_mask_difference()
                .ok_or(EvaluationError::Incomplete("placement mask difference"))?;

            if pair[0].signals.len() != pair[1].signals.len()
                || xor(&pair[0].signals, &pair[1].signals) != difference
            {
                return Err(CheatError::new(format!(
                    "signals of circuits {j} and {} do not match the placement mask difference",
                    j + 1
                ))
                .into());
            }
        }

        bucket
            .iter()
            .zip(&self.circuits)
            .map(|(bundle, opening)| opening.open(bundle, matrix, d2))
            .collect()
    }
}

impl CircuitOpening {
    fn open(
        &self,
        bundle: &LimitedBundle,
        matrix: &ProbeResistantMatrix,
        d2: &[bool],
    ) -> Result<OpenedCircuit, EvaluationError> {
        let labels = bundle.labels();
        if self.signals.len() != labels.x.len() || self.x.len() != labels.x.len() {
            return Err(CheatError::new("P1 input openings have the wrong length").into());
        }

        if d2.len() != labels.y2.len() || self.y2.len() != labels.y2.len() {
            return Err(CheatError::new("P2 share openings have the wrong length").into());
        }

        self.commitment_mask
            .verify(bundle.commitment_mask_commitment())
            .map_err(|_| CheatError::new("decommitment of commitment mask failed!"))?;
        let mask = *self.commitment_mask.data();

        let x = self
            .x
            .iter()
            .zip(&self.signals)
            .enumerate()
            .map(|(i, (decommitment, sigma))| {
                bundle
                    .commitments_x()
                    .open(i, *sigma, decommitment)
                    .map(|key| key ^ mask)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let y2 = self
            .y2
            .iter()
            .zip(d2)
            .enumerate()
            .map(|(i, (decommitment, sigma))| {
                bundle
                    .commitments_y2()
                    .open(i, *sigma, decommitment)
                    .map(|key| key ^ mask)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let y1_extended: Vec<Block> = bundle
            .y1_extended_keys()
            .ok_or(EvaluationError::Incomplete("extended P2 input keys"))?
            .iter()
            .map(|key| *key ^ mask)
            .collect();
        let y1 = matrix.restore_keys(&y1_extended)?;
        if y1.len() != y2.len() {
            return Err(EvaluationError::InvalidInput(format!(
                "matrix restores {} keys, expected {}",
                y1.len(),
                y2.len()
            )));
        }

        self.output
            .verify(bundle.output_commitment())
            .map_err(|_| CheatError::new("decommitment of output keys failed!"))?;
        if self.output.data().len() != labels.output.len() {
            return Err(CheatError::new("output decommitment has the wrong length").into());
        }

        Ok(OpenedCircuit {
            x,
            y: y1.into_iter().zip(y2).map(|(a, b)| a ^ b).collect(),
            output_keys: self.output.data().clone(),
        })
    }
}

/// The active keys P2 recovered for one circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedCircuit {
    /// Active P1 input keys.
    pub x: Vec<Block>,
    /// Active P2 input keys.
    pub y: Vec<Block>,
    /// Decommitted output key pairs.
    pub output_keys: Vec<[Block; 2]>,
}

impl OpenedCircuit {
    /// Returns the active input keys of the circuit, P1 first.
    pub fn inputs(&self) -> Vec<Block> {
        self.x.iter().chain(&self.y).copied().collect()
    }

    /// Returns the active input keys of a cheating-recovery circuit.
    ///
    /// The P2 keys are shares of the key of the circuit's single P2 input wire.
    pub fn recovery_inputs(&self) -> Vec<Block> {
        let master = self.y.iter().fold(Block::ZERO, |acc, key| acc ^ *key);
        self.x.iter().copied().chain([master]).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        bundle::{BundleBuilder, LimitedBundleConfig, PROOF_LABELS},
        circuit::Circuit,
        circuits::{adder, from_bits, to_bits, unlock_input},
        commit::HashCommit,
        compute::{EvaluationInstance, EvaluationResult, MajorityCompute, OnlineCompute},
        difference::{Committer, Receiver},
        matrix::ProbeResistantMatrixBuilder,
        selection::{EvaluateAllSelectionBuilder, SelectionBuilder},
    };

    /// P1's bundles and P2's matching limited bundles, as left by a successful offline phase.
    fn offline(
        builder: &BundleBuilder,
        size: usize,
        rng: &mut StdRng,
    ) -> (Vec<Bundle>, Vec<LimitedBundle>) {
        let bundles: Vec<Bundle> = (0..size)
            .map(|_| builder.build(rng.gen()).unwrap())
            .collect();

        let selection = EvaluateAllSelectionBuilder.build(size, rng).unwrap();
        let (receiver, setup) = Receiver::new(selection, 4, rng).setup();
        let secrets = bundles.iter().map(|b| b.placement_mask().to_vec()).collect();
        let (_, msg) = Committer::new(secrets, 4).unwrap().commit(setup, rng);
        let receiver = receiver.receive_commitments(msg).unwrap();

        let matrix = builder.matrix();
        let y1: Vec<bool> = (0..matrix.n()).map(|_| rng.gen()).collect();
        let y1_extended = matrix.transform_input(&y1, rng).unwrap();

        let limited = bundles
            .iter()
            .enumerate()
            .map(|(j, bundle)| {
                let (_, seed) = bundle.seed().hash_commit();
                let mut limited = LimitedBundleConfig {
                    garbled_tables: bundle.garbled_tables().clone(),
                    translation_table: bundle.translation_table().clone(),
                    labels: builder.labels(),
                    commitments: bundle.commitments_package(seed),
                    difference: receiver.bundle(j).unwrap(),
                }
                .finalize()
                .unwrap();

                if let Some(next) = bundles.get(j + 1) {
                    limited.set_placement_mask_difference(xor(
                        bundle.placement_mask(),
                        next.placement_mask(),
                    ));
                }

                limited.set_y1(y1.clone());
                limited.set_y1_extended_keys(
                    y1_extended
                        .iter()
                        .enumerate()
                        .map(|(i, bit)| {
                            *bundle
                                .commitments_y1_extended()
                                .decommitment(i, *bit)
                                .unwrap()
                                .data()
                        })
                        .collect(),
                );

                limited
            })
            .collect();

        (bundles, limited)
    }

    fn instances<'a>(
        bucket: &'a [LimitedBundle],
        opened: &'a [OpenedCircuit],
        recovery: bool,
    ) -> Vec<EvaluationInstance<'a>> {
        bucket
            .iter()
            .zip(opened)
            .map(|(bundle, opened)| EvaluationInstance {
                tables: bundle.garbled_tables(),
                translation_table: bundle.translation_table(),
                inputs: if recovery {
                    opened.recovery_inputs()
                } else {
                    opened.inputs()
                },
                output_keys: Some(&opened.output_keys),
            })
            .collect()
    }

    fn main_builder(rng: &mut StdRng) -> (Arc<Circuit>, BundleBuilder) {
        let circ = Arc::new(adder(32));
        let matrix = ProbeResistantMatrixBuilder::new(32, 8).unwrap().build(rng);
        let builder = BundleBuilder::new(circ.clone(), Arc::new(matrix)).unwrap();

        (circ, builder)
    }

    #[test]
    fn test_evaluate_bucket() {
        let mut rng = StdRng::seed_from_u64(0);
        let (circ, builder) = main_builder(&mut rng);
        let (bundles, limited) = offline(&builder, 3, &mut rng);

        let x = to_bits(3, 32);
        let y = to_bits(5, 32);
        let d2 = xor(&y, limited[0].y1().unwrap());

        let proof: Block = rng.gen();
        let package = EvaluationPackage::build(&bundles, &x, &d2, Some(proof), &mut rng).unwrap();
        let opened = package.open(&limited, builder.matrix(), &d2).unwrap();

        let ciphers = package.proof.as_ref().unwrap();
        let result =
            OnlineCompute::new(&circ, instances(&limited, &opened, false), ciphers, 2)
                .unwrap()
                .compute();

        let EvaluationResult::ValidOutput(output) = result else {
            panic!("expected a valid output, got {result:?}");
        };
        assert_eq!(from_bits(&output), 8);
    }

    #[test]
    fn test_inconsistent_signals() {
        let mut rng = StdRng::seed_from_u64(0);
        let (_, builder) = main_builder(&mut rng);
        let (bundles, limited) = offline(&builder, 3, &mut rng);

        let d2 = vec![false; 32];
        let mut package =
            EvaluationPackage::build(&bundles, &to_bits(3, 32), &d2, None, &mut rng).unwrap();

        // P1 feeds a different input to the second circuit.
        let other =
            EvaluationPackage::build(&bundles, &to_bits(4, 32), &d2, None, &mut rng).unwrap();
        package.circuits[1] = other.circuits[1].clone();

        let err = package.open(&limited, builder.matrix(), &d2).unwrap_err();
        assert!(matches!(err, EvaluationError::Cheat(_)));
    }

    #[test]
    fn test_wrong_decommitment() {
        let mut rng = StdRng::seed_from_u64(0);
        let (_, builder) = main_builder(&mut rng);
        let (bundles, limited) = offline(&builder, 2, &mut rng);

        let d2 = vec![true; 32];
        let mut package =
            EvaluationPackage::build(&bundles, &to_bits(3, 32), &d2, None, &mut rng).unwrap();
        package.circuits[0].y2[7] = package.circuits[1].y2[7].clone();

        let err = package.open(&limited, builder.matrix(), &d2).unwrap_err();
        assert!(matches!(err, EvaluationError::Cheat(_)));
    }

    #[test]
    fn test_wrong_d2_length() {
        let mut rng = StdRng::seed_from_u64(0);
        let (_, builder) = main_builder(&mut rng);
        let (bundles, _) = offline(&builder, 2, &mut rng);

        let err =
            EvaluationPackage::build(&bundles, &to_bits(3, 32), &[true; 3], None, &mut rng)
                .unwrap_err();
        assert!(matches!(err, EvaluationError::Cheat(_)));
    }

    #[test]
    fn test_recovery_bucket() {
        let mut rng = StdRng::seed_from_u64(0);
        let circ = Arc::new(unlock_input(32));
        let matrix = ProbeResistantMatrixBuilder::new(PROOF_LABELS, 8)
            .unwrap()
            .build(&mut rng);
        let proof: Block = rng.gen();
        let builder = BundleBuilder::cheating_recovery(circ.clone(), Arc::new(matrix), proof)
            .unwrap();
        let (bundles, limited) = offline(&builder, 3, &mut rng);

        let x = to_bits(0xdead_beef, 32);
        let unlock = |guess: Block, rng: &mut StdRng| {
            let d2 = xor(&guess.to_bits(), limited[0].y1().unwrap());
            let package = EvaluationPackage::build(&bundles, &x, &d2, None, rng).unwrap();
            let opened = package.open(&limited, builder.matrix(), &d2).unwrap();

            MajorityCompute::new(&circ, instances(&limited, &opened, true), 1).compute()
        };

        assert_eq!(unlock(proof, &mut rng), EvaluationResult::ValidOutput(x.clone()));

        // A guess one bit off selects the 0-key of the unlock wire.
        let mut guess = proof.to_bits();
        guess[5] = !guess[5];
        assert_eq!(
            unlock(Block::from_bits(guess), &mut rng),
            EvaluationResult::ValidOutput(vec![false; 32])
        );
    }
}
