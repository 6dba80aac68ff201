//! Online evaluation of a bucket of garbled circuits and analysis of their outputs.

use std::fmt;

use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    chunks::chunk_ranges,
    circuit::Circuit,
    garble::{decode_outputs, evaluate, GarbledTables, TranslationTable},
    Block, CheatError,
};

/// Result of the output analysis of a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationResult {
    /// The circuits agree, or disagree without revealing a proof of cheating.
    ValidOutput(Vec<bool>),
    /// No circuit produced a valid output.
    InvalidWireFound,
    /// Two circuits disagree on an output wire and revealed the garbler's proof of cheating.
    FoundProofOfCheating(Block),
}

/// Hash of the proof of cheating.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedProof([u8; 32]);

impl HashedProof {
    /// Hashes a proof of cheating.
    pub fn new(proof: Block) -> Self {
        Self(blake3::hash(proof.as_bytes()).into())
    }
}

impl fmt::Debug for HashedProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashedProof({})", hex::encode(self.0))
    }
}

/// A garbled circuit with its active input keys, ready for evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationInstance<'a> {
    /// Encrypted gates.
    pub tables: &'a GarbledTables,
    /// Translation table.
    pub translation_table: &'a TranslationTable,
    /// Active input keys, P1 first.
    pub inputs: Vec<Block>,
    /// Decommitted output key pairs.
    ///
    /// When present, an output key must be one of the keys of its pair, otherwise the output is
    /// decoded with the translation table.
    pub output_keys: Option<&'a [[Block; 2]]>,
}

/// Output of one evaluated circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitOutput {
    /// Active output keys.
    pub keys: Vec<Block>,
    /// Decoded output values.
    pub values: Vec<bool>,
}

fn evaluate_instance(circ: &Circuit, instance: &EvaluationInstance<'_>) -> Option<CircuitOutput> {
    let keys = evaluate(circ, instance.tables, &instance.inputs).ok()?;
    let values = match instance.output_keys {
        Some(pairs) => decode_outputs(&keys, pairs)?,
        None => instance.translation_table.translate(&keys).ok()?,
    };

    Some(CircuitOutput { keys, values })
}

/// Evaluates every instance, `None` marking a circuit without valid output.
///
/// The instances are split into `threads` contiguous chunks evaluated in parallel.
pub fn evaluate_instances(
    circ: &Circuit,
    instances: &[EvaluationInstance<'_>],
    threads: usize,
) -> Vec<Option<CircuitOutput>> {
    let ranges = chunk_ranges(instances.len(), threads);

    cfg_if::cfg_if! {
        if #[cfg(all(feature = "rayon", not(feature = "force-st")))] {
            use rayon::prelude::*;

            let chunks: Vec<Vec<_>> = ranges
                .into_par_iter()
                .map(|range| {
                    instances[range]
                        .iter()
                        .map(|instance| evaluate_instance(circ, instance))
                        .collect()
                })
                .collect();
        } else {
            let chunks: Vec<Vec<_>> = ranges
                .into_iter()
                .map(|range| {
                    instances[range]
                        .iter()
                        .map(|instance| evaluate_instance(circ, instance))
                        .collect()
                })
                .collect();
        }
    }

    chunks.into_iter().flatten().collect()
}

/// Takes a per-wire majority vote over the circuits that produced output.
///
/// Used where the evaluated circuits are trusted to be mostly correct and no proof of cheating
/// is available.
#[derive(Debug)]
pub struct MajorityCompute<'a> {
    circ: &'a Circuit,
    instances: Vec<EvaluationInstance<'a>>,
    threads: usize,
}

impl<'a> MajorityCompute<'a> {
    /// Creates a new majority routine.
    pub fn new(circ: &'a Circuit, instances: Vec<EvaluationInstance<'a>>, threads: usize) -> Self {
        Self {
            circ,
            instances,
            threads,
        }
    }

    /// Evaluates the circuits and votes on every output wire.
    ///
    /// A tie is resolved to `false`.
    pub fn compute(&self) -> EvaluationResult {
        let outputs: Vec<Vec<bool>> = evaluate_instances(self.circ, &self.instances, self.threads)
            .into_iter()
            .flatten()
            .map(|output| output.values)
            .collect();

        if outputs.is_empty() {
            return EvaluationResult::InvalidWireFound;
        }

        let majority = (0..self.circ.outputs().len())
            .map(|wire| {
                let ones = outputs.iter().filter(|values| values[wire]).count();
                ones > outputs.len() - ones
            })
            .collect();

        EvaluationResult::ValidOutput(majority)
    }
}

/// Encryptions of the proof shares under the output keys of a bucket.
///
/// `ciphers[w][j][b]` is the `b`-key of output wire `w` of circuit `j` XOR share `b` of the
/// proof, the two shares of a wire XORing to the proof of cheating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofCiphers {
    ciphers: Vec<Vec<[Block; 2]>>,
    hashed_proof: HashedProof,
}

impl ProofCiphers {
    /// Creates the ciphers for the output key pairs of every circuit of a bucket.
    pub fn new<R: Rng + CryptoRng + ?Sized>(
        proof: Block,
        output_keys: &[&[[Block; 2]]],
        rng: &mut R,
    ) -> Self {
        let wires = output_keys.first().map(|keys| keys.len()).unwrap_or(0);
        let ciphers = (0..wires)
            .map(|w| {
                let share: Block = rng.gen();
                let shares = [share, share ^ proof];
                output_keys
                    .iter()
                    .map(|keys| [keys[w][0] ^ shares[0], keys[w][1] ^ shares[1]])
                    .collect()
            })
            .collect();

        Self {
            ciphers,
            hashed_proof: HashedProof::new(proof),
        }
    }

    /// Returns the hash of the proof.
    pub fn hashed_proof(&self) -> &HashedProof {
        &self.hashed_proof
    }

    /// Returns the number of output wires covered.
    pub fn wires(&self) -> usize {
        self.ciphers.len()
    }

    /// Returns the number of circuits covered.
    pub fn circuits(&self) -> usize {
        self.ciphers.first().map(Vec::len).unwrap_or(0)
    }

    /// Checks the ciphers hold a pair for every one of `circuits` circuits on each of `wires`
    /// output wires.
    pub fn check_shape(&self, wires: usize, circuits: usize) -> Result<(), CheatError> {
        if self.ciphers.len() != wires {
            return Err(CheatError::new(format!(
                "proof ciphers cover {} output wires, expected {wires}",
                self.ciphers.len()
            )));
        }

        if let Some(w) = self.ciphers.iter().position(|row| row.len() != circuits) {
            return Err(CheatError::new(format!(
                "proof ciphers of output wire {w} cover {} circuits, expected {circuits}",
                self.ciphers[w].len()
            )));
        }

        Ok(())
    }

    fn cipher(&self, wire: usize, circuit: usize, bit: bool) -> Block {
        self.ciphers[wire][circuit][bit as usize]
    }
}

/// Evaluates a bucket and looks for a proof of cheating.
#[derive(Debug)]
pub struct OnlineCompute<'a> {
    circ: &'a Circuit,
    instances: Vec<EvaluationInstance<'a>>,
    ciphers: &'a ProofCiphers,
    threads: usize,
}

impl<'a> OnlineCompute<'a> {
    /// Creates a new online routine.
    ///
    /// Fails if the ciphers do not cover every circuit and output wire.
    pub fn new(
        circ: &'a Circuit,
        instances: Vec<EvaluationInstance<'a>>,
        ciphers: &'a ProofCiphers,
        threads: usize,
    ) -> Result<Self, CheatError> {
        ciphers.check_shape(circ.outputs().len(), instances.len())?;

        Ok(Self {
            circ,
            instances,
            ciphers,
            threads,
        })
    }

    /// Evaluates every circuit and analyzes the outputs.
    ///
    /// Returns the output of the first circuit with a valid output unless two circuits disagree on
    /// a wire in a way that reveals the proof of cheating.
    pub fn compute(&self) -> EvaluationResult {
        let outputs = evaluate_instances(self.circ, &self.instances, self.threads);

        let Some(correct) = outputs.iter().flatten().next() else {
            return EvaluationResult::InvalidWireFound;
        };

        for wire in 0..self.circ.outputs().len() {
            if let Some(proof) = self.extract_proof(&outputs, wire) {
                return EvaluationResult::FoundProofOfCheating(proof);
            }
        }

        EvaluationResult::ValidOutput(correct.values.clone())
    }

    fn extract_proof(&self, outputs: &[Option<CircuitOutput>], wire: usize) -> Option<Block> {
        let mut seen: [Option<(usize, Block)>; 2] = [None, None];

        for (j, output) in outputs.iter().enumerate() {
            let Some(output) = output else {
                continue;
            };

            let bit = output.values[wire];
            seen[bit as usize] = Some((j, output.keys[wire]));

            if let [Some((j0, k0)), Some((j1, k1))] = seen {
                let proof = (k0 ^ self.ciphers.cipher(wire, j0, false))
                    ^ (k1 ^ self.ciphers.cipher(wire, j1, true));

                if HashedProof::new(proof) == self.ciphers.hashed_proof {
                    return Some(proof);
                }
            }
        }

        None
    }
}
