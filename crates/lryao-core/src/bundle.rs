//! Per-circuit bundles.
//!
//! A [`Bundle`] is everything P1 keeps about one garbled circuit: the seed it was built from, its
//! key material and the decommitments of every key commitment. A [`LimitedBundle`] is P2's view of
//! the same circuit: the garbled tables, the commitments, and the values learned during the
//! offline phase.

mod builder;
mod limited;

use serde::{Deserialize, Serialize};

pub use builder::{BundleBuilder, BundleError, GarblingStrategy, PROOF_LABELS};
pub use limited::{LimitedBundle, LimitedBundleConfig};

use crate::{
    commit::{Commitment, Decommitment},
    commitments::{CommitmentBundle, CommitmentsPackage},
    difference::DifferenceCommitterBundle,
    garble::{GarbledTables, TranslationTable},
    Block,
};

/// Wire labels of each key group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labels {
    /// P1 input wires.
    pub x: Vec<usize>,
    /// Extended P2 input wires.
    pub y1_extended: Vec<usize>,
    /// P2 input wires of the second share.
    pub y2: Vec<usize>,
    /// Output wires.
    pub output: Vec<usize>,
}

/// P1's record of one garbled circuit.
#[derive(Clone, Serialize, Deserialize)]
pub struct Bundle {
    seed: Block,
    garbled_tables: GarbledTables,
    translation_table: TranslationTable,
    labels: Labels,
    placement_mask: Vec<bool>,
    commitment_mask: Decommitment<Block>,
    keys_x: Vec<[Block; 2]>,
    keys_y1_extended: Vec<[Block; 2]>,
    keys_y2: Vec<[Block; 2]>,
    output_keys: Vec<[Block; 2]>,
    commitments_x: CommitmentBundle,
    commitments_y1_extended: CommitmentBundle,
    commitments_y2: CommitmentBundle,
    output_commitment: Commitment,
    output_decommitment: Decommitment<Vec<[Block; 2]>>,
    proof_of_cheating: Option<Block>,
    difference: Option<DifferenceCommitterBundle>,
}

opaque_debug::implement!(Bundle);

impl Bundle {
    /// Returns the seed the bundle was built from.
    pub fn seed(&self) -> Block {
        self.seed
    }

    /// Returns the garbled tables.
    pub fn garbled_tables(&self) -> &GarbledTables {
        &self.garbled_tables
    }

    /// Returns the translation table.
    pub fn translation_table(&self) -> &TranslationTable {
        &self.translation_table
    }

    /// Returns the wire labels.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Returns the placement mask, the pointer bit of each P1 input 0-key.
    pub fn placement_mask(&self) -> &[bool] {
        &self.placement_mask
    }

    /// Returns the commitment mask.
    pub fn commitment_mask(&self) -> Block {
        *self.commitment_mask.data()
    }

    /// Returns the decommitment of the commitment mask.
    pub fn commitment_mask_decommitment(&self) -> &Decommitment<Block> {
        &self.commitment_mask
    }

    /// Returns the P1 input key pairs.
    pub fn keys_x(&self) -> &[[Block; 2]] {
        &self.keys_x
    }

    /// Returns the extended P2 input key pairs.
    pub fn keys_y1_extended(&self) -> &[[Block; 2]] {
        &self.keys_y1_extended
    }

    /// Returns the key pairs of the second P2 share.
    pub fn keys_y2(&self) -> &[[Block; 2]] {
        &self.keys_y2
    }

    /// Returns the output key pairs.
    pub fn output_keys(&self) -> &[[Block; 2]] {
        &self.output_keys
    }

    /// Returns the commitments to the P1 input keys.
    pub fn commitments_x(&self) -> &CommitmentBundle {
        &self.commitments_x
    }

    /// Returns the commitments to the extended P2 input keys.
    pub fn commitments_y1_extended(&self) -> &CommitmentBundle {
        &self.commitments_y1_extended
    }

    /// Returns the commitments to the second P2 share.
    pub fn commitments_y2(&self) -> &CommitmentBundle {
        &self.commitments_y2
    }

    /// Returns the commitment to the output keys.
    pub fn output_commitment(&self) -> &Commitment {
        &self.output_commitment
    }

    /// Returns the decommitment of the output keys.
    pub fn output_decommitment(&self) -> &Decommitment<Vec<[Block; 2]>> {
        &self.output_decommitment
    }

    /// Returns the proof of cheating shared into the P2 keys, for cheating-recovery bundles.
    pub fn proof_of_cheating(&self) -> Option<Block> {
        self.proof_of_cheating
    }

    /// Returns the difference protocol material.
    pub fn difference(&self) -> Option<&DifferenceCommitterBundle> {
        self.difference.as_ref()
    }

    /// Sets the difference protocol material.
    pub fn set_difference(&mut self, difference: DifferenceCommitterBundle) {
        self.difference = Some(difference);
    }

    /// Returns the commitments sent to the verifier for this circuit.
    pub fn commitments_package(&self, seed: Commitment) -> CommitmentsPackage {
        CommitmentsPackage {
            seed,
            commitment_mask: self.commitment_mask.commit(),
            x: self.commitments_x.commitments().to_vec(),
            y1_extended: self.commitments_y1_extended.commitments().to_vec(),
            y2: self.commitments_y2.commitments().to_vec(),
            output: self.output_commitment,
        }
    }
}
