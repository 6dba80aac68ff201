use serde::{Deserialize, Serialize};

use super::Labels;
use crate::{
    commit::Commitment,
    commitments::{CommitmentBundle, CommitmentsPackage},
    difference::DifferenceReceiverBundle,
    garble::{GarbledTables, TranslationTable},
    Block, CheatError,
};

/// Everything P2 receives about an evaluated circuit during cut-and-choose.
///
/// Assembled field by field while the exchange progresses, then finalized once.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct LimitedBundleConfig {
    pub garbled_tables: GarbledTables,
    pub translation_table: TranslationTable,
    pub labels: Labels,
    pub commitments: CommitmentsPackage,
    pub difference: DifferenceReceiverBundle,
}

impl LimitedBundleConfig {
    /// Checks the received commitments match the labels and builds the limited bundle.
    pub fn finalize(self) -> Result<LimitedBundle, CheatError> {
        let Self {
            garbled_tables,
            translation_table,
            labels,
            commitments,
            difference,
        } = self;

        if translation_table.len() != labels.output.len() {
            return Err(CheatError::new(format!(
                "translation table has {} entries, expected {}",
                translation_table.len(),
                labels.output.len()
            )));
        }

        let CommitmentsPackage {
            commitment_mask,
            x,
            y1_extended,
            y2,
            output,
            ..
        } = commitments;

        Ok(LimitedBundle {
            commitments_x: CommitmentBundle::from_commitments(labels.x.clone(), x)?,
            commitments_y1_extended: CommitmentBundle::from_commitments(
                labels.y1_extended.clone(),
                y1_extended,
            )?,
            commitments_y2: CommitmentBundle::from_commitments(labels.y2.clone(), y2)?,
            garbled_tables,
            translation_table,
            labels,
            commitment_mask_commitment: commitment_mask,
            output_commitment: output,
            difference,
            placement_mask_difference: None,
            y1: None,
            y1_extended_keys: None,
        })
    }
}

/// P2's record of one evaluated circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitedBundle {
    garbled_tables: GarbledTables,
    translation_table: TranslationTable,
    labels: Labels,
    commitments_x: CommitmentBundle,
    commitments_y1_extended: CommitmentBundle,
    commitments_y2: CommitmentBundle,
    commitment_mask_commitment: Commitment,
    output_commitment: Commitment,
    difference: DifferenceReceiverBundle,
    placement_mask_difference: Option<Vec<bool>>,
    y1: Option<Vec<bool>>,
    y1_extended_keys: Option<Vec<Block>>,
}

impl LimitedBundle {
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

    /// Returns the commitment to the commitment mask.
    pub fn commitment_mask_commitment(&self) -> &Commitment {
        &self.commitment_mask_commitment
    }

    /// Returns the commitment to the output keys.
    pub fn output_commitment(&self) -> &Commitment {
        &self.output_commitment
    }

    /// Returns the difference protocol commitments.
    pub fn difference(&self) -> &DifferenceReceiverBundle {
        &self.difference
    }

    /// Returns the placement mask difference to the next circuit of the bucket.
    ///
    /// `None` for the last circuit of a bucket.
    pub fn placement_mask_difference(&self) -> Option<&[bool]> {
        self.placement_mask_difference.as_deref()
    }

    /// Sets the placement mask difference to the next circuit of the bucket.
    pub fn set_placement_mask_difference(&mut self, difference: Vec<bool>) {
        self.placement_mask_difference = Some(difference);
    }

    /// Returns the random P2 input share chosen for the bucket during OT.
    pub fn y1(&self) -> Option<&[bool]> {
        self.y1.as_deref()
    }

    /// Sets the random P2 input share.
    pub fn set_y1(&mut self, y1: Vec<bool>) {
        self.y1 = Some(y1);
    }

    /// Returns the extended P2 input keys received through OT, still blinded by the commitment
    /// mask.
    pub fn y1_extended_keys(&self) -> Option<&[Block]> {
        self.y1_extended_keys.as_deref()
    }

    /// Sets the blinded extended P2 input keys.
    pub fn set_y1_extended_keys(&mut self, keys: Vec<Block>) {
        self.y1_extended_keys = Some(keys);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::{
        bundle::BundleBuilder,
        circuits::adder,
        commit::HashCommit,
        difference::{Committer, Receiver},
        matrix::ProbeResistantMatrixBuilder,
        selection::{EvaluateAllSelectionBuilder, SelectionBuilder},
    };

    fn config(rng: &mut StdRng) -> LimitedBundleConfig {
        let matrix = ProbeResistantMatrixBuilder::new(4, 4).unwrap().build(rng);
        let builder = BundleBuilder::new(Arc::new(adder(4)), Arc::new(matrix)).unwrap();
        let bundle = builder.build(rng.gen()).unwrap();

        let selection = EvaluateAllSelectionBuilder.build(1, rng).unwrap();
        let (receiver, setup) = Receiver::new(selection, 4, rng).setup();
        let committer = Committer::new(vec![bundle.placement_mask().to_vec()], 4).unwrap();
        let (_, msg) = committer.commit(setup, rng);
        let receiver = receiver.receive_commitments(msg).unwrap();

        let (_, seed) = bundle.seed().hash_commit();

        LimitedBundleConfig {
            garbled_tables: bundle.garbled_tables().clone(),
            translation_table: bundle.translation_table().clone(),
            labels: builder.labels(),
            commitments: bundle.commitments_package(seed),
            difference: receiver.bundle(0).unwrap(),
        }
    }

    #[test]
    fn test_finalize() {
        let mut rng = StdRng::seed_from_u64(0);
        let config = config(&mut rng);
        let expected = config.commitments.x.clone();

        let mut bundle = config.finalize().unwrap();
        assert_eq!(bundle.commitments_x().commitments(), expected.as_slice());
        assert!(bundle.placement_mask_difference().is_none());
        assert!(bundle.y1().is_none());

        bundle.set_y1(vec![true, false, true, true]);
        bundle.set_placement_mask_difference(vec![false; 4]);
        assert_eq!(bundle.y1(), Some([true, false, true, true].as_slice()));
        assert_eq!(bundle.placement_mask_difference(), Some([false; 4].as_slice()));
    }

    #[test]
    fn test_finalize_rejects_short_commitments() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut config = config(&mut rng);
        config.commitments.y2.pop();

        assert!(config.finalize().is_err());
    }
}
