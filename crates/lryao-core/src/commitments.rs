//! Key commitments and the packages exchanged during cut-and-choose.

use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    commit::{Commitment, Decommitment, HashCommit},
    difference::SecretOpening,
    Block, CheatError,
};

/// Commitments to the key pairs of a group of wires.
///
/// Every committed key is blinded with the commitment mask. When a placement mask is used, position
/// `σ` of wire `i` holds the key for bit `σ ⊕ pm_i`, otherwise it holds the key for bit `σ`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentBundle {
    labels: Vec<usize>,
    commitments: Vec<[Commitment; 2]>,
    decommitments: Option<Vec<[Decommitment<Block>; 2]>>,
}

impl CommitmentBundle {
    /// Commits to the key pairs, keeping the decommitments.
    pub fn commit<R: Rng + CryptoRng + ?Sized>(
        labels: Vec<usize>,
        keys: &[[Block; 2]],
        commitment_mask: Block,
        placement_mask: Option<&[bool]>,
        rng: &mut R,
    ) -> Self {
        assert_eq!(labels.len(), keys.len(), "one label per key pair");

        let mut commitments = Vec::with_capacity(keys.len());
        let mut decommitments = Vec::with_capacity(keys.len());
        for (i, pair) in keys.iter().enumerate() {
            let flip = placement_mask.map(|mask| mask[i]).unwrap_or(false);
            let mut open = |sigma: usize| {
                let key = pair[sigma ^ flip as usize] ^ commitment_mask;
                key.hash_commit_with(rng.gen())
            };

            let (d0, c0) = open(0);
            let (d1, c1) = open(1);
            commitments.push([c0, c1]);
            decommitments.push([d0, d1]);
        }

        Self {
            labels,
            commitments,
            decommitments: Some(decommitments),
        }
    }

    /// Creates a bundle from commitments received from the peer.
    pub fn from_commitments(
        labels: Vec<usize>,
        commitments: Vec<[Commitment; 2]>,
    ) -> Result<Self, CheatError> {
        if labels.len() != commitments.len() {
            return Err(CheatError::new(format!(
                "expected {} commitment pairs, got {}",
                labels.len(),
                commitments.len()
            )));
        }

        Ok(Self {
            labels,
            commitments,
            decommitments: None,
        })
    }

    /// Returns the wire labels.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Returns the number of committed wires.
    pub fn len(&self) -> usize {
        self.commitments.len()
    }

    /// Returns `true` if no wires are committed.
    pub fn is_empty(&self) -> bool {
        self.commitments.is_empty()
    }

    /// Returns all commitment pairs.
    pub fn commitments(&self) -> &[[Commitment; 2]] {
        &self.commitments
    }

    /// Returns the commitment at position `sigma` of wire `i`.
    pub fn commitment(&self, i: usize, sigma: bool) -> Option<&Commitment> {
        self.commitments.get(i).map(|pair| &pair[sigma as usize])
    }

    /// Returns the decommitment at position `sigma` of wire `i`, if held.
    pub fn decommitment(&self, i: usize, sigma: bool) -> Option<&Decommitment<Block>> {
        self.decommitments
            .as_ref()
            .and_then(|decommitments| decommitments.get(i))
            .map(|pair| &pair[sigma as usize])
    }

    /// Verifies a decommitment opens position `sigma` of wire `i`, returning the masked key.
    pub fn open(
        &self,
        i: usize,
        sigma: bool,
        decommitment: &Decommitment<Block>,
    ) -> Result<Block, CheatError> {
        let commitment = self.commitment(i, sigma).ok_or_else(|| {
            CheatError::new(format!("no commitment for wire {i} of {}", self.len()))
        })?;

        decommitment.verify(commitment).map_err(|_| {
            CheatError::new(format!(
                "decommitment failed for label={} and sigma={}",
                self.labels[i], sigma as u8
            ))
        })?;

        Ok(*decommitment.data())
    }

    /// Checks both bundles hold the same commitments.
    pub fn verify_equal(&self, other: &Self) -> Result<(), CheatError> {
        if self.len() != other.len() {
            return Err(CheatError::new(format!(
                "commitment bundles differ in length: {} != {}",
                self.len(),
                other.len()
            )));
        }

        for (i, (a, b)) in self.commitments.iter().zip(&other.commitments).enumerate() {
            for sigma in 0..2 {
                if a[sigma] != b[sigma] {
                    return Err(CheatError::new(format!(
                        "commitments differ for label={} and sigma={}",
                        self.labels[i], sigma
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Commitments sent by the prover for one circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitmentsPackage {
    /// Commitment to the circuit seed.
    pub seed: Commitment,
    /// Commitment to the commitment mask.
    pub commitment_mask: Commitment,
    /// Commitments to the P1 input keys.
    pub x: Vec<[Commitment; 2]>,
    /// Commitments to the extended P2 input keys.
    pub y1_extended: Vec<[Commitment; 2]>,
    /// Commitments to the second share of the P2 input keys.
    pub y2: Vec<[Commitment; 2]>,
    /// Commitment to all output keys.
    pub output: Commitment,
}

/// The opening of one checked circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckedCircuitOpening {
    /// Opens the seed commitment.
    pub seed: Decommitment<Block>,
    /// Opens the commitment mask commitment.
    pub commitment_mask: Decommitment<Block>,
    /// Opens the placement mask committed in the difference protocol.
    pub difference: SecretOpening,
}

/// Openings of every checked circuit, in ascending circuit order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecommitmentsPackage {
    /// The openings.
    pub openings: Vec<CheckedCircuitOpening>,
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::garble::Delta;

    fn pairs(rng: &mut StdRng, n: usize) -> Vec<[Block; 2]> {
        let delta = Delta::random(rng).into_inner();
        (0..n)
            .map(|_| {
                let key: Block = rng.gen();
                [key, key ^ delta]
            })
            .collect()
    }

    #[test]
    fn test_placement_mask_orders_positions() {
        let mut rng = StdRng::seed_from_u64(0);
        let keys = pairs(&mut rng, 4);
        let mask: Block = rng.gen();
        let placement = [false, true, true, false];

        let bundle = CommitmentBundle::commit(
            (0..4).collect(),
            &keys,
            mask,
            Some(&placement),
            &mut rng,
        );

        for (i, pm) in placement.iter().enumerate() {
            for sigma in [false, true] {
                let decommitment = bundle.decommitment(i, sigma).unwrap();
                let key = bundle.open(i, sigma, decommitment).unwrap() ^ mask;
                assert_eq!(key, keys[i][(sigma ^ pm) as usize]);
            }
        }
    }

    #[test]
    fn test_verify_equal_reports_label() {
        let mut rng = StdRng::seed_from_u64(0);
        let keys = pairs(&mut rng, 3);
        let labels = vec![10, 11, 12];

        let a = CommitmentBundle::commit(labels.clone(), &keys, Block::ZERO, None, &mut rng);
        let mut commitments = a.commitments().to_vec();
        assert!(CommitmentBundle::from_commitments(labels.clone(), commitments.clone())
            .unwrap()
            .verify_equal(&a)
            .is_ok());

        commitments[2].swap(0, 1);
        let b = CommitmentBundle::from_commitments(labels, commitments).unwrap();
        let err = b.verify_equal(&a).unwrap_err();

        assert_eq!(err.reason(), "commitments differ for label=12 and sigma=0");
    }

    #[test]
    fn test_open_rejects_wrong_position() {
        let mut rng = StdRng::seed_from_u64(0);
        let keys = pairs(&mut rng, 2);
        let bundle = CommitmentBundle::commit(vec![0, 1], &keys, Block::ZERO, None, &mut rng);

        let decommitment = bundle.decommitment(0, false).unwrap().clone();
        assert!(bundle.open(0, true, &decommitment).is_err());
        assert!(bundle.open(1, false, &decommitment).is_err());
    }
}
