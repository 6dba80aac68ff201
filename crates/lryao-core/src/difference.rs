//! Commitments with proofs of difference.
//!
//! The committer holds one secret bit string per circuit (its placement mask) and commits to it
//! `s` times as pairs `(Com(x ⊕ r_i), Com(r_i))`. For two committed secrets it can later reveal
//! `x1 ⊕ x2` and prove the value is consistent with the commitments without opening either secret:
//! it sends, per repetition, `(x1 ⊕ r1_i ⊕ x2 ⊕ r2_i, r1_i ⊕ r2_i)` and opens the side selected by
//! the receiver's challenge bit `w_i`. The challenge is committed before any commitment is seen,
//! so a committer claiming a wrong difference is caught except with probability `2^-s`.
//!
//! The receiver also sends its cut-and-choose selection encrypted under a committed key `k`. Once
//! the selection is revealed the receiver opens `k`, and the committer checks the revealed
//! selection is the one fixed at setup.

pub mod committer;
pub mod receiver;

use aes::Aes128;
use cipher::{generic_array::GenericArray, KeyIvInit, StreamCipher};
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};

pub use committer::Committer;
pub use receiver::Receiver;

use crate::{
    commit::{Commitment, Decommitment, HashCommit},
    selection::CutAndChooseSelection,
    Block, CheatError,
};

type Aes128Ctr = ctr::Ctr64BE<Aes128>;

/// Errors of the difference protocol.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum DifferenceError {
    #[error(transparent)]
    Cheat(#[from] CheatError),
    #[error("invalid secrets: {0}")]
    InvalidSecrets(String),
    #[error("circuit {0} has no committed secret")]
    InvalidCircuit(usize),
    #[error("invalid bucket: {0}")]
    InvalidBucket(String),
}

/// Commitments for one repetition, `(Com(x ⊕ r), Com(r))`.
#[derive(Clone, Serialize, Deserialize)]
pub struct SCom {
    decommitments: [Decommitment<Vec<bool>>; 2],
    commitments: [Commitment; 2],
}

opaque_debug::implement!(SCom);

impl SCom {
    fn new<R: Rng + CryptoRng + ?Sized>(x: &[bool], rng: &mut R) -> Self {
        let r: Vec<bool> = (0..x.len()).map(|_| rng.gen()).collect();
        let (d0, c0) = xor(x, &r).hash_commit_with(rng.gen());
        let (d1, c1) = r.hash_commit_with(rng.gen());

        Self {
            decommitments: [d0, d1],
            commitments: [c0, c1],
        }
    }

    /// Returns the opened values `[x ⊕ r, r]`.
    fn values(&self) -> [&[bool]; 2] {
        [
            self.decommitments[0].data(),
            self.decommitments[1].data(),
        ]
    }
}

/// The `s` repetitions committing to one secret.
#[derive(Clone, Serialize, Deserialize)]
pub struct SC {
    reps: Vec<SCom>,
}

opaque_debug::implement!(SC);

impl SC {
    fn new<R: Rng + CryptoRng + ?Sized>(x: &[bool], s: usize, rng: &mut R) -> Self {
        Self {
            reps: (0..s).map(|_| SCom::new(x, rng)).collect(),
        }
    }

    /// Returns the commitment pairs of every repetition.
    pub fn commitments(&self) -> Vec<[Commitment; 2]> {
        self.reps.iter().map(|rep| rep.commitments).collect()
    }

    fn decommitment(&self, i: usize, sigma: bool) -> &Decommitment<Vec<bool>> {
        &self.reps[i].decommitments[sigma as usize]
    }
}

/// The committer's material for one circuit, kept with the circuit's bundle.
#[derive(Clone, Serialize, Deserialize)]
pub struct DifferenceCommitterBundle {
    x: Vec<bool>,
    c: SC,
}

opaque_debug::implement!(DifferenceCommitterBundle);

impl DifferenceCommitterBundle {
    /// Returns the committed secret.
    pub fn secret(&self) -> &[bool] {
        &self.x
    }

    #[cfg(test)]
    pub(crate) fn corrupt(&mut self, rep: usize, sigma: bool) {
        let decommitment = &mut self.c.reps[rep].decommitments[sigma as usize];
        *decommitment = Decommitment::new_with_nonce(decommitment.data().clone(), Block::ONES);
    }
}

/// The receiver's material for one circuit, kept with the circuit's limited bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifferenceReceiverBundle {
    commitments: Vec<[Commitment; 2]>,
}

/// Sent by the receiver to open the protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifferenceSetup {
    /// Commitment to the challenge `w`.
    pub w: Commitment,
    /// Commitment to the selection key `k`.
    pub k: Commitment,
    /// The cut-and-choose selection encrypted under `k`.
    pub encrypted_selection: Vec<u8>,
}

/// The committer's commitments, per circuit and repetition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifferenceCommitments {
    /// `commitments[j][i]` is repetition `i` of circuit `j`.
    pub commitments: Vec<Vec<[Commitment; 2]>>,
}

/// Opens every repetition of a checked circuit's secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretOpening {
    /// The secret.
    pub x: Vec<bool>,
    /// Per repetition, the openings of `Com(x ⊕ r_i)` and `Com(r_i)`.
    pub openings: Vec<[Decommitment<Vec<bool>>; 2]>,
}

/// The claimed differences of a bucket and the per-repetition deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProveDifference {
    /// `differences[p]` is `x_p ⊕ x_{p+1}`.
    pub differences: Vec<Vec<bool>>,
    /// `deltas[p][i]` is `[x_p ⊕ r_{p,i} ⊕ x_{p+1} ⊕ r_{p+1,i}, r_{p,i} ⊕ r_{p+1,i}]`.
    pub deltas: Vec<Vec<[Vec<bool>; 2]>>,
}

/// Openings selected by the challenge, per adjacent pair and repetition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifferenceOpenings {
    /// `openings[p][i]` opens side `w_i` of repetition `i` for circuits `p` and `p + 1`.
    pub openings: Vec<Vec<[Decommitment<Vec<bool>>; 2]>>,
}

pub(crate) fn xor(a: &[bool], b: &[bool]) -> Vec<bool> {
    a.iter().zip(b).map(|(a, b)| a ^ b).collect()
}

fn apply_keystream(key: Block, data: &mut [u8]) {
    let mut cipher = Aes128Ctr::new(
        &GenericArray::from(key.to_bytes()),
        &GenericArray::from([0u8; 16]),
    );
    cipher.apply_keystream(data);
}

pub(crate) fn encrypt_selection(key: Block, selection: &CutAndChooseSelection) -> Vec<u8> {
    let mut bytes = bincode::serialize(selection).expect("selection is serializable");
    apply_keystream(key, &mut bytes);
    bytes
}

pub(crate) fn decrypt_selection(
    key: Block,
    ciphertext: &[u8],
) -> Result<CutAndChooseSelection, CheatError> {
    let mut bytes = ciphertext.to_vec();
    apply_keystream(key, &mut bytes);

    bincode::deserialize(&bytes)
        .map_err(|_| CheatError::new("encrypted selection does not decrypt to a selection"))
}
