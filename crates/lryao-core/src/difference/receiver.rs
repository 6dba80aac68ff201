//! The receiver of the difference protocol, run by P2.

use rand::{CryptoRng, Rng};

use super::{
    encrypt_selection, xor, DifferenceCommitments, DifferenceError, DifferenceOpenings,
    DifferenceReceiverBundle, DifferenceSetup, ProveDifference, SecretOpening,
};
use crate::{
    commit::{Commitment, Decommitment},
    selection::CutAndChooseSelection,
    Block, CheatError,
};

/// Receiver state.
pub mod state {
    use super::*;

    mod sealed {
        pub trait Sealed {}

        impl Sealed for super::Initialized {}
        impl Sealed for super::Setup {}
        impl Sealed for super::Committed {}
    }

    /// The receiver's state.
    pub trait State: sealed::Sealed {}

    /// The receiver has chosen its challenge and selection key.
    pub struct Initialized {
        pub(super) selection: CutAndChooseSelection,
        pub(super) w: Decommitment<Vec<bool>>,
        pub(super) k: Decommitment<Block>,
    }

    impl State for Initialized {}

    opaque_debug::implement!(Initialized);

    /// The receiver has sent its setup message.
    pub struct Setup {
        pub(super) selection: CutAndChooseSelection,
        pub(super) w: Decommitment<Vec<bool>>,
        pub(super) k: Decommitment<Block>,
    }

    impl State for Setup {}

    opaque_debug::implement!(Setup);

    /// The receiver holds the committer's commitments.
    pub struct Committed {
        pub(super) w: Decommitment<Vec<bool>>,
        pub(super) k: Decommitment<Block>,
        pub(super) commitments: Vec<Vec<[Commitment; 2]>>,
    }

    impl State for Committed {}

    opaque_debug::implement!(Committed);
}

use state::State;

/// Receives commitments and verifies claimed differences.
#[derive(Debug)]
pub struct Receiver<T: State = state::Initialized> {
    s: usize,
    state: T,
}

impl Receiver {
    /// Creates a receiver with `s` repetitions, bound to the selection.
    pub fn new<R: Rng + CryptoRng + ?Sized>(
        selection: CutAndChooseSelection,
        s: usize,
        rng: &mut R,
    ) -> Self {
        let w: Vec<bool> = (0..s).map(|_| rng.gen()).collect();
        let k: Block = rng.gen();

        Self {
            s,
            state: state::Initialized {
                selection,
                w: Decommitment::new_with_nonce(w, rng.gen()),
                k: Decommitment::new_with_nonce(k, rng.gen()),
            },
        }
    }

    /// Commits to the challenge and the selection key, encrypting the selection.
    pub fn setup(self) -> (Receiver<state::Setup>, DifferenceSetup) {
        let state::Initialized { selection, w, k } = self.state;

        let msg = DifferenceSetup {
            w: w.commit(),
            k: k.commit(),
            encrypted_selection: encrypt_selection(*k.data(), &selection),
        };

        (
            Receiver {
                s: self.s,
                state: state::Setup { selection, w, k },
            },
            msg,
        )
    }
}

impl Receiver<state::Setup> {
    /// Receives the committer's commitments, one group per circuit of the selection.
    pub fn receive_commitments(
        self,
        msg: DifferenceCommitments,
    ) -> Result<Receiver<state::Committed>, DifferenceError> {
        let state::Setup { selection, w, k } = self.state;

        if msg.commitments.len() != selection.len() {
            return Err(CheatError::new(format!(
                "expected commitments for {} circuits, got {}",
                selection.len(),
                msg.commitments.len()
            ))
            .into());
        }

        if let Some(j) = msg.commitments.iter().position(|c| c.len() != self.s) {
            return Err(CheatError::new(format!(
                "circuit {j} has {} repetitions, expected {}",
                msg.commitments[j].len(),
                self.s
            ))
            .into());
        }

        Ok(Receiver {
            s: self.s,
            state: state::Committed {
                w,
                k,
                commitments: msg.commitments,
            },
        })
    }
}

impl Receiver<state::Committed> {
    /// Opens the selection key.
    pub fn reveal_selection(&self) -> Decommitment<Block> {
        self.state.k.clone()
    }

    /// Opens the challenge.
    pub fn reveal_challenge(&self) -> Decommitment<Vec<bool>> {
        self.state.w.clone()
    }

    /// Returns the commitments of circuit `circuit`, to be kept with its limited bundle.
    pub fn bundle(&self, circuit: usize) -> Result<DifferenceReceiverBundle, DifferenceError> {
        self.state
            .commitments
            .get(circuit)
            .map(|commitments| DifferenceReceiverBundle {
                commitments: commitments.clone(),
            })
            .ok_or(DifferenceError::InvalidCircuit(circuit))
    }

    /// Verifies the opening of a checked circuit's secret, returning the secret.
    pub fn verify_opening(
        &self,
        circuit: usize,
        opening: &SecretOpening,
    ) -> Result<Vec<bool>, DifferenceError> {
        let commitments = self
            .state
            .commitments
            .get(circuit)
            .ok_or(DifferenceError::InvalidCircuit(circuit))?;

        if opening.openings.len() != self.s {
            return Err(CheatError::new(format!(
                "opening of circuit {circuit} has {} repetitions, expected {}",
                opening.openings.len(),
                self.s
            ))
            .into());
        }

        for (i, (pair, [d0, d1])) in commitments.iter().zip(&opening.openings).enumerate() {
            let opens = d0.verify(&pair[0]).is_ok() && d1.verify(&pair[1]).is_ok();
            let n = opening.x.len();
            if !opens
                || d0.data().len() != n
                || d1.data().len() != n
                || xor(d0.data(), d1.data()) != opening.x
            {
                return Err(CheatError::new(format!(
                    "decommitment failed! for circuit {circuit} and repetition {i}"
                ))
                .into());
            }
        }

        Ok(opening.x.clone())
    }

    /// Checks every delta pair XORs to the claimed difference.
    pub fn check_differences(
        &self,
        bucket: &[&DifferenceReceiverBundle],
        msg: &ProveDifference,
    ) -> Result<(), DifferenceError> {
        let pairs = bucket.len().saturating_sub(1);
        if msg.differences.len() != pairs || msg.deltas.len() != pairs {
            return Err(CheatError::new(format!(
                "expected {pairs} differences, got {}",
                msg.differences.len()
            ))
            .into());
        }

        for (index, (difference, deltas)) in msg.differences.iter().zip(&msg.deltas).enumerate() {
            if deltas.len() != self.s {
                return Err(CheatError::new(format!(
                    "difference {index} has {} repetitions, expected {}",
                    deltas.len(),
                    self.s
                ))
                .into());
            }

            for (i, [d0, d1]) in deltas.iter().enumerate() {
                let n = difference.len();
                if d0.len() != n || d1.len() != n || &xor(d0, d1) != difference {
                    return Err(CheatError::new(format!(
                        "d0_i ^ d1_i != delta for i = {i} and k = {index}"
                    ))
                    .into());
                }
            }
        }

        Ok(())
    }

    /// Verifies the opened sides against the commitments, returning the adjacent differences.
    pub fn verify_differences(
        &self,
        bucket: &[&DifferenceReceiverBundle],
        msg: &ProveDifference,
        openings: &DifferenceOpenings,
    ) -> Result<Vec<Vec<bool>>, DifferenceError> {
        self.check_differences(bucket, msg)?;

        if openings.openings.len() != msg.deltas.len() {
            return Err(CheatError::new("openings do not cover every difference").into());
        }

        let w = self.state.w.data();
        for (index, (pair, opened)) in bucket.windows(2).zip(&openings.openings).enumerate() {
            if opened.len() != self.s {
                return Err(CheatError::new(format!(
                    "openings of difference {index} have {} repetitions, expected {}",
                    opened.len(),
                    self.s
                ))
                .into());
            }

            for (i, [d1, d2]) in opened.iter().enumerate() {
                let side = w[i] as usize;
                let opens = d1.verify(&pair[0].commitments[i][side]).is_ok()
                    && d2.verify(&pair[1].commitments[i][side]).is_ok();

                let delta = &msg.deltas[index][i][side];
                if !opens
                    || d1.data().len() != delta.len()
                    || d2.data().len() != delta.len()
                    || &xor(d1.data(), d2.data()) != delta
                {
                    return Err(CheatError::new(format!(
                        "Decom(c_i^w_i) xor Decom(c_i^w_i) != delta_i^w_i for i = {i} and k = {index}"
                    ))
                    .into());
                }
            }
        }

        Ok(msg.differences.clone())
    }
}
