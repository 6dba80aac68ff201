//! The committer of the difference protocol, run by P1 over its placement masks.

use rand::{CryptoRng, Rng};

use super::{
    decrypt_selection, xor, DifferenceCommitments, DifferenceCommitterBundle, DifferenceError,
    DifferenceOpenings, DifferenceSetup, ProveDifference, SecretOpening, SC,
};
use crate::{commit::Decommitment, selection::CutAndChooseSelection, Block, CheatError};

/// Committer state.
pub mod state {
    use super::*;

    mod sealed {
        pub trait Sealed {}

        impl Sealed for super::Initialized {}
        impl Sealed for super::Committed {}
    }

    /// The committer's state.
    pub trait State: sealed::Sealed {}

    /// The committer holds its secrets.
    pub struct Initialized {
        pub(super) secrets: Vec<Vec<bool>>,
    }

    impl State for Initialized {}

    opaque_debug::implement!(Initialized);

    /// The committer has sent its commitments.
    pub struct Committed {
        pub(super) secrets: Vec<Vec<bool>>,
        pub(super) commitments: Vec<SC>,
        pub(super) setup: DifferenceSetup,
    }

    impl State for Committed {}

    opaque_debug::implement!(Committed);
}

use state::State;

/// Commits to secrets and proves differences between them.
#[derive(Debug)]
pub struct Committer<T: State = state::Initialized> {
    s: usize,
    state: T,
}

impl Committer {
    /// Creates a committer for the secrets, one per circuit, with `s` repetitions each.
    pub fn new(secrets: Vec<Vec<bool>>, s: usize) -> Result<Self, DifferenceError> {
        let n = secrets
            .first()
            .map(Vec::len)
            .ok_or_else(|| DifferenceError::InvalidSecrets("no secrets".to_string()))?;

        if secrets.iter().any(|x| x.len() != n) {
            return Err(DifferenceError::InvalidSecrets(
                "secrets must have equal length".to_string(),
            ));
        }

        if s == 0 {
            return Err(DifferenceError::InvalidSecrets(
                "at least one repetition is required".to_string(),
            ));
        }

        Ok(Self {
            s,
            state: state::Initialized { secrets },
        })
    }
}

impl Committer<state::Initialized> {
    /// Receives the receiver's setup and commits to every secret.
    pub fn commit<R: Rng + CryptoRng + ?Sized>(
        self,
        setup: DifferenceSetup,
        rng: &mut R,
    ) -> (Committer<state::Committed>, DifferenceCommitments) {
        let state::Initialized { secrets } = self.state;

        let commitments: Vec<SC> = secrets.iter().map(|x| SC::new(x, self.s, rng)).collect();
        let msg = DifferenceCommitments {
            commitments: commitments.iter().map(SC::commitments).collect(),
        };

        (
            Committer {
                s: self.s,
                state: state::Committed {
                    secrets,
                    commitments,
                    setup,
                },
            },
            msg,
        )
    }
}

impl Committer<state::Committed> {
    /// Opens the selection key and decrypts the selection fixed at setup.
    pub fn receive_selection(
        &self,
        k: &Decommitment<Block>,
    ) -> Result<CutAndChooseSelection, DifferenceError> {
        k.verify(&self.state.setup.k)
            .map_err(|_| CheatError::new("decommitment of k failed!"))?;

        let selection = decrypt_selection(*k.data(), &self.state.setup.encrypted_selection)?;
        if selection.len() != self.state.secrets.len() {
            return Err(CheatError::new(format!(
                "selection covers {} circuits, expected {}",
                selection.len(),
                self.state.secrets.len()
            ))
            .into());
        }

        Ok(selection)
    }

    /// Opens every repetition of the secret of a checked circuit.
    pub fn open(&self, circuit: usize) -> Result<SecretOpening, DifferenceError> {
        let bundle = self.bundle(circuit)?;

        Ok(SecretOpening {
            x: bundle.x,
            openings: bundle
                .c
                .reps
                .into_iter()
                .map(|rep| rep.decommitments)
                .collect(),
        })
    }

    /// Returns the material of circuit `circuit`, to be kept with its bundle.
    pub fn bundle(&self, circuit: usize) -> Result<DifferenceCommitterBundle, DifferenceError> {
        let x = self
            .state
            .secrets
            .get(circuit)
            .ok_or(DifferenceError::InvalidCircuit(circuit))?;

        Ok(DifferenceCommitterBundle {
            x: x.clone(),
            c: self.state.commitments[circuit].clone(),
        })
    }

    /// Computes the differences of adjacent secrets in a bucket and the per-repetition deltas.
    pub fn prove_differences(
        &self,
        bucket: &[&DifferenceCommitterBundle],
    ) -> Result<ProveDifference, DifferenceError> {
        self.check_bucket(bucket)?;

        let mut differences = Vec::with_capacity(bucket.len() - 1);
        let mut deltas = Vec::with_capacity(bucket.len() - 1);
        for pair in bucket.windows(2) {
            let (b1, b2) = (pair[0], pair[1]);
            differences.push(xor(&b1.x, &b2.x));
            deltas.push(
                b1.c.reps
                    .iter()
                    .zip(&b2.c.reps)
                    .map(|(r1, r2)| {
                        let [p0, p1] = r1.values();
                        let [q0, q1] = r2.values();
                        [xor(p0, q0), xor(p1, q1)]
                    })
                    .collect(),
            );
        }

        Ok(ProveDifference {
            differences,
            deltas,
        })
    }

    /// Receives the opened challenge and opens the selected side of every repetition.
    pub fn open_differences(
        &self,
        bucket: &[&DifferenceCommitterBundle],
        w: &Decommitment<Vec<bool>>,
    ) -> Result<DifferenceOpenings, DifferenceError> {
        self.check_bucket(bucket)?;

        w.verify(&self.state.setup.w)
            .map_err(|_| CheatError::new("decommitment of w failed!"))?;

        let w = w.data();
        if w.len() != self.s {
            return Err(CheatError::new(format!(
                "challenge has {} bits, expected {}",
                w.len(),
                self.s
            ))
            .into());
        }

        let openings = bucket
            .windows(2)
            .map(|pair| {
                w.iter()
                    .enumerate()
                    .map(|(i, w_i)| {
                        [
                            pair[0].c.decommitment(i, *w_i).clone(),
                            pair[1].c.decommitment(i, *w_i).clone(),
                        ]
                    })
                    .collect()
            })
            .collect();

        Ok(DifferenceOpenings { openings })
    }

    fn check_bucket(&self, bucket: &[&DifferenceCommitterBundle]) -> Result<(), DifferenceError> {
        if bucket.is_empty() {
            return Err(DifferenceError::InvalidBucket("bucket is empty".to_string()));
        }

        if bucket.iter().any(|b| b.c.reps.len() != self.s) {
            return Err(DifferenceError::InvalidBucket(format!(
                "every bundle must hold {} repetitions",
                self.s
            )));
        }

        Ok(())
    }
}
