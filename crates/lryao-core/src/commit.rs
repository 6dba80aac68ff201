//! Hash commitments.
//!
//! A commitment to `data` is `BLAKE3(nonce || bincode(data))` where `nonce` is a random [`Block`].

use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};

use crate::Block;

/// A hash commitment.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment([u8; 32]);

impl Commitment {
    /// Returns the commitment bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Commitment({})", hex::encode(self.0))
    }
}

/// The opening of a [`Commitment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decommitment<T> {
    nonce: Block,
    data: T,
}

/// Error returned when a decommitment does not open a commitment.
#[derive(Debug, thiserror::Error)]
#[error("decommitment does not match the commitment")]
pub struct CommitmentError;

impl<T: Serialize> Decommitment<T> {
    /// Creates a decommitment with a random nonce.
    pub fn new(data: T) -> Self {
        Self::new_with_nonce(data, thread_rng().gen())
    }

    /// Creates a decommitment with the provided nonce.
    pub fn new_with_nonce(data: T, nonce: Block) -> Self {
        Self { nonce, data }
    }

    /// Computes the commitment.
    pub fn commit(&self) -> Commitment {
        hash(&self.nonce, &self.data)
    }

    /// Verifies this decommitment opens the given commitment.
    pub fn verify(&self, commitment: &Commitment) -> Result<(), CommitmentError> {
        if &self.commit() == commitment {
            Ok(())
        } else {
            Err(CommitmentError)
        }
    }

    /// Returns the nonce.
    pub fn nonce(&self) -> &Block {
        &self.nonce
    }

    /// Returns the committed data.
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Returns the committed data, consuming the decommitment.
    pub fn into_inner(self) -> T {
        self.data
    }
}

/// A trait for committing to arbitrary serializable data.
pub trait HashCommit: Serialize + Sized {
    /// Commits with a random nonce.
    fn hash_commit(self) -> (Decommitment<Self>, Commitment) {
        let decommitment = Decommitment::new(self);
        let commitment = decommitment.commit();

        (decommitment, commitment)
    }

    /// Commits with the provided nonce.
    fn hash_commit_with(self, nonce: Block) -> (Decommitment<Self>, Commitment) {
        let decommitment = Decommitment::new_with_nonce(self, nonce);
        let commitment = decommitment.commit();

        (decommitment, commitment)
    }
}

impl<T: Serialize> HashCommit for T {}

fn hash<T: Serialize>(nonce: &Block, data: &T) -> Commitment {
    let mut hasher = blake3::Hasher::new();
    hasher.update(nonce.as_bytes());
    bincode::serialize_into(&mut hasher, data).expect("serialization into a hasher is infallible");

    Commitment(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_verify() {
        let (decommitment, commitment) = vec![1u8, 2, 3].hash_commit();

        assert!(decommitment.verify(&commitment).is_ok());
        assert_eq!(decommitment.data(), &vec![1u8, 2, 3]);
    }

    #[test]
    fn test_commit_binds_data_and_nonce() {
        let nonce = Block::from(42u128);
        let (_, commitment) = 7u64.hash_commit_with(nonce);

        assert!(Decommitment::new_with_nonce(8u64, nonce)
            .verify(&commitment)
            .is_err());
        assert!(Decommitment::new_with_nonce(7u64, Block::from(43u128))
            .verify(&commitment)
            .is_err());
        assert!(Decommitment::new_with_nonce(7u64, nonce)
            .verify(&commitment)
            .is_ok());
    }
}
