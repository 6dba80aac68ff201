//! Deterministic randomness derived from a circuit seed.
//!
//! Every random choice made while building a bundle comes from one of the streams below, so a
//! revealed seed lets the verifier rebuild the bundle exactly.

use rand_chacha::ChaCha12Rng;
use rand_core::SeedableRng;

use crate::Block;

const GARBLING_CONTEXT: &str = "lryao garbling randomness v1";
const P2_INPUT_KEYS_CONTEXT: &str = "lryao p2 input keys randomness v1";
const MASKS_CONTEXT: &str = "lryao masks randomness v1";
const COMMITMENTS_CONTEXT: &str = "lryao commitments randomness v1";

/// Independent random streams keyed by a single seed.
#[derive(Clone)]
pub struct SeededRandomness {
    seed: Block,
}

opaque_debug::implement!(SeededRandomness);

impl SeededRandomness {
    /// Creates a new provider from the seed.
    pub fn new(seed: Block) -> Self {
        Self { seed }
    }

    /// Returns the seed.
    pub fn seed(&self) -> Block {
        self.seed
    }

    /// Stream used to garble the circuit.
    pub fn garbling(&self) -> ChaCha12Rng {
        self.stream(GARBLING_CONTEXT)
    }

    /// Stream used to split and extend the P2 input keys.
    pub fn p2_input_keys(&self) -> ChaCha12Rng {
        self.stream(P2_INPUT_KEYS_CONTEXT)
    }

    /// Stream used for the commitment mask.
    pub fn masks(&self) -> ChaCha12Rng {
        self.stream(MASKS_CONTEXT)
    }

    /// Stream used for commitment nonces.
    pub fn commitments(&self) -> ChaCha12Rng {
        self.stream(COMMITMENTS_CONTEXT)
    }

    fn stream(&self, context: &str) -> ChaCha12Rng {
        ChaCha12Rng::from_seed(blake3::derive_key(context, self.seed.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn test_streams_are_deterministic_and_independent() {
        let a = SeededRandomness::new(Block::from(1u128));
        let b = SeededRandomness::new(Block::from(1u128));

        let x: Block = a.garbling().gen();
        assert_eq!(x, b.garbling().gen::<Block>());
        assert_ne!(x, a.masks().gen::<Block>());
        assert_ne!(x, a.commitments().gen::<Block>());
        assert_ne!(x, a.p2_input_keys().gen::<Block>());

        let c = SeededRandomness::new(Block::from(2u128));
        assert_ne!(x, c.garbling().gen::<Block>());
    }
}
