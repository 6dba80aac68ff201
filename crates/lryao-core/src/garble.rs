//! Half-gates garbling with free-XOR.
//!
//! All wire keys of a garbled circuit share a global offset `Δ` such that the 1-key of a wire is
//! its 0-key XOR `Δ`. The pointer bit of `Δ` is set, so the pointer bits of the two keys of a wire
//! always differ.
//!
//! The translation table holds the pointer bit of the 0-key of each output wire, so the value of an
//! output wire is the pointer bit of its active key XOR its translation bit.

use aes::Aes128;
use cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use once_cell::sync::Lazy;
use rand::{distributions::Standard, prelude::Distribution, CryptoRng, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    circuit::{Circuit, Gate},
    Block,
};

const FIXED_KEY: [u8; 16] = [
    0x61, 0x7e, 0x8d, 0xa2, 0xa0, 0x51, 0x1e, 0x96, 0x5e, 0x41, 0xc2, 0x9b, 0x15, 0x3f, 0xc7, 0x7a,
];

static FIXED_KEY_AES: Lazy<Aes128> = Lazy::new(|| Aes128::new(&GenericArray::from(FIXED_KEY)));

/// Tweakable correlation-robust hash built from fixed-key AES.
#[inline]
fn tccr(block: Block, tweak: u64) -> Block {
    let x = block ^ Block::from(tweak as u128);
    let mut out = GenericArray::from(x.to_bytes());
    FIXED_KEY_AES.encrypt_block(&mut out);

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&out);

    Block::new(bytes) ^ x
}

/// Global free-XOR offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta(Block);

impl Delta {
    /// Creates a new delta, setting the pointer bit to 1.
    #[inline]
    pub fn new(mut value: Block) -> Self {
        value.set_lsb();
        Self(value)
    }

    /// Generates a random delta.
    #[inline]
    pub fn random<R: Rng + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        Self::new(rng.gen())
    }

    /// Returns the inner block.
    #[inline]
    pub fn into_inner(self) -> Block {
        self.0
    }
}

impl Distribution<Delta> for Standard {
    #[inline]
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Delta {
        Delta::new(self.sample(rng))
    }
}

impl From<Delta> for Block {
    fn from(delta: Delta) -> Self {
        delta.0
    }
}

/// Encrypted AND gate, the generator and evaluator half-gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedGate([Block; 2]);

/// The encrypted gates of a garbled circuit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarbledTables(Vec<EncryptedGate>);

impl GarbledTables {
    /// Returns the number of encrypted gates.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no encrypted gates.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn corrupt(&mut self, gate: usize) {
        self.0[gate].0[0] ^= Block::ONES;
        self.0[gate].0[1] ^= Block::ONES;
    }
}

/// Per output wire, the pointer bit of the 0-key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationTable(Vec<bool>);

impl TranslationTable {
    /// Returns the number of output wires.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Translates output keys into output values.
    pub fn translate(&self, keys: &[Block]) -> Result<Vec<bool>, GarbleError> {
        if keys.len() != self.0.len() {
            return Err(GarbleError::InvalidOutputCount {
                expected: self.0.len(),
                actual: keys.len(),
            });
        }

        Ok(keys
            .iter()
            .zip(&self.0)
            .map(|(key, bit)| key.lsb() ^ bit)
            .collect())
    }
}

/// Errors that can occur while evaluating a garbled circuit.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum GarbleError {
    #[error("invalid input count: expected {expected}, got {actual}")]
    InvalidInputCount { expected: usize, actual: usize },
    #[error("invalid garbled table count: expected {expected}, got {actual}")]
    InvalidTableCount { expected: usize, actual: usize },
    #[error("invalid output count: expected {expected}, got {actual}")]
    InvalidOutputCount { expected: usize, actual: usize },
}

/// The generator's view of a garbled circuit.
#[derive(Debug, Clone)]
pub struct GarbledCircuit {
    /// Encrypted gates.
    pub tables: GarbledTables,
    /// Translation table.
    pub translation_table: TranslationTable,
    /// Input key pairs in flattened order, P1 first.
    pub input_keys: Vec<[Block; 2]>,
    /// Output key pairs.
    pub output_keys: Vec<[Block; 2]>,
    /// Global offset.
    pub delta: Delta,
}

/// Garbles a circuit with fresh keys drawn from `rng`.
pub fn garble<R: Rng + CryptoRng + ?Sized>(circ: &Circuit, rng: &mut R) -> GarbledCircuit {
    let delta = Delta::random(rng);
    let delta_block = delta.into_inner();

    let mut keys = vec![Block::ZERO; circ.wire_count()];
    let mut input_keys = Vec::with_capacity(circ.input_len());
    for wire in circ.all_input_wires() {
        let key: Block = rng.gen();
        keys[wire] = key;
        input_keys.push([key, key ^ delta_block]);
    }

    let mut tables = Vec::with_capacity(circ.and_count());
    for gate in circ.gates() {
        match *gate {
            Gate::Xor { x, y, z } => keys[z] = keys[x] ^ keys[y],
            Gate::Inv { x, z } => keys[z] = keys[x] ^ delta_block,
            Gate::And { x, y, z } => {
                let gid = tables.len() as u64;
                let (z0, gate) = and_gate(keys[x], keys[y], delta_block, gid);
                keys[z] = z0;
                tables.push(gate);
            }
        }
    }

    let output_keys: Vec<[Block; 2]> = circ
        .outputs()
        .iter()
        .map(|wire| [keys[*wire], keys[*wire] ^ delta_block])
        .collect();

    let translation_table =
        TranslationTable(output_keys.iter().map(|pair| pair[0].lsb()).collect());

    GarbledCircuit {
        tables: GarbledTables(tables),
        translation_table,
        input_keys,
        output_keys,
        delta,
    }
}

#[inline]
fn and_gate(a0: Block, b0: Block, delta: Block, gid: u64) -> (Block, EncryptedGate) {
    let (j, k) = (2 * gid, 2 * gid + 1);
    let a1 = a0 ^ delta;
    let b1 = b0 ^ delta;
    let (pa, pb) = (a0.lsb(), b0.lsb());

    let ha0 = tccr(a0, j);
    let hb0 = tccr(b0, k);

    // Generator half-gate.
    let tg = ha0 ^ tccr(a1, j) ^ delta.select(pb);
    let wg = ha0 ^ tg.select(pa);

    // Evaluator half-gate.
    let te = hb0 ^ tccr(b1, k) ^ a0;
    let we = hb0 ^ (te ^ a0).select(pb);

    (wg ^ we, EncryptedGate([tg, te]))
}

/// Evaluates a garbled circuit, returning the active output keys.
///
/// `inputs` are the active input keys in flattened order, P1 first.
pub fn evaluate(
    circ: &Circuit,
    tables: &GarbledTables,
    inputs: &[Block],
) -> Result<Vec<Block>, GarbleError> {
    if inputs.len() != circ.input_len() {
        return Err(GarbleError::InvalidInputCount {
            expected: circ.input_len(),
            actual: inputs.len(),
        });
    }

    if tables.len() != circ.and_count() {
        return Err(GarbleError::InvalidTableCount {
            expected: circ.and_count(),
            actual: tables.len(),
        });
    }

    let mut keys = vec![Block::ZERO; circ.wire_count()];
    for (wire, key) in circ.all_input_wires().zip(inputs) {
        keys[wire] = *key;
    }

    let mut gid = 0;
    for gate in circ.gates() {
        match *gate {
            Gate::Xor { x, y, z } => keys[z] = keys[x] ^ keys[y],
            Gate::Inv { x, z } => keys[z] = keys[x],
            Gate::And { x, y, z } => {
                let EncryptedGate([tg, te]) = tables.0[gid];
                let (a, b) = (keys[x], keys[y]);
                let (j, k) = (2 * gid as u64, 2 * gid as u64 + 1);

                let wg = tccr(a, j) ^ tg.select(a.lsb());
                let we = tccr(b, k) ^ (te ^ a).select(b.lsb());

                keys[z] = wg ^ we;
                gid += 1;
            }
        }
    }

    Ok(circ.outputs().iter().map(|wire| keys[*wire]).collect())
}

/// Checks every output key is one of the two keys of its wire, returning the decoded values.
///
/// Returns `None` if any key is invalid.
pub fn decode_outputs(keys: &[Block], pairs: &[[Block; 2]]) -> Option<Vec<bool>> {
    if keys.len() != pairs.len() {
        return None;
    }

    keys.iter()
        .zip(pairs)
        .map(|(key, pair)| {
            if key == &pair[0] {
                Some(false)
            } else if key == &pair[1] {
                Some(true)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};
    use rstest::rstest;

    use super::*;
    use crate::circuits::{adder, from_bits, to_bits, unlock_input};

    fn active_keys(keys: &[[Block; 2]], bits: &[bool]) -> Vec<Block> {
        keys.iter()
            .zip(bits)
            .map(|(pair, bit)| pair[*bit as usize])
            .collect()
    }

    #[rstest]
    #[case(3, 5)]
    #[case(0xffff_ffff, 2)]
    #[case(1_000_000, 24_601)]
    fn test_garble_adder(#[case] a: u64, #[case] b: u64) {
        let mut rng = StdRng::seed_from_u64(0);
        let circ = adder(32);
        let gc = garble(&circ, &mut rng);

        let bits: Vec<bool> = to_bits(a, 32).into_iter().chain(to_bits(b, 32)).collect();
        let inputs = active_keys(&gc.input_keys, &bits);

        let outputs = evaluate(&circ, &gc.tables, &inputs).unwrap();
        let values = gc.translation_table.translate(&outputs).unwrap();

        assert_eq!(from_bits(&values), (a + b) & 0xffff_ffff);
        assert_eq!(decode_outputs(&outputs, &gc.output_keys).unwrap(), values);
    }

    #[test]
    fn test_garble_inverter() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut builder = crate::circuit::CircuitBuilder::new();
        let a = builder.add_input(crate::circuit::Party::P1);
        let b = builder.add_input(crate::circuit::Party::P2);
        let c = builder.and(a, b);
        let d = builder.inv(c);
        builder.add_output(d);
        let circ = builder.build().unwrap();

        let gc = garble(&circ, &mut rng);
        for (x, y) in [(false, false), (false, true), (true, false), (true, true)] {
            let inputs = active_keys(&gc.input_keys, &[x, y]);
            let outputs = evaluate(&circ, &gc.tables, &inputs).unwrap();

            assert_eq!(
                gc.translation_table.translate(&outputs).unwrap(),
                vec![!(x & y)]
            );
        }
    }

    #[test]
    fn test_delta_correlation() {
        let mut rng = StdRng::seed_from_u64(0);
        let gc = garble(&unlock_input(4), &mut rng);
        let delta = gc.delta.into_inner();

        assert!(delta.lsb());
        for pair in gc.input_keys.iter().chain(&gc.output_keys) {
            assert_eq!(pair[0] ^ pair[1], delta);
        }
    }

    #[test]
    fn test_corrupted_table_yields_invalid_output() {
        let mut rng = StdRng::seed_from_u64(0);
        let circ = unlock_input(4);
        let mut gc = garble(&circ, &mut rng);
        gc.tables.corrupt(0);

        // One of the two choices for the P2 bit has its pointer bit set, which makes the evaluator
        // read the corrupted half-gate.
        let detected = [false, true].into_iter().any(|b| {
            let bits = [true, false, true, true, b];
            let inputs = active_keys(&gc.input_keys, &bits);
            let outputs = evaluate(&circ, &gc.tables, &inputs).unwrap();

            decode_outputs(&outputs, &gc.output_keys).is_none()
        });

        assert!(detected);
    }

    #[test]
    fn test_evaluate_checks_input_count() {
        let mut rng = StdRng::seed_from_u64(0);
        let circ = adder(8);
        let gc = garble(&circ, &mut rng);

        assert!(matches!(
            evaluate(&circ, &gc.tables, &[Block::ZERO; 3]),
            Err(GarbleError::InvalidInputCount { .. })
        ));
    }
}
