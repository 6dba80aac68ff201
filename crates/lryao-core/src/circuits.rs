//! Circuits used by the protocol and its tests.

use crate::circuit::{Circuit, CircuitBuilder, Party};

/// An `n`-bit adder, `a + b mod 2^n`.
///
/// P1 provides `a`, P2 provides `b`, both least significant bit first.
pub fn adder(n: usize) -> Circuit {
    assert!(n > 0, "adder must have at least one bit");

    let mut builder = CircuitBuilder::new();
    let a = builder.add_inputs(Party::P1, n);
    let b = builder.add_inputs(Party::P2, n);

    let mut carry = None;
    for i in 0..n {
        let a_xor_b = builder.xor(a[i], b[i]);
        let (sum, next) = match carry {
            None => (a_xor_b, builder.and(a[i], b[i])),
            Some(c) => {
                let sum = builder.xor(a_xor_b, c);
                // c' = (a & b) ^ (c & (a ^ b))
                let ab = builder.and(a[i], b[i]);
                let cab = builder.and(c, a_xor_b);
                (sum, builder.xor(ab, cab))
            }
        };
        builder.add_output(sum);
        carry = Some(next);
    }

    builder.build().expect("adder circuit is well formed")
}

/// Bitwise XOR of two `n`-bit values.
pub fn xor(n: usize) -> Circuit {
    assert!(n > 0, "xor must have at least one bit");

    let mut builder = CircuitBuilder::new();
    let a = builder.add_inputs(Party::P1, n);
    let b = builder.add_inputs(Party::P2, n);

    for (a, b) in a.into_iter().zip(b) {
        let z = builder.xor(a, b);
        builder.add_output(z);
    }

    builder.build().expect("xor circuit is well formed")
}

/// The cheating-recovery unlock circuit.
///
/// P1 provides its `n`-bit input `x`, P2 provides a single bit `b` which is set only when P2 knows
/// the proof of cheating. Outputs `x` if `b` is set, otherwise zeros.
pub fn unlock_input(n: usize) -> Circuit {
    assert!(n > 0, "unlock circuit must have at least one bit");

    let mut builder = CircuitBuilder::new();
    let x = builder.add_inputs(Party::P1, n);
    let b = builder.add_input(Party::P2);

    for x in x {
        let z = builder.and(x, b);
        builder.add_output(z);
    }

    builder.build().expect("unlock circuit is well formed")
}

/// Converts a value to `n` bits, least significant bit first.
pub fn to_bits(value: u64, n: usize) -> Vec<bool> {
    (0..n).map(|i| i < 64 && (value >> i) & 1 == 1).collect()
}

/// Converts bits, least significant bit first, to a value.
pub fn from_bits(bits: &[bool]) -> u64 {
    bits.iter()
        .take(64)
        .enumerate()
        .fold(0, |acc, (i, bit)| acc | ((*bit as u64) << i))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(3, 5)]
    #[case(0, 0)]
    #[case(u32::MAX as u64, 1)]
    #[case(123_456, 654_321)]
    fn test_adder(#[case] a: u64, #[case] b: u64) {
        let circ = adder(32);
        let out = circ.evaluate(&to_bits(a, 32), &to_bits(b, 32)).unwrap();

        assert_eq!(from_bits(&out), (a + b) & 0xffff_ffff);
    }

    #[test]
    fn test_unlock_input() {
        let circ = unlock_input(8);
        let x = to_bits(0xa5, 8);

        assert_eq!(from_bits(&circ.evaluate(&x, &[true]).unwrap()), 0xa5);
        assert_eq!(from_bits(&circ.evaluate(&x, &[false]).unwrap()), 0);
    }

    #[test]
    fn test_xor() {
        let circ = xor(8);
        let out = circ
            .evaluate(&to_bits(0b1100, 8), &to_bits(0b1010, 8))
            .unwrap();

        assert_eq!(from_bits(&out), 0b0110);
    }
}
