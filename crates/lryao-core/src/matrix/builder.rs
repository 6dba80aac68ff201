use rand::Rng;

use super::{MatrixError, ProbeResistantMatrix};

/// Irreducible polynomials over GF(2), indexed by degree, including the leading term.
const IRREDUCIBLE: [u32; 17] = [
    0, 0, 0x7, 0xb, 0x13, 0x25, 0x43, 0x83, 0x11b, 0x211, 0x409, 0x805, 0x1009, 0x201b, 0x4021,
    0x8003, 0x1002b,
];

/// Builds a k-probe-resistant matrix `(M | I)` for `n` input bits.
///
/// Each row of `M` is a random polynomial of degree `K − 1` over `GF(2^t)` evaluated at the
/// points `1..=N`, every evaluation written as `t` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResistantMatrixBuilder {
    n: usize,
    k: usize,
    t: usize,
    big_k: usize,
    big_n: usize,
}

impl ProbeResistantMatrixBuilder {
    /// Computes the matrix dimensions for `n` input bits and security parameter `k`.
    pub fn new(n: usize, k: usize) -> Result<Self, MatrixError> {
        if n == 0 || k == 0 {
            return Err(MatrixError::Unsupported(format!("n = {n}, k = {k}")));
        }

        let log_n = (n as f64).log2();
        let numerator = log_n + n as f64 + k as f64;

        let mut t = ((4 * n) as f64).log2().max(((4 * k) as f64).log2()).ceil() as usize;
        while t > 2 && (1u64 << (t - 1)) as f64 > k as f64 + numerator / (t - 1) as f64 {
            t -= 1;
        }

        if t >= IRREDUCIBLE.len() {
            return Err(MatrixError::Unsupported(format!(
                "field GF(2^{t}) is too large"
            )));
        }

        let big_k = (numerator / t as f64).ceil() as usize;
        let big_n = big_k + k - 1;

        Ok(Self {
            n,
            k,
            t,
            big_k,
            big_n,
        })
    }

    /// Returns the field degree `t`.
    pub fn t(&self) -> usize {
        self.t
    }

    /// Returns the number of columns of `M`, `N·t`.
    pub fn redundancy(&self) -> usize {
        self.big_n * self.t
    }

    /// Returns the total number of columns, the extended input length.
    pub fn m(&self) -> usize {
        self.redundancy() + self.n
    }

    /// Builds a fresh matrix.
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> ProbeResistantMatrix {
        let field = Gf2t::new(self.t);

        let rows = (0..self.n)
            .map(|i| {
                let coefficients: Vec<u32> = (0..self.big_k).map(|_| field.random(rng)).collect();

                let mut row = Vec::with_capacity(self.m());
                for x in 1..=self.big_n {
                    let value = field.evaluate(&coefficients, field.element(x as u32));
                    row.extend((0..self.t).map(|bit| (value >> bit) & 1 == 1));
                }
                row.extend((0..self.n).map(|j| i == j));

                row
            })
            .collect();

        ProbeResistantMatrix { rows }
    }
}

/// Arithmetic in `GF(2^t)` for small `t`.
struct Gf2t {
    t: usize,
    modulus: u32,
}

impl Gf2t {
    fn new(t: usize) -> Self {
        Self {
            t,
            modulus: IRREDUCIBLE[t],
        }
    }

    fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(0..(1u32 << self.t))
    }

    /// Maps an integer to a field element by reducing it modulo the field polynomial.
    fn element(&self, mut x: u32) -> u32 {
        let mut bits = 32 - x.leading_zeros() as usize;
        while bits > self.t {
            x ^= self.modulus << (bits - 1 - self.t);
            bits = 32 - x.leading_zeros() as usize;
        }
        x
    }

    fn mul(&self, mut a: u32, mut b: u32) -> u32 {
        let mut out = 0;
        while b != 0 {
            if b & 1 == 1 {
                out ^= a;
            }
            b >>= 1;
            a <<= 1;
            if a >> self.t & 1 == 1 {
                a ^= self.modulus;
            }
        }
        out
    }

    /// Horner evaluation of the polynomial with the given coefficients, constant term first.
    fn evaluate(&self, coefficients: &[u32], x: u32) -> u32 {
        coefficients
            .iter()
            .rev()
            .fold(0, |acc, c| self.mul(acc, x) ^ c)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(32, 8, 5, 80)]
    #[case(32, 40, 6, 312)]
    #[case(128, 8, 6, 186)]
    fn test_dimensions(
        #[case] n: usize,
        #[case] k: usize,
        #[case] t: usize,
        #[case] redundancy: usize,
    ) {
        let builder = ProbeResistantMatrixBuilder::new(n, k).unwrap();

        assert_eq!(builder.t(), t);
        assert_eq!(builder.redundancy(), redundancy);
        assert_eq!(builder.m(), redundancy + n);
    }

    #[test]
    fn test_build_appends_identity() {
        let mut rng = StdRng::seed_from_u64(0);
        let builder = ProbeResistantMatrixBuilder::new(16, 4).unwrap();
        let matrix = builder.build(&mut rng);

        assert_eq!(matrix.n(), 16);
        assert_eq!(matrix.m(), builder.m());
        for i in 0..16 {
            let identity = &matrix.row(i)[builder.redundancy()..];
            for (j, bit) in identity.iter().enumerate() {
                assert_eq!(*bit, i == j);
            }
        }
    }

    #[test]
    fn test_field_arithmetic() {
        let field = Gf2t::new(8);

        // AES field: 0x53 · 0xca = 0x01.
        assert_eq!(field.mul(0x53, 0xca), 0x01);
        assert_eq!(field.mul(0x57, 0x83), 0xc1);
        assert_eq!(field.element(0x100), 0x1b);
        assert_eq!(field.evaluate(&[1, 0, 1], 2), 5);
    }
}
