/*
 * keyceremony: key-splitting ceremony engine and shell
 * Copyright (C) 2024-2026 keyceremony authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use rand::{CryptoRng, RngCore};

/// A field element of `GF(2^8)` with reduction polynomial
/// `x^8 + x^4 + x^3 + x + 1` (0x11B) -- the same field AES uses.
///
/// Multiplication and division are table lookups (discrete log under the
/// generator 0x03). The tables are built at compile time from the bit-serial
/// reference multiply, so there is no hand-transcribed constant data that
/// could silently disagree with the field.
// NOTE: PartialEq is not timing-safe.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct GfElem(u8);

/// (x, y) in GF.
pub type GfPoint = (GfElem, GfElem);

// The full reduction polynomial, including the x^8 term.
const POLYNOMIAL: u16 = 0x11b;

// 0x03 generates the whole multiplicative group of this field.
const GENERATOR: u8 = 0x03;

/// Russian Peasant multiplication over GF(2^8), reducing by `POLYNOMIAL`
/// whenever the accumulator leaves the field. This is the reference
/// implementation: the log/exp tables are derived from it at compile time
/// and the test suite cross-checks the two.
const fn peasant_mul(a: u8, mut b: u8) -> u8 {
    let mut product: u16 = 0;
    let mut shifted = a as u16;
    while b != 0 {
        if b & 1 == 1 {
            product ^= shifted;
        }
        shifted <<= 1;
        if shifted & 0x100 != 0 {
            shifted ^= POLYNOMIAL;
        }
        b >>= 1;
    }
    (product & 0xff) as u8
}

// LOG[x] is the discrete log of x base GENERATOR (LOG[0] is meaningless and
// never read). EXP holds two periods of the generator's powers so that both
// LOG[a] + LOG[b] and LOG[a] + 255 - LOG[b] index without a modulo.
const fn build_tables() -> ([u8; 256], [u8; 510]) {
    let mut log = [0u8; 256];
    let mut exp = [0u8; 510];
    let mut x: u8 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x;
        exp[i + 255] = x;
        log[x as usize] = i as u8;
        x = peasant_mul(x, GENERATOR);
        i += 1;
    }
    (log, exp)
}

const TABLES: ([u8; 256], [u8; 510]) = build_tables();
static LOG: [u8; 256] = TABLES.0;
static EXP: [u8; 510] = TABLES.1;

impl GfElem {
    /// Additive identity.
    pub const ZERO: GfElem = GfElem(0);

    /// Multiplicative identity.
    pub const ONE: GfElem = GfElem(1);

    pub fn new_rand<R: CryptoRng + RngCore + ?Sized>(r: &mut R) -> Self {
        let mut byte = [0u8; 1];
        r.fill_bytes(&mut byte);
        Self(byte[0])
    }

    pub const fn from_byte(v: u8) -> Self {
        Self(v)
    }

    pub const fn to_byte(self) -> u8 {
        self.0
    }

    /// The multiplicative inverse, or `None` for the zero element.
    pub fn inverse(self) -> Option<Self> {
        match self.0 {
            0 => None,
            a => Some(Self(EXP[255 - LOG[a as usize] as usize])),
        }
    }
}

impl Add for GfElem {
    type Output = Self;
    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl AddAssign for GfElem {
    fn add_assign(&mut self, rhs: Self) {
        // Addition in GF(2^n) is XOR.
        #![allow(clippy::suspicious_op_assign_impl)]
        self.0 ^= rhs.0
    }
}

impl Sub for GfElem {
    type Output = Self;
    fn sub(mut self, rhs: Self) -> Self::Output {
        self -= rhs;
        self
    }
}

impl SubAssign for GfElem {
    fn sub_assign(&mut self, rhs: Self) {
        // Subtraction in GF(2^n) is identical to addition.
        #![allow(clippy::suspicious_op_assign_impl)]
        *self += rhs
    }
}

impl Neg for GfElem {
    type Output = Self;
    fn neg(self) -> Self::Output {
        // Every element is its own additive inverse.
        self
    }
}

impl Mul for GfElem {
    type Output = Self;
    fn mul(mut self, rhs: Self) -> Self::Output {
        self *= rhs;
        self
    }
}

impl MulAssign for GfElem {
    fn mul_assign(&mut self, rhs: Self) {
        self.0 = match (self.0, rhs.0) {
            (0, _) | (_, 0) => 0,
            (a, b) => EXP[LOG[a as usize] as usize + LOG[b as usize] as usize],
        };
    }
}

impl Div for GfElem {
    type Output = Self;
    fn div(mut self, rhs: Self) -> Self::Output {
        self /= rhs;
        self
    }
}

impl DivAssign for GfElem {
    fn div_assign(&mut self, rhs: Self) {
        #![allow(clippy::suspicious_op_assign_impl)]
        *self *= rhs.inverse().expect("rhs cannot be inverted")
    }
}

/// A polynomial over GF(256) with coefficients in *increasing* degree
/// (`x^0, x^1, ..., x^{k-1}`). For secret sharing the constant term is the
/// secret byte and the remaining coefficients are fresh randomness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfPolynomial(Vec<GfElem>);

impl GfPolynomial {
    /// Build a degree `k-1` polynomial whose constant term is `constant` and
    /// whose other `k-1` coefficients are drawn uniformly from the field.
    pub fn new_rand<R: CryptoRng + RngCore + ?Sized>(
        constant: GfElem,
        k: usize,
        r: &mut R,
    ) -> Self {
        let mut coeffs = Vec::with_capacity(k);
        coeffs.push(constant);
        coeffs.extend((1..k).map(|_| GfElem::new_rand(r)));
        Self(coeffs)
    }

    #[cfg(test)]
    pub(crate) fn from_coeffs(coeffs: Vec<GfElem>) -> Self {
        assert!(!coeffs.is_empty());
        Self(coeffs)
    }

    pub fn constant(&self) -> GfElem {
        *self
            .0
            .first()
            .expect("GfPolynomial must have at least one coefficient")
    }

    /// Evaluate with Horner's method -- O(k) multiplies and adds.
    pub fn evaluate(&self, x: GfElem) -> GfElem {
        self.0
            .iter()
            .rev()
            .copied()
            .reduce(|acc, coeff| coeff + x * acc)
            .expect("GfPolynomial must have at least one coefficient")
    }
}

/// Interpolate the constant term of the polynomial passing through `points`
/// -- Lagrange interpolation evaluated at x = 0:
///
///   L(0)   = \sum_j y_j l_j(0)
///   l_j(0) = \prod_{m != j} x_m / (x_j + x_m)
///
/// All x values must be distinct and non-zero. The shamir codec validates
/// that before calling in, so a zero denominator here is a programming error
/// rather than bad user input.
pub fn lagrange_zero(points: &[GfPoint]) -> GfElem {
    points
        .iter()
        .enumerate()
        .fold(GfElem::ZERO, |acc, (j, &(xj, yj))| {
            let basis = points
                .iter()
                .enumerate()
                .filter(|&(m, _)| m != j)
                .fold(GfElem::ONE, |l, (_, &(xm, _))| l * (xm / (xj + xm)));
            acc + yj * basis
        })
}

/// The Lagrange basis values at x = 0 for a fixed set of x coordinates.
///
/// When interpolating many polynomials that share one x set (one polynomial
/// per secret byte) the basis only needs computing once.
pub fn lagrange_zero_basis(xs: &[GfElem]) -> Vec<GfElem> {
    xs.iter()
        .enumerate()
        .map(|(j, &xj)| {
            xs.iter()
                .enumerate()
                .filter(|&(m, _)| m != j)
                .fold(GfElem::ONE, |l, (_, &xm)| l * (xm / (xj + xm)))
        })
        .collect()
}

#[cfg(test)]
impl quickcheck::Arbitrary for GfElem {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Self(u8::arbitrary(g))
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.0.shrink().into_iter().map(Self))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use quickcheck::TestResult;
    use rand::rngs::OsRng;

    #[quickcheck]
    fn mul_matches_peasant_reference(a: GfElem, b: GfElem) -> bool {
        (a * b).to_byte() == peasant_mul(a.to_byte(), b.to_byte())
    }

    #[quickcheck]
    fn add_commutativity(a: GfElem, b: GfElem) -> bool {
        (a + b) == (b + a)
    }

    #[quickcheck]
    fn mul_commutativity(a: GfElem, b: GfElem) -> bool {
        (a * b) == (b * a)
    }

    #[quickcheck]
    fn add_associativity(a: GfElem, b: GfElem, c: GfElem) -> bool {
        ((a + b) + c) == (a + (b + c))
    }

    #[quickcheck]
    fn mul_associativity(a: GfElem, b: GfElem, c: GfElem) -> bool {
        ((a * b) * c) == (a * (b * c))
    }

    #[quickcheck]
    fn add_identity(a: GfElem) -> bool {
        (a + GfElem::ZERO) == a
    }

    #[quickcheck]
    fn mul_identity(a: GfElem) -> bool {
        (a * GfElem::ONE) == a
    }

    #[quickcheck]
    fn mul_zero_annihilates(a: GfElem) -> bool {
        (a * GfElem::ZERO) == GfElem::ZERO
    }

    #[quickcheck]
    fn add_self_inverse(a: GfElem) -> bool {
        a - a == GfElem::ZERO
    }

    #[quickcheck]
    fn distributivity(a: GfElem, b: GfElem, c: GfElem) -> bool {
        (a * (b + c)) == ((a * b) + (a * c))
    }

    #[quickcheck]
    fn div_mul_invertibility(a: GfElem, b: GfElem) -> TestResult {
        match b {
            GfElem::ZERO => TestResult::discard(),
            _ => TestResult::from_bool((a / b) * b == a),
        }
    }

    #[test]
    fn every_nonzero_element_inverts() {
        for a in 1..=255u8 {
            let a = GfElem::from_byte(a);
            let a_inv = a.inverse().expect("non-zero element must invert");
            assert_eq!(a * a_inv, GfElem::ONE, "a = {:?}", a);
        }
    }

    #[test]
    fn zero_has_no_inverse() {
        assert_eq!(GfElem::ZERO.inverse(), None);
    }

    #[test]
    fn known_products() {
        // 0x57 * 0x83 = 0xc1 is the worked example from the AES spec.
        let product = GfElem::from_byte(0x57) * GfElem::from_byte(0x83);
        assert_eq!(product.to_byte(), 0xc1);
        // Doubling 0x80 wraps through the reduction polynomial.
        let wrapped = GfElem::from_byte(0x80) * GfElem::from_byte(0x02);
        assert_eq!(wrapped.to_byte(), 0x1b);
    }

    // Inefficient but obviously-correct evaluation to compare Horner against.
    fn manual_poly(poly: &GfPolynomial, x: GfElem) -> GfElem {
        poly.0
            .iter()
            .enumerate()
            .map(|(n, &coeff)| {
                let mut power = GfElem::ONE;
                for _ in 0..n {
                    power *= x;
                }
                coeff * power
            })
            .reduce(Add::add)
            .expect("must be at least one coefficient")
    }

    #[quickcheck]
    fn polynomial_evaluate(coeffs: Vec<GfElem>, x: GfElem) -> TestResult {
        if coeffs.is_empty() {
            return TestResult::discard();
        }
        let poly = GfPolynomial::from_coeffs(coeffs);
        TestResult::from_bool(poly.evaluate(x) == manual_poly(&poly, x))
    }

    #[test]
    fn polynomial_constant_is_secret() {
        let secret = GfElem::from_byte(0xa5);
        let poly = GfPolynomial::new_rand(secret, 5, &mut OsRng);
        assert_eq!(poly.constant(), secret);
        assert_eq!(poly.evaluate(GfElem::ZERO), secret);
    }

    #[quickcheck]
    fn lagrange_recovers_constant(coeffs: Vec<GfElem>) -> TestResult {
        // Interpolating a degree k-1 polynomial needs k distinct non-zero xs,
        // so the coefficient count is capped by the field size.
        if coeffs.is_empty() || coeffs.len() > 255 {
            return TestResult::discard();
        }
        let poly = GfPolynomial::from_coeffs(coeffs.clone());
        let points = (1..=coeffs.len() as u8)
            .map(|x| {
                let x = GfElem::from_byte(x);
                (x, poly.evaluate(x))
            })
            .collect::<Vec<_>>();
        TestResult::from_bool(lagrange_zero(&points) == poly.constant())
    }

    #[quickcheck]
    fn basis_matches_direct_interpolation(coeffs: Vec<GfElem>) -> TestResult {
        if coeffs.is_empty() || coeffs.len() > 255 {
            return TestResult::discard();
        }
        let poly = GfPolynomial::from_coeffs(coeffs.clone());
        let xs = (1..=coeffs.len() as u8)
            .map(GfElem::from_byte)
            .collect::<Vec<_>>();
        let points = xs
            .iter()
            .map(|&x| (x, poly.evaluate(x)))
            .collect::<Vec<_>>();

        let basis = lagrange_zero_basis(&xs);
        let combined = points
            .iter()
            .zip(&basis)
            .fold(GfElem::ZERO, |acc, (&(_, y), &l)| acc + y * l);

        TestResult::from_bool(combined == lagrange_zero(&points))
    }
}
