//! # Goldilocks Field
//!
//! Prime field with p = 2^64 - 2^32 + 1. The native prover encodes its
//! witness as elements of this field.

use primitive_types::U256;
use std::ops::{Add, Mul, Neg, Sub};

/// Goldilocks prime: p = 2^64 - 2^32 + 1
pub const GOLDILOCKS_PRIME: u64 = 0xFFFF_FFFF_0000_0001;

/// Element in the Goldilocks field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldElement(u64);

impl FieldElement {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1);

    /// Create new field element (reduces mod p).
    pub fn new(value: u64) -> Self {
        Self(value % GOLDILOCKS_PRIME)
    }

    pub fn from_u128(value: u128) -> Self {
        Self((value % GOLDILOCKS_PRIME as u128) as u64)
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::ONE
        } else {
            Self::ZERO
        }
    }

    /// Reduce the first 8 bytes (big-endian) of a digest.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest[..8]);
        Self::new(u64::from_be_bytes(word))
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// a^(-1) = a^(p-2) mod p
    pub fn inverse(&self) -> Option<Self> {
        if self.0 == 0 {
            return None;
        }
        Some(self.pow(GOLDILOCKS_PRIME - 2))
    }

    /// Exponentiation by squaring.
    pub fn pow(&self, mut exp: u64) -> Self {
        let mut base = *self;
        let mut result = Self::ONE;

        while exp > 0 {
            if exp & 1 == 1 {
                result = result * base;
            }
            base = base * base;
            exp >>= 1;
        }
        result
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Add for FieldElement {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::from_u128(self.0 as u128 + rhs.0 as u128)
    }
}

impl Sub for FieldElement {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        if self.0 >= rhs.0 {
            Self(self.0 - rhs.0)
        } else {
            Self(GOLDILOCKS_PRIME - rhs.0 + self.0)
        }
    }
}

impl Mul for FieldElement {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::from_u128(self.0 as u128 * rhs.0 as u128)
    }
}

impl Neg for FieldElement {
    type Output = Self;

    fn neg(self) -> Self {
        if self.0 == 0 {
            self
        } else {
            Self(GOLDILOCKS_PRIME - self.0)
        }
    }
}

/// Split 32 bytes into eight exact 32-bit limbs, most significant first.
pub fn limbs_of_bytes(bytes: &[u8; 32]) -> [FieldElement; 8] {
    let mut limbs = [FieldElement::ZERO; 8];
    for (limb, chunk) in limbs.iter_mut().zip(bytes.chunks_exact(4)) {
        let mut word = [0u8; 4];
        word.copy_from_slice(chunk);
        *limb = FieldElement::new(u32::from_be_bytes(word) as u64);
    }
    limbs
}

pub fn limbs_of_u256(value: U256) -> [FieldElement; 8] {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    limbs_of_bytes(&bytes)
}

/// Evaluate the polynomial with `coefficients` (lowest degree first) at `x`.
pub fn evaluate(coefficients: &[FieldElement], x: FieldElement) -> FieldElement {
    coefficients
        .iter()
        .rev()
        .fold(FieldElement::ZERO, |acc, c| acc * x + *c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wraparound() {
        let max = FieldElement::new(GOLDILOCKS_PRIME - 1);
        assert_eq!(max + FieldElement::ONE, FieldElement::ZERO);
        assert_eq!(FieldElement::ZERO - FieldElement::ONE, max);
        assert_eq!(-FieldElement::ONE, max);
    }

    #[test]
    fn test_inverse() {
        let a = FieldElement::new(12345);
        let inv = a.inverse().unwrap();
        assert_eq!(a * inv, FieldElement::ONE);
        assert!(FieldElement::ZERO.inverse().is_none());
    }

    #[test]
    fn test_limbs_are_exact() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xFF;
        bytes[31] = 0x01;
        let limbs = limbs_of_bytes(&bytes);
        assert_eq!(limbs[0].value(), 0xFF00_0000);
        assert_eq!(limbs[7].value(), 1);
        assert_eq!(limbs_of_u256(U256::from(1u8))[7].value(), 1);
    }

    #[test]
    fn test_horner_evaluation() {
        // 3 + 2x + x^2 at x = 5
        let poly = [FieldElement::new(3), FieldElement::new(2), FieldElement::ONE];
        assert_eq!(evaluate(&poly, FieldElement::new(5)).value(), 38);
        assert_eq!(evaluate(&[], FieldElement::new(5)), FieldElement::ZERO);
    }

    proptest! {
        #[test]
        fn prop_mul_distributes(a in any::<u64>(), b in any::<u64>(), c in any::<u64>()) {
            let (a, b, c) = (FieldElement::new(a), FieldElement::new(b), FieldElement::new(c));
            prop_assert_eq!(a * (b + c), a * b + a * c);
        }
    }
}
