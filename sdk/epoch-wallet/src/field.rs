//! BN254 scalar field elements
//!
//! Everything the pool hashes or proves over is a scalar of BN254's
//! prime field (p = 2188824287183927522224640574525727508854836440041
//! 6034343698204186575808495617). `FieldElement` owns the byte
//! conversions so the rest of the crate never touches arkworks types
//! directly: 32-byte big-endian on the outside, `ark_bn254::Fr` inside.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};

use crate::error::{WalletError, WalletResult};

/// A BN254 scalar field element
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FieldElement(Fr);

impl FieldElement {
    /// The additive identity
    pub fn zero() -> Self {
        Self(Fr::from(0u64))
    }

    /// Lift a u64 into the field
    pub fn from_u64(value: u64) -> Self {
        Self(Fr::from(value))
    }

    /// Interpret up to 32 big-endian bytes, reducing mod p
    pub fn from_be_bytes_reduced(bytes: &[u8]) -> WalletResult<Self> {
        if bytes.len() > 32 {
            return Err(WalletError::NotInField);
        }
        Ok(Self(Fr::from_be_bytes_mod_order(bytes)))
    }

    /// Interpret exactly 32 big-endian bytes; rejects values >= p
    pub fn from_be_bytes(bytes: &[u8; 32]) -> WalletResult<Self> {
        let element = Self(Fr::from_be_bytes_mod_order(bytes));
        if element.to_be_bytes() != *bytes {
            return Err(WalletError::NotInField);
        }
        Ok(element)
    }

    /// Serialize as 32 big-endian bytes
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let digits = self.0.into_bigint().to_bytes_be();

        let mut bytes = [0u8; 32];
        bytes[32 - digits.len()..].copy_from_slice(&digits);
        bytes
    }

    /// Decimal string, the form circom witness files use
    pub fn to_decimal(&self) -> String {
        self.0.to_string()
    }

    pub(crate) fn from_fr(fr: Fr) -> Self {
        Self(fr)
    }

    pub(crate) fn as_fr(&self) -> Fr {
        self.0
    }
}

impl std::fmt::Display for FieldElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_roundtrip() {
        let element = FieldElement::from_u64(123_456_789);
        let bytes = element.to_be_bytes();
        assert_eq!(&bytes[..24], &[0u8; 24]);
        assert_eq!(FieldElement::from_be_bytes(&bytes).unwrap(), element);
        assert_eq!(element.to_decimal(), "123456789");
    }

    #[test]
    fn test_zero_serializes_to_zero_bytes() {
        assert_eq!(FieldElement::zero().to_be_bytes(), [0u8; 32]);
    }

    #[test]
    fn test_out_of_range_rejected() {
        // 2^256 - 1 is far above p
        let bytes = [0xffu8; 32];
        assert!(matches!(
            FieldElement::from_be_bytes(&bytes),
            Err(WalletError::NotInField)
        ));
        // but reduction accepts it
        assert!(FieldElement::from_be_bytes_reduced(&bytes).is_ok());
    }

    #[test]
    fn test_reduction_is_deterministic() {
        let bytes = [0xabu8; 32];
        let a = FieldElement::from_be_bytes_reduced(&bytes).unwrap();
        let b = FieldElement::from_be_bytes_reduced(&bytes).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_oversize_input_rejected() {
        let bytes = [1u8; 33];
        assert!(matches!(
            FieldElement::from_be_bytes_reduced(&bytes),
            Err(WalletError::NotInField)
        ));
    }

    #[test]
    fn test_short_input_is_high_zero_padded() {
        let a = FieldElement::from_be_bytes_reduced(&[0x01, 0x02]).unwrap();
        assert_eq!(a, FieldElement::from_u64(0x0102));
    }
}
