//! Account-key parsing (C1/C2 boundary). An [`AccountKey`] is the single
//! secret a user holds; every note they will ever own derives from it.

use ark_ff::PrimeField;
use num_bigint::BigUint;
use num_traits::Num;

use crate::error::{Result, SdkError};
use crate::field::F;

/// One `F`, reduced modulo `p`. Deliberately opaque: the only way to get
/// one is [`AccountKey::parse`], so every instance is already reduced.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AccountKey(F);

impl AccountKey {
    pub fn as_field(&self) -> F {
        self.0
    }

    /// Accepts a hex string (`0x...`), a decimal string, or an
    /// arbitrary-precision integer already parsed by the caller; all three
    /// paths reduce modulo `p`. Whitespace is trimmed first.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SdkError::InvalidKey("empty key".into()));
        }

        let big = if let Some(hex_digits) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
            BigUint::from_str_radix(hex_digits, 16)
                .map_err(|e| SdkError::InvalidKey(format!("invalid hex key: {e}")))?
        } else {
            BigUint::from_str_radix(trimmed, 10)
                .map_err(|e| SdkError::InvalidKey(format!("invalid decimal key: {e}")))?
        };

        Ok(Self::from_biguint(&big))
    }

    /// Same reduction, starting from an integer the caller already has in
    /// hand (the "arbitrary-precision integer" input path of `parseUserKey`).
    pub fn from_biguint(value: &BigUint) -> Self {
        let be = value.to_bytes_be();
        Self(F::from_be_bytes_mod_order(&be))
    }

    pub fn from_private_key_bytes(bytes: &[u8; 32]) -> Self {
        Self(F::from_be_bytes_mod_order(bytes))
    }
}
