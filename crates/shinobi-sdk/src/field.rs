//! BN254 scalar-field arithmetic and the hash/encoding primitives every
//! other module builds on. Operates on `ark_bn254::Fr` field elements
//! directly rather than raw commitment bytes, since C2/C5 need to carry
//! field elements through several derivations before ever touching bytes
//! again.

use alloy_primitives::Address;
use ark_ff::{BigInteger, PrimeField};
use light_poseidon::{Poseidon, PoseidonBytesHasher};

use crate::error::{Result, SdkError};

/// A BN254 scalar-field element. All cryptographic outputs of this crate
/// live in `[0, p)` where `p` is the BN254 scalar field modulus.
pub type F = ark_bn254::Fr;

/// Big-endian, left-padded to 32 bytes.
pub fn f_to_bytes_be(f: &F) -> [u8; 32] {
    let be = f.into_bigint().to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - be.len()..].copy_from_slice(&be);
    out
}

/// Non-negative reduction of an arbitrary byte string into `F`. This is
/// `mod_p` for inputs already given as bytes (e.g. keccak digests).
pub fn mod_p_from_bytes_be(bytes: &[u8]) -> F {
    F::from_be_bytes_mod_order(bytes)
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    alloy_primitives::keccak256(data).0
}

/// `field_from_keccak(bytes) = mod_p(uint256(keccak256(bytes)))`. Not a
/// uniform sampler, but the bias is cryptographically negligible for a
/// ~254-bit field reduced from a 256-bit digest.
pub fn field_from_keccak(data: &[u8]) -> F {
    mod_p_from_bytes_be(&keccak256(data))
}

/// Parses a caller-supplied address string, validating its EIP-55 mixed
/// case checksum when one is present (an all-lower or all-upper string is
/// accepted without a checksum check, per EIP-55).
pub fn parse_address(s: &str) -> Result<Address> {
    s.parse::<Address>()
        .map_err(|e| SdkError::Crypto(format!("invalid address {s:?}: {e}")))
}

/// `checksum_address(addr) -> 20 bytes`. The checksum normalization work
/// already happened in [`parse_address`] (an `Address` has no case of its
/// own); this just extracts the canonical bytes right before they're
/// packed into hashing input, so every call site goes through the same
/// conversion and no address is ever packed from an unvalidated string.
pub fn checksum_address(addr: &Address) -> [u8; 20] {
    addr.into_array()
}

/// One value to pack into `abi_encode_packed`'s output. Only the variants
/// the note-coordinate and legacy encodings actually need.
#[derive(Clone, Copy, Debug)]
pub enum Packed<'a> {
    Address([u8; 20]),
    Uint64(u64),
    Bytes32([u8; 32]),
    Str(&'a str),
}

/// Deterministic packed encoding used only inside hashing: address = 20
/// bytes, `uintN` = N/8 bytes big-endian, `bytes32` = 32 bytes verbatim,
/// `string` = raw UTF-8 bytes with no length prefix.
pub fn abi_encode_packed(values: &[Packed]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        match v {
            Packed::Address(a) => out.extend_from_slice(a),
            Packed::Uint64(n) => out.extend_from_slice(&n.to_be_bytes()),
            Packed::Bytes32(b) => out.extend_from_slice(b),
            Packed::Str(s) => out.extend_from_slice(s.as_bytes()),
        }
    }
    out
}

fn poseidon_hash_bytes(inputs: &[[u8; 32]]) -> Result<[u8; 32]> {
    let mut hasher = Poseidon::<F>::new_circom(inputs.len())
        .map_err(|e| SdkError::Crypto(format!("poseidon init failed: {e}")))?;
    let slices: Vec<&[u8]> = inputs.iter().map(|a| a.as_slice()).collect();
    hasher
        .hash_bytes_be(&slices)
        .map_err(|e| SdkError::Crypto(format!("poseidon hash failed: {e}")))
}

/// Arity is fixed per call site; the parametrization must match the
/// on-chain verifier and circuit exactly or proofs silently fail.
pub fn poseidon1(a: F) -> Result<F> {
    let out = poseidon_hash_bytes(&[f_to_bytes_be(&a)])?;
    Ok(mod_p_from_bytes_be(&out))
}

pub fn poseidon2(a: F, b: F) -> Result<F> {
    let out = poseidon_hash_bytes(&[f_to_bytes_be(&a), f_to_bytes_be(&b)])?;
    Ok(mod_p_from_bytes_be(&out))
}

pub fn poseidon3(a: F, b: F, c: F) -> Result<F> {
    let out = poseidon_hash_bytes(&[f_to_bytes_be(&a), f_to_bytes_be(&b), f_to_bytes_be(&c)])?;
    Ok(mod_p_from_bytes_be(&out))
}

/// Decimal-string rendering for Groth16 signals (§6: "decimal strings of
/// field elements or small non-negative integers").
pub fn f_to_decimal(f: &F) -> String {
    f.into_bigint().to_string()
}

/// Inverse of [`f_to_decimal`]: parses a decimal-string field element as
/// delivered by the activity stream (`precommitmentHash`, `spentNullifier`,
/// labels) back into `F`.
pub fn decimal_to_field(s: &str) -> Result<F> {
    let digits: num_bigint::BigUint = s
        .parse()
        .map_err(|e| SdkError::Crypto(format!("not a decimal field element {s:?}: {e}")))?;
    Ok(F::from_be_bytes_mod_order(&digits.to_bytes_be()))
}
