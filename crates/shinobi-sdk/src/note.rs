//! Domain-separated note derivation (C2): account key + typed coordinates
//! in, (nullifier, secret, commitment) triples out. A `Note` type plus a
//! handful of free derivation functions, keyed on a BN254/Poseidon PRF.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::field::{abi_encode_packed, checksum_address, field_from_keccak, keccak256, poseidon1, poseidon2, poseidon3, F};
use crate::keys::AccountKey;

/// `tag_X = keccak256(utf8("shinobi.cash:X"))`. Six fixed roles; the exact
/// strings are a deployed wire contract, never renamed.
const TAG_DEPOSIT_NULLIFIER: &str = "shinobi.cash:DepositNullifierV1";
const TAG_DEPOSIT_SECRET: &str = "shinobi.cash:DepositSecretV1";
const TAG_CHANGE_NULLIFIER: &str = "shinobi.cash:ChangeNullifierV1";
const TAG_CHANGE_SECRET: &str = "shinobi.cash:ChangeSecretV1";
const TAG_REFUND_NULLIFIER: &str = "shinobi.cash:RefundNullifierV1";
const TAG_REFUND_SECRET: &str = "shinobi.cash:RefundSecretV1";

/// The role a derivation is for, fixing which pair of domain tags and
/// which packed `tag_X` bytes enter the context field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    DepositNullifier,
    DepositSecret,
    ChangeNullifier,
    ChangeSecret,
    RefundNullifier,
    RefundSecret,
}

impl Role {
    fn tag_str(self) -> &'static str {
        match self {
            Role::DepositNullifier => TAG_DEPOSIT_NULLIFIER,
            Role::DepositSecret => TAG_DEPOSIT_SECRET,
            Role::ChangeNullifier => TAG_CHANGE_NULLIFIER,
            Role::ChangeSecret => TAG_CHANGE_SECRET,
            Role::RefundNullifier => TAG_REFUND_NULLIFIER,
            Role::RefundSecret => TAG_REFUND_SECRET,
        }
    }

    fn tag_bytes(self) -> [u8; 32] {
        keccak256(self.tag_str().as_bytes())
    }

    /// `dom_X = field_from_keccak(tag_X)`.
    fn dom(self) -> F {
        field_from_keccak(self.tag_str().as_bytes())
    }
}

/// `ctx = field_from_keccak(abi_encode_packed([address, uint64, uint64,
/// bytes32], [checksum(poolAddress), depositIndex, changeIndex, tag_X]))`.
///
/// `tag_X` appears here *and* again (as `dom_X`) inside [`prf`]; that
/// double inclusion is intentional and part of the deployed wire format.
fn ctx(pool: &Address, deposit_index: u64, change_index: u64, role: Role) -> F {
    let packed = abi_encode_packed(&[
        crate::field::Packed::Address(checksum_address(pool)),
        crate::field::Packed::Uint64(deposit_index),
        crate::field::Packed::Uint64(change_index),
        crate::field::Packed::Bytes32(role.tag_bytes()),
    ]);
    field_from_keccak(&packed)
}

/// `prf(k, ctx, dom) = mod_p(poseidon2(k, mod_p(poseidon2(ctx, dom))))`.
fn prf(k: F, ctx: F, dom: F) -> Result<F> {
    let inner = poseidon2(ctx, dom)?;
    poseidon2(k, inner)
}

fn derive(k: &AccountKey, pool: &Address, deposit_index: u64, change_index: u64, role: Role) -> Result<F> {
    let c = ctx(pool, deposit_index, change_index, role);
    prf(k.as_field(), c, role.dom())
}

pub fn derive_deposit_nullifier(k: &AccountKey, pool: &Address, deposit_index: u64) -> Result<F> {
    derive(k, pool, deposit_index, 0, Role::DepositNullifier)
}

pub fn derive_deposit_secret(k: &AccountKey, pool: &Address, deposit_index: u64) -> Result<F> {
    derive(k, pool, deposit_index, 0, Role::DepositSecret)
}

/// `change_index >= 1`.
pub fn derive_change_nullifier(k: &AccountKey, pool: &Address, deposit_index: u64, change_index: u64) -> Result<F> {
    debug_assert!(change_index >= 1);
    derive(k, pool, deposit_index, change_index, Role::ChangeNullifier)
}

pub fn derive_change_secret(k: &AccountKey, pool: &Address, deposit_index: u64, change_index: u64) -> Result<F> {
    debug_assert!(change_index >= 1);
    derive(k, pool, deposit_index, change_index, Role::ChangeSecret)
}

pub fn derive_refund_nullifier(k: &AccountKey, pool: &Address, deposit_index: u64, change_index: u64) -> Result<F> {
    debug_assert!(change_index >= 1);
    derive(k, pool, deposit_index, change_index, Role::RefundNullifier)
}

pub fn derive_refund_secret(k: &AccountKey, pool: &Address, deposit_index: u64, change_index: u64) -> Result<F> {
    debug_assert!(change_index >= 1);
    derive(k, pool, deposit_index, change_index, Role::RefundSecret)
}

/// `precommitment = poseidon2(nullifier, secret)`. What a depositor
/// reveals on-chain; binds without revealing amount or label.
pub fn precommitment(nullifier: F, secret: F) -> Result<F> {
    poseidon2(nullifier, secret)
}

/// `commitment = poseidon3(amount, label, precommitment)`. Matches the
/// on-chain contract exactly; any deviation produces an unspendable note.
pub fn commitment(amount: F, label: F, precommitment: F) -> Result<F> {
    poseidon3(amount, label, precommitment)
}

/// `nullifierHash = poseidon1(nullifier)`, what the contract needs to mark
/// a note spent without learning the nullifier itself.
pub fn nullifier_hash(nullifier: F) -> Result<F> {
    poseidon1(nullifier)
}

/// Which branch of C2's derivation tree a note's nullifier/secret pair
/// comes from. `Deposit` is only ever paired with `change_index == 0`;
/// `Refund` shares the change note's coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteKind {
    Deposit,
    Change,
    Refund,
}

/// `(poolAddress, depositIndex, changeIndex, kind)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteCoordinate {
    pub pool_address: Address,
    pub deposit_index: u64,
    pub change_index: u64,
    pub kind: NoteKind,
}

impl NoteCoordinate {
    pub fn deposit(pool_address: Address, deposit_index: u64) -> Self {
        Self {
            pool_address,
            deposit_index,
            change_index: 0,
            kind: NoteKind::Deposit,
        }
    }

    pub fn change(pool_address: Address, deposit_index: u64, change_index: u64) -> Self {
        debug_assert!(change_index >= 1);
        Self {
            pool_address,
            deposit_index,
            change_index,
            kind: NoteKind::Change,
        }
    }

    pub fn refund(pool_address: Address, deposit_index: u64, change_index: u64) -> Self {
        debug_assert!(change_index >= 1);
        Self {
            pool_address,
            deposit_index,
            change_index,
            kind: NoteKind::Refund,
        }
    }

    /// The (nullifier, secret) pair for this coordinate, dispatching on
    /// `kind` - deposit branch at `change_index = 0`, change/refund branch
    /// otherwise.
    pub fn derive_nullifier_secret(&self, k: &AccountKey) -> Result<(F, F)> {
        match self.kind {
            NoteKind::Deposit => {
                let nul = derive_deposit_nullifier(k, &self.pool_address, self.deposit_index)?;
                let sec = derive_deposit_secret(k, &self.pool_address, self.deposit_index)?;
                Ok((nul, sec))
            }
            NoteKind::Change => {
                let nul = derive_change_nullifier(k, &self.pool_address, self.deposit_index, self.change_index)?;
                let sec = derive_change_secret(k, &self.pool_address, self.deposit_index, self.change_index)?;
                Ok((nul, sec))
            }
            NoteKind::Refund => {
                let nul = derive_refund_nullifier(k, &self.pool_address, self.deposit_index, self.change_index)?;
                let sec = derive_refund_secret(k, &self.pool_address, self.deposit_index, self.change_index)?;
                Ok((nul, sec))
            }
        }
    }
}

/// Status of a note within its chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteStatus {
    Unspent,
    Spent,
}

/// One record in a chain. `amount`/`label` are `None` while a deposit is
/// still pending activation; commitment equality can't be decided until
/// both are present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub coordinate: NoteCoordinate,
    pub amount: Option<u128>,
    pub label: Option<String>,
    pub status: NoteStatus,
    pub is_activated: bool,
    pub origin_transaction_hash: String,
    pub destination_transaction_hash: Option<String>,
    pub origin_chain_id: u64,
    pub destination_chain_id: Option<u64>,
    pub block_number: u64,
    pub timestamp: u64,
    pub refund_commitment: Option<String>,
}

impl Note {
    /// An unspent note with zero amount behaves like a spent one; nothing
    /// further can be extended from it.
    pub fn is_spendable(&self) -> bool {
        matches!(self.status, NoteStatus::Unspent) && matches!(self.amount, Some(a) if a > 0)
    }
}

/// `{ precommitment: "0x" + hex(poseidon2(nul, sec)), depositIndex,
/// poolAddress, nullifier, secret }` - what a user submits on deposit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DepositCommitmentResult {
    pub precommitment: String,
    pub deposit_index: u64,
    pub pool_address: Address,
    pub nullifier_decimal: String,
    pub secret_decimal: String,
}

/// Derives the deposit nullifier/secret/precommitment for the next
/// available `depositIndex` - the candidate a caller submits to a deposit
/// transaction.
pub fn derive_deposit_commitment(k: &AccountKey, pool: Address, deposit_index: u64) -> Result<DepositCommitmentResult> {
    let nullifier = derive_deposit_nullifier(k, &pool, deposit_index)?;
    let secret = derive_deposit_secret(k, &pool, deposit_index)?;
    let pre = precommitment(nullifier, secret)?;
    Ok(DepositCommitmentResult {
        precommitment: format!("0x{}", hex::encode(crate::field::f_to_bytes_be(&pre))),
        deposit_index,
        pool_address: pool,
        nullifier_decimal: crate::field::f_to_decimal(&nullifier),
        secret_decimal: crate::field::f_to_decimal(&secret),
    })
}
