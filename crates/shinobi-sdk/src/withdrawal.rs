//! Withdrawal context & Groth16 input-record assembly (C5). Pure and
//! synchronous throughout - unlike C4, every error here surfaces
//! immediately to the caller, matching §7's propagation policy.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};
use crate::field::{decimal_to_field, f_to_decimal, field_from_keccak, F};
use crate::keys::AccountKey;
use crate::merkle::{MerkleProof, MerkleTree};
use crate::note::{commitment, derive_change_nullifier, derive_change_secret, derive_refund_nullifier, derive_refund_secret, precommitment, Note};

/// Circuit-hard-wired sibling-array length. Any tree the host constructs
/// deeper than this cannot be proven against the deployed circuit.
pub const CIRCUIT_TREE_DEPTH: usize = 32;

/// The `(address, bytes)` half of the on-chain tuple the context hash
/// commits to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawalData {
    pub to: Address,
    pub call_data: Vec<u8>,
}

/// `context = field_from_keccak(encode(((address, bytes), uint256)))`,
/// using standard (non-packed) ABI encoding - the one place in this crate
/// that is *not* packed, since it must match the contract's own tuple
/// decoding exactly.
pub fn context_hash(withdrawal_data: &WithdrawalData, pool_scope: U256) -> F {
    let tuple = ((withdrawal_data.to, Bytes::from(withdrawal_data.call_data.clone())), pool_scope);
    field_from_keccak(&tuple.abi_encode())
}

/// The six field elements a withdrawal proof is built from, plus the
/// optional cross-chain refund triple.
#[derive(Clone, Debug)]
pub struct WithdrawalContext {
    pub context: F,
    pub existing_commitment: F,
    pub existing_nullifier: F,
    pub existing_secret: F,
    pub new_nullifier: F,
    pub new_secret: F,
    pub refund: Option<RefundContext>,
}

#[derive(Clone, Debug)]
pub struct RefundContext {
    pub nullifier: F,
    pub secret: F,
    pub commitment: F,
}

fn note_amount_field(note: &Note) -> F {
    F::from(note.amount.unwrap_or(0))
}

fn note_label_field(note: &Note) -> Result<F> {
    let label = note
        .label
        .as_deref()
        .ok_or_else(|| SdkError::Crypto("note has no label; deposit is not yet activated".into()))?;
    decimal_to_field(label)
}

/// Steps 1-3 of §4.5: context hash, existing commitment, new change-note
/// derivation. Cross-chain refund derivation is a separate call
/// ([`assemble_refund`]) since it only applies to cross-chain withdrawals.
pub fn assemble_withdrawal_context(
    account_key: &AccountKey,
    pool: Address,
    note: &Note,
    withdrawal_data: &WithdrawalData,
    pool_scope: U256,
) -> Result<WithdrawalContext> {
    let context = context_hash(withdrawal_data, pool_scope);

    let (existing_nullifier, existing_secret) = note.coordinate.derive_nullifier_secret(account_key)?;
    let pre = precommitment(existing_nullifier, existing_secret)?;
    let amount = note_amount_field(note);
    let label = note_label_field(note)?;
    let existing_commitment = commitment(amount, label, pre)?;

    let new_change_index = note.coordinate.change_index + 1;
    let new_nullifier = derive_change_nullifier(account_key, &pool, note.coordinate.deposit_index, new_change_index)?;
    let new_secret = derive_change_secret(account_key, &pool, note.coordinate.deposit_index, new_change_index)?;

    Ok(WithdrawalContext {
        context,
        existing_commitment,
        existing_nullifier,
        existing_secret,
        new_nullifier,
        new_secret,
        refund: None,
    })
}

/// Step 4 (cross-chain only): the refund note covers the *original*
/// spendable value, so the host can recover funds if the destination-chain
/// fill fails; the circuit enforces amount equality against the note being
/// spent.
pub fn assemble_refund(account_key: &AccountKey, pool: Address, note: &Note) -> Result<RefundContext> {
    let new_change_index = note.coordinate.change_index + 1;
    let nullifier = derive_refund_nullifier(account_key, &pool, note.coordinate.deposit_index, new_change_index)?;
    let secret = derive_refund_secret(account_key, &pool, note.coordinate.deposit_index, new_change_index)?;
    let amount = note_amount_field(note);
    let label = note_label_field(note)?;
    let refund_commitment = commitment(amount, label, precommitment(nullifier, secret)?)?;
    Ok(RefundContext {
        nullifier,
        secret,
        commitment: refund_commitment,
    })
}

/// `{ withdrawnValue, stateRoot, ASPRoot, stateTreeDepth, ASPTreeDepth,
/// context, label, existingValue, existingNullifier, existingSecret,
/// newNullifier, newSecret, [refundNullifier, refundSecret,]
/// stateSiblings[32], ASPSiblings[32], stateIndex, ASPIndex }`, all as
/// decimal strings of field elements or small integers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Groth16InputRecord {
    pub withdrawn_value: String,
    pub state_root: String,
    pub asp_root: String,
    pub state_tree_depth: String,
    pub asp_tree_depth: String,
    pub context: String,
    pub label: String,
    pub existing_value: String,
    pub existing_nullifier: String,
    pub existing_secret: String,
    pub new_nullifier: String,
    pub new_secret: String,
    pub refund_nullifier: Option<String>,
    pub refund_secret: Option<String>,
    pub state_siblings: [String; CIRCUIT_TREE_DEPTH],
    pub asp_siblings: [String; CIRCUIT_TREE_DEPTH],
    pub state_index: String,
    pub asp_index: String,
}

fn pad_siblings(proof: &MerkleProof) -> Result<[F; CIRCUIT_TREE_DEPTH]> {
    if proof.depth > CIRCUIT_TREE_DEPTH {
        return Err(SdkError::MerkleTree(format!(
            "tree depth {} exceeds circuit depth {CIRCUIT_TREE_DEPTH}",
            proof.depth
        )));
    }
    let mut padded = [F::from(0u64); CIRCUIT_TREE_DEPTH];
    padded[..proof.siblings.len()].copy_from_slice(&proof.siblings);
    Ok(padded)
}

/// `0` when the tree yields no well-defined index - the degenerate
/// single-leaf tree where `depth = 0`.
fn nan_guarded_index(proof: &MerkleProof) -> u64 {
    if proof.depth == 0 {
        0
    } else {
        proof.index
    }
}

/// Step 5 of §4.5: builds the state tree and approved-set tree from the
/// indexer-supplied leaf lists, locates `existingCommitment` and `label`
/// in each, and assembles the final proof-input record.
pub fn build_groth16_input(
    withdrawal_context: &WithdrawalContext,
    withdrawn_value: u128,
    note: &Note,
    state_tree_leaves: &[F],
    approved_set_labels: &[F],
) -> Result<Groth16InputRecord> {
    let state_tree = MerkleTree::from_leaves(state_tree_leaves.iter().copied())?;
    let asp_tree = MerkleTree::from_leaves(approved_set_labels.iter().copied())?;

    let state_index = state_tree_leaves
        .iter()
        .position(|leaf| *leaf == withdrawal_context.existing_commitment)
        .ok_or(SdkError::CommitmentNotInStateTree)?;

    let label = note_label_field(note)?;
    let asp_index = approved_set_labels
        .iter()
        .position(|leaf| *leaf == label)
        .ok_or(SdkError::LabelNotInApprovedTree)?;

    let state_proof = state_tree.proof(state_index as u64)?;
    let asp_proof = asp_tree.proof(asp_index as u64)?;

    let state_siblings = pad_siblings(&state_proof)?.map(|f| f_to_decimal(&f));
    let asp_siblings = pad_siblings(&asp_proof)?.map(|f| f_to_decimal(&f));

    Ok(Groth16InputRecord {
        withdrawn_value: withdrawn_value.to_string(),
        state_root: f_to_decimal(&state_tree.root()?),
        asp_root: f_to_decimal(&asp_tree.root()?),
        state_tree_depth: state_proof.depth.to_string(),
        asp_tree_depth: asp_proof.depth.to_string(),
        context: f_to_decimal(&withdrawal_context.context),
        label: f_to_decimal(&label),
        existing_value: note.amount.unwrap_or(0).to_string(),
        existing_nullifier: f_to_decimal(&withdrawal_context.existing_nullifier),
        existing_secret: f_to_decimal(&withdrawal_context.existing_secret),
        new_nullifier: f_to_decimal(&withdrawal_context.new_nullifier),
        new_secret: f_to_decimal(&withdrawal_context.new_secret),
        refund_nullifier: withdrawal_context.refund.as_ref().map(|r| f_to_decimal(&r.nullifier)),
        refund_secret: withdrawal_context.refund.as_ref().map(|r| f_to_decimal(&r.secret)),
        state_siblings,
        asp_siblings,
        state_index: nan_guarded_index(&state_proof).to_string(),
        asp_index: nan_guarded_index(&asp_proof).to_string(),
    })
}

/// A generated proof, opaque to this crate - its internal shape (group
/// elements, encoding) is entirely the backend's concern.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proof(pub serde_json::Value);

/// Black-box Groth16 prover/verifier (§4.1, §4.5). Implementations load
/// and memoize `wasm`/`zkey`/`vkey` behind their first call; this crate
/// never inspects circuit files itself.
pub trait ProofBackend: Send + Sync {
    fn full_prove(&self, inputs: &Groth16InputRecord, wasm: &[u8], zkey: &[u8]) -> Result<(Proof, Vec<String>)>;
    fn verify(&self, vkey: &[u8], public_signals: &[String], proof: &Proof) -> Result<bool>;
}

/// Generates a withdrawal proof and **always** self-verifies it before
/// returning. A verification mismatch is fatal and is never retried - it
/// indicates circuit/parameter drift between the backend and this SDK,
/// never a user-correctable condition.
pub fn generate_withdrawal_proof(
    backend: &dyn ProofBackend,
    inputs: &Groth16InputRecord,
    wasm: Option<&[u8]>,
    zkey: Option<&[u8]>,
    vkey: Option<&[u8]>,
) -> Result<(Proof, Vec<String>)> {
    let (wasm, zkey, vkey) = match (wasm, zkey, vkey) {
        (Some(w), Some(z), Some(v)) => (w, z, v),
        _ => return Err(SdkError::CircuitFilesUnavailable("wasm/zkey/vkey loader not configured".into())),
    };

    let (proof, public_signals) = backend.full_prove(inputs, wasm, zkey)?;
    let verified = backend.verify(vkey, &public_signals, &proof)?;
    if !verified {
        return Err(SdkError::ProofVerificationFailed(
            "self-verification after proving failed; circuit/parameter mismatch".into(),
        ));
    }
    Ok((proof, public_signals))
}
