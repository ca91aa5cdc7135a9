//! Data model for the external activity stream C4 consumes (§3/§6): a
//! tagged union over four event kinds, plus the checkpoint shape the
//! engine persists between pages.

use serde::{Deserialize, Serialize};

use crate::note::Note;

/// Fields shared by `Deposit` and `CrossChainDeposit`. `precommitment_hash`
/// is a field element serialized as a decimal string - C4 compares it
/// against derived precommitments as strings, never as parsed integers,
/// to avoid a round-trip through field arithmetic on untrusted input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositFields {
    pub precommitment_hash: String,
    pub amount: Option<u128>,
    pub label: Option<String>,
    pub origin_transaction_hash: String,
    pub destination_transaction_hash: Option<String>,
    pub origin_chain_id: u64,
    pub destination_chain_id: Option<u64>,
    pub block_number: u64,
    pub timestamp: u64,
}

/// Fields shared by `Withdrawal` and `CrossChainWithdrawal`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalFields {
    pub spent_nullifier: String,
    pub new_commitment: Option<String>,
    pub amount: u128,
    pub refund_commitment: Option<String>,
    pub origin_transaction_hash: String,
    pub destination_transaction_hash: Option<String>,
    pub origin_chain_id: u64,
    pub destination_chain_id: Option<u64>,
    pub block_number: u64,
    pub timestamp: u64,
}

/// One event from the indexer. Activities are delivered in ascending
/// block order; C4 relies on that ordering and never re-sorts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Activity {
    Deposit(DepositFields),
    CrossChainDeposit(DepositFields),
    Withdrawal(WithdrawalFields),
    CrossChainWithdrawal(WithdrawalFields),
}

impl Activity {
    pub fn block_number(&self) -> u64 {
        match self {
            Activity::Deposit(f) | Activity::CrossChainDeposit(f) => f.block_number,
            Activity::Withdrawal(f) | Activity::CrossChainWithdrawal(f) => f.block_number,
        }
    }

    pub fn as_deposit(&self) -> Option<&DepositFields> {
        match self {
            Activity::Deposit(f) | Activity::CrossChainDeposit(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_withdrawal(&self) -> Option<&WithdrawalFields> {
        match self {
            Activity::Withdrawal(f) | Activity::CrossChainWithdrawal(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_cross_chain(&self) -> bool {
        matches!(self, Activity::CrossChainDeposit(_) | Activity::CrossChainWithdrawal(_))
    }
}

/// One page of the activity stream, as returned by `ActivityFetcher::fetch`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityPage {
    pub items: Vec<Activity>,
    pub page_info: PageInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Ascending-by-block fetch order; the only order the core ever requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchOrder {
    Ascending,
}

/// Per-`(publicKey, poolAddress)` discovery state, persisted by the
/// storage collaborator after every processed page.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DiscoveryCheckpoint {
    pub notes: Vec<Vec<Note>>,
    pub last_used_deposit_index: Option<u64>,
    pub last_processed_cursor: Option<String>,
}

/// `{ notes[], lastUsedIndex, newNotesFound, lastProcessedCursor }` - the
/// result of one `NoteDiscoveryEngine::run` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub notes: Vec<Vec<Note>>,
    pub last_used_index: Option<u64>,
    pub new_notes_found: usize,
    pub last_processed_cursor: Option<String>,
}
