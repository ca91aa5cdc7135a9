//! Note Discovery Engine (C4): reconstructs every note chain for a
//! `(accountKey, poolAddress)` pair from a forward-only, paginated
//! activity stream. Resumable - every page is followed by a checkpoint
//! write - and single-threaded cooperative, driven by an injected
//! collaborator rather than a direct RPC client.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use tracing::debug;

use crate::activity::{Activity, ActivityPage, DiscoveryCheckpoint, DiscoveryResult, FetchOrder, WithdrawalFields};
use crate::error::{Result, SdkError};
use crate::field::f_to_decimal;
use crate::keys::AccountKey;
use crate::note::{nullifier_hash, precommitment, NoteCoordinate, NoteKind, NoteStatus};
use crate::note::Note;

/// Boxed collaborator error, wrapped by the engine into [`SdkError::Storage`]
/// / [`SdkError::Fetcher`] with the page it failed on.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_PAGE_LIMIT: u32 = 200;

/// External paginated activity stream (§4.4, §6). Items within a page are
/// ascending by block; the cursor is opaque to the core.
#[async_trait]
pub trait ActivityFetcher: Send + Sync {
    async fn fetch(
        &self,
        pool: Address,
        limit: u32,
        cursor: Option<String>,
        order: FetchOrder,
    ) -> std::result::Result<ActivityPage, BoxError>;
}

/// External checkpoint store. All four operations are idempotent under
/// identical inputs.
#[async_trait]
pub trait NoteStorageProvider: Send + Sync {
    async fn get_cached_notes(&self, account_key: &AccountKey, pool: Address) -> std::result::Result<Option<DiscoveryCheckpoint>, BoxError>;

    async fn store_discovered_notes(
        &self,
        account_key: &AccountKey,
        pool: Address,
        notes: &[Vec<Note>],
        cursor: Option<String>,
    ) -> std::result::Result<(), BoxError>;

    async fn get_next_deposit_index(&self, account_key: &AccountKey, pool: Address) -> std::result::Result<u64, BoxError>;

    async fn update_last_used_deposit_index(
        &self,
        account_key: &AccountKey,
        pool: Address,
        deposit_index: u64,
    ) -> std::result::Result<(), BoxError>;
}

/// Progress snapshot delivered after each page and at logical substeps
/// within one.
#[derive(Clone, Debug)]
pub struct ProgressUpdate {
    pub pages_processed: u64,
    pub current_page_activity_count: usize,
    pub deposits_checked: u64,
    pub deposits_matched: u64,
    pub last_cursor: Option<String>,
    pub complete: bool,
}

/// Receives progress updates. Returning `false` is this crate's rendition
/// of "the observer callback throws" (§4.4): the engine treats it exactly
/// like a cancellation request, raising [`SdkError::Cancelled`] with no
/// further writes for the in-flight page.
pub trait ProgressObserver: Send {
    fn on_progress(&mut self, update: &ProgressUpdate) -> bool;
}

/// Shared cancellation flag, polled at every suspension point and at the
/// top of the inner deposit-scan loop. Cloning shares the same underlying
/// flag, so a host can hand one token to both a UI cancel button and the
/// discovery call.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A chain tail that is unspent and has positive amount: a candidate for
/// extension on a future page.
#[derive(Clone, Debug)]
struct LiveDeposit {
    chain_index: usize,
}

pub struct NoteDiscoveryEngine {
    account_key: AccountKey,
    pool: Address,
    fetcher: Arc<dyn ActivityFetcher>,
    storage: Arc<dyn NoteStorageProvider>,
    cancellation: CancellationToken,
    max_pages: Option<u64>,
    page_limit: u32,
}

impl NoteDiscoveryEngine {
    pub fn new(account_key: AccountKey, pool: Address, fetcher: Arc<dyn ActivityFetcher>, storage: Arc<dyn NoteStorageProvider>) -> Self {
        Self {
            account_key,
            pool,
            fetcher,
            storage,
            cancellation: CancellationToken::new(),
            max_pages: None,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_max_pages(mut self, max_pages: u64) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit;
        self
    }

    /// Drives pages until `hasNextPage` is false or `maxPages` is reached,
    /// in the strict per-page order: extend-live-chains, scan-new-deposits,
    /// checkpoint.
    pub async fn run(&self, mut observer: Option<&mut dyn ProgressObserver>) -> Result<DiscoveryResult> {
        let checkpoint = self
            .storage
            .get_cached_notes(&self.account_key, self.pool)
            .await
            .map_err(|e| SdkError::storage(None, e))?;

        let (mut notes, mut last_used_index, mut cursor) = match checkpoint {
            Some(cp) => (cp.notes, cp.last_used_deposit_index, cp.last_processed_cursor),
            None => (Vec::new(), None, None),
        };

        let initial_indices: HashSet<u64> = notes.iter().filter_map(|chain| chain.first()).map(|n| n.coordinate.deposit_index).collect();
        let mut live_deposits = rebuild_live_deposits(&notes);

        let mut pages_processed: u64 = 0;
        let mut deposits_checked: u64 = 0;
        let mut deposits_matched: u64 = 0;

        loop {
            if self.cancellation.is_cancelled() {
                return Err(SdkError::Cancelled);
            }

            let page = self
                .fetcher
                .fetch(self.pool, self.page_limit, cursor.clone(), FetchOrder::Ascending)
                .await
                .map_err(|e| SdkError::fetcher(Some(pages_processed + 1), e))?;

            if self.cancellation.is_cancelled() {
                return Err(SdkError::Cancelled);
            }

            // 1. extend live chains
            let mut still_live = Vec::with_capacity(live_deposits.len());
            for live in &live_deposits {
                extend_chain_tail(&self.account_key, &mut notes[live.chain_index], &page.items)?;
                if is_live_candidate(notes[live.chain_index].last().expect("chain never empty")) {
                    still_live.push(LiveDeposit { chain_index: live.chain_index });
                }
            }
            live_deposits = still_live;

            // 2. scan new deposits
            let start_index = last_used_index.map(|i| i + 1).unwrap_or(0);
            let mut next_index = start_index;
            loop {
                if self.cancellation.is_cancelled() {
                    return Err(SdkError::Cancelled);
                }
                deposits_checked += 1;

                let found = match_deposit(&self.account_key, self.pool, next_index, &page.items)?;
                let Some((position, fields)) = found else { break };
                deposits_matched += 1;

                let amount = fields.amount.unwrap_or(0);
                let label = fields.label.clone().unwrap_or_else(|| format!("Pending Deposit #{next_index}"));
                let note = Note {
                    coordinate: NoteCoordinate::deposit(self.pool, next_index),
                    amount: Some(amount),
                    label: Some(label),
                    status: NoteStatus::Unspent,
                    is_activated: fields.label.is_some(),
                    origin_transaction_hash: fields.origin_transaction_hash.clone(),
                    destination_transaction_hash: fields.destination_transaction_hash.clone(),
                    origin_chain_id: fields.origin_chain_id,
                    destination_chain_id: fields.destination_chain_id,
                    block_number: fields.block_number,
                    timestamp: fields.timestamp,
                    refund_commitment: None,
                };

                let mut chain = vec![note];
                extend_chain_tail(&self.account_key, &mut chain, &page.items[position + 1..])?;
                let chain_index = notes.len();
                let tail_is_live = is_live_candidate(chain.last().expect("just pushed"));
                notes.push(chain);
                if tail_is_live {
                    live_deposits.push(LiveDeposit { chain_index });
                }

                next_index += 1;
            }
            if next_index > start_index {
                last_used_index = Some(next_index - 1);
            }

            // 3. checkpoint
            cursor = page.page_info.end_cursor.clone();
            pages_processed += 1;

            self.storage
                .store_discovered_notes(&self.account_key, self.pool, &notes, cursor.clone())
                .await
                .map_err(|e| SdkError::storage(Some(pages_processed), e))?;

            if let Some(di) = last_used_index {
                self.storage
                    .update_last_used_deposit_index(&self.account_key, self.pool, di)
                    .await
                    .map_err(|e| SdkError::storage(Some(pages_processed), e))?;
            }

            let reached_page_cap = self.max_pages.map(|m| pages_processed >= m).unwrap_or(false);
            let complete = !page.page_info.has_next_page || reached_page_cap;

            if let Some(obs) = observer.as_deref_mut() {
                let update = ProgressUpdate {
                    pages_processed,
                    current_page_activity_count: page.items.len(),
                    deposits_checked,
                    deposits_matched,
                    last_cursor: cursor.clone(),
                    complete,
                };
                if !obs.on_progress(&update) {
                    return Err(SdkError::Cancelled);
                }
            }

            debug!(pages_processed, chains = notes.len(), "discovery page processed");

            if complete {
                break;
            }
        }

        let new_notes_found = notes
            .iter()
            .filter_map(|chain| chain.first())
            .filter(|n| !initial_indices.contains(&n.coordinate.deposit_index))
            .count();

        Ok(DiscoveryResult {
            notes,
            last_used_index,
            new_notes_found,
            last_processed_cursor: cursor,
        })
    }
}

/// A chain tail is a candidate for extension on a future page only once
/// it's both spendable (unspent, positive amount) and activated - a
/// pending deposit with a provisional amount but no label yet assigned
/// is not extended until a later scan observes its activation.
fn is_live_candidate(note: &Note) -> bool {
    note.is_spendable() && note.is_activated
}

fn rebuild_live_deposits(notes: &[Vec<Note>]) -> Vec<LiveDeposit> {
    notes
        .iter()
        .enumerate()
        .filter_map(|(chain_index, chain)| chain.last().filter(|n| is_live_candidate(n)).map(|_| LiveDeposit { chain_index }))
        .collect()
}

/// Searches `items` for a deposit/cross-chain-deposit whose precommitment
/// matches the candidate `deposit_index`'s derived precommitment, compared
/// as decimal strings per §6.
fn match_deposit(account_key: &AccountKey, pool: Address, deposit_index: u64, items: &[Activity]) -> Result<Option<(usize, crate::activity::DepositFields)>> {
    let nul = crate::note::derive_deposit_nullifier(account_key, &pool, deposit_index)?;
    let sec = crate::note::derive_deposit_secret(account_key, &pool, deposit_index)?;
    let pre = precommitment(nul, sec)?;
    let pre_decimal = f_to_decimal(&pre);

    for (i, activity) in items.iter().enumerate() {
        if let Some(fields) = activity.as_deposit() {
            if fields.precommitment_hash == pre_decimal {
                return Ok(Some((i, fields.clone())));
            }
        }
    }
    Ok(None)
}

/// Repeatedly extends `chain`'s tail against `items` until no withdrawal
/// matches the tail's nullifier hash or the remaining amount hits zero.
/// Never mutates a note once its status becomes `Spent` (I2).
fn extend_chain_tail(account_key: &AccountKey, chain: &mut Vec<Note>, items: &[Activity]) -> Result<()> {
    loop {
        let tail = chain.last().expect("chain is never empty");
        if !matches!(tail.status, NoteStatus::Unspent) {
            break;
        }
        let Some(amount) = tail.amount.filter(|a| *a > 0) else {
            break;
        };

        let (tail_nullifier, _) = tail.coordinate.derive_nullifier_secret(account_key)?;
        let nh = nullifier_hash(tail_nullifier)?;
        let nh_decimal = f_to_decimal(&nh);

        let matched: Option<&WithdrawalFields> = items.iter().find_map(|a| a.as_withdrawal().filter(|w| w.spent_nullifier == nh_decimal));
        let Some(withdrawal) = matched.cloned() else {
            break;
        };

        let deposit_index = tail.coordinate.deposit_index;
        let pool_address = tail.coordinate.pool_address;
        let label = tail.label.clone();
        let new_change_index = match tail.coordinate.kind {
            NoteKind::Deposit => 1,
            _ => tail.coordinate.change_index + 1,
        };
        // I3: a withdrawal can never exceed what remains; saturating_sub
        // guards a misbehaving collaborator instead of panicking.
        let remaining = amount.saturating_sub(withdrawal.amount);

        chain.last_mut().expect("chain is never empty").status = NoteStatus::Spent;

        let new_note = Note {
            coordinate: NoteCoordinate::change(pool_address, deposit_index, new_change_index),
            amount: Some(remaining),
            label,
            status: if remaining > 0 { NoteStatus::Unspent } else { NoteStatus::Spent },
            is_activated: true,
            origin_transaction_hash: withdrawal.origin_transaction_hash.clone(),
            destination_transaction_hash: withdrawal.destination_transaction_hash.clone(),
            origin_chain_id: withdrawal.origin_chain_id,
            destination_chain_id: withdrawal.destination_chain_id,
            block_number: withdrawal.block_number,
            timestamp: withdrawal.timestamp,
            refund_commitment: withdrawal.refund_commitment.clone(),
        };
        chain.push(new_note);

        if remaining == 0 {
            break;
        }
    }
    Ok(())
}
