//! End-to-end discovery scenarios not already covered by `discovery.rs`'s
//! inline fixtures: two partial withdrawals draining a single chain, and
//! resuming a scan from a checkpoint after the run was split across an
//! arbitrary page boundary.

use std::sync::{Arc, Mutex};

use alloy_primitives::Address;
use async_trait::async_trait;
use shinobi_sdk::{
    AccountKey, Activity, ActivityFetcher, ActivityPage, BoxError, DiscoveryCheckpoint, FetchOrder,
    NoteDiscoveryEngine, NoteStatus, NoteStorageProvider, PageInfo,
};
use shinobi_sdk::activity::{DepositFields, WithdrawalFields};
use shinobi_sdk::field::f_to_decimal;
use shinobi_sdk::note::{derive_deposit_nullifier, derive_deposit_secret, nullifier_hash, precommitment};
use std::str::FromStr;
use tokio::sync::Mutex as AsyncMutex;

fn pool() -> Address {
    Address::from_str("0x5543d6e2b3c7c965ea3ffae31f17d118e1e7d18").unwrap()
}

fn key() -> AccountKey {
    AccountKey::parse("0x1").unwrap()
}

struct FixtureFetcher {
    pages: AsyncMutex<Vec<ActivityPage>>,
}

#[async_trait]
impl ActivityFetcher for FixtureFetcher {
    async fn fetch(&self, _pool: Address, _limit: u32, _cursor: Option<String>, _order: FetchOrder) -> Result<ActivityPage, BoxError> {
        let mut pages = self.pages.lock().await;
        if pages.is_empty() {
            return Ok(ActivityPage {
                items: vec![],
                page_info: PageInfo { has_next_page: false, end_cursor: None },
            });
        }
        Ok(pages.remove(0))
    }
}

#[derive(Default)]
struct FixtureStorage {
    checkpoint: Mutex<Option<DiscoveryCheckpoint>>,
}

#[async_trait]
impl NoteStorageProvider for FixtureStorage {
    async fn get_cached_notes(&self, _account_key: &AccountKey, _pool: Address) -> Result<Option<DiscoveryCheckpoint>, BoxError> {
        Ok(self.checkpoint.lock().unwrap().clone())
    }

    async fn store_discovered_notes(&self, _account_key: &AccountKey, _pool: Address, notes: &[Vec<shinobi_sdk::Note>], cursor: Option<String>) -> Result<(), BoxError> {
        let mut guard = self.checkpoint.lock().unwrap();
        let last_used_deposit_index = guard.as_ref().and_then(|c| c.last_used_deposit_index);
        *guard = Some(DiscoveryCheckpoint {
            notes: notes.to_vec(),
            last_used_deposit_index,
            last_processed_cursor: cursor,
        });
        Ok(())
    }

    async fn get_next_deposit_index(&self, _account_key: &AccountKey, _pool: Address) -> Result<u64, BoxError> {
        let guard = self.checkpoint.lock().unwrap();
        Ok(guard.as_ref().and_then(|c| c.last_used_deposit_index).map(|i| i + 1).unwrap_or(0))
    }

    async fn update_last_used_deposit_index(&self, _account_key: &AccountKey, _pool: Address, deposit_index: u64) -> Result<(), BoxError> {
        let mut guard = self.checkpoint.lock().unwrap();
        if let Some(cp) = guard.as_mut() {
            cp.last_used_deposit_index = Some(deposit_index);
        }
        Ok(())
    }
}

fn deposit_activity(precommitment_hash: String, amount: u128, label: &str, block: u64) -> Activity {
    Activity::Deposit(DepositFields {
        precommitment_hash,
        amount: Some(amount),
        label: Some(label.to_string()),
        origin_transaction_hash: format!("0xdep{block}"),
        destination_transaction_hash: None,
        origin_chain_id: 1,
        destination_chain_id: None,
        block_number: block,
        timestamp: block * 10,
    })
}

fn withdrawal_activity(spent_nullifier: String, amount: u128, block: u64) -> Activity {
    Activity::Withdrawal(WithdrawalFields {
        spent_nullifier,
        new_commitment: None,
        amount,
        refund_commitment: None,
        origin_transaction_hash: format!("0xwd{block}"),
        destination_transaction_hash: None,
        origin_chain_id: 1,
        destination_chain_id: None,
        block_number: block,
        timestamp: block * 10,
    })
}

/// Scenario 2: one deposit of 1_000_000, drained by two partial
/// withdrawals (400_000 then 600_000). Expected chain length 3 with
/// change indices [0, 1, 2] and a spent, zero-amount tail.
#[tokio::test]
async fn scenario_two_partial_withdrawals_drain_the_chain() {
    let k = key();
    let p = pool();

    let deposit_nul = derive_deposit_nullifier(&k, &p, 0).unwrap();
    let deposit_sec = derive_deposit_secret(&k, &p, 0).unwrap();
    let deposit_pre = precommitment(deposit_nul, deposit_sec).unwrap();
    let deposit_nh = nullifier_hash(deposit_nul).unwrap();

    let change1_nul = shinobi_sdk::note::derive_change_nullifier(&k, &p, 0, 1).unwrap();
    let change1_nh = nullifier_hash(change1_nul).unwrap();

    let pages = vec![
        ActivityPage {
            items: vec![deposit_activity(f_to_decimal(&deposit_pre), 1_000_000, "1", 100)],
            page_info: PageInfo { has_next_page: true, end_cursor: Some("p1".into()) },
        },
        ActivityPage {
            items: vec![withdrawal_activity(f_to_decimal(&deposit_nh), 400_000, 101)],
            page_info: PageInfo { has_next_page: true, end_cursor: Some("p2".into()) },
        },
        ActivityPage {
            items: vec![withdrawal_activity(f_to_decimal(&change1_nh), 600_000, 102)],
            page_info: PageInfo { has_next_page: false, end_cursor: Some("p3".into()) },
        },
    ];

    let fetcher = Arc::new(FixtureFetcher { pages: AsyncMutex::new(pages) });
    let storage = Arc::new(FixtureStorage::default());
    let engine = NoteDiscoveryEngine::new(k, p, fetcher, storage);
    let result = engine.run(None).await.unwrap();

    assert_eq!(result.notes.len(), 1);
    let chain = &result.notes[0];
    assert_eq!(chain.len(), 3);
    assert_eq!(chain[0].coordinate.change_index, 0);
    assert_eq!(chain[1].coordinate.change_index, 1);
    assert_eq!(chain[2].coordinate.change_index, 2);
    assert_eq!(chain[0].status, NoteStatus::Spent);
    assert_eq!(chain[1].status, NoteStatus::Spent);
    assert_eq!(chain[2].status, NoteStatus::Spent);
    assert_eq!(chain[1].amount, Some(600_000));
    assert_eq!(chain[2].amount, Some(0));
}

/// Scenario 4 / P7: interrupting after some pages and resuming from the
/// persisted checkpoint with only the remaining pages yields the same
/// final state as running every page uninterrupted.
#[tokio::test]
async fn resuming_from_checkpoint_matches_uninterrupted_run() {
    let k = key();
    let p = pool();

    let deposit_nul = derive_deposit_nullifier(&k, &p, 0).unwrap();
    let deposit_sec = derive_deposit_secret(&k, &p, 0).unwrap();
    let deposit_pre = precommitment(deposit_nul, deposit_sec).unwrap();
    let deposit_nh = nullifier_hash(deposit_nul).unwrap();

    let all_pages = || {
        vec![
            ActivityPage {
                items: vec![deposit_activity(f_to_decimal(&deposit_pre), 1_000_000, "1", 100)],
                page_info: PageInfo { has_next_page: true, end_cursor: Some("p1".into()) },
            },
            ActivityPage {
                items: vec![],
                page_info: PageInfo { has_next_page: true, end_cursor: Some("p2".into()) },
            },
            ActivityPage {
                items: vec![],
                page_info: PageInfo { has_next_page: true, end_cursor: Some("p3".into()) },
            },
            ActivityPage {
                items: vec![withdrawal_activity(f_to_decimal(&deposit_nh), 1_000_000, 103)],
                page_info: PageInfo { has_next_page: false, end_cursor: Some("p4".into()) },
            },
        ]
    };

    // Uninterrupted baseline.
    let fetcher = Arc::new(FixtureFetcher { pages: AsyncMutex::new(all_pages()) });
    let storage = Arc::new(FixtureStorage::default());
    let baseline = NoteDiscoveryEngine::new(k, p, fetcher, storage).run(None).await.unwrap();

    // Split: run pages 1-2, persist, then resume with pages 3-4 only.
    let mut pages = all_pages();
    let remaining = pages.split_off(2);

    let fetcher = Arc::new(FixtureFetcher { pages: AsyncMutex::new(pages) });
    let storage = Arc::new(FixtureStorage::default());
    let first_half = NoteDiscoveryEngine::new(k, p, fetcher, storage.clone())
        .with_max_pages(2)
        .run(None)
        .await
        .unwrap();
    assert!(!first_half.notes.is_empty());

    let fetcher = Arc::new(FixtureFetcher { pages: AsyncMutex::new(remaining) });
    let resumed = NoteDiscoveryEngine::new(k, p, fetcher, storage).run(None).await.unwrap();

    assert_eq!(resumed.notes, baseline.notes);
    assert_eq!(resumed.last_used_index, baseline.last_used_index);
}
