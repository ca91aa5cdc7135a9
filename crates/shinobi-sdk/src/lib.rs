pub mod activity;
pub mod discovery;
pub mod error;
pub mod field;
pub mod keys;
pub mod merkle;
pub mod note;
pub mod withdrawal;

pub use activity::{Activity, ActivityPage, DiscoveryCheckpoint, DiscoveryResult, FetchOrder, PageInfo};
pub use discovery::{ActivityFetcher, BoxError, CancellationToken, NoteDiscoveryEngine, NoteStorageProvider, ProgressObserver, ProgressUpdate};
pub use error::{Result, SdkError};
pub use keys::AccountKey;
pub use merkle::{MerkleProof, MerkleTree};
pub use note::{DepositCommitmentResult, Note, NoteCoordinate, NoteKind, NoteStatus};
pub use withdrawal::{Groth16InputRecord, Proof, ProofBackend, RefundContext, WithdrawalContext, WithdrawalData};
