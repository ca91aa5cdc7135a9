use thiserror::Error;

pub type Result<T> = std::result::Result<T, SdkError>;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Discovery cancelled")]
    Cancelled,

    #[error("Commitment not present in state tree")]
    CommitmentNotInStateTree,

    #[error("Label not present in approved-set tree")]
    LabelNotInApprovedTree,

    #[error("Proof verification failed after generation: {0}")]
    ProofVerificationFailed(String),

    #[error("Circuit files unavailable: {0}")]
    CircuitFilesUnavailable(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Merkle tree error: {0}")]
    MerkleTree(String),

    #[error("Storage error (page {page:?}): {source}")]
    Storage {
        page: Option<u64>,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Fetcher error (page {page:?}): {source}")]
    Fetcher {
        page: Option<u64>,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SdkError {
    pub fn storage(page: Option<u64>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        SdkError::Storage {
            page,
            source: Box::new(source),
        }
    }

    pub fn fetcher(page: Option<u64>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        SdkError::Fetcher {
            page,
            source: Box::new(source),
        }
    }
}
