//! Known-creator storage
//!
//! Vetting only needs an existence check: has this address launched a token
//! before? Addresses are stored as their 32 raw bytes.

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("creator store error: {0}")]
    Backend(#[from] sled::Error),
}

#[async_trait]
pub trait CreatorStore: Send + Sync {
    async fn has_created_asset_before(&self, creator: &Pubkey) -> Result<bool, StoreError>;

    /// Remember `creator` as having launched an asset.
    async fn record_creator(&self, creator: &Pubkey) -> Result<(), StoreError>;
}

/// sled-backed store, one tree keyed by creator address
pub struct SledCreatorStore {
    tree: sled::Tree,
}

impl SledCreatorStore {
    const TREE: &'static str = "creators";

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            tree: db.open_tree(Self::TREE)?,
        })
    }

    /// Number of known creators
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[async_trait]
impl CreatorStore for SledCreatorStore {
    async fn has_created_asset_before(&self, creator: &Pubkey) -> Result<bool, StoreError> {
        Ok(self.tree.contains_key(creator.as_ref())?)
    }

    async fn record_creator(&self, creator: &Pubkey) -> Result<(), StoreError> {
        let seen_at = chrono::Utc::now().timestamp().to_le_bytes();
        // keep the first sighting
        let _ = self
            .tree
            .compare_and_swap(creator.as_ref(), None as Option<&[u8]>, Some(&seen_at[..]))?;
        Ok(())
    }
}

/// In-memory store for tests and dry runs
#[derive(Default)]
pub struct InMemoryCreatorStore {
    creators: Mutex<HashSet<Pubkey>>,
}

impl InMemoryCreatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_creators(creators: impl IntoIterator<Item = Pubkey>) -> Self {
        Self {
            creators: Mutex::new(creators.into_iter().collect()),
        }
    }
}

#[async_trait]
impl CreatorStore for InMemoryCreatorStore {
    async fn has_created_asset_before(&self, creator: &Pubkey) -> Result<bool, StoreError> {
        Ok(self.creators.lock().contains(creator))
    }

    async fn record_creator(&self, creator: &Pubkey) -> Result<(), StoreError> {
        self.creators.lock().insert(*creator);
        Ok(())
    }
}
