use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("Asset {0} not found")]
    NotFound(Uuid),
}

/// The asset-store contract the core consumes. Persistence backends are
/// external collaborators; scripts only need get/store/exists by ID.
pub trait AssetStore: Send + Sync {
    fn get(&self, id: &Uuid) -> Result<Vec<u8>, AssetError>;
    fn store(&self, data: Vec<u8>) -> Uuid;
    fn exists(&self, id: &Uuid) -> bool;
}

/// In-memory store used by tests and standalone regions.
pub struct MemoryAssetStore {
    assets: Mutex<HashMap<Uuid, Vec<u8>>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self {
            assets: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryAssetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetStore for MemoryAssetStore {
    fn get(&self, id: &Uuid) -> Result<Vec<u8>, AssetError> {
        self.assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or(AssetError::NotFound(*id))
    }

    fn store(&self, data: Vec<u8>) -> Uuid {
        let id = Uuid::new_v4();
        self.assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, data);
        id
    }

    fn exists(&self, id: &Uuid) -> bool {
        self.assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }
}
