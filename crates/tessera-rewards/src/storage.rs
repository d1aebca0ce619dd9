use crate::error::Result;
use crate::license::License;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_types::LicenseId;
use tokio::sync::RwLock;

/// Persistence boundary for the license ledger. The replicated substrate
/// supplies a durable implementation; tests and previews use the in-memory
/// one.
#[async_trait]
pub trait RewardStorage: Send + Sync {
    async fn load_license(&self, id: LicenseId) -> Result<Option<License>>;
    async fn store_license(&self, license: &License) -> Result<()>;
    async fn all_license_ids(&self) -> Result<Vec<LicenseId>>;
}

pub struct MemoryStorage {
    licenses: Arc<RwLock<HashMap<LicenseId, License>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            licenses: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl RewardStorage for MemoryStorage {
    async fn load_license(&self, id: LicenseId) -> Result<Option<License>> {
        let licenses = self.licenses.read().await;
        Ok(licenses.get(&id).cloned())
    }

    async fn store_license(&self, license: &License) -> Result<()> {
        let mut licenses = self.licenses.write().await;
        licenses.insert(license.id, license.clone());
        Ok(())
    }

    async fn all_license_ids(&self) -> Result<Vec<LicenseId>> {
        let licenses = self.licenses.read().await;
        let mut ids: Vec<LicenseId> = licenses.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::{Epoch, TokenAmount};

    #[tokio::test]
    async fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        let id = LicenseId::new(7);
        assert!(storage.load_license(id).await.unwrap().is_none());

        let license = License::new(id, TokenAmount::from_whole(1000), 5 as Epoch);
        storage.store_license(&license).await.unwrap();

        let loaded = storage.load_license(id).await.unwrap().unwrap();
        assert_eq!(loaded.assigned, license.assigned);
        assert_eq!(storage.all_license_ids().await.unwrap(), vec![id]);
    }
}
