use crate::error::{Result, RewardError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_types::{AccountAddress, LicenseId, TokenAmount};
use tokio::sync::RwLock;
use tracing::info;

/// External license-ownership registry. The engine consults it for
/// authorization and writes back on executed transfers.
#[async_trait]
pub trait OwnershipRegistry: Send + Sync {
    async fn owner_of(&self, id: LicenseId) -> Result<AccountAddress>;
    async fn set_owner(&self, id: LicenseId, owner: AccountAddress) -> Result<()>;
}

/// External token-issuance collaborator; payouts are minted to addresses.
#[async_trait]
pub trait TokenIssuance: Send + Sync {
    async fn mint(&self, to: AccountAddress, amount: TokenAmount) -> Result<()>;
}

pub struct MemoryOwnershipRegistry {
    owners: Arc<RwLock<HashMap<LicenseId, AccountAddress>>>,
}

impl Default for MemoryOwnershipRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOwnershipRegistry {
    pub fn new() -> Self {
        Self {
            owners: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl OwnershipRegistry for MemoryOwnershipRegistry {
    async fn owner_of(&self, id: LicenseId) -> Result<AccountAddress> {
        let owners = self.owners.read().await;
        owners.get(&id).copied().ok_or(RewardError::UnknownLicense(id))
    }

    async fn set_owner(&self, id: LicenseId, owner: AccountAddress) -> Result<()> {
        let mut owners = self.owners.write().await;
        owners.insert(id, owner);
        Ok(())
    }
}

/// In-memory mint ledger; doubles as the balance oracle for tests.
pub struct MemoryTokenIssuance {
    balances: Arc<RwLock<HashMap<AccountAddress, TokenAmount>>>,
}

impl Default for MemoryTokenIssuance {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTokenIssuance {
    pub fn new() -> Self {
        Self {
            balances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn balance_of(&self, address: AccountAddress) -> TokenAmount {
        let balances = self.balances.read().await;
        balances.get(&address).copied().unwrap_or(TokenAmount::ZERO)
    }

    pub async fn total_minted(&self) -> TokenAmount {
        let balances = self.balances.read().await;
        balances.values().copied().sum()
    }
}

#[async_trait]
impl TokenIssuance for MemoryTokenIssuance {
    async fn mint(&self, to: AccountAddress, amount: TokenAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut balances = self.balances.write().await;
        let entry = balances.entry(to).or_insert(TokenAmount::ZERO);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| RewardError::Storage("balance overflow".into()))?;
        info!(to = %to, amount = %amount, "Rewards minted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ownership_round_trip() {
        let registry = MemoryOwnershipRegistry::new();
        let id = LicenseId::new(4);
        let owner = AccountAddress::from_bytes([1; 32]);

        assert!(registry.owner_of(id).await.is_err());
        registry.set_owner(id, owner).await.unwrap();
        assert_eq!(registry.owner_of(id).await.unwrap(), owner);
    }

    #[tokio::test]
    async fn test_mint_accumulates() {
        let issuance = MemoryTokenIssuance::new();
        let to = AccountAddress::from_bytes([2; 32]);
        issuance.mint(to, TokenAmount::from_whole(3)).await.unwrap();
        issuance.mint(to, TokenAmount::from_whole(4)).await.unwrap();
        assert_eq!(issuance.balance_of(to).await, TokenAmount::from_whole(7));
        assert_eq!(issuance.total_minted().await, TokenAmount::from_whole(7));
    }
}
