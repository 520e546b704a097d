use async_trait::async_trait;
use sqlx::PgPool;
use tally_engine::{CommitReceipt, EventCommit, LedgerStore, StoreError, VersionedBalance};
use tally_ledger::{BankState, LedgerEvent, UserBalance};

/// `LedgerStore` over a Postgres pool.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn read_balance(&self, uid: &str) -> Result<VersionedBalance, StoreError> {
        Ok(crate::fetch_balance(&self.pool, uid).await?)
    }

    async fn read_bank(&self) -> Result<BankState, StoreError> {
        Ok(crate::fetch_bank(&self.pool).await?)
    }

    async fn commit_event(&self, commit: EventCommit) -> Result<CommitReceipt, StoreError> {
        crate::commit_event(&self.pool, &commit).await
    }

    async fn load_events(&self, uid: &str) -> Result<Vec<LedgerEvent>, StoreError> {
        Ok(crate::fetch_events_for_uid(&self.pool, uid).await?)
    }

    async fn load_all_events(&self) -> Result<Vec<LedgerEvent>, StoreError> {
        Ok(crate::fetch_all_events(&self.pool).await?)
    }

    async fn overwrite_balance(&self, balance: &UserBalance) -> Result<i64, StoreError> {
        Ok(crate::overwrite_balance(&self.pool, balance).await?)
    }

    async fn list_uids(&self) -> Result<Vec<String>, StoreError> {
        Ok(crate::list_uids(&self.pool).await?)
    }
}
