use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, Statement,
    TransactionTrait, Value,
};

use crate::config::AdvisoryLockStrategy;
use crate::error::OrgTreeError;

/// A transaction holding the table's advisory lock, if one is configured.
///
/// The lock is transaction scoped (`pg_advisory_xact_lock`), so it is
/// released by whichever of commit or rollback ends the transaction.
pub struct LockedTransaction {
    txn: DatabaseTransaction,
}

impl LockedTransaction {
    pub async fn acquire(
        strategy: &AdvisoryLockStrategy,
        db: &DatabaseConnection,
    ) -> Result<Self, OrgTreeError> {
        let txn = db.begin().await?;

        if let Some(key) = strategy.key() {
            if let Err(err) = acquire_lock(&txn, key.as_str()).await {
                let _ = txn.rollback().await;
                return Err(err);
            }
            tracing::trace!(key = key.as_str(), "advisory lock acquired");
        }

        Ok(Self { txn })
    }

    pub fn connection(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> Result<(), OrgTreeError> {
        self.txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), OrgTreeError> {
        self.txn.rollback().await?;
        Ok(())
    }

    /// Commits on `Ok`, rolls back on `Err`, and hands `result` back.
    pub async fn finish<T>(self, result: Result<T, OrgTreeError>) -> Result<T, OrgTreeError> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.rollback().await;
                Err(err)
            }
        }
    }
}

async fn acquire_lock(txn: &DatabaseTransaction, key: &str) -> Result<(), OrgTreeError> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1), 0)",
        vec![Value::from(key)],
    ))
    .await?;
    Ok(())
}
