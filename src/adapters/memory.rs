//! In-memory transactional key/value store.
//!
//! Writes made through a `MemoryTransaction` are staged and only become
//! visible to other transactions after `commit`. A transaction can finish
//! once; any later use fails.

use crate::domain::ports::{ConnectionPool, Transaction};
use crate::utils::error::{BusError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
struct DatabaseState {
    rows: RwLock<BTreeMap<String, Value>>,
    next_transaction: AtomicU64,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<DatabaseState>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已提交的資料
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.state.rows.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn commit_count(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }

    pub fn transaction(&self) -> MemoryTransaction {
        let id = self.state.next_transaction.fetch_add(1, Ordering::SeqCst) + 1;
        MemoryTransaction {
            id,
            db: self.clone(),
            staged: Mutex::new(BTreeMap::new()),
            finished: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ConnectionPool for MemoryDatabase {
    async fn begin(&self) -> Result<Arc<dyn Transaction>> {
        let tx = self.transaction();
        tracing::trace!("Began transaction #{}", tx.id);
        Ok(Arc::new(tx))
    }
}

pub struct MemoryTransaction {
    id: u64,
    db: MemoryDatabase,
    /// `None` marks a staged delete
    staged: Mutex<BTreeMap<String, Option<Value>>>,
    finished: AtomicBool,
}

impl MemoryTransaction {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(BusError::Transaction {
                message: format!("transaction #{} is already finished", self.id),
            });
        }
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return Err(BusError::Transaction {
                message: format!("transaction #{} is already finished", self.id),
            });
        }
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.ensure_open()?;
        if let Some(staged) = self.staged.lock().await.get(key) {
            return Ok(staged.clone());
        }
        Ok(self.db.get(key).await)
    }

    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, key: &str, value: Value) -> Result<()> {
        self.ensure_open()?;
        self.staged.lock().await.insert(key.to_string(), Some(value));
        Ok(())
    }

    pub async fn put_as<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.put(key, serde_json::to_value(value)?).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_open()?;
        self.staged.lock().await.insert(key.to_string(), None);
        Ok(())
    }

    /// Committed rows overlaid with this transaction's staged writes.
    pub async fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        self.ensure_open()?;
        let mut view: BTreeMap<String, Value> = self
            .db
            .state
            .rows
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (key, staged) in self.staged.lock().await.iter() {
            if !key.starts_with(prefix) {
                continue;
            }
            match staged {
                Some(value) => {
                    view.insert(key.clone(), value.clone());
                }
                None => {
                    view.remove(key);
                }
            }
        }
        Ok(view.into_iter().collect())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(&self) -> Result<()> {
        self.finish()?;
        let staged = std::mem::take(&mut *self.staged.lock().await);
        let mut rows = self.db.state.rows.write().await;
        let writes = staged.len();
        for (key, value) in staged {
            match value {
                Some(value) => {
                    rows.insert(key, value);
                }
                None => {
                    rows.remove(&key);
                }
            }
        }
        self.db.state.commits.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("Committed transaction #{} ({} writes)", self.id, writes);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.finish()?;
        let discarded = std::mem::take(&mut *self.staged.lock().await).len();
        self.db.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("Rolled back transaction #{} ({} writes discarded)", self.id, discarded);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let db = MemoryDatabase::new();
        let tx = db.transaction();
        tx.put("debts/1", json!({"amount": 100})).await.unwrap();

        assert_eq!(tx.get("debts/1").await.unwrap(), Some(json!({"amount": 100})));
        assert!(db.get("debts/1").await.is_none());

        tx.commit().await.unwrap();
        assert_eq!(db.get("debts/1").await, Some(json!({"amount": 100})));
        assert_eq!(db.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let db = MemoryDatabase::new();
        let tx = db.transaction();
        tx.put("debts/1", json!(1)).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(db.is_empty().await);
        assert_eq!(db.rollback_count(), 1);
    }

    #[tokio::test]
    async fn test_finished_transaction_rejects_use() {
        let db = MemoryDatabase::new();
        let tx = db.transaction();
        tx.commit().await.unwrap();

        assert!(tx.put("a", json!(1)).await.is_err());
        assert!(tx.rollback().await.is_err());
        assert!(tx.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_scan_overlays_staged_rows() {
        let db = MemoryDatabase::new();
        let setup = db.transaction();
        setup.put("debts/1", json!(1)).await.unwrap();
        setup.put("debts/2", json!(2)).await.unwrap();
        setup.put("payments/1", json!(9)).await.unwrap();
        setup.commit().await.unwrap();

        let tx = db.transaction();
        tx.delete("debts/1").await.unwrap();
        tx.put("debts/3", json!(3)).await.unwrap();

        let rows = tx.scan("debts/").await.unwrap();
        assert_eq!(
            rows,
            vec![
                ("debts/2".to_string(), json!(2)),
                ("debts/3".to_string(), json!(3)),
            ]
        );
    }
}
