use crate::config::BusConfig;
use crate::domain::ports::{Storage, Transaction};
use crate::utils::error::{BusError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Process-wide services every request can reach (config, object storage).
#[derive(Clone)]
pub struct StaticServices {
    pub config: Arc<BusConfig>,
    pub storage: Option<Arc<dyn Storage>>,
}

impl StaticServices {
    pub fn new(config: Arc<BusConfig>) -> Self {
        Self {
            config,
            storage: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn storage(&self) -> Result<&Arc<dyn Storage>> {
        self.storage.as_ref().ok_or_else(|| BusError::Config {
            message: "no storage client configured".to_string(),
        })
    }
}

/// 單一外部請求的執行上下文：交易、session 與靜態服務。
///
/// 以 `Arc` 在所有巢狀呼叫間共享，從不複製；請求結束後隨交易一起丟棄。
pub struct ExecutionContext {
    request_id: String,
    started_at: DateTime<Utc>,
    transaction: Arc<dyn Transaction>,
    session: Option<Value>,
    services: StaticServices,
}

impl ExecutionContext {
    pub fn new(
        request_id: impl Into<String>,
        transaction: Arc<dyn Transaction>,
        session: Option<Value>,
        services: StaticServices,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            started_at: Utc::now(),
            transaction,
            session,
            services,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn transaction(&self) -> &Arc<dyn Transaction> {
        &self.transaction
    }

    /// 取得具體的交易型別（例如資料庫 adapter 的交易）
    pub fn transaction_as<T: 'static>(&self) -> Result<&T> {
        self.transaction
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| BusError::Transaction {
                message: format!(
                    "transaction handle is not a {}",
                    std::any::type_name::<T>()
                ),
            })
    }

    pub fn session(&self) -> Option<&Value> {
        self.session.as_ref()
    }

    pub fn session_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.session {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn services(&self) -> &StaticServices {
        &self.services
    }

    pub fn config(&self) -> &BusConfig {
        &self.services.config
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("request_id", &self.request_id)
            .field("started_at", &self.started_at)
            .field("has_session", &self.session.is_some())
            .finish()
    }
}
