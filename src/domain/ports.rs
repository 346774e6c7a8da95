use crate::utils::error::Result;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Opaque per-request transaction handle. The bus never opens or closes
/// connections; the request boundary decides between commit and rollback.
#[async_trait]
pub trait Transaction: Send + Sync {
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;
    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn begin(&self) -> Result<Arc<dyn Transaction>>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;
}
