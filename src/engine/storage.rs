// ==========================================
// 案件管理系统数据迁移 - 目标存储接口
// ==========================================
// 职责: 定义记录写入接口 + 单次调用的超时/重试策略
// 说明: Engine 层定义 trait，Repository 层提供实现
// 约束: 每个 RecordStore 实例只对应一个组织（租户隔离）
// 实现者:
// - SqliteRecordStore（rusqlite，按 organization_id 过滤）
// - InMemoryRecordStore（测试 / 嵌入式使用）
// - OverlayStore（预演草稿层，不写底层存储）
// ==========================================

use crate::config::import_settings::ImportSettings;
use crate::domain::record::{FieldValue, NewRecord, RecordId, UpdatedRecord};
use crate::domain::types::EntityType;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

// ==========================================
// StoreError - 存储错误
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("记录不存在: {entity_type} {key}")]
    NotFound { entity_type: EntityType, key: String },

    #[error("业务主键已存在: {entity_type} {key}")]
    Duplicate { entity_type: EntityType, key: String },

    #[error("存储调用超时（{0} ms）")]
    Timeout(u64),

    #[error("存储暂不可用: {0}")]
    Unavailable(String),

    #[error("存储错误: {0}")]
    Backend(String),
}

impl StoreError {
    /// 可重试错误（超时 / 暂不可用）
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ==========================================
// RecordStore Trait
// ==========================================
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 按业务主键判断记录是否存在
    async fn exists(&self, entity_type: EntityType, key: &str) -> StoreResult<bool>;

    /// 新建记录
    ///
    /// # 错误
    /// - Duplicate: 业务主键已存在
    async fn insert(&self, record: NewRecord) -> StoreResult<RecordId>;

    /// 按业务主键覆盖字段，返回覆盖前的字段
    ///
    /// # 错误
    /// - NotFound: 业务主键不存在
    async fn update(
        &self,
        entity_type: EntityType,
        key: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> StoreResult<UpdatedRecord>;

    /// 按记录 ID 删除（回滚使用）
    async fn delete(&self, entity_type: EntityType, id: &RecordId) -> StoreResult<()>;
}

// ==========================================
// TenantStores - 按组织路由记录存储
// ==========================================
pub trait TenantStores: Send + Sync {
    /// 返回只读写该组织记录的存储视图
    fn store_for(&self, organization_id: &str) -> Arc<dyn RecordStore>;
}

// ==========================================
// StorageCallPolicy - 单次存储调用策略
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageCallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl StorageCallPolicy {
    pub fn from_settings(settings: &ImportSettings) -> Self {
        Self {
            timeout: settings.storage_timeout(),
            max_retries: settings.storage_max_retries,
            backoff: settings.retry_backoff(),
        }
    }

    /// 执行一次存储调用（超时视为可重试错误，重试耗尽返回最后一次错误）
    pub async fn call<T, F, Fut>(&self, op: &str, mut f: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, f()).await {
                Ok(r) => r,
                Err(_) => Err(StoreError::Timeout(self.timeout.as_millis() as u64)),
            };

            match result {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(op = op, attempt = attempt, error = %e, "存储调用失败，准备重试");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_retries: u32) -> StorageCallPolicy {
        StorageCallPolicy {
            timeout: Duration::from_millis(50),
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = policy(2)
            .call("insert", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StoreError::Unavailable("busy".to_string()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: StoreResult<()> = policy(3)
            .call("insert", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(StoreError::Backend("constraint".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_exhausts_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: StoreResult<()> = policy(1)
            .call("exists", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(())
                }
            })
            .await;

        assert_eq!(result, Err(StoreError::Timeout(50)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
