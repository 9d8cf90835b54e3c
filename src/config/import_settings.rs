// ==========================================
// 案件管理系统数据迁移 - 导入参数
// ==========================================
// 职责: 一次导入运行所使用的全部可调参数（快照）
// 来源: ImportConfigReader（config_kv）或测试直接构造
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::domain::types::{ExistingRecordPolicy, ImportMode};
use crate::importer::error::MigrationResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_STORAGE_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 50;
pub const DEFAULT_PROGRESS_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub mode: ImportMode,
    /// 单实体类型可容忍的失败行数（超过即该实体类型失败）
    pub error_tolerance: usize,
    /// 显式回滚开关；None 时按 mode 默认
    pub rollback_on_failure: Option<bool>,
    pub existing_record_policy: ExistingRecordPolicy,
    pub worker_count: usize,
    pub storage_timeout_ms: u64,
    pub storage_max_retries: u32,
    pub retry_backoff_ms: u64,
    pub progress_chunk_size: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            mode: ImportMode::FirstTime,
            error_tolerance: 0,
            rollback_on_failure: None,
            existing_record_policy: ExistingRecordPolicy::Reject,
            worker_count: DEFAULT_WORKER_COUNT,
            storage_timeout_ms: DEFAULT_STORAGE_TIMEOUT_MS,
            storage_max_retries: DEFAULT_STORAGE_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            progress_chunk_size: DEFAULT_PROGRESS_CHUNK_SIZE,
        }
    }
}

impl ImportSettings {
    /// 增量模式的默认参数
    pub fn incremental() -> Self {
        Self {
            mode: ImportMode::Incremental,
            ..Self::default()
        }
    }

    /// 按组织读取参数
    pub async fn load(
        reader: &dyn ImportConfigReader,
        organization_id: &str,
    ) -> MigrationResult<Self> {
        Ok(Self {
            mode: reader.get_import_mode(organization_id).await?,
            error_tolerance: reader.get_error_tolerance(organization_id).await?,
            rollback_on_failure: reader.get_rollback_on_failure(organization_id).await?,
            existing_record_policy: reader.get_existing_record_policy(organization_id).await?,
            worker_count: reader.get_worker_count(organization_id).await?.max(1),
            storage_timeout_ms: reader.get_storage_timeout_ms(organization_id).await?,
            storage_max_retries: reader.get_storage_max_retries(organization_id).await?,
            retry_backoff_ms: reader.get_retry_backoff_ms(organization_id).await?,
            progress_chunk_size: reader.get_progress_chunk_size(organization_id).await?.max(1),
        })
    }

    /// 实际是否启用失败回滚
    pub fn rollback_enabled(&self) -> bool {
        self.rollback_on_failure
            .unwrap_or_else(|| self.mode.rollback_by_default())
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    // ===== 构建器 =====

    pub fn with_tolerance(mut self, error_tolerance: usize) -> Self {
        self.error_tolerance = error_tolerance;
        self
    }

    pub fn with_rollback(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = Some(enabled);
        self
    }

    pub fn with_policy(mut self, policy: ExistingRecordPolicy) -> Self {
        self.existing_record_policy = policy;
        self
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }
}
