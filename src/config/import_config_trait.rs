// ==========================================
// 案件管理系统数据迁移 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::{ExistingRecordPolicy, ImportMode};
use crate::importer::error::MigrationResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 按组织读取导入参数（组织级覆盖 → 全局 → 默认值）
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 批次行为 =====

    /// 获取导入模式
    ///
    /// # 默认值
    /// - first_time
    async fn get_import_mode(&self, organization_id: &str) -> MigrationResult<ImportMode>;

    /// 获取单实体类型可容忍的失败行数
    ///
    /// # 默认值
    /// - 0（任一行失败即判定该实体类型失败）
    async fn get_error_tolerance(&self, organization_id: &str) -> MigrationResult<usize>;

    /// 获取失败回滚开关（None 表示按导入模式默认）
    async fn get_rollback_on_failure(&self, organization_id: &str)
        -> MigrationResult<Option<bool>>;

    /// 获取业务主键已存在时的处理策略
    ///
    /// # 默认值
    /// - reject
    async fn get_existing_record_policy(
        &self,
        organization_id: &str,
    ) -> MigrationResult<ExistingRecordPolicy>;

    // ===== 执行资源 =====

    /// 获取单实体类型内的并发写入数
    ///
    /// # 默认值
    /// - 4
    async fn get_worker_count(&self, organization_id: &str) -> MigrationResult<usize>;

    /// 获取单次存储调用超时（毫秒）
    ///
    /// # 默认值
    /// - 5000
    async fn get_storage_timeout_ms(&self, organization_id: &str) -> MigrationResult<u64>;

    /// 获取存储调用最大重试次数（瞬时错误/超时）
    ///
    /// # 默认值
    /// - 2
    async fn get_storage_max_retries(&self, organization_id: &str) -> MigrationResult<u32>;

    /// 获取重试基础退避（毫秒，按次数线性递增）
    ///
    /// # 默认值
    /// - 50
    async fn get_retry_backoff_ms(&self, organization_id: &str) -> MigrationResult<u64>;

    /// 获取进度回调间隔（行数）
    ///
    /// # 默认值
    /// - 100
    async fn get_progress_chunk_size(&self, organization_id: &str) -> MigrationResult<usize>;
}
