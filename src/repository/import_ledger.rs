// ==========================================
// 案件管理系统数据迁移 - 导入台账 Repository Trait
// ==========================================
// 职责: 定义批次台账数据访问接口（不包含业务逻辑）
// 红线: Repository 不含业务规则，只做数据 CRUD
// 约束:
// - 批次状态只能按状态机前进（终态冻结）
// - ImportError 只追加
// ==========================================

use crate::domain::batch::{BatchOutcome, ImportBatch, ImportError};
use crate::domain::types::BatchStatus;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ImportLedger Trait
// ==========================================
// 实现者: SqliteImportLedger（使用 rusqlite）
#[async_trait]
pub trait ImportLedger: Send + Sync {
    // ===== 批次 =====

    /// 创建批次（status 必须为 pending）
    async fn insert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()>;

    /// 推进批次状态（非法转换返回 InvalidStateTransition）
    async fn update_batch_status(
        &self,
        batch_id: &str,
        status: BatchStatus,
    ) -> RepositoryResult<()>;

    /// 写入批次终态与统计
    async fn finish_batch(&self, batch_id: &str, outcome: &BatchOutcome) -> RepositoryResult<()>;

    /// 按组织列出批次（按创建时间倒序）
    async fn list_batches(&self, organization_id: &str) -> RepositoryResult<Vec<ImportBatch>>;

    async fn get_batch(&self, batch_id: &str) -> RepositoryResult<Option<ImportBatch>>;

    // ===== 失败行 =====

    /// 追加失败行记录
    ///
    /// # 返回
    /// - Ok(usize): 写入条数
    async fn append_errors(&self, errors: &[ImportError]) -> RepositoryResult<usize>;

    /// 查询批次失败行（按实体类型、行号排序）
    async fn get_errors(&self, batch_id: &str) -> RepositoryResult<Vec<ImportError>>;
}
