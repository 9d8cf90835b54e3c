// ==========================================
// 案件管理系统数据迁移 - 批次台账模型
// ==========================================
// 职责: ImportBatch / ImportError 持久化结构
// 约束:
// - ImportBatch 仅由执行引擎变更，终态后冻结
// - ImportError 只追加，不修改
// ==========================================

use crate::domain::record::RawValues;
use crate::domain::types::{BatchStatus, EntityType, ImportMode, IssueKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// BatchRequest - 发起导入的调用方上下文
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub organization_id: String,
    pub user_id: String,
    pub source_system_name: String, // 源系统名称（如 "LegacyCMS"）
}

// ==========================================
// ImportBatch - 导入批次
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: String,                           // 批次 ID（UUID）
    pub organization_id: String,              // 组织
    pub user_id: String,                      // 发起人
    pub source_system_name: String,           // 源系统
    pub mapping_config_snapshot: String,      // 映射配置快照（JSON）
    pub status: BatchStatus,                  // 批次状态
    pub mode: ImportMode,                     // 导入模式
    pub total_records: usize,                 // 总行数
    pub successful_records: usize,            // 成功写入行数
    pub failed_records: usize,                // 失败行数
    pub rolled_back_records: usize,           // 回滚撤销的写入数
    pub predecessor_batch_id: Option<String>, // 修正重导入的前序批次
    pub message: Option<String>,              // 结果说明
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportBatch {
    /// 创建待处理批次
    pub fn new(
        request: &BatchRequest,
        mapping_config_snapshot: String,
        mode: ImportMode,
        total_records: usize,
        predecessor_batch_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            organization_id: request.organization_id.clone(),
            user_id: request.user_id.clone(),
            source_system_name: request.source_system_name.clone(),
            mapping_config_snapshot,
            status: BatchStatus::Pending,
            mode,
            total_records,
            successful_records: 0,
            failed_records: 0,
            rolled_back_records: 0,
            predecessor_batch_id,
            message: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// 还原调用方上下文（修正重导入沿用原批次身份）
    pub fn request(&self) -> BatchRequest {
        BatchRequest {
            organization_id: self.organization_id.clone(),
            user_id: self.user_id.clone(),
            source_system_name: self.source_system_name.clone(),
        }
    }
}

// ==========================================
// BatchOutcome - 批次终态写入内容
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub status: BatchStatus,
    pub successful_records: usize,
    pub failed_records: usize,
    pub rolled_back_records: usize,
    pub message: Option<String>,
}

// ==========================================
// ImportError - 失败行记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportError {
    pub id: String,
    pub batch_id: String,
    pub entity_type: EntityType,
    pub source_row_index: usize,
    pub raw_values: RawValues, // 原始行（修正依据）
    pub error_message: String,
    pub kind: IssueKind,
    pub created_at: DateTime<Utc>,
}

impl ImportError {
    pub fn new(
        batch_id: &str,
        entity_type: EntityType,
        source_row_index: usize,
        raw_values: RawValues,
        kind: IssueKind,
        error_message: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            batch_id: batch_id.to_string(),
            entity_type,
            source_row_index,
            raw_values,
            error_message,
            kind,
            created_at: Utc::now(),
        }
    }

    /// 错误签名（实体, 行号, 类型, 消息），用于比较两次导入的错误集合
    pub fn signature(&self) -> (EntityType, usize, IssueKind, String) {
        (
            self.entity_type,
            self.source_row_index,
            self.kind,
            self.error_message.clone(),
        )
    }
}
