// ==========================================
// 案件管理系统数据迁移 - 校验/预演/执行结果模型
// ==========================================
// 职责: ValidationIssue / DryRunResult / EntityProgress / ImportExecutionResult
// ==========================================

use crate::domain::batch::{ImportBatch, ImportError};
use crate::domain::record::RecordId;
use crate::domain::types::{EntityStatus, EntityType, IssueKind, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ==========================================
// ValidationIssue - 行级问题
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub source_row_index: usize,
    pub entity_type: EntityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub severity: Severity,
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(
        entity_type: EntityType,
        source_row_index: usize,
        kind: IssueKind,
        field: Option<&str>,
        message: String,
    ) -> Self {
        Self {
            source_row_index,
            entity_type,
            field: field.map(str::to_string),
            severity: Severity::Error,
            kind,
            message,
        }
    }

    pub fn warning(
        entity_type: EntityType,
        source_row_index: usize,
        kind: IssueKind,
        field: Option<&str>,
        message: String,
    ) -> Self {
        Self {
            source_row_index,
            entity_type,
            field: field.map(str::to_string),
            severity: Severity::Warning,
            kind,
            message,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// 将多个阻断问题合并为一条错误消息
pub fn join_messages(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

// ==========================================
// EntityCounts - 单实体类型预演统计
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub total: usize,
    pub to_create: usize,
    pub to_update: usize,
    pub blocked: usize,
    pub warnings: usize,
    pub projected_status: EntityStatus, // 按容忍度推算的执行结果
}

impl Default for EntityCounts {
    fn default() -> Self {
        Self {
            total: 0,
            to_create: 0,
            to_update: 0,
            blocked: 0,
            warnings: 0,
            projected_status: EntityStatus::Pending,
        }
    }
}

// ==========================================
// DryRunResult - 预演结果（纯投影，不落库）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunResult {
    pub success: bool,
    pub records_to_create: usize,
    pub records_to_update: usize,
    /// 全部问题（含 warning），按处理顺序排列
    pub conflicts: Vec<ValidationIssue>,
    pub per_entity_counts: BTreeMap<EntityType, EntityCounts>,
    pub import_order: Vec<EntityType>,
}

impl DryRunResult {
    /// 跨实体引用冲突
    pub fn reference_conflicts(&self) -> Vec<&ValidationIssue> {
        self.issues_of_kind(IssueKind::ReferenceConflict)
    }

    pub fn issues_of_kind(&self, kind: IssueKind) -> Vec<&ValidationIssue> {
        self.conflicts.iter().filter(|i| i.kind == kind).collect()
    }

    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.conflicts.iter().filter(|i| i.is_blocking()).collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.conflicts.iter().filter(|i| !i.is_blocking()).collect()
    }

    /// 某实体类型预计新建数
    pub fn to_create(&self, entity_type: EntityType) -> usize {
        self.per_entity_counts
            .get(&entity_type)
            .map(|c| c.to_create)
            .unwrap_or(0)
    }
}

// ==========================================
// EntityProgress - 实体类型执行进度（运行期）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProgress {
    pub entity_type: EntityType,
    pub status: EntityStatus,
    pub processed: usize,
    pub total: usize,
    pub errors: usize,
}

impl EntityProgress {
    pub fn new(entity_type: EntityType, total: usize) -> Self {
        Self {
            entity_type,
            status: EntityStatus::Pending,
            processed: 0,
            total,
            errors: 0,
        }
    }
}

// ==========================================
// RollbackError - 回滚删除失败
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackError {
    pub entity_type: EntityType,
    pub record_id: RecordId,
    pub natural_key: String,
    pub message: String,
}

// ==========================================
// ImportExecutionResult - 执行结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportExecutionResult {
    pub batch: ImportBatch,
    pub entity_progress: Vec<EntityProgress>,
    pub errors: Vec<ImportError>,
    pub warnings: Vec<ValidationIssue>,
    pub rollback_errors: Vec<RollbackError>,
    pub elapsed_time: Duration,
}

impl ImportExecutionResult {
    pub fn progress_of(&self, entity_type: EntityType) -> Option<&EntityProgress> {
        self.entity_progress
            .iter()
            .find(|p| p.entity_type == entity_type)
    }
}
