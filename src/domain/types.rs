// ==========================================
// 案件管理系统数据迁移 - 领域类型定义
// ==========================================
// 职责: 实体类型、严重级别、批次/实体状态机、导入模式
// 序列化格式: snake_case（与台账表一致）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 实体类型 (Entity Type)
// ==========================================
// 声明顺序即产品依赖图的注册顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Accounts,       // 客户
    Contacts,       // 联系人
    Cases,          // 案件
    CaseSubjects,   // 案件当事人
    CaseActivities, // 案件活动
    CaseFinances,   // 案件费用
    Invoices,       // 发票
}

impl EntityType {
    /// 全部实体类型（按声明顺序）
    pub const ALL: [EntityType; 7] = [
        EntityType::Accounts,
        EntityType::Contacts,
        EntityType::Cases,
        EntityType::CaseSubjects,
        EntityType::CaseActivities,
        EntityType::CaseFinances,
        EntityType::Invoices,
    ];

    /// 转换为字符串标识（与上传文件名/台账字段一致）
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Accounts => "accounts",
            EntityType::Contacts => "contacts",
            EntityType::Cases => "cases",
            EntityType::CaseSubjects => "case_subjects",
            EntityType::CaseActivities => "case_activities",
            EntityType::CaseFinances => "case_finances",
            EntityType::Invoices => "invoices",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        EntityType::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == normalized)
            .ok_or_else(|| format!("未知实体类型: {}", s))
    }
}

// ==========================================
// 问题严重级别 (Severity)
// ==========================================
// Error 阻断该行写入；Warning 仅提示
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

// ==========================================
// 问题分类 (Issue Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Parse,             // 文件解析（行级/文件级）
    Mapping,           // 字段未映射 / 类型转换失败
    Validation,        // 模式规则 / 业务规则
    ReferenceConflict, // 跨实体引用无法解析
    DuplicateKey,      // 业务主键重复（同批次内或已存在）
    WriteFailure,      // 执行期存储写入失败
    DependencyFailed,  // 依赖实体类型未完成
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Parse => "parse",
            IssueKind::Mapping => "mapping",
            IssueKind::Validation => "validation",
            IssueKind::ReferenceConflict => "reference_conflict",
            IssueKind::DuplicateKey => "duplicate_key",
            IssueKind::WriteFailure => "write_failure",
            IssueKind::DependencyFailed => "dependency_failed",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "parse" => Ok(IssueKind::Parse),
            "mapping" => Ok(IssueKind::Mapping),
            "validation" => Ok(IssueKind::Validation),
            "reference_conflict" => Ok(IssueKind::ReferenceConflict),
            "duplicate_key" => Ok(IssueKind::DuplicateKey),
            "write_failure" => Ok(IssueKind::WriteFailure),
            "dependency_failed" => Ok(IssueKind::DependencyFailed),
            other => Err(format!("未知问题类型: {}", other)),
        }
    }
}

// ==========================================
// 批次状态 (Batch Status)
// ==========================================
// 状态机: pending → processing → (completed | failed | rolled_back)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    RolledBack,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::RolledBack => "rolled_back",
        }
    }

    /// 终态: 不再允许任何状态变更
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::RolledBack
        )
    }

    /// 判断状态转换是否合法
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        matches!(
            (self, next),
            (BatchStatus::Pending, BatchStatus::Processing)
                | (BatchStatus::Processing, BatchStatus::Completed)
                | (BatchStatus::Processing, BatchStatus::Failed)
                | (BatchStatus::Processing, BatchStatus::RolledBack)
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(BatchStatus::Pending),
            "processing" => Ok(BatchStatus::Processing),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            "rolled_back" => Ok(BatchStatus::RolledBack),
            other => Err(format!("未知批次状态: {}", other)),
        }
    }
}

// ==========================================
// 实体处理状态 (Entity Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityStatus::Pending => write!(f, "pending"),
            EntityStatus::Processing => write!(f, "processing"),
            EntityStatus::Completed => write!(f, "completed"),
            EntityStatus::Failed => write!(f, "failed"),
        }
    }
}

// ==========================================
// 导入模式 (Import Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// 首次迁移: 任一实体类型失败即整批回滚
    #[default]
    FirstTime,
    /// 增量导入: 容忍部分失败，失败行进入修正流程
    Incremental,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::FirstTime => "first_time",
            ImportMode::Incremental => "incremental",
        }
    }

    /// 该模式默认是否启用失败回滚
    pub fn rollback_by_default(&self) -> bool {
        matches!(self, ImportMode::FirstTime)
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first_time" => Ok(ImportMode::FirstTime),
            "incremental" => Ok(ImportMode::Incremental),
            other => Err(format!("未知导入模式: {}", other)),
        }
    }
}

// ==========================================
// 已存在记录策略 (Existing Record Policy)
// ==========================================
// 业务主键在目标存储中已存在时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingRecordPolicy {
    /// 视为冲突，该行不写入
    #[default]
    Reject,
    /// 覆盖已有记录（回滚时恢复原值）
    Update,
}

impl FromStr for ExistingRecordPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(ExistingRecordPolicy::Reject),
            "update" => Ok(ExistingRecordPolicy::Update),
            other => Err(format!("未知已存在记录策略: {}", other)),
        }
    }
}
