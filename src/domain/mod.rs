// ==========================================
// 案件管理系统数据迁移 - 领域层
// ==========================================
// 职责: 迁移管道的数据模型（不含业务流程）
// ==========================================

pub mod batch;
pub mod mapping;
pub mod record;
pub mod report;
pub mod types;

// 重导出核心类型
pub use batch::{BatchOutcome, BatchRequest, ImportBatch, ImportError};
pub use mapping::{EntityMapping, FieldTransform, MappingConfig};
pub use record::{
    FieldValue, MappedRecord, NewRecord, ParseError, ParseErrorKind, ParsedFile, RawRow,
    RawValues, RecordId, StoredRecord, UpdatedRecord,
};
pub use report::{
    DryRunResult, EntityCounts, EntityProgress, ImportExecutionResult, RollbackError,
    ValidationIssue,
};
pub use types::{
    BatchStatus, EntityStatus, EntityType, ExistingRecordPolicy, ImportMode, IssueKind, Severity,
};
