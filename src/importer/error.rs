// ==========================================
// 案件管理系统数据迁移 - 迁移模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约束: 行级问题是数据（ValidationIssue / ImportError），不走 Err
// ==========================================

use crate::domain::types::EntityType;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 迁移模块错误类型（操作级）
#[derive(Error, Debug)]
pub enum MigrationError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .csv/.xlsx/.xls）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("同一实体类型上传了多个文件: {0}")]
    DuplicateEntityFile(EntityType),

    #[error("未知实体类型: {0}")]
    UnknownEntityType(String),

    // ===== 映射 / 依赖图错误 =====
    #[error("映射配置快照无效: {0}")]
    InvalidMappingSnapshot(String),

    #[error("依赖关系无效 ({entity}): {message}")]
    InvalidDependency { entity: EntityType, message: String },

    #[error("字段注册表已初始化")]
    RegistryAlreadyInitialized,

    // ===== 批次 / 修正错误 =====
    #[error("批次不存在: {0}")]
    BatchNotFound(String),

    #[error("批次尚未结束 (batch_id={batch_id}, status={status})")]
    BatchNotTerminal { batch_id: String, status: String },

    #[error("批次已回滚，成功写入已撤销，请修正源文件后重新导入 (batch_id={0})")]
    BatchRolledBack(String),

    #[error("修正行不在原批次失败集合中 ({entity_type} 行 {source_row_index})")]
    CorrectionTargetNotFailed {
        entity_type: EntityType,
        source_row_index: usize,
    },

    // ===== 数据库错误 =====
    #[error("数据库操作失败: {0}")]
    DatabaseError(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 配置错误 =====
    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigReadError { key: String, message: String },

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    ConfigValueError {
        key: String,
        value: String,
        message: String,
    },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for MigrationError {
    fn from(err: std::io::Error) -> Self {
        MigrationError::FileReadError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for MigrationError {
    fn from(err: rusqlite::Error) -> Self {
        MigrationError::DatabaseError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for MigrationError {
    fn from(err: csv::Error) -> Self {
        MigrationError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for MigrationError {
    fn from(err: calamine::Error) -> Self {
        MigrationError::ExcelParseError(err.to_string())
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        MigrationError::InvalidMappingSnapshot(err.to_string())
    }
}

/// Result 类型别名
pub type MigrationResult<T> = Result<T, MigrationError>;
