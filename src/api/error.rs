// ==========================================
// 案件管理系统数据迁移 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，将下层技术错误转换为用户可理解的错误消息
// 约束: 所有错误信息必须包含显式原因
// ==========================================

use crate::domain::record::ParseError;
use crate::domain::types::EntityType;
use crate::importer::error::MigrationError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 文件级解析失败（空文件 / 编码 / 表头问题）
    #[error("文件解析失败 ({entity_type}): {}", summarize(.errors))]
    FileParseFailed {
        entity_type: EntityType,
        errors: Vec<ParseError>,
    },

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("导入失败: {0}")]
    ImportError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn summarize(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::DatabaseError(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 MigrationError 转换
// ==========================================
impl From<MigrationError> for ApiError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Repository(e) => e.into(),
            MigrationError::FileNotFound(path) => {
                ApiError::NotFound(format!("文件{}不存在", path))
            }
            MigrationError::BatchNotFound(id) => {
                ApiError::NotFound(format!("批次(id={})不存在", id))
            }
            e @ (MigrationError::UnsupportedFormat(_)
            | MigrationError::DuplicateEntityFile(_)
            | MigrationError::UnknownEntityType(_)
            | MigrationError::InvalidMappingSnapshot(_)) => ApiError::InvalidInput(e.to_string()),
            e @ (MigrationError::BatchNotTerminal { .. }
            | MigrationError::BatchRolledBack(_)
            | MigrationError::CorrectionTargetNotFailed { .. }
            | MigrationError::InvalidDependency { .. }) => {
                ApiError::BusinessRuleViolation(e.to_string())
            }
            e @ (MigrationError::FileReadError(_)
            | MigrationError::ExcelParseError(_)
            | MigrationError::CsvParseError(_)) => ApiError::ImportError(e.to_string()),
            e @ (MigrationError::ConfigReadError { .. }
            | MigrationError::ConfigValueError { .. }) => ApiError::ConfigError(e.to_string()),
            MigrationError::DatabaseError(msg) => ApiError::DatabaseError(msg),
            MigrationError::RegistryAlreadyInitialized => {
                ApiError::InternalError(MigrationError::RegistryAlreadyInitialized.to_string())
            }
            MigrationError::InternalError(msg) => ApiError::InternalError(msg),
            MigrationError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::ParseErrorKind;

    #[test]
    fn test_migration_error_mapping() {
        let err: ApiError = MigrationError::BatchNotFound("b-1".to_string()).into();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err: ApiError = MigrationError::DuplicateEntityFile(EntityType::Cases).into();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let err: ApiError = MigrationError::Repository(RepositoryError::InvalidStateTransition {
            from: "completed".to_string(),
            to: "processing".to_string(),
        })
        .into();
        assert!(matches!(err, ApiError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_parse_failure_message_lists_causes() {
        let err = ApiError::FileParseFailed {
            entity_type: EntityType::Accounts,
            errors: vec![ParseError::file_level(
                EntityType::Accounts,
                ParseErrorKind::EmptyFile,
                "文件为空".to_string(),
            )],
        };
        assert_eq!(err.to_string(), "文件解析失败 (accounts): 文件为空");
    }
}
