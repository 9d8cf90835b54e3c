// ==========================================
// 案件管理系统数据迁移 - 导入层
// ==========================================
// 职责: 文件解析 → 字段映射 → 行校验
// 管道: FileParser → ColumnMapper(DataCleaner) → Validator / ConflictHandler
// ==========================================

pub mod conflict_handler;
pub mod data_cleaner;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod validator;

// 重导出核心类型
pub use conflict_handler::ConflictHandler;
pub use data_cleaner::DataCleaner;
pub use error::{MigrationError, MigrationResult};
pub use field_mapper::{ColumnMapper, MappedRow};
pub use file_parser::{CsvParser, ExcelParser, FileParser, ParseOutcome, UniversalFileParser};
pub use validator::Validator;
