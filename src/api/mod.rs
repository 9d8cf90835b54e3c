// ==========================================
// 案件管理系统数据迁移 - API 层
// ==========================================
// 职责: 对外提供迁移业务接口（上传解析 / 预演 / 执行 / 台账 / 修正）
// ==========================================

pub mod error;
pub mod migration_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use migration_api::MigrationApi;
