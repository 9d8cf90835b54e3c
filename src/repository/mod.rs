// ==========================================
// 案件管理系统数据迁移 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 批次台账 + 目标记录存储的数据访问
// 约束: 所有查询使用参数化
// ==========================================

pub mod error;
pub mod import_ledger;
pub mod import_ledger_impl;
pub mod memory_store;
pub mod record_store_impl;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use import_ledger::ImportLedger;
pub use import_ledger_impl::SqliteImportLedger;
pub use memory_store::InMemoryRecordStore;
pub use record_store_impl::{SqliteRecordStore, SqliteTenantStores};
