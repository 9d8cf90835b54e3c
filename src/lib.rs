// ==========================================
// 案件管理系统数据迁移 - 核心库
// ==========================================
// 技术栈: Rust + SQLite (rusqlite) + tokio
// 系统定位: 多租户案件管理系统的批量数据迁移管道
// 管道: 解析 → 映射 → 校验 → 预演 → 执行（失败回滚）→ 修正重导入
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 数据模型
pub mod domain;

// 数据仓储层 - 批次台账 / 记录存储
pub mod repository;

// 引擎层 - 排序 / 预演 / 执行 / 回滚
pub mod engine;

// 导入层 - 解析 / 映射 / 校验
pub mod importer;

// 配置层 - 导入参数 / 字段注册表
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    BatchStatus, EntityStatus, EntityType, ExistingRecordPolicy, ImportMode, IssueKind, Severity,
};

// 领域模型
pub use domain::{
    BatchRequest, DryRunResult, EntityMapping, FieldTransform, FieldValue, ImportBatch,
    ImportError, ImportExecutionResult, MappingConfig, ParsedFile, ValidationIssue,
};

// 引擎
pub use engine::{
    CorrectionService, DependencyGraph, DryRunSimulator, ExecutionEngine, ExecutionOptions,
    ProgressSink, RecordStore, RowCorrection, TenantStores,
};

// 配置
pub use config::{FieldRegistry, ImportSettings};

// 错误
pub use importer::error::{MigrationError, MigrationResult};

// API
pub use api::{ApiError, ApiResult, MigrationApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "案件管理系统数据迁移";
