// ==========================================
// 案件管理系统数据迁移 - 配置层
// ==========================================
// 职责: 导入参数管理（多级覆写）+ 标准字段注册表
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod field_registry;
pub mod import_config_trait;
pub mod import_settings;

// 重导出核心配置类型
pub use config_manager::{config_keys, ConfigManager, ConfigScope};
pub use field_registry::{
    global_registry, init_registry, CrossFieldRule, EntitySchema, FieldRegistry, FieldSpec,
    FieldType, NATURAL_KEY_FIELD,
};
pub use import_config_trait::ImportConfigReader;
pub use import_settings::ImportSettings;
