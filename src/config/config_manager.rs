// ==========================================
// 案件管理系统数据迁移 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (scope_id + key → value)
// 作用域: 组织级覆盖 → global → 代码默认值
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::types::{ExistingRecordPolicy, ImportMode};
use crate::importer::error::{MigrationError, MigrationResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::warn;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> MigrationResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA（幂等）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> MigrationResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| MigrationError::InternalError(format!("锁获取失败: {}", e)))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn read_scope(&self, scope_id: &str, key: &str) -> MigrationResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| MigrationError::ConfigReadError {
                key: key.to_string(),
                message: format!("锁获取失败: {}", e),
            })?;

        conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![scope_id, key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| MigrationError::ConfigReadError {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// 读取配置值（组织级优先，回退 global）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 两个作用域都未配置
    pub fn get_config_value(
        &self,
        organization_id: &str,
        key: &str,
    ) -> MigrationResult<Option<String>> {
        let org_scope = ConfigScope::Organization {
            organization_id: organization_id.to_string(),
        };
        if let Some(value) = self.read_scope(&org_scope.scope_id(), key)? {
            return Ok(Some(value));
        }
        self.read_scope(&ConfigScope::Global.scope_id(), key)
    }

    /// 写入配置值（UPSERT）
    pub fn set_config_value(
        &self,
        scope: &ConfigScope,
        key: &str,
        value: &str,
    ) -> MigrationResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| MigrationError::InternalError(format!("锁获取失败: {}", e)))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![scope.scope_id(), key, value],
        )?;
        Ok(())
    }

    /// 获取组织生效配置快照（global 被组织级覆盖后的结果）
    pub fn get_config_snapshot(
        &self,
        organization_id: &str,
    ) -> MigrationResult<BTreeMap<String, String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| MigrationError::InternalError(format!("锁获取失败: {}", e)))?;

        // global 在前、组织在后，后者覆盖前者
        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id IN ('global', ?1)
             ORDER BY CASE scope_id WHEN 'global' THEN 0 ELSE 1 END, key",
        )?;
        let org_scope = ConfigScope::Organization {
            organization_id: organization_id.to_string(),
        }
        .scope_id();
        let rows = stmt.query_map(params![org_scope], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut snapshot = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            snapshot.insert(key, value);
        }
        Ok(snapshot)
    }

    /// 读取并解析配置；格式错误时告警并回退默认值
    fn parse_or_default<T>(
        &self,
        organization_id: &str,
        key: &str,
        default: T,
    ) -> MigrationResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get_config_value(organization_id, key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(e) => {
                    warn!(
                        config_key = key,
                        raw_value = %raw,
                        error = %e,
                        "配置值格式错误，使用默认值"
                    );
                    Ok(default)
                }
            },
        }
    }
}

// ==========================================
// ImportConfigReader 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_import_mode(&self, organization_id: &str) -> MigrationResult<ImportMode> {
        self.parse_or_default(organization_id, config_keys::IMPORT_MODE, ImportMode::FirstTime)
    }

    async fn get_error_tolerance(&self, organization_id: &str) -> MigrationResult<usize> {
        self.parse_or_default(organization_id, config_keys::ERROR_TOLERANCE, 0)
    }

    async fn get_rollback_on_failure(
        &self,
        organization_id: &str,
    ) -> MigrationResult<Option<bool>> {
        match self.get_config_value(organization_id, config_keys::ROLLBACK_ON_FAILURE)? {
            None => Ok(None),
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Some(true)),
                "false" | "0" | "no" => Ok(Some(false)),
                _ => Err(MigrationError::ConfigValueError {
                    key: config_keys::ROLLBACK_ON_FAILURE.to_string(),
                    value: raw,
                    message: "期望 true/false".to_string(),
                }),
            },
        }
    }

    async fn get_existing_record_policy(
        &self,
        organization_id: &str,
    ) -> MigrationResult<ExistingRecordPolicy> {
        self.parse_or_default(
            organization_id,
            config_keys::EXISTING_RECORD_POLICY,
            ExistingRecordPolicy::Reject,
        )
    }

    async fn get_worker_count(&self, organization_id: &str) -> MigrationResult<usize> {
        self.parse_or_default(
            organization_id,
            config_keys::WORKER_COUNT,
            crate::config::import_settings::DEFAULT_WORKER_COUNT,
        )
    }

    async fn get_storage_timeout_ms(&self, organization_id: &str) -> MigrationResult<u64> {
        self.parse_or_default(
            organization_id,
            config_keys::STORAGE_TIMEOUT_MS,
            crate::config::import_settings::DEFAULT_STORAGE_TIMEOUT_MS,
        )
    }

    async fn get_storage_max_retries(&self, organization_id: &str) -> MigrationResult<u32> {
        self.parse_or_default(
            organization_id,
            config_keys::STORAGE_MAX_RETRIES,
            crate::config::import_settings::DEFAULT_STORAGE_MAX_RETRIES,
        )
    }

    async fn get_retry_backoff_ms(&self, organization_id: &str) -> MigrationResult<u64> {
        self.parse_or_default(
            organization_id,
            config_keys::RETRY_BACKOFF_MS,
            crate::config::import_settings::DEFAULT_RETRY_BACKOFF_MS,
        )
    }

    async fn get_progress_chunk_size(&self, organization_id: &str) -> MigrationResult<usize> {
        self.parse_or_default(
            organization_id,
            config_keys::PROGRESS_CHUNK_SIZE,
            crate::config::import_settings::DEFAULT_PROGRESS_CHUNK_SIZE,
        )
    }
}

// ==========================================
// 配置作用域
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    Global,                                   // 全局
    Organization { organization_id: String }, // 租户
}

impl ConfigScope {
    pub fn scope_id(&self) -> String {
        match self {
            ConfigScope::Global => "global".to_string(),
            ConfigScope::Organization { organization_id } => format!("org/{}", organization_id),
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 批次行为
    pub const IMPORT_MODE: &str = "import_mode";
    pub const ERROR_TOLERANCE: &str = "error_tolerance";
    pub const ROLLBACK_ON_FAILURE: &str = "rollback_on_failure";
    pub const EXISTING_RECORD_POLICY: &str = "existing_record_policy";

    // 执行资源
    pub const WORKER_COUNT: &str = "worker_count";
    pub const STORAGE_TIMEOUT_MS: &str = "storage_timeout_ms";
    pub const STORAGE_MAX_RETRIES: &str = "storage_max_retries";
    pub const RETRY_BACKOFF_MS: &str = "retry_backoff_ms";
    pub const PROGRESS_CHUNK_SIZE: &str = "progress_chunk_size";
}
