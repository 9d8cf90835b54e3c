// ==========================================
// 案件管理系统数据迁移 - SQLite 记录存储
// ==========================================
// 职责: RecordStore 的 rusqlite 实现
// 表: migrated_record（UNIQUE(organization_id, entity_type, natural_key)）
// 约束: 每个实例绑定一个组织，所有读写都带 organization_id 条件
// 说明: 字段以 JSON 存储，目标业务表的落地不在本模块范围
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::record::{FieldValue, NewRecord, RecordId, UpdatedRecord};
use crate::domain::types::EntityType;
use crate::engine::storage::{RecordStore, StoreError, StoreResult, TenantStores};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    organization_id: String,
}

impl SqliteRecordStore {
    pub fn new(db_path: &str, organization_id: &str) -> StoreResult<Self> {
        let conn = open_sqlite_connection(db_path).map_err(map_sqlite_error)?;
        Ok(Self::for_organization(
            Arc::new(Mutex::new(conn)),
            organization_id,
        ))
    }

    /// 在共享连接上创建某组织的存储视图
    pub fn for_organization(conn: Arc<Mutex<Connection>>, organization_id: &str) -> Self {
        Self {
            conn,
            organization_id: organization_id.to_string(),
        }
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("锁获取失败: {}", e)))
    }

    /// 本组织某实体类型的记录数
    pub fn count(&self, entity_type: EntityType) -> StoreResult<usize> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM migrated_record
                 WHERE organization_id = ?1 AND entity_type = ?2",
                params![self.organization_id, entity_type.as_str()],
                |row| row.get(0),
            )
            .map_err(map_sqlite_error)?;
        Ok(n as usize)
    }
}

// ==========================================
// SqliteTenantStores - 共享连接上的组织存储路由
// ==========================================
pub struct SqliteTenantStores {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTenantStores {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

impl TenantStores for SqliteTenantStores {
    fn store_for(&self, organization_id: &str) -> Arc<dyn RecordStore> {
        Arc::new(SqliteRecordStore::for_organization(
            self.conn.clone(),
            organization_id,
        ))
    }
}

/// rusqlite 错误 → StoreError（忙/锁视为暂不可用，可重试）
fn map_sqlite_error(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            StoreError::Unavailable(e.to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn encode_fields(fields: &BTreeMap<String, FieldValue>) -> StoreResult<String> {
    serde_json::to_string(fields).map_err(|e| StoreError::Backend(e.to_string()))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn exists(&self, entity_type: EntityType, key: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM migrated_record
                 WHERE organization_id = ?1 AND entity_type = ?2 AND natural_key = ?3",
                params![self.organization_id, entity_type.as_str(), key],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sqlite_error)?;
        Ok(found.is_some())
    }

    async fn insert(&self, record: NewRecord) -> StoreResult<RecordId> {
        let conn = self.lock()?;
        let id = Uuid::new_v4().to_string();
        let result = conn.execute(
            r#"
            INSERT INTO migrated_record (
                record_id, organization_id, entity_type, natural_key,
                fields_json, batch_id, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                id,
                self.organization_id,
                record.entity_type.as_str(),
                record.natural_key,
                encode_fields(&record.fields)?,
                record.batch_id,
                Utc::now().to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate {
                entity_type: record.entity_type,
                key: record.natural_key,
            }),
            Err(e) => Err(map_sqlite_error(e)),
        }
    }

    async fn update(
        &self,
        entity_type: EntityType,
        key: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> StoreResult<UpdatedRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(map_sqlite_error)?;

        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT record_id, fields_json FROM migrated_record
                 WHERE organization_id = ?1 AND entity_type = ?2 AND natural_key = ?3",
                params![self.organization_id, entity_type.as_str(), key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(map_sqlite_error)?;

        let (id, previous_json) = existing.ok_or_else(|| StoreError::NotFound {
            entity_type,
            key: key.to_string(),
        })?;
        let previous_fields: BTreeMap<String, FieldValue> = serde_json::from_str(&previous_json)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        tx.execute(
            "UPDATE migrated_record SET fields_json = ?1 WHERE record_id = ?2",
            params![encode_fields(&fields)?, id],
        )
        .map_err(map_sqlite_error)?;
        tx.commit().map_err(map_sqlite_error)?;

        Ok(UpdatedRecord { id, previous_fields })
    }

    async fn delete(&self, entity_type: EntityType, id: &RecordId) -> StoreResult<()> {
        let conn = self.lock()?;
        let affected = conn
            .execute(
                "DELETE FROM migrated_record
                 WHERE record_id = ?1 AND organization_id = ?2 AND entity_type = ?3",
                params![id, self.organization_id, entity_type.as_str()],
            )
            .map_err(map_sqlite_error)?;

        if affected == 0 {
            return Err(StoreError::NotFound {
                entity_type,
                key: id.clone(),
            });
        }
        Ok(())
    }
}
