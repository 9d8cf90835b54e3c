// ==========================================
// 案件管理系统数据迁移 - 导入台账 Repository 实现
// ==========================================
// 职责: 实现批次台账数据访问（使用 rusqlite）
// 表: import_batch / import_error（见 db::init_schema）
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::batch::{BatchOutcome, ImportBatch, ImportError};
use crate::domain::record::RawValues;
use crate::domain::types::{BatchStatus, EntityType, ImportMode, IssueKind};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_ledger::ImportLedger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const BATCH_COLUMNS: &str = "batch_id, organization_id, user_id, source_system_name, \
     mapping_config_snapshot, status, mode, total_records, successful_records, failed_records, \
     rolled_back_records, predecessor_batch_id, message, created_at, finished_at";

// ==========================================
// SqliteImportLedger
// ==========================================
pub struct SqliteImportLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteImportLedger {
    /// 创建新的 Repository 实例（表需已存在）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（与 ConfigManager / SqliteRecordStore 共享连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn read_status(conn: &Connection, batch_id: &str) -> RepositoryResult<BatchStatus> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT status FROM import_batch WHERE batch_id = ?1",
                params![batch_id],
                |row| row.get(0),
            )
            .optional()?;

        let raw = raw.ok_or_else(|| RepositoryError::NotFound {
            entity: "ImportBatch".to_string(),
            id: batch_id.to_string(),
        })?;
        parse_enum::<BatchStatus>("status", &raw)
    }

    /// 校验状态转换
    fn check_transition(from: BatchStatus, to: BatchStatus) -> RepositoryResult<()> {
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(RepositoryError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }
}

fn parse_enum<T>(field: &str, raw: &str) -> RepositoryResult<T>
where
    T: FromStr<Err = String>,
{
    raw.parse::<T>().map_err(|message| RepositoryError::FieldValueError {
        field: field.to_string(),
        message,
    })
}

fn parse_time(field: &str, raw: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::FieldValueError {
            field: field.to_string(),
            message: e.to_string(),
        })
}

/// 原始列读取（先取出字符串，再在 rusqlite 闭包外做领域转换）
struct BatchRow {
    id: String,
    organization_id: String,
    user_id: String,
    source_system_name: String,
    mapping_config_snapshot: String,
    status: String,
    mode: String,
    total_records: i64,
    successful_records: i64,
    failed_records: i64,
    rolled_back_records: i64,
    predecessor_batch_id: Option<String>,
    message: Option<String>,
    created_at: String,
    finished_at: Option<String>,
}

impl BatchRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            user_id: row.get(2)?,
            source_system_name: row.get(3)?,
            mapping_config_snapshot: row.get(4)?,
            status: row.get(5)?,
            mode: row.get(6)?,
            total_records: row.get(7)?,
            successful_records: row.get(8)?,
            failed_records: row.get(9)?,
            rolled_back_records: row.get(10)?,
            predecessor_batch_id: row.get(11)?,
            message: row.get(12)?,
            created_at: row.get(13)?,
            finished_at: row.get(14)?,
        })
    }

    fn into_batch(self) -> RepositoryResult<ImportBatch> {
        Ok(ImportBatch {
            id: self.id,
            organization_id: self.organization_id,
            user_id: self.user_id,
            source_system_name: self.source_system_name,
            mapping_config_snapshot: self.mapping_config_snapshot,
            status: parse_enum::<BatchStatus>("status", &self.status)?,
            mode: parse_enum::<ImportMode>("mode", &self.mode)?,
            total_records: self.total_records as usize,
            successful_records: self.successful_records as usize,
            failed_records: self.failed_records as usize,
            rolled_back_records: self.rolled_back_records as usize,
            predecessor_batch_id: self.predecessor_batch_id,
            message: self.message,
            created_at: parse_time("created_at", &self.created_at)?,
            finished_at: self
                .finished_at
                .as_deref()
                .map(|t| parse_time("finished_at", t))
                .transpose()?,
        })
    }
}

#[async_trait]
impl ImportLedger for SqliteImportLedger {
    async fn insert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        if batch.status != BatchStatus::Pending {
            return Err(RepositoryError::InvalidStateTransition {
                from: "none".to_string(),
                to: batch.status.to_string(),
            });
        }

        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO import_batch ({})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                BATCH_COLUMNS
            ),
            params![
                batch.id,
                batch.organization_id,
                batch.user_id,
                batch.source_system_name,
                batch.mapping_config_snapshot,
                batch.status.as_str(),
                batch.mode.as_str(),
                batch.total_records as i64,
                batch.successful_records as i64,
                batch.failed_records as i64,
                batch.rolled_back_records as i64,
                batch.predecessor_batch_id,
                batch.message,
                batch.created_at.to_rfc3339(),
                batch.finished_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        debug!(batch_id = %batch.id, "批次已创建");
        Ok(())
    }

    async fn update_batch_status(
        &self,
        batch_id: &str,
        status: BatchStatus,
    ) -> RepositoryResult<()> {
        let conn = self.lock()?;
        let current = Self::read_status(&conn, batch_id)?;
        Self::check_transition(current, status)?;

        conn.execute(
            "UPDATE import_batch SET status = ?1 WHERE batch_id = ?2",
            params![status.as_str(), batch_id],
        )?;
        Ok(())
    }

    async fn finish_batch(&self, batch_id: &str, outcome: &BatchOutcome) -> RepositoryResult<()> {
        if !outcome.status.is_terminal() {
            return Err(RepositoryError::InvalidStateTransition {
                from: "processing".to_string(),
                to: outcome.status.to_string(),
            });
        }

        let conn = self.lock()?;
        let current = Self::read_status(&conn, batch_id)?;
        Self::check_transition(current, outcome.status)?;

        conn.execute(
            r#"
            UPDATE import_batch SET
                status = ?1,
                successful_records = ?2,
                failed_records = ?3,
                rolled_back_records = ?4,
                message = ?5,
                finished_at = ?6
            WHERE batch_id = ?7
            "#,
            params![
                outcome.status.as_str(),
                outcome.successful_records as i64,
                outcome.failed_records as i64,
                outcome.rolled_back_records as i64,
                outcome.message,
                Utc::now().to_rfc3339(),
                batch_id,
            ],
        )?;
        Ok(())
    }

    async fn list_batches(&self, organization_id: &str) -> RepositoryResult<Vec<ImportBatch>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_batch WHERE organization_id = ?1
             ORDER BY created_at DESC, rowid DESC",
            BATCH_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![organization_id], BatchRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(BatchRow::into_batch).collect()
    }

    async fn get_batch(&self, batch_id: &str) -> RepositoryResult<Option<ImportBatch>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM import_batch WHERE batch_id = ?1", BATCH_COLUMNS),
                params![batch_id],
                BatchRow::read,
            )
            .optional()?;

        row.map(BatchRow::into_batch).transpose()
    }

    async fn append_errors(&self, errors: &[ImportError]) -> RepositoryResult<usize> {
        if errors.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO import_error (
                    error_id, batch_id, entity_type, source_row_index,
                    raw_values, error_message, kind, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )?;

            for error in errors {
                stmt.execute(params![
                    error.id,
                    error.batch_id,
                    error.entity_type.as_str(),
                    error.source_row_index as i64,
                    serde_json::to_string(&error.raw_values)?,
                    error.error_message,
                    error.kind.as_str(),
                    error.created_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;

        Ok(errors.len())
    }

    async fn get_errors(&self, batch_id: &str) -> RepositoryResult<Vec<ImportError>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT error_id, batch_id, entity_type, source_row_index,
                   raw_values, error_message, kind, created_at
            FROM import_error
            WHERE batch_id = ?1
            ORDER BY rowid
            "#,
        )?;

        let rows = stmt
            .query_map(params![batch_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, batch_id, entity, row_index, raw, message, kind, created_at)| {
                Ok(ImportError {
                    id,
                    batch_id,
                    entity_type: parse_enum::<EntityType>("entity_type", &entity)?,
                    source_row_index: row_index as usize,
                    raw_values: serde_json::from_str::<RawValues>(&raw)?,
                    error_message: message,
                    kind: parse_enum::<IssueKind>("kind", &kind)?,
                    created_at: parse_time("created_at", &created_at)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::batch::BatchRequest;

    fn ledger() -> SqliteImportLedger {
        let conn = crate::db::open_in_memory().unwrap();
        SqliteImportLedger::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn batch(org: &str) -> ImportBatch {
        let request = BatchRequest {
            organization_id: org.to_string(),
            user_id: "u-1".to_string(),
            source_system_name: "LegacyCMS".to_string(),
        };
        ImportBatch::new(&request, "{}".to_string(), ImportMode::FirstTime, 3, None)
    }

    #[tokio::test]
    async fn test_batch_lifecycle() {
        let ledger = ledger();
        let b = batch("org-1");
        ledger.insert_batch(&b).await.unwrap();
        ledger
            .update_batch_status(&b.id, BatchStatus::Processing)
            .await
            .unwrap();
        ledger
            .finish_batch(
                &b.id,
                &BatchOutcome {
                    status: BatchStatus::Completed,
                    successful_records: 2,
                    failed_records: 1,
                    rolled_back_records: 0,
                    message: Some("ok".to_string()),
                },
            )
            .await
            .unwrap();

        let stored = ledger.get_batch(&b.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BatchStatus::Completed);
        assert_eq!(stored.successful_records, 2);
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_batch_is_frozen() {
        let ledger = ledger();
        let b = batch("org-1");
        ledger.insert_batch(&b).await.unwrap();

        // pending 不能直接进入终态
        let err = ledger
            .update_batch_status(&b.id, BatchStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidStateTransition { .. }));

        ledger
            .update_batch_status(&b.id, BatchStatus::Processing)
            .await
            .unwrap();
        ledger
            .update_batch_status(&b.id, BatchStatus::Failed)
            .await
            .unwrap();
        assert!(ledger
            .update_batch_status(&b.id, BatchStatus::Processing)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_errors_round_trip_and_list_by_org() {
        let ledger = ledger();
        let b = batch("org-1");
        ledger.insert_batch(&b).await.unwrap();
        ledger.insert_batch(&batch("org-2")).await.unwrap();

        let mut raw = RawValues::new();
        raw.insert("name".to_string(), "".to_string());
        let errors = vec![ImportError::new(
            &b.id,
            EntityType::Accounts,
            3,
            raw.clone(),
            IssueKind::Validation,
            "必填字段缺失: name".to_string(),
        )];
        assert_eq!(ledger.append_errors(&errors).await.unwrap(), 1);

        let stored = ledger.get_errors(&b.id).await.unwrap();
        assert_eq!(stored, errors);
        assert_eq!(ledger.list_batches("org-1").await.unwrap().len(), 1);
        assert!(ledger.get_batch("missing").await.unwrap().is_none());
    }
}
