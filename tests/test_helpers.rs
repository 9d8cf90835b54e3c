// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的存储/台账初始化、CSV 构造、故障注入存储
// ==========================================
#![allow(dead_code)]

use async_trait::async_trait;
use case_migration::domain::{
    BatchRequest, FieldValue, MappingConfig, NewRecord, ParsedFile, RecordId, UpdatedRecord,
};
use case_migration::engine::storage::{RecordStore, StoreError, StoreResult};
use case_migration::engine::ExecutionEngine;
use case_migration::importer::{CsvParser, FileParser};
use case_migration::repository::{InMemoryRecordStore, SqliteImportLedger};
use case_migration::{EntityType, FieldRegistry, ImportSettings};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ORG: &str = "org-test";

/// 解析 CSV 文本（测试数据必须格式正确）
pub fn csv(entity_type: EntityType, text: &str) -> ParsedFile {
    CsvParser
        .parse_bytes(entity_type, text.as_bytes())
        .expect("测试 CSV 应可解析")
}

pub fn request() -> BatchRequest {
    BatchRequest {
        organization_id: ORG.to_string(),
        user_id: "tester".to_string(),
        source_system_name: "LegacyCMS".to_string(),
    }
}

pub fn mapping() -> MappingConfig {
    MappingConfig::new(ORG)
}

/// 内存 SQLite 台账
pub fn new_ledger() -> Arc<SqliteImportLedger> {
    let conn = case_migration::db::open_in_memory().expect("内存数据库初始化失败");
    Arc::new(SqliteImportLedger::from_connection(Arc::new(Mutex::new(conn))))
}

/// 构造执行引擎（返回台账以便断言）
pub fn engine(
    store: Arc<dyn RecordStore>,
    settings: ImportSettings,
) -> (ExecutionEngine, Arc<SqliteImportLedger>) {
    let ledger = new_ledger();
    let engine = ExecutionEngine::new(
        Arc::new(FieldRegistry::builtin()),
        store,
        ledger.clone(),
        settings,
    );
    (engine, ledger)
}

/// accounts.csv: 生成 n 个客户 A1..An
pub fn accounts_csv(n: usize) -> ParsedFile {
    let mut text = String::from("external_id,name,account_type\n");
    for i in 1..=n {
        text.push_str(&format!("A{},Account {},business\n", i, i));
    }
    csv(EntityType::Accounts, &text)
}

/// contacts.csv: 每个客户一个联系人 P1..Pn
pub fn contacts_csv(n: usize) -> ParsedFile {
    let mut text = String::from("external_id,account_ref,first_name,last_name\n");
    for i in 1..=n {
        text.push_str(&format!("P{},A{},First{},Last{}\n", i, i, i, i));
    }
    csv(EntityType::Contacts, &text)
}

/// cases.csv: n 个案件，invalid_rows 中的序号（1 起）使用非法状态值
pub fn cases_csv(n: usize, accounts: usize, invalid_rows: &[usize]) -> ParsedFile {
    let mut text = String::from("external_id,account_ref,title,status,opened_on\n");
    for i in 1..=n {
        let status = if invalid_rows.contains(&i) { "archived" } else { "open" };
        text.push_str(&format!(
            "C{},A{},Case {},{},2024-01-{:02}\n",
            i,
            (i - 1) % accounts + 1,
            i,
            status,
            (i - 1) % 28 + 1
        ));
    }
    csv(EntityType::Cases, &text)
}

// ==========================================
// FaultyStore - 故障注入存储
// ==========================================
// 包装 InMemoryRecordStore：指定主键插入失败 / 删除失败
pub struct FaultyStore {
    pub inner: InMemoryRecordStore,
    failing_inserts: Mutex<HashSet<(EntityType, String)>>,
    failing_deletes: Mutex<HashSet<EntityType>>,
    pub insert_calls: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            failing_inserts: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            insert_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_insert(self, entity_type: EntityType, key: &str) -> Self {
        self.failing_inserts
            .lock()
            .unwrap()
            .insert((entity_type, key.to_string()));
        self
    }

    pub fn fail_delete(self, entity_type: EntityType) -> Self {
        self.failing_deletes.lock().unwrap().insert(entity_type);
        self
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn exists(&self, entity_type: EntityType, key: &str) -> StoreResult<bool> {
        self.inner.exists(entity_type, key).await
    }

    async fn insert(&self, record: NewRecord) -> StoreResult<RecordId> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_inserts
            .lock()
            .unwrap()
            .contains(&(record.entity_type, record.natural_key.clone()));
        if failing {
            return Err(StoreError::Backend(format!("注入的写入故障: {}", record.natural_key)));
        }
        self.inner.insert(record).await
    }

    async fn update(
        &self,
        entity_type: EntityType,
        key: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> StoreResult<UpdatedRecord> {
        self.inner.update(entity_type, key, fields).await
    }

    async fn delete(&self, entity_type: EntityType, id: &RecordId) -> StoreResult<()> {
        if self.failing_deletes.lock().unwrap().contains(&entity_type) {
            return Err(StoreError::Backend("注入的删除故障".to_string()));
        }
        self.inner.delete(entity_type, id).await
    }
}
