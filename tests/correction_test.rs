// ==========================================
// 失败行修正重导入测试
// ==========================================
// 测试目标:
// - 未修改重导入 → 错误签名不变（幂等）
// - 修正后重导入 → 成功写入，新批次指向前序批次
// - 修正目标必须属于原批次失败集合
// - 原批次必须存在且已结束
// - 已回滚批次不能修正，只能整体重新导入
// ==========================================

mod test_helpers;

use case_migration::domain::ImportBatch;
use case_migration::engine::{CorrectionService, ExecutionEngine, ExecutionOptions, RowCorrection};
use case_migration::repository::{ImportLedger, InMemoryRecordStore, SqliteImportLedger};
use case_migration::{BatchStatus, EntityType, ImportMode, ImportSettings, MigrationError};
use std::sync::Arc;
use test_helpers::{csv, engine, mapping, request};

struct Fixture {
    store: Arc<InMemoryRecordStore>,
    ledger: Arc<SqliteImportLedger>,
    engine: Arc<ExecutionEngine>,
    original_batch_id: String,
}

impl Fixture {
    fn service(&self) -> CorrectionService {
        CorrectionService::new(self.ledger.clone(), self.engine.clone())
    }
}

/// 原始导入: A1 缺少名称，P1 引用不存在的 A404
async fn failed_import() -> Fixture {
    let store = Arc::new(InMemoryRecordStore::new());
    let (engine, ledger) = engine(store.clone(), ImportSettings::incremental().with_tolerance(5));
    let files = vec![
        csv(EntityType::Accounts, "external_id,name\nA1,\nA2,Globex\n"),
        csv(
            EntityType::Contacts,
            "external_id,account_ref,last_name\nP1,A404,Lee\nP2,A2,Kim\n",
        ),
    ];

    let result = engine
        .execute(&request(), &files, &mapping(), ExecutionOptions::default())
        .await
        .unwrap();
    assert_eq!(result.batch.status, BatchStatus::Completed);
    assert_eq!(result.batch.failed_records, 2);

    Fixture {
        store,
        ledger,
        engine: Arc::new(engine),
        original_batch_id: result.batch.id,
    }
}

#[tokio::test]
async fn test_failed_rows_sorted_with_raw_values() {
    let fixture = failed_import().await;
    let rows = fixture
        .service()
        .failed_rows(&fixture.original_batch_id)
        .await
        .unwrap();

    let keys: Vec<(EntityType, usize)> = rows
        .iter()
        .map(|r| (r.entity_type, r.source_row_index))
        .collect();
    assert_eq!(keys, vec![(EntityType::Accounts, 2), (EntityType::Contacts, 2)]);
    assert_eq!(
        rows[1].raw_values.get("account_ref").map(String::as_str),
        Some("A404")
    );
}

#[tokio::test]
async fn test_unmodified_reimport_reproduces_same_errors() {
    let fixture = failed_import().await;
    let service = fixture.service();
    let original_errors = fixture
        .ledger
        .get_errors(&fixture.original_batch_id)
        .await
        .unwrap();

    let rows = service.failed_rows(&fixture.original_batch_id).await.unwrap();
    let result = service
        .reimport(&fixture.original_batch_id, rows, ExecutionOptions::default())
        .await
        .unwrap();

    assert_ne!(result.batch.id, fixture.original_batch_id);
    assert_eq!(
        result.batch.predecessor_batch_id.as_deref(),
        Some(fixture.original_batch_id.as_str())
    );
    assert_eq!(result.batch.successful_records, 0);

    let mut before: Vec<_> = original_errors.iter().map(|e| e.signature()).collect();
    let mut after: Vec<_> = result.errors.iter().map(|e| e.signature()).collect();
    before.sort();
    after.sort();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_corrected_rows_are_written() {
    let fixture = failed_import().await;
    let service = fixture.service();

    let mut rows = service.failed_rows(&fixture.original_batch_id).await.unwrap();
    rows[0].raw_values.insert("name".to_string(), "Acme".to_string());
    rows[1].raw_values.insert("account_ref".to_string(), "A1".to_string());

    let result = service
        .reimport(&fixture.original_batch_id, rows, ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.batch.status, BatchStatus::Completed);
    assert_eq!(result.batch.successful_records, 2);
    assert!(result.errors.is_empty());
    assert_eq!(fixture.store.count(EntityType::Accounts), 2);
    assert_eq!(fixture.store.count(EntityType::Contacts), 2);

    // 新批次沿用原批次的组织与来源
    let batches = fixture.ledger.list_batches(test_helpers::ORG).await.unwrap();
    assert_eq!(batches.len(), 2);
    assert!(batches.iter().all(|b| b.source_system_name == "LegacyCMS"));
}

#[tokio::test]
async fn test_correction_must_target_failed_row() {
    let fixture = failed_import().await;
    let service = fixture.service();

    let mut rows = service.failed_rows(&fixture.original_batch_id).await.unwrap();
    // A2 (第 3 行) 已成功写入
    rows[0].source_row_index = 3;

    let err = service
        .reimport(&fixture.original_batch_id, rows, ExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MigrationError::CorrectionTargetNotFailed {
            entity_type: EntityType::Accounts,
            source_row_index: 3
        }
    ));
}

#[tokio::test]
async fn test_original_batch_must_exist_and_be_finished() {
    let fixture = failed_import().await;
    let service = fixture.service();

    let err = service
        .reimport("no-such-batch", Vec::new(), ExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::BatchNotFound(_)));

    let pending = ImportBatch::new(
        &request(),
        mapping().to_snapshot().unwrap(),
        ImportMode::Incremental,
        0,
        None,
    );
    fixture.ledger.insert_batch(&pending).await.unwrap();
    let err = service
        .reimport(&pending.id, Vec::new(), ExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::BatchNotTerminal { .. }));
}

#[tokio::test]
async fn test_rolled_back_batch_requires_full_reimport() {
    let store = Arc::new(InMemoryRecordStore::new());
    let (engine, ledger) = engine(store.clone(), ImportSettings::default());
    let contacts = "external_id,account_ref,last_name\nP1,A1,\nP2,A1,Kim\n";
    let files = vec![
        csv(EntityType::Accounts, "external_id,name\nA1,Acme\n"),
        csv(EntityType::Contacts, contacts),
    ];

    let result = engine
        .execute(&request(), &files, &mapping(), ExecutionOptions::default())
        .await
        .unwrap();
    assert_eq!(result.batch.status, BatchStatus::RolledBack);
    assert!(store.is_empty());

    // A1 与 P2 的写入已被撤销，只修正 P1 无法恢复
    let engine = Arc::new(engine);
    let service = CorrectionService::new(ledger.clone(), engine.clone());
    let err = service.failed_rows(&result.batch.id).await.unwrap_err();
    assert!(matches!(err, MigrationError::BatchRolledBack(ref id) if *id == result.batch.id));

    let correction = RowCorrection {
        entity_type: EntityType::Contacts,
        source_row_index: 2,
        raw_values: [
            ("external_id", "P1"),
            ("account_ref", "A1"),
            ("last_name", "Lee"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
    };
    let err = service
        .reimport(&result.batch.id, vec![correction], ExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::BatchRolledBack(_)));
    assert_eq!(ledger.list_batches(test_helpers::ORG).await.unwrap().len(), 1);

    // 修正源文件后整体重新导入
    let files = vec![
        csv(EntityType::Accounts, "external_id,name\nA1,Acme\n"),
        csv(
            EntityType::Contacts,
            "external_id,account_ref,last_name\nP1,A1,Lee\nP2,A1,Kim\n",
        ),
    ];
    let retry = engine
        .execute(&request(), &files, &mapping(), ExecutionOptions::default())
        .await
        .unwrap();
    assert_eq!(retry.batch.status, BatchStatus::Completed);
    assert_eq!(retry.batch.successful_records, 3);
    assert_eq!(store.count(EntityType::Contacts), 2);
}
