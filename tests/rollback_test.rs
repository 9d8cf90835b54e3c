// ==========================================
// 回滚与取消测试
// ==========================================
// 测试目标:
// - 回滚覆盖所有实体类型（逆依赖顺序）
// - Update 策略覆盖的记录回滚后恢复原值
// - 执行中取消 → 回滚已写入记录
// - 撤销失败单独记录，不中断其余撤销
// - 存储写入失败记为 WriteFailure
// ==========================================

mod test_helpers;

use case_migration::domain::{FieldValue, NewRecord};
use case_migration::engine::{ExecutionOptions, FnProgress, RecordStore};
use case_migration::repository::{ImportLedger, InMemoryRecordStore};
use case_migration::{
    BatchStatus, EntityStatus, EntityType, ExistingRecordPolicy, ImportSettings, IssueKind,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use test_helpers::{accounts_csv, cases_csv, contacts_csv, engine, mapping, request, FaultyStore};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_updated_records_restored_on_rollback() {
    let store = Arc::new(InMemoryRecordStore::new());
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), FieldValue::Text("Old Name".to_string()));
    store
        .insert(NewRecord {
            entity_type: EntityType::Accounts,
            natural_key: "A1".to_string(),
            fields,
            batch_id: None,
        })
        .await
        .unwrap();

    let settings = ImportSettings::default().with_policy(ExistingRecordPolicy::Update);
    let (engine, _ledger) = engine(store.clone(), settings);
    let files = vec![accounts_csv(2), cases_csv(4, 2, &[4])];

    let result = engine
        .execute(&request(), &files, &mapping(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.batch.status, BatchStatus::RolledBack);
    // A1 覆盖 + A2 新建 + 3 个案件
    assert_eq!(result.batch.rolled_back_records, 5);
    assert_eq!(store.len(), 1);
    let restored = store.get(EntityType::Accounts, "A1").unwrap();
    assert_eq!(
        restored.fields.get("name"),
        Some(&FieldValue::Text("Old Name".to_string()))
    );
}

#[tokio::test]
async fn test_cancel_between_stages_rolls_back_written_types() {
    let store = Arc::new(InMemoryRecordStore::new());
    let (engine, ledger) = engine(store.clone(), ImportSettings::incremental());
    let cancel = CancellationToken::new();
    let sink = {
        let cancel = cancel.clone();
        FnProgress(move |entity_type: EntityType, _p: usize, _t: usize, message: &str| {
            if entity_type == EntityType::Accounts && message == "阶段完成" {
                cancel.cancel();
            }
        })
    };

    let files = vec![accounts_csv(4), contacts_csv(4)];
    let result = engine
        .execute(
            &request(),
            &files,
            &mapping(),
            ExecutionOptions::default()
                .with_progress(Arc::new(sink))
                .with_cancel(cancel),
        )
        .await
        .unwrap();

    assert_eq!(result.batch.status, BatchStatus::RolledBack);
    assert_eq!(result.progress_of(EntityType::Accounts).unwrap().status, EntityStatus::Completed);
    assert_eq!(result.progress_of(EntityType::Contacts).unwrap().status, EntityStatus::Pending);
    assert_eq!(result.batch.rolled_back_records, 4);
    assert!(store.is_empty());
    assert!(result.batch.message.as_deref().unwrap().contains("导入已取消"));

    let stored = ledger.get_batch(&result.batch.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BatchStatus::RolledBack);
}

#[tokio::test]
async fn test_delete_failures_reported_and_rest_reverted() {
    let store = Arc::new(FaultyStore::new().fail_delete(EntityType::Contacts));
    let (engine, _ledger) = engine(store.clone(), ImportSettings::default());
    let files = vec![accounts_csv(3), contacts_csv(3), cases_csv(6, 3, &[2])];

    let result = engine
        .execute(&request(), &files, &mapping(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.batch.status, BatchStatus::RolledBack);
    assert_eq!(result.rollback_errors.len(), 3);
    assert!(result
        .rollback_errors
        .iter()
        .all(|e| e.entity_type == EntityType::Contacts));
    // 3 客户 + 5 案件已撤销，3 个联系人残留
    assert_eq!(result.batch.rolled_back_records, 8);
    assert_eq!(result.batch.successful_records, 3);
    assert_eq!(store.inner.count(EntityType::Contacts), 3);
    assert_eq!(store.inner.count(EntityType::Accounts), 0);
    assert_eq!(store.inner.count(EntityType::Cases), 0);
    assert!(result.batch.message.as_deref().unwrap().contains("3 条撤销失败"));
}

#[tokio::test]
async fn test_store_write_failure_is_row_level() {
    let store = Arc::new(FaultyStore::new().fail_insert(EntityType::Accounts, "A2"));
    let (engine, _ledger) = engine(store.clone(), ImportSettings::incremental().with_tolerance(1));

    let result = engine
        .execute(&request(), &[accounts_csv(3)], &mapping(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.batch.status, BatchStatus::Completed);
    assert_eq!(result.batch.successful_records, 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, IssueKind::WriteFailure);
    assert_eq!(result.errors[0].source_row_index, 3);
    assert!(result.errors[0].error_message.contains("注入的写入故障"));
    // 永久性错误不重试
    assert_eq!(store.insert_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_incremental_without_rollback_keeps_partial_writes() {
    let store = Arc::new(InMemoryRecordStore::new());
    let (engine, _ledger) = engine(store.clone(), ImportSettings::incremental());
    let files = vec![accounts_csv(2), cases_csv(3, 2, &[1])];

    let result = engine
        .execute(&request(), &files, &mapping(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.batch.status, BatchStatus::Failed);
    assert_eq!(result.batch.rolled_back_records, 0);
    assert_eq!(store.count(EntityType::Accounts), 2);
    assert_eq!(store.count(EntityType::Cases), 2);
}
