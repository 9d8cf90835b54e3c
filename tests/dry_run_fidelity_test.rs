// ==========================================
// 预演保真度测试
// ==========================================
// 测试目标: 预演与执行共用同一实现
// - 预演成功 ⇒ 执行无写入失败
// - 预演投影的新建/阻断数与执行结果一致
// - 预演不修改目标存储
// ==========================================

mod test_helpers;

use case_migration::domain::NewRecord;
use case_migration::engine::{DryRunSimulator, ExecutionOptions, RecordStore};
use case_migration::repository::InMemoryRecordStore;
use case_migration::{
    BatchStatus, DryRunResult, EntityType, ExistingRecordPolicy, FieldRegistry,
    ImportExecutionResult, ImportSettings, IssueKind, ParsedFile,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use test_helpers::{accounts_csv, cases_csv, contacts_csv, csv, engine, mapping, request};

async fn preview_then_execute(
    files: Vec<ParsedFile>,
    seed: &[(EntityType, &str)],
    settings: ImportSettings,
) -> (DryRunResult, ImportExecutionResult, Arc<InMemoryRecordStore>) {
    let store = Arc::new(InMemoryRecordStore::new());
    for (entity_type, key) in seed {
        store
            .insert(NewRecord {
                entity_type: *entity_type,
                natural_key: key.to_string(),
                fields: BTreeMap::new(),
                batch_id: None,
            })
            .await
            .unwrap();
    }
    let before = store.len();

    let simulator = DryRunSimulator::new(
        Arc::new(FieldRegistry::builtin()),
        store.clone(),
        settings.clone(),
    );
    let preview = simulator
        .simulate(&files, &mapping())
        .await
        .unwrap();
    assert_eq!(store.len(), before, "预演不得修改存储");

    let (engine, _ledger) = engine(store.clone(), settings);
    let result = engine
        .execute(&request(), &files, &mapping(), ExecutionOptions::default())
        .await
        .unwrap();
    (preview, result, store)
}

#[tokio::test]
async fn test_successful_preview_implies_clean_execution() {
    let files = vec![cases_csv(30, 6, &[]), contacts_csv(6), accounts_csv(6)];
    let (preview, result, store) =
        preview_then_execute(files, &[], ImportSettings::default()).await;

    assert!(preview.success);
    assert_eq!(result.batch.status, BatchStatus::Completed);
    assert!(result.errors.is_empty());
    assert_eq!(result.batch.successful_records, preview.records_to_create);
    assert_eq!(store.len(), preview.records_to_create);
}

#[tokio::test]
async fn test_projection_matches_execution_with_existing_records() {
    // A1 已存在于目标存储：Reject 策略下为主键冲突；C 引用既有 A1 可解析
    let files = vec![
        accounts_csv(3),
        csv(
            EntityType::Cases,
            "external_id,account_ref,title,status,opened_on\n\
             C1,A1,Alpha,open,2024-03-01\n\
             C2,A9,Beta,open,2024-03-02\n\
             C3,A2,Gamma,OPEN,2024-03-03\n\
             C3,A3,Delta,open,2024-03-04\n",
        ),
    ];
    let settings = ImportSettings::incremental().with_tolerance(10);
    let (preview, result, _store) =
        preview_then_execute(files, &[(EntityType::Accounts, "A1")], settings).await;

    assert!(!preview.success);
    let accounts = &preview.per_entity_counts[&EntityType::Accounts];
    let cases = &preview.per_entity_counts[&EntityType::Cases];
    assert_eq!((accounts.to_create, accounts.blocked), (2, 1));
    assert_eq!((cases.to_create, cases.blocked), (2, 2));
    assert_eq!(cases.warnings, 1, "OPEN 大小写规范化警告");

    assert_eq!(result.batch.successful_records, preview.records_to_create);
    assert_eq!(result.batch.failed_records, accounts.blocked + cases.blocked);

    // 逐行比较: 预演阻断行 == 执行失败行
    let mut projected: Vec<(EntityType, usize)> = preview
        .errors()
        .iter()
        .map(|i| (i.entity_type, i.source_row_index))
        .collect();
    projected.sort();
    projected.dedup();
    let mut executed: Vec<(EntityType, usize)> = result
        .errors
        .iter()
        .map(|e| (e.entity_type, e.source_row_index))
        .collect();
    executed.sort();
    assert_eq!(projected, executed);

    assert_eq!(preview.issues_of_kind(IssueKind::DuplicateKey).len(), 2);
    assert_eq!(preview.reference_conflicts().len(), 1);
}

#[tokio::test]
async fn test_update_policy_projection() {
    let files = vec![accounts_csv(2)];
    let settings = ImportSettings::default().with_policy(ExistingRecordPolicy::Update);
    let (preview, result, store) =
        preview_then_execute(files, &[(EntityType::Accounts, "A2")], settings).await;

    assert!(preview.success);
    assert_eq!(preview.records_to_create, 1);
    assert_eq!(preview.records_to_update, 1);
    assert_eq!(result.batch.successful_records, 2);
    assert_eq!(store.count(EntityType::Accounts), 2);
}
