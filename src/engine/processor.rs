// ==========================================
// 案件管理系统数据迁移 - 行记录处理器
// ==========================================
// 职责: 单行 校验 → 引用解析 → 主键判定 → 写入
// 说明: 预演与执行共用本模块，区别仅在于传入的 RecordStore
// - 预演: OverlayStore（草稿层）
// - 执行: 真实存储
// 约束:
// - 行级问题为数据，不以 Err 中断整批
// - 每次存储调用受 StorageCallPolicy 约束（超时 + 有限重试）
// ==========================================

use crate::config::field_registry::FieldRegistry;
use crate::config::import_settings::ImportSettings;
use crate::domain::record::{FieldValue, MappedRecord, NewRecord, RawValues, RecordId};
use crate::domain::report::ValidationIssue;
use crate::domain::types::{EntityType, ExistingRecordPolicy, IssueKind};
use crate::engine::plan::EntityStage;
use crate::engine::progress::ProgressSink;
use crate::engine::storage::{RecordStore, StorageCallPolicy, StoreError};
use crate::importer::conflict_handler::ConflictHandler;
use crate::importer::field_mapper::MappedRow;
use crate::importer::validator::Validator;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

// ==========================================
// RowOutcome / ProcessedRow - 单行处理结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Created {
        record_id: RecordId,
        natural_key: String,
    },
    Updated {
        record_id: RecordId,
        natural_key: String,
        previous_fields: BTreeMap<String, FieldValue>,
    },
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRow {
    pub entity_type: EntityType,
    pub source_row_index: usize,
    pub raw_values: RawValues,
    pub outcome: RowOutcome,
    pub issues: Vec<ValidationIssue>, // 含 warning
}

impl ProcessedRow {
    fn rejected(record: &MappedRecord, issues: Vec<ValidationIssue>) -> Self {
        Self {
            entity_type: record.entity_type,
            source_row_index: record.source_row_index,
            raw_values: record.raw_values.clone(),
            outcome: RowOutcome::Rejected,
            issues,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.outcome, RowOutcome::Rejected)
    }

    pub fn blocking_issues(&self) -> Vec<ValidationIssue> {
        self.issues.iter().filter(|i| i.is_blocking()).cloned().collect()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| !i.is_blocking())
    }
}

fn has_blocking(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(ValidationIssue::is_blocking)
}

// ==========================================
// RecordProcessor
// ==========================================
pub struct RecordProcessor {
    registry: Arc<FieldRegistry>,
    validator: Validator,
    policy: StorageCallPolicy,
    existing_record_policy: ExistingRecordPolicy,
    worker_count: usize,
    progress_chunk_size: usize,
}

impl RecordProcessor {
    pub fn new(registry: Arc<FieldRegistry>, settings: &ImportSettings) -> Self {
        Self {
            validator: Validator::new(registry.clone()),
            registry,
            policy: StorageCallPolicy::from_settings(settings),
            existing_record_policy: settings.existing_record_policy,
            worker_count: settings.worker_count.max(1),
            progress_chunk_size: settings.progress_chunk_size.max(1),
        }
    }

    /// 处理单行
    pub async fn process(
        &self,
        row: MappedRow,
        store: &dyn RecordStore,
        batch_id: Option<&str>,
    ) -> ProcessedRow {
        let MappedRow { record, mut issues } = row;

        // 1. 映射阶段已阻断
        if has_blocking(&issues) {
            return ProcessedRow::rejected(&record, issues);
        }

        // 2. 模式 + 跨字段校验
        issues.extend(self.validator.validate(&record));
        if has_blocking(&issues) {
            return ProcessedRow::rejected(&record, issues);
        }

        let schema = match self.registry.schema(record.entity_type) {
            Some(s) => s,
            None => return ProcessedRow::rejected(&record, issues),
        };
        let natural_key = match record.text(schema.natural_key) {
            Some(k) => k.to_string(),
            None => {
                issues.push(self.issue(
                    &record,
                    IssueKind::Validation,
                    Some(schema.natural_key),
                    format!("业务主键缺失: {}", schema.natural_key),
                ));
                return ProcessedRow::rejected(&record, issues);
            }
        };

        // 3. 跨实体引用
        for (field, target) in schema.references() {
            let Some(target_key) = record.text(field) else {
                continue;
            };
            match self
                .policy
                .call("exists", move || store.exists(target, target_key))
                .await
            {
                Ok(true) => {}
                Ok(false) => issues.push(self.issue(
                    &record,
                    IssueKind::ReferenceConflict,
                    Some(field),
                    format!("引用的 {} 记录不存在: {}", target, target_key),
                )),
                Err(e) => issues.push(self.issue(
                    &record,
                    IssueKind::WriteFailure,
                    Some(field),
                    format!("引用校验失败: {}", e),
                )),
            }
        }
        if has_blocking(&issues) {
            return ProcessedRow::rejected(&record, issues);
        }

        // 4. 自身业务主键
        let key_field = schema.natural_key;
        let entity_type = record.entity_type;
        let key = natural_key.as_str();
        let exists = match self
            .policy
            .call("exists", move || store.exists(entity_type, key))
            .await
        {
            Ok(found) => found,
            Err(e) => {
                issues.push(self.write_failure(&record, &e));
                return ProcessedRow::rejected(&record, issues);
            }
        };

        let outcome = if exists {
            match self.existing_record_policy {
                ExistingRecordPolicy::Reject => {
                    issues.push(self.duplicate(&record, key_field, key));
                    return ProcessedRow::rejected(&record, issues);
                }
                ExistingRecordPolicy::Update => {
                    let fields = record.fields.clone();
                    match self
                        .policy
                        .call("update", move || store.update(entity_type, key, fields.clone()))
                        .await
                    {
                        Ok(updated) => RowOutcome::Updated {
                            record_id: updated.id,
                            natural_key: natural_key.clone(),
                            previous_fields: updated.previous_fields,
                        },
                        Err(e) => {
                            issues.push(self.write_failure(&record, &e));
                            return ProcessedRow::rejected(&record, issues);
                        }
                    }
                }
            }
        } else {
            // 5. 新建
            let new_record = NewRecord {
                entity_type,
                natural_key: natural_key.clone(),
                fields: record.fields.clone(),
                batch_id: batch_id.map(str::to_string),
            };
            match self
                .policy
                .call("insert", move || store.insert(new_record.clone()))
                .await
            {
                Ok(record_id) => RowOutcome::Created {
                    record_id,
                    natural_key: natural_key.clone(),
                },
                Err(StoreError::Duplicate { .. }) => {
                    issues.push(self.duplicate(&record, key_field, key));
                    return ProcessedRow::rejected(&record, issues);
                }
                Err(e) => {
                    issues.push(self.write_failure(&record, &e));
                    return ProcessedRow::rejected(&record, issues);
                }
            }
        };

        ProcessedRow {
            entity_type,
            source_row_index: record.source_row_index,
            raw_values: record.raw_values,
            outcome,
            issues,
        }
    }

    /// 处理单个实体阶段（结果保持源顺序）
    ///
    /// 先剔除同批次内重复主键（首次出现者保留），再以 worker_count 并发处理
    pub async fn run_entity_pass(
        &self,
        stage: &EntityStage,
        store: &dyn RecordStore,
        batch_id: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> Vec<ProcessedRow> {
        let entity_type = stage.entity_type;
        let total = stage.total();
        let offset = stage.parse_errors.len();

        let key_field = self
            .registry
            .schema(entity_type)
            .map(|s| s.natural_key)
            .unwrap_or(crate::config::field_registry::NATURAL_KEY_FIELD);
        let duplicates: HashMap<usize, (String, usize)> = ConflictHandler
            .detect_duplicates(stage.rows.iter().map(|r| &r.record), key_field)
            .into_iter()
            .map(|(row, key, first)| (row, (key, first)))
            .collect();
        if !duplicates.is_empty() {
            warn!(
                entity_type = %entity_type,
                count = duplicates.len(),
                "同批次内存在重复业务主键"
            );
        }

        let mut results = Vec::with_capacity(stage.rows.len());
        let mut pending = stream::iter(stage.rows.iter().cloned().map(|row| {
            let duplicate = duplicates.get(&row.record.source_row_index).cloned();
            async move {
                match duplicate {
                    Some((key, first_row)) => {
                        Self::in_batch_duplicate(row, key_field, &key, first_row)
                    }
                    None => self.process(row, store, batch_id).await,
                }
            }
        }))
        .buffered(self.worker_count);

        while let Some(processed) = pending.next().await {
            results.push(processed);
            let done = results.len();
            if done % self.progress_chunk_size == 0 && done < stage.rows.len() {
                progress.on_progress(entity_type, offset + done, total, "处理中");
            }
        }

        debug!(
            entity_type = %entity_type,
            rows = results.len(),
            rejected = results.iter().filter(|r| r.is_rejected()).count(),
            "实体阶段处理完成"
        );
        results
    }

    fn in_batch_duplicate(
        row: MappedRow,
        key_field: &str,
        key: &str,
        first_row: usize,
    ) -> ProcessedRow {
        let MappedRow { record, mut issues } = row;
        issues.push(ValidationIssue::error(
            record.entity_type,
            record.source_row_index,
            IssueKind::DuplicateKey,
            Some(key_field),
            format!(
                "业务主键在本次上传中重复: {}（首次出现于第 {} 行）",
                key, first_row
            ),
        ));
        ProcessedRow::rejected(&record, issues)
    }

    fn issue(
        &self,
        record: &MappedRecord,
        kind: IssueKind,
        field: Option<&str>,
        message: String,
    ) -> ValidationIssue {
        ValidationIssue::error(record.entity_type, record.source_row_index, kind, field, message)
    }

    fn duplicate(&self, record: &MappedRecord, key_field: &str, key: &str) -> ValidationIssue {
        self.issue(
            record,
            IssueKind::DuplicateKey,
            Some(key_field),
            format!("业务主键已存在: {}", key),
        )
    }

    fn write_failure(&self, record: &MappedRecord, error: &StoreError) -> ValidationIssue {
        warn!(
            entity_type = %record.entity_type,
            row = record.source_row_index,
            error = %error,
            "存储写入失败"
        );
        self.issue(
            record,
            IssueKind::WriteFailure,
            None,
            format!("存储写入失败: {}", error),
        )
    }
}
