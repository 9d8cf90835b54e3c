// ==========================================
// 案件管理系统数据迁移 - 写入日志与回滚
// ==========================================
// 职责: 记录本批次的每一次成功写入，并在失败/取消时按逆依赖顺序撤销
// 规则:
// - 新建记录 → 删除
// - 覆盖记录 → 恢复原字段
// - 同一实体类型内按写入的逆序处理
// - 撤销失败记录为 RollbackError，不无限重试（仅受 StorageCallPolicy 约束）
// - 目标记录已不存在视为已撤销
// ==========================================

use crate::domain::record::{FieldValue, RecordId};
use crate::domain::report::RollbackError;
use crate::domain::types::EntityType;
use crate::engine::orderer::DependencyGraph;
use crate::engine::processor::{ProcessedRow, RowOutcome};
use crate::engine::storage::{RecordStore, StorageCallPolicy, StoreError};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

// ==========================================
// JournalEntry - 写入日志条目
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    Created {
        entity_type: EntityType,
        record_id: RecordId,
        natural_key: String,
    },
    Updated {
        entity_type: EntityType,
        record_id: RecordId,
        natural_key: String,
        previous_fields: BTreeMap<String, FieldValue>,
    },
}

impl JournalEntry {
    pub fn entity_type(&self) -> EntityType {
        match self {
            JournalEntry::Created { entity_type, .. }
            | JournalEntry::Updated { entity_type, .. } => *entity_type,
        }
    }

    fn record_id(&self) -> &RecordId {
        match self {
            JournalEntry::Created { record_id, .. }
            | JournalEntry::Updated { record_id, .. } => record_id,
        }
    }

    fn natural_key(&self) -> &str {
        match self {
            JournalEntry::Created { natural_key, .. }
            | JournalEntry::Updated { natural_key, .. } => natural_key,
        }
    }
}

// ==========================================
// WriteJournal - 本批次写入日志
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct WriteJournal {
    entries: Vec<JournalEntry>,
}

impl WriteJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一行的写入结果（被拒绝的行不记录）
    pub fn record(&mut self, row: &ProcessedRow) {
        match &row.outcome {
            RowOutcome::Created {
                record_id,
                natural_key,
            } => self.entries.push(JournalEntry::Created {
                entity_type: row.entity_type,
                record_id: record_id.clone(),
                natural_key: natural_key.clone(),
            }),
            RowOutcome::Updated {
                record_id,
                natural_key,
                previous_fields,
            } => self.entries.push(JournalEntry::Updated {
                entity_type: row.entity_type,
                record_id: record_id.clone(),
                natural_key: natural_key.clone(),
                previous_fields: previous_fields.clone(),
            }),
            RowOutcome::Rejected => {}
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// 回滚处理顺序: 依赖序号倒序，同类型内写入逆序
    pub fn rollback_sequence(&self, graph: &DependencyGraph) -> Vec<&JournalEntry> {
        let mut sequence: Vec<&JournalEntry> = self.entries.iter().rev().collect();
        // 稳定排序保持同类型内的逆序
        sequence.sort_by_key(|e| {
            std::cmp::Reverse(graph.rank(e.entity_type()).unwrap_or(usize::MAX))
        });
        sequence
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollbackReport {
    pub reverted: usize,
    pub errors: Vec<RollbackError>,
}

/// 撤销写入日志中的全部写入
pub async fn rollback(
    journal: &WriteJournal,
    store: &dyn RecordStore,
    graph: &DependencyGraph,
    policy: &StorageCallPolicy,
) -> RollbackReport {
    let mut report = RollbackReport::default();
    info!(entries = journal.len(), "开始回滚");

    for entry in journal.rollback_sequence(graph) {
        let entity_type = entry.entity_type();
        let result = match entry {
            JournalEntry::Created { record_id, .. } => {
                policy
                    .call("delete", move || store.delete(entity_type, record_id))
                    .await
            }
            JournalEntry::Updated {
                natural_key,
                previous_fields,
                ..
            } => {
                let key = natural_key.as_str();
                policy
                    .call("restore", move || {
                        store.update(entity_type, key, previous_fields.clone())
                    })
                    .await
                    .map(|_| ())
            }
        };

        match result {
            Ok(()) => report.reverted += 1,
            Err(StoreError::NotFound { .. }) => {
                warn!(
                    entity_type = %entity_type,
                    record_id = %entry.record_id(),
                    "回滚目标已不存在，视为已撤销"
                );
                report.reverted += 1;
            }
            Err(e) => {
                error!(
                    entity_type = %entity_type,
                    record_id = %entry.record_id(),
                    natural_key = %entry.natural_key(),
                    error = %e,
                    "回滚撤销失败"
                );
                report.errors.push(RollbackError {
                    entity_type,
                    record_id: entry.record_id().clone(),
                    natural_key: entry.natural_key().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    info!(reverted = report.reverted, failed = report.errors.len(), "回滚结束");
    report
}
