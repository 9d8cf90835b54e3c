// ==========================================
// 案件管理系统数据迁移 - 预演模拟器
// ==========================================
// 职责: 不落库地投影一次导入的结果
// 红线: 不得修改目标存储，不得创建批次/错误台账
// 实现: 与执行引擎共用 RecordProcessor，写入落在 OverlayStore 草稿层
// 说明: 某实体类型预计失败时仍继续后续阶段，以便一次看到全部问题
// ==========================================

use crate::config::field_registry::FieldRegistry;
use crate::config::import_settings::ImportSettings;
use crate::domain::mapping::MappingConfig;
use crate::domain::record::ParsedFile;
use crate::domain::report::{DryRunResult, EntityCounts};
use crate::domain::types::EntityStatus;
use crate::engine::orderer::DependencyGraph;
use crate::engine::overlay::OverlayStore;
use crate::engine::plan::build_plan;
use crate::engine::processor::{RecordProcessor, RowOutcome};
use crate::engine::progress::NoopProgress;
use crate::engine::storage::RecordStore;
use crate::importer::error::MigrationResult;
use crate::importer::field_mapper::ColumnMapper;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

pub struct DryRunSimulator {
    registry: Arc<FieldRegistry>,
    store: Arc<dyn RecordStore>,
    settings: ImportSettings,
    graph: &'static DependencyGraph,
}

impl DryRunSimulator {
    pub fn new(
        registry: Arc<FieldRegistry>,
        store: Arc<dyn RecordStore>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            registry,
            store,
            settings,
            graph: DependencyGraph::product(),
        }
    }

    pub fn with_graph(mut self, graph: &'static DependencyGraph) -> Self {
        self.graph = graph;
        self
    }

    /// 预演一次导入
    ///
    /// # 返回
    /// - Ok(DryRunResult): success 当且仅当不存在 error 级问题
    /// - Err: 上传文件组合非法（重复实体类型 / 未注册实体类型）
    #[instrument(skip_all, fields(org = %mapping.organization_id, files = files.len()))]
    pub async fn simulate(
        &self,
        files: &[ParsedFile],
        mapping: &MappingConfig,
    ) -> MigrationResult<DryRunResult> {
        let mapper = ColumnMapper::new(self.registry.clone());
        let plan = build_plan(self.graph, &mapper, files, mapping)?;
        let processor = RecordProcessor::new(self.registry.clone(), &self.settings);
        let overlay = OverlayStore::new(self.store.clone());

        let mut result = DryRunResult {
            success: true,
            records_to_create: 0,
            records_to_update: 0,
            conflicts: Vec::new(),
            per_entity_counts: BTreeMap::new(),
            import_order: plan.entity_types(),
        };

        for stage in &plan.stages {
            let entity_type = stage.entity_type;
            let mut counts = EntityCounts {
                total: stage.total(),
                blocked: stage.parse_errors.len(),
                ..EntityCounts::default()
            };
            result.conflicts.extend(stage.parse_issues());

            let rows = processor
                .run_entity_pass(stage, &overlay, None, &NoopProgress)
                .await;
            for row in rows {
                match row.outcome {
                    RowOutcome::Created { .. } => counts.to_create += 1,
                    RowOutcome::Updated { .. } => counts.to_update += 1,
                    RowOutcome::Rejected => counts.blocked += 1,
                }
                counts.warnings += row.issues.iter().filter(|i| !i.is_blocking()).count();
                result.conflicts.extend(row.issues);
            }

            let dependency_failed = self.graph.dependencies_of(entity_type).iter().any(|dep| {
                result
                    .per_entity_counts
                    .get(dep)
                    .map_or(false, |c| c.projected_status == EntityStatus::Failed)
            });
            counts.projected_status =
                if dependency_failed || counts.blocked > self.settings.error_tolerance {
                    EntityStatus::Failed
                } else {
                    EntityStatus::Completed
                };

            result.records_to_create += counts.to_create;
            result.records_to_update += counts.to_update;
            result.per_entity_counts.insert(entity_type, counts);
        }

        result.success = result.conflicts.iter().all(|i| !i.is_blocking());

        info!(
            success = result.success,
            to_create = result.records_to_create,
            to_update = result.records_to_update,
            conflicts = result.conflicts.len(),
            "预演完成"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::RawValues;
    use crate::domain::types::{EntityType, IssueKind};
    use crate::repository::memory_store::InMemoryRecordStore;

    fn file(entity_type: EntityType, rows: Vec<Vec<(&str, &str)>>) -> ParsedFile {
        let raw = rows
            .into_iter()
            .enumerate()
            .map(|(i, cells)| {
                (
                    i + 2,
                    cells
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<RawValues>(),
                )
            })
            .collect();
        ParsedFile::from_raw_values(entity_type, raw)
    }

    #[tokio::test]
    async fn test_in_batch_references_resolve_without_writing() {
        let store = Arc::new(InMemoryRecordStore::new());
        let simulator = DryRunSimulator::new(
            Arc::new(FieldRegistry::builtin()),
            store.clone(),
            ImportSettings::default(),
        );
        let files = vec![
            file(
                EntityType::Contacts,
                vec![vec![
                    ("external_id", "P1"),
                    ("account_ref", "A1"),
                    ("last_name", "Lee"),
                ]],
            ),
            file(EntityType::Accounts, vec![vec![("external_id", "A1"), ("name", "Acme")]]),
        ];

        let result = simulator
            .simulate(&files, &MappingConfig::new("org-1"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.records_to_create, 2);
        assert_eq!(result.import_order, vec![EntityType::Accounts, EntityType::Contacts]);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_dependency_failure_propagates_to_projection() {
        let simulator = DryRunSimulator::new(
            Arc::new(FieldRegistry::builtin()),
            Arc::new(InMemoryRecordStore::new()),
            ImportSettings::default(),
        );
        let files = vec![
            file(EntityType::Accounts, vec![vec![("external_id", "A1"), ("name", "")]]),
            file(
                EntityType::Contacts,
                vec![vec![
                    ("external_id", "P1"),
                    ("account_ref", "A1"),
                    ("last_name", "Lee"),
                ]],
            ),
        ];

        let result = simulator
            .simulate(&files, &MappingConfig::new("org-1"))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.reference_conflicts().len(), 1);
        assert_eq!(result.issues_of_kind(IssueKind::Validation).len(), 1);
        let contacts = &result.per_entity_counts[&EntityType::Contacts];
        assert_eq!(contacts.projected_status, EntityStatus::Failed);
    }
}
