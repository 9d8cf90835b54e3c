// ==========================================
// 案件管理系统数据迁移 - 执行引擎
// ==========================================
// 职责: 按依赖顺序写入全部实体类型，维护批次台账
// 流程:
// 1. 构建导入计划（文件组合非法时直接返回，不创建批次）
// 2. 创建批次 pending → processing
// 3. 逐实体类型处理（阶段屏障：前一类型结束后才开始下一类型）
// 4. 按容忍度判定实体类型成败；启用回滚时任一失败即停止
// 5. 失败/取消 → 逆依赖顺序回滚 → rolled_back
// 6. 写入批次终态
// 约束:
// - 取消只在实体类型边界检查
// - 依赖未完成的实体类型不启动，其行记为 DependencyFailed
// ==========================================

use crate::config::field_registry::FieldRegistry;
use crate::config::import_settings::ImportSettings;
use crate::domain::batch::{BatchOutcome, BatchRequest, ImportBatch, ImportError};
use crate::domain::mapping::MappingConfig;
use crate::domain::record::ParsedFile;
use crate::domain::report::{
    join_messages, EntityProgress, ImportExecutionResult, RollbackError, ValidationIssue,
};
use crate::domain::types::{BatchStatus, EntityStatus, EntityType, IssueKind};
use crate::engine::orderer::DependencyGraph;
use crate::engine::plan::{build_plan, EntityStage, ImportPlan};
use crate::engine::processor::{ProcessedRow, RecordProcessor};
use crate::engine::progress::{NoopProgress, ProgressSink};
use crate::engine::rollback::{rollback, RollbackReport, WriteJournal};
use crate::engine::storage::{RecordStore, StorageCallPolicy};
use crate::importer::error::{MigrationError, MigrationResult};
use crate::importer::field_mapper::ColumnMapper;
use crate::repository::import_ledger::ImportLedger;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

// ==========================================
// ExecutionOptions - 单次执行的调用方选项
// ==========================================
#[derive(Clone)]
pub struct ExecutionOptions {
    pub progress: Arc<dyn ProgressSink>,
    pub cancel: CancellationToken,
    pub predecessor_batch_id: Option<String>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            progress: Arc::new(NoopProgress),
            cancel: CancellationToken::new(),
            predecessor_batch_id: None,
        }
    }
}

impl ExecutionOptions {
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// 运行期累积状态
#[derive(Default)]
struct RunState {
    progress: Vec<EntityProgress>,
    errors: Vec<ImportError>,
    warnings: Vec<ValidationIssue>,
    journal: WriteJournal,
    rollback_errors: Vec<RollbackError>,
    failed_types: Vec<EntityType>,
    cancelled: bool,
}

// ==========================================
// ExecutionEngine
// ==========================================
pub struct ExecutionEngine {
    registry: Arc<FieldRegistry>,
    store: Arc<dyn RecordStore>,
    ledger: Arc<dyn ImportLedger>,
    settings: ImportSettings,
    graph: &'static DependencyGraph,
}

impl ExecutionEngine {
    pub fn new(
        registry: Arc<FieldRegistry>,
        store: Arc<dyn RecordStore>,
        ledger: Arc<dyn ImportLedger>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            registry,
            store,
            ledger,
            settings,
            graph: DependencyGraph::product(),
        }
    }

    pub fn with_graph(mut self, graph: &'static DependencyGraph) -> Self {
        self.graph = graph;
        self
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// 执行导入
    ///
    /// # 返回
    /// - Ok(ImportExecutionResult): 批次已进入终态（completed / failed / rolled_back）
    /// - Err: 文件组合非法，或台账写入失败
    #[instrument(skip_all, fields(org = %request.organization_id, files = files.len()))]
    pub async fn execute(
        &self,
        request: &BatchRequest,
        files: &[ParsedFile],
        mapping: &MappingConfig,
        options: ExecutionOptions,
    ) -> MigrationResult<ImportExecutionResult> {
        let started = Instant::now();

        let mapper = ColumnMapper::new(self.registry.clone());
        let plan = build_plan(self.graph, &mapper, files, mapping)?;
        let snapshot = mapping.to_snapshot()?;

        let batch = ImportBatch::new(
            request,
            snapshot,
            self.settings.mode,
            plan.total_records(),
            options.predecessor_batch_id.clone(),
        );
        self.ledger.insert_batch(&batch).await?;
        self.ledger
            .update_batch_status(&batch.id, BatchStatus::Processing)
            .await?;
        info!(
            batch_id = %batch.id,
            mode = %self.settings.mode,
            total = batch.total_records,
            order = ?plan.entity_types(),
            "批次开始执行"
        );

        let mut state = RunState {
            progress: plan
                .stages
                .iter()
                .map(|s| EntityProgress::new(s.entity_type, s.total()))
                .collect(),
            ..RunState::default()
        };

        if let Err(e) = self.run_stages(&plan, &batch.id, &options, &mut state).await {
            error!(batch_id = %batch.id, error = %e, "批次执行中断");
            self.abort(&batch.id, &mut state, &e).await;
            return Err(e);
        }

        let outcome = self.conclude(&mut state).await;
        self.ledger.finish_batch(&batch.id, &outcome).await?;
        let batch = self
            .ledger
            .get_batch(&batch.id)
            .await?
            .ok_or_else(|| MigrationError::BatchNotFound(batch.id.clone()))?;

        info!(
            batch_id = %batch.id,
            status = %batch.status,
            successful = batch.successful_records,
            failed = batch.failed_records,
            rolled_back = batch.rolled_back_records,
            "批次执行结束"
        );

        Ok(ImportExecutionResult {
            batch,
            entity_progress: state.progress,
            errors: state.errors,
            warnings: state.warnings,
            rollback_errors: state.rollback_errors,
            elapsed_time: started.elapsed(),
        })
    }

    async fn run_stages(
        &self,
        plan: &ImportPlan,
        batch_id: &str,
        options: &ExecutionOptions,
        state: &mut RunState,
    ) -> MigrationResult<()> {
        let processor = RecordProcessor::new(self.registry.clone(), &self.settings);
        let mut completed: BTreeSet<EntityType> = BTreeSet::new();

        for (index, stage) in plan.stages.iter().enumerate() {
            if options.cancel.is_cancelled() {
                warn!(batch_id = %batch_id, next = %stage.entity_type, "收到取消请求，停止后续实体类型");
                state.cancelled = true;
                break;
            }

            let entity_type = stage.entity_type;
            let total = stage.total();
            state.progress[index].status = EntityStatus::Processing;
            options.progress.on_progress(entity_type, 0, total, "开始处理");

            let blocked_by: Vec<EntityType> = self
                .graph
                .dependencies_of(entity_type)
                .iter()
                .copied()
                .filter(|dep| plan.stage(*dep).is_some() && !completed.contains(dep))
                .collect();

            let stage_errors = if blocked_by.is_empty() {
                let rows = processor
                    .run_entity_pass(
                        stage,
                        self.store.as_ref(),
                        Some(batch_id),
                        options.progress.as_ref(),
                    )
                    .await;
                self.collect_rows(stage, rows, batch_id, state)
            } else {
                warn!(entity_type = %entity_type, blocked_by = ?blocked_by, "依赖的实体类型未完成，跳过");
                dependency_failed_errors(stage, &blocked_by, batch_id)
            };

            let error_count = stage_errors.len();
            self.ledger.append_errors(&stage_errors).await?;
            state.errors.extend(stage_errors);

            let stage_failed =
                !blocked_by.is_empty() || error_count > self.settings.error_tolerance;
            let progress = &mut state.progress[index];
            progress.processed = total;
            progress.errors = error_count;
            progress.status = if stage_failed {
                EntityStatus::Failed
            } else {
                EntityStatus::Completed
            };
            options.progress.on_progress(
                entity_type,
                total,
                total,
                if stage_failed { "阶段失败" } else { "阶段完成" },
            );
            info!(
                entity_type = %entity_type,
                total = total,
                errors = error_count,
                status = %progress.status,
                "实体类型处理结束"
            );

            if stage_failed {
                state.failed_types.push(entity_type);
                if self.settings.rollback_enabled() {
                    break;
                }
            } else {
                completed.insert(entity_type);
            }
        }

        Ok(())
    }

    /// 行结果 → 失败行记录 / 警告 / 写入日志
    fn collect_rows(
        &self,
        stage: &EntityStage,
        rows: Vec<ProcessedRow>,
        batch_id: &str,
        state: &mut RunState,
    ) -> Vec<ImportError> {
        let mut errors: Vec<ImportError> = stage
            .parse_errors
            .iter()
            .map(|e| {
                ImportError::new(
                    batch_id,
                    stage.entity_type,
                    e.source_row_index.unwrap_or(0),
                    e.raw_values.clone(),
                    IssueKind::Parse,
                    e.message.clone(),
                )
            })
            .collect();

        for row in rows {
            state.journal.record(&row);
            state.warnings.extend(row.warnings().cloned());
            if !row.is_rejected() {
                continue;
            }

            let blocking = row.blocking_issues();
            let kind = match blocking.first().map(|i| i.kind) {
                // 执行期引用缺失即写入失败（消息与预演一致）
                Some(IssueKind::ReferenceConflict) | None => IssueKind::WriteFailure,
                Some(kind) => kind,
            };
            errors.push(ImportError::new(
                batch_id,
                row.entity_type,
                row.source_row_index,
                row.raw_values,
                kind,
                join_messages(&blocking),
            ));
        }
        errors
    }

    /// 根据运行状态决定批次终态（必要时回滚）
    async fn conclude(&self, state: &mut RunState) -> BatchOutcome {
        let written = state.journal.len();
        let failed_records = state.errors.len();
        let must_rollback =
            state.cancelled || (!state.failed_types.is_empty() && self.settings.rollback_enabled());

        if must_rollback {
            let reason = if state.cancelled {
                "导入已取消".to_string()
            } else {
                format!("实体类型失败: {}", type_list(&state.failed_types))
            };
            let report = self.revert(state).await;
            return BatchOutcome {
                status: BatchStatus::RolledBack,
                successful_records: written - report.reverted,
                failed_records,
                rolled_back_records: report.reverted,
                message: Some(rollback_message(&reason, &report)),
            };
        }

        if state.failed_types.is_empty() {
            BatchOutcome {
                status: BatchStatus::Completed,
                successful_records: written,
                failed_records,
                rolled_back_records: 0,
                message: None,
            }
        } else {
            BatchOutcome {
                status: BatchStatus::Failed,
                successful_records: written,
                failed_records,
                rolled_back_records: 0,
                message: Some(format!("实体类型超过错误容忍度: {}", type_list(&state.failed_types))),
            }
        }
    }

    /// 台账异常中断: 撤销已写入记录，尽力写入终态
    async fn abort(&self, batch_id: &str, state: &mut RunState, cause: &MigrationError) {
        let written = state.journal.len();
        let report = self.revert(state).await;
        let outcome = BatchOutcome {
            status: BatchStatus::RolledBack,
            successful_records: written - report.reverted,
            failed_records: state.errors.len(),
            rolled_back_records: report.reverted,
            message: Some(rollback_message(&format!("执行中断: {}", cause), &report)),
        };
        if let Err(e) = self.ledger.finish_batch(batch_id, &outcome).await {
            error!(batch_id = %batch_id, error = %e, "批次终态写入失败");
        }
    }

    async fn revert(&self, state: &mut RunState) -> RollbackReport {
        let policy = StorageCallPolicy::from_settings(&self.settings);
        let report = rollback(&state.journal, self.store.as_ref(), self.graph, &policy).await;
        state.rollback_errors.extend(report.errors.iter().cloned());
        report
    }
}

/// 依赖未完成: 阶段内全部行（含解析失败行）记为 DependencyFailed
fn dependency_failed_errors(
    stage: &EntityStage,
    blocked_by: &[EntityType],
    batch_id: &str,
) -> Vec<ImportError> {
    let message = format!("依赖的实体类型未完成: {}", type_list(blocked_by));
    let mut errors: Vec<ImportError> = stage
        .rows
        .iter()
        .map(|r| (r.record.source_row_index, r.record.raw_values.clone()))
        .chain(
            stage
                .parse_errors
                .iter()
                .map(|e| (e.source_row_index.unwrap_or(0), e.raw_values.clone())),
        )
        .map(|(row, raw)| {
            ImportError::new(
                batch_id,
                stage.entity_type,
                row,
                raw,
                IssueKind::DependencyFailed,
                message.clone(),
            )
        })
        .collect();
    errors.sort_by_key(|e| e.source_row_index);
    errors
}

fn type_list(types: &[EntityType]) -> String {
    types
        .iter()
        .map(EntityType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn rollback_message(reason: &str, report: &RollbackReport) -> String {
    if report.errors.is_empty() {
        format!("{}，已回滚 {} 条写入", reason, report.reverted)
    } else {
        format!(
            "{}，已回滚 {} 条写入，{} 条撤销失败",
            reason,
            report.reverted,
            report.errors.len()
        )
    }
}
