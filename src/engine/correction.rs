// ==========================================
// 案件管理系统数据迁移 - 失败行修正重导入
// ==========================================
// 职责: 用户修正失败行后，以新批次重新导入
// 规则:
// - 原批次必须已结束且未回滚（回滚批次的成功写入已撤销，只能重新上传源文件）
// - 只接受原批次失败集合中的行（实体类型 + 源行号）
// - 沿用原批次的映射配置快照
// - 新批次记录 predecessor_batch_id
// ==========================================

use crate::domain::batch::ImportBatch;
use crate::domain::mapping::MappingConfig;
use crate::domain::record::{ParsedFile, RawValues};
use crate::domain::report::ImportExecutionResult;
use crate::domain::types::{BatchStatus, EntityType};
use crate::engine::executor::{ExecutionEngine, ExecutionOptions};
use crate::importer::error::{MigrationError, MigrationResult};
use crate::repository::import_ledger::ImportLedger;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, instrument};

/// 单行修正（原始列名 → 修正后的值）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCorrection {
    pub entity_type: EntityType,
    pub source_row_index: usize,
    pub raw_values: RawValues,
}

pub struct CorrectionService {
    ledger: Arc<dyn ImportLedger>,
    engine: Arc<ExecutionEngine>,
}

impl CorrectionService {
    pub fn new(ledger: Arc<dyn ImportLedger>, engine: Arc<ExecutionEngine>) -> Self {
        Self { ledger, engine }
    }

    /// 原批次的失败行（未修改的原始值，按实体类型、行号排序）
    pub async fn failed_rows(&self, batch_id: &str) -> MigrationResult<Vec<RowCorrection>> {
        self.load_correctable_batch(batch_id).await?;

        let mut rows: BTreeMap<(EntityType, usize), RawValues> = BTreeMap::new();
        for error in self.ledger.get_errors(batch_id).await? {
            rows.entry((error.entity_type, error.source_row_index))
                .or_insert(error.raw_values);
        }

        Ok(rows
            .into_iter()
            .map(|((entity_type, source_row_index), raw_values)| RowCorrection {
                entity_type,
                source_row_index,
                raw_values,
            })
            .collect())
    }

    /// 修正行重导入
    ///
    /// # 错误
    /// - BatchNotFound / BatchNotTerminal: 原批次不存在或尚未结束
    /// - BatchRolledBack: 原批次已回滚
    /// - CorrectionTargetNotFailed: 修正行不在原批次失败集合中
    /// - InvalidMappingSnapshot: 原批次映射快照无法解析
    #[instrument(skip(self, corrections, options), fields(rows = corrections.len()))]
    pub async fn reimport(
        &self,
        batch_id: &str,
        corrections: Vec<RowCorrection>,
        options: ExecutionOptions,
    ) -> MigrationResult<ImportExecutionResult> {
        let batch = self.load_correctable_batch(batch_id).await?;

        let failed: BTreeSet<(EntityType, usize)> = self
            .ledger
            .get_errors(batch_id)
            .await?
            .into_iter()
            .map(|e| (e.entity_type, e.source_row_index))
            .collect();

        let mut grouped: BTreeMap<EntityType, Vec<(usize, RawValues)>> = BTreeMap::new();
        for correction in corrections {
            if !failed.contains(&(correction.entity_type, correction.source_row_index)) {
                return Err(MigrationError::CorrectionTargetNotFailed {
                    entity_type: correction.entity_type,
                    source_row_index: correction.source_row_index,
                });
            }
            grouped
                .entry(correction.entity_type)
                .or_default()
                .push((correction.source_row_index, correction.raw_values));
        }

        let mapping = MappingConfig::from_snapshot(&batch.mapping_config_snapshot)?;
        let files: Vec<ParsedFile> = grouped
            .into_iter()
            .map(|(entity_type, rows)| ParsedFile::from_raw_values(entity_type, rows))
            .collect();

        info!(
            predecessor = %batch_id,
            files = files.len(),
            "开始修正重导入"
        );

        let options = ExecutionOptions {
            predecessor_batch_id: Some(batch_id.to_string()),
            ..options
        };
        self.engine
            .execute(&batch.request(), &files, &mapping, options)
            .await
    }

    /// 读取可修正的原批次（已结束且未回滚）
    async fn load_correctable_batch(&self, batch_id: &str) -> MigrationResult<ImportBatch> {
        let batch = self
            .ledger
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| MigrationError::BatchNotFound(batch_id.to_string()))?;

        if !batch.status.is_terminal() {
            return Err(MigrationError::BatchNotTerminal {
                batch_id: batch_id.to_string(),
                status: batch.status.to_string(),
            });
        }
        if batch.status == BatchStatus::RolledBack {
            return Err(MigrationError::BatchRolledBack(batch_id.to_string()));
        }
        Ok(batch)
    }
}
