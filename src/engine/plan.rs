// ==========================================
// 案件管理系统数据迁移 - 导入计划
// ==========================================
// 职责: 已解析文件 → 按依赖顺序排列的实体阶段（含映射结果）
// 约束:
// - 每个实体类型至多一个文件
// - 实体类型必须在依赖图中注册
// ==========================================

use crate::domain::mapping::MappingConfig;
use crate::domain::record::{ParseError, ParsedFile};
use crate::domain::report::ValidationIssue;
use crate::domain::types::{EntityType, IssueKind};
use crate::engine::orderer::DependencyGraph;
use crate::importer::error::{MigrationError, MigrationResult};
use crate::importer::field_mapper::{ColumnMapper, MappedRow};
use std::collections::BTreeSet;
use tracing::debug;

// ==========================================
// EntityStage - 单实体类型阶段
// ==========================================
#[derive(Debug, Clone)]
pub struct EntityStage {
    pub entity_type: EntityType,
    pub rows: Vec<MappedRow>,          // 映射后的行（源顺序）
    pub parse_errors: Vec<ParseError>, // 行级解析错误
}

impl EntityStage {
    /// 阶段总行数（含解析失败行）
    pub fn total(&self) -> usize {
        self.rows.len() + self.parse_errors.len()
    }

    /// 解析错误 → 行级问题（计入容忍度）
    pub fn parse_issues(&self) -> Vec<ValidationIssue> {
        self.parse_errors
            .iter()
            .map(|e| {
                ValidationIssue::error(
                    self.entity_type,
                    e.source_row_index.unwrap_or(0),
                    IssueKind::Parse,
                    None,
                    e.message.clone(),
                )
            })
            .collect()
    }
}

// ==========================================
// ImportPlan - 导入计划
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
    pub stages: Vec<EntityStage>, // 依赖顺序
}

impl ImportPlan {
    pub fn entity_types(&self) -> Vec<EntityType> {
        self.stages.iter().map(|s| s.entity_type).collect()
    }

    pub fn total_records(&self) -> usize {
        self.stages.iter().map(EntityStage::total).sum()
    }

    pub fn stage(&self, entity_type: EntityType) -> Option<&EntityStage> {
        self.stages.iter().find(|s| s.entity_type == entity_type)
    }
}

/// 构建导入计划
///
/// # 错误
/// - DuplicateEntityFile: 同一实体类型出现多个文件
/// - UnknownEntityType: 实体类型未在依赖图中注册
pub fn build_plan(
    graph: &DependencyGraph,
    mapper: &ColumnMapper,
    files: &[ParsedFile],
    mapping: &MappingConfig,
) -> MigrationResult<ImportPlan> {
    let mut seen = BTreeSet::new();
    for file in files {
        if !seen.insert(file.entity_type) {
            return Err(MigrationError::DuplicateEntityFile(file.entity_type));
        }
        if !graph.contains(file.entity_type) {
            return Err(MigrationError::UnknownEntityType(file.entity_type.to_string()));
        }
    }

    let mut ordered: Vec<&ParsedFile> = files.iter().collect();
    graph.sort_by_import_order(&mut ordered, |f| f.entity_type);

    let stages: Vec<EntityStage> = ordered
        .into_iter()
        .map(|file| EntityStage {
            entity_type: file.entity_type,
            rows: mapper.map_file(file, mapping),
            parse_errors: file.row_errors.clone(),
        })
        .collect();

    debug!(
        stages = stages.len(),
        order = ?stages.iter().map(|s| s.entity_type.as_str()).collect::<Vec<_>>(),
        "导入计划已生成"
    );
    Ok(ImportPlan { stages })
}
