// ==========================================
// 案件管理系统数据迁移 - 映射配置模型
// ==========================================
// 职责: 源列 → 标准字段映射 + 值转换规则
// 归属: 租户（组织）维护，映射界面修改；对核心只读
// 约束: 纯数据结构，可序列化为批次快照
// ==========================================

use crate::domain::types::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// FieldTransform - 字段值转换规则
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTransform {
    /// 日期格式（chrono 格式串），按顺序尝试；为空时使用默认格式
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_formats: Vec<String>,

    /// 枚举翻译表（源值 → 标准值）
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enum_translations: BTreeMap<String, String>,

    /// 空白单元格（或未映射字段）的默认值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

// ==========================================
// EntityMapping - 单个实体类型的映射
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMapping {
    /// 源列名 → 标准字段名
    #[serde(default)]
    pub columns: BTreeMap<String, String>,

    /// 标准字段名 → 转换规则
    #[serde(default)]
    pub transforms: BTreeMap<String, FieldTransform>,
}

impl EntityMapping {
    /// 查找映射到指定标准字段的源列
    ///
    /// 多个源列映射到同一标准字段时，取列名排序后的第一个
    pub fn source_column_for(&self, canonical: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, target)| target.as_str() == canonical)
            .map(|(source, _)| source.as_str())
    }

    pub fn transform_for(&self, canonical: &str) -> Option<&FieldTransform> {
        self.transforms.get(canonical)
    }

    /// 构建器: 添加列映射
    pub fn map(mut self, source: &str, canonical: &str) -> Self {
        self.columns.insert(source.to_string(), canonical.to_string());
        self
    }

    /// 构建器: 设置字段转换规则
    pub fn transform(mut self, canonical: &str, transform: FieldTransform) -> Self {
        self.transforms.insert(canonical.to_string(), transform);
        self
    }
}

// ==========================================
// MappingConfig - 组织级映射配置
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingConfig {
    pub organization_id: String,
    #[serde(default)]
    pub entities: BTreeMap<EntityType, EntityMapping>,
}

impl MappingConfig {
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            entities: BTreeMap::new(),
        }
    }

    pub fn with_entity(mut self, entity_type: EntityType, mapping: EntityMapping) -> Self {
        self.entities.insert(entity_type, mapping);
        self
    }

    pub fn entity(&self, entity_type: EntityType) -> Option<&EntityMapping> {
        self.entities.get(&entity_type)
    }

    /// 序列化为批次快照（JSON）
    pub fn to_snapshot(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 从批次快照恢复
    pub fn from_snapshot(snapshot: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(snapshot)
    }
}
