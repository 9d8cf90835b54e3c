// ==========================================
// 案件管理系统数据迁移 - 字段映射器实现
// ==========================================
// 职责: 源列 → 标准字段映射 + 类型转换
// 约束:
// - 不含任何实体特定逻辑：规则全部来自 MappingConfig 与 FieldRegistry
// - 转换失败为行级问题，不影响其他行
// 列匹配顺序: 显式映射 → 与标准字段同名的表头（忽略大小写）
// ==========================================

use crate::config::field_registry::{EntitySchema, FieldRegistry, FieldSpec, FieldType};
use crate::domain::mapping::{EntityMapping, FieldTransform, MappingConfig};
use crate::domain::record::{FieldValue, MappedRecord, ParsedFile, RawRow};
use crate::domain::report::ValidationIssue;
use crate::domain::types::{EntityType, IssueKind};
use crate::importer::data_cleaner::DataCleaner;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

// ==========================================
// MappedRow - 映射结果（记录 + 映射阶段问题）
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow {
    pub record: MappedRecord,
    pub issues: Vec<ValidationIssue>,
}

impl MappedRow {
    /// 存在映射错误（该行不再进入校验）
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.is_blocking())
    }
}

/// 单字段转换结果: (值, 可选警告)
type Coerced = Result<(FieldValue, Option<String>), String>;

pub struct ColumnMapper {
    registry: Arc<FieldRegistry>,
    cleaner: DataCleaner,
}

impl ColumnMapper {
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        Self {
            registry,
            cleaner: DataCleaner,
        }
    }

    pub fn registry(&self) -> &Arc<FieldRegistry> {
        &self.registry
    }

    /// 映射整个文件（仅格式正确的行；解析错误行已由解析器排除）
    pub fn map_file(&self, file: &ParsedFile, config: &MappingConfig) -> Vec<MappedRow> {
        let default_mapping = EntityMapping::default();
        let mapping = config.entity(file.entity_type).unwrap_or(&default_mapping);

        let schema = match self.registry.schema(file.entity_type) {
            Some(s) => s,
            None => {
                return file
                    .rows
                    .iter()
                    .map(|row| self.unregistered_row(file, row))
                    .collect()
            }
        };

        let columns = self.resolve_columns(file, mapping, schema);
        let rows: Vec<MappedRow> = file
            .rows
            .iter()
            .map(|row| self.map_row(file, row, mapping, schema, &columns))
            .collect();

        debug!(
            entity_type = %file.entity_type,
            rows = rows.len(),
            blocked = rows.iter().filter(|r| r.has_errors()).count(),
            "字段映射完成"
        );
        rows
    }

    /// 标准字段 → 源列下标（None 表示未映射）
    fn resolve_columns(
        &self,
        file: &ParsedFile,
        mapping: &EntityMapping,
        schema: &EntitySchema,
    ) -> BTreeMap<&'static str, Option<usize>> {
        schema
            .fields
            .iter()
            .map(|spec| {
                let index = match mapping.source_column_for(spec.name) {
                    Some(source) => file.column_index(source),
                    None => file
                        .header_row
                        .iter()
                        .position(|h| h.eq_ignore_ascii_case(spec.name)),
                };
                (spec.name, index)
            })
            .collect()
    }

    fn map_row(
        &self,
        file: &ParsedFile,
        row: &RawRow,
        mapping: &EntityMapping,
        schema: &EntitySchema,
        columns: &BTreeMap<&'static str, Option<usize>>,
    ) -> MappedRow {
        let entity_type = file.entity_type;
        let mut fields = BTreeMap::new();
        let mut issues = Vec::new();
        let no_transform = FieldTransform::default();

        for spec in &schema.fields {
            let transform = mapping.transform_for(spec.name).unwrap_or(&no_transform);
            let cell = columns
                .get(spec.name)
                .copied()
                .flatten()
                .and_then(|i| row.cells.get(i));

            let source = match cell {
                Some(value) => self.cleaner.normalize_null(value).map(str::to_string),
                None if transform.default_value.is_none() && spec.required => {
                    issues.push(mapping_error(
                        entity_type,
                        row.source_row_index,
                        spec.name,
                        format!("必填字段未映射: {}", spec.name),
                    ));
                    continue;
                }
                None => None,
            };

            // 空白 / 未映射 → 默认值 → Null
            let value = match source.or_else(|| transform.default_value.clone()) {
                Some(v) => v,
                None => {
                    fields.insert(spec.name.to_string(), FieldValue::Null);
                    continue;
                }
            };

            match self.coerce(&value, spec, transform) {
                Ok((typed, warning)) => {
                    if let Some(message) = warning {
                        issues.push(ValidationIssue::warning(
                            entity_type,
                            row.source_row_index,
                            IssueKind::Mapping,
                            Some(spec.name),
                            message,
                        ));
                    }
                    fields.insert(spec.name.to_string(), typed);
                }
                Err(message) => {
                    issues.push(mapping_error(
                        entity_type,
                        row.source_row_index,
                        spec.name,
                        format!("字段 {} 转换失败: {}", spec.name, message),
                    ));
                }
            }
        }

        MappedRow {
            record: MappedRecord {
                entity_type,
                source_row_index: row.source_row_index,
                fields,
                raw_values: file.raw_values(row),
            },
            issues,
        }
    }

    /// 枚举翻译（精确键 → 忽略大小写键）后按字段类型转换
    fn coerce(&self, value: &str, spec: &FieldSpec, transform: &FieldTransform) -> Coerced {
        let translated = translate(value, transform);
        let value = translated.as_str();

        match spec.field_type {
            FieldType::Text { .. } | FieldType::Reference(_) => {
                Ok((FieldValue::Text(value.to_string()), None))
            }
            FieldType::Integer { .. } => self
                .cleaner
                .parse_integer(value)
                .map(|v| (FieldValue::Integer(v), None)),
            FieldType::Decimal { .. } => self
                .cleaner
                .parse_decimal(value)
                .map(|v| (FieldValue::Decimal(v), None)),
            FieldType::Boolean => self
                .cleaner
                .parse_bool(value)
                .map(|v| (FieldValue::Boolean(v), None)),
            FieldType::Date => self
                .cleaner
                .parse_date(value, &transform.date_formats)
                .map(|v| (FieldValue::Date(v), None)),
            FieldType::Enum(allowed) => match self.cleaner.normalize_enum(value, allowed) {
                Some((canonical, false)) => Ok((FieldValue::Text(canonical), None)),
                Some((canonical, true)) => {
                    let warning = format!("枚举值大小写已规范化: {} → {}", value, canonical);
                    Ok((FieldValue::Text(canonical), Some(warning)))
                }
                // 不在允许值内：保留原值，由校验器报告
                None => Ok((FieldValue::Text(value.to_string()), None)),
            },
        }
    }

    fn unregistered_row(&self, file: &ParsedFile, row: &RawRow) -> MappedRow {
        MappedRow {
            record: MappedRecord {
                entity_type: file.entity_type,
                source_row_index: row.source_row_index,
                fields: BTreeMap::new(),
                raw_values: file.raw_values(row),
            },
            issues: vec![ValidationIssue::error(
                file.entity_type,
                row.source_row_index,
                IssueKind::Mapping,
                None,
                format!("实体类型未注册字段模式: {}", file.entity_type),
            )],
        }
    }
}

fn translate(value: &str, transform: &FieldTransform) -> String {
    let trimmed = value.trim();
    if let Some(v) = transform.enum_translations.get(trimmed) {
        return v.clone();
    }
    transform
        .enum_translations
        .iter()
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(trimmed))
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| trimmed.to_string())
}

fn mapping_error(
    entity_type: EntityType,
    row: usize,
    field: &str,
    message: String,
) -> ValidationIssue {
    ValidationIssue::error(entity_type, row, IssueKind::Mapping, Some(field), message)
}
