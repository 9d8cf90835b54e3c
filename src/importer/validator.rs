// ==========================================
// 案件管理系统数据迁移 - 行校验器
// ==========================================
// 职责: 模式规则 + 跨字段规则 → ValidationIssue
// 规则分级:
// - Error: 必填缺失 / 类型不符 / 长度超限 / 数值越界 / 枚举非法 / 跨字段冲突
// - Warning: 数值异常偏大 / 日期不合理（1900 年前或 2100 年后）
// 说明: 跨实体引用校验依赖存储，由 RecordProcessor 执行
// ==========================================

use crate::config::field_registry::{CrossFieldRule, FieldRegistry, FieldSpec, FieldType};
use crate::domain::record::{FieldValue, MappedRecord};
use crate::domain::report::ValidationIssue;
use crate::domain::types::IssueKind;
use chrono::Datelike;
use std::sync::Arc;

const MIN_PLAUSIBLE_YEAR: i32 = 1900;
const MAX_PLAUSIBLE_YEAR: i32 = 2100;

pub struct Validator {
    registry: Arc<FieldRegistry>,
}

impl Validator {
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        Self { registry }
    }

    /// 校验单条记录（纯函数，不访问存储）
    pub fn validate(&self, record: &MappedRecord) -> Vec<ValidationIssue> {
        let schema = match self.registry.schema(record.entity_type) {
            Some(s) => s,
            None => {
                return vec![self.error(
                    record,
                    None,
                    format!("实体类型未注册字段模式: {}", record.entity_type),
                )]
            }
        };

        let mut issues = Vec::new();
        for spec in &schema.fields {
            self.check_field(record, spec, &mut issues);
        }
        for rule in &schema.rules {
            self.check_rule(record, rule, &mut issues);
        }
        issues
    }

    fn check_field(
        &self,
        record: &MappedRecord,
        spec: &FieldSpec,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let value = match record.get(spec.name) {
            Some(v) if !v.is_blank() => v,
            _ => {
                if spec.required {
                    issues.push(self.error(
                        record,
                        Some(spec.name),
                        format!("必填字段缺失: {}", spec.name),
                    ));
                }
                return;
            }
        };

        match (spec.field_type, value) {
            (FieldType::Text { max_len }, FieldValue::Text(s)) => {
                if let Some(max) = max_len {
                    let len = s.chars().count();
                    if len > max {
                        issues.push(self.error(
                            record,
                            Some(spec.name),
                            format!("字段 {} 长度 {} 超过上限 {}", spec.name, len, max),
                        ));
                    }
                }
            }
            (FieldType::Reference(_), FieldValue::Text(_)) => {}
            (FieldType::Enum(allowed), FieldValue::Text(s)) => {
                if !allowed.contains(&s.as_str()) {
                    issues.push(self.error(
                        record,
                        Some(spec.name),
                        format!("字段 {} 取值无效: {}（允许: {}）", spec.name, s, allowed.join(", ")),
                    ));
                }
            }
            (FieldType::Integer { min, max }, FieldValue::Integer(v)) => {
                let below = min.map_or(false, |m| *v < m);
                let above = max.map_or(false, |m| *v > m);
                if below || above {
                    issues.push(self.error(
                        record,
                        Some(spec.name),
                        format!("字段 {} 超出范围: {}", spec.name, v),
                    ));
                }
            }
            (
                FieldType::Decimal { min, warn_above },
                FieldValue::Decimal(_) | FieldValue::Integer(_),
            ) => {
                let v = value.as_number().unwrap_or_default();
                if min.map_or(false, |m| v < m) {
                    issues.push(self.error(
                        record,
                        Some(spec.name),
                        format!("字段 {} 超出范围: {}", spec.name, v),
                    ));
                } else if warn_above.map_or(false, |w| v > w) {
                    issues.push(self.warning(
                        record,
                        Some(spec.name),
                        format!("字段 {} 数值异常偏大: {}", spec.name, v),
                    ));
                }
            }
            (FieldType::Boolean, FieldValue::Boolean(_)) => {}
            (FieldType::Date, FieldValue::Date(d)) => {
                if d.year() < MIN_PLAUSIBLE_YEAR || d.year() > MAX_PLAUSIBLE_YEAR {
                    issues.push(self.warning(
                        record,
                        Some(spec.name),
                        format!("字段 {} 日期不合理: {}", spec.name, d),
                    ));
                }
            }
            (expected, actual) => {
                issues.push(self.error(
                    record,
                    Some(spec.name),
                    format!(
                        "字段 {} 类型不符: 期望 {}，实际 {}",
                        spec.name,
                        expected.name(),
                        actual.type_name()
                    ),
                ));
            }
        }
    }

    fn check_rule(
        &self,
        record: &MappedRecord,
        rule: &CrossFieldRule,
        issues: &mut Vec<ValidationIssue>,
    ) {
        match *rule {
            CrossFieldRule::NotBefore { field, reference } => {
                let pair = (
                    record.get(field).and_then(FieldValue::as_date),
                    record.get(reference).and_then(FieldValue::as_date),
                );
                if let (Some(value), Some(bound)) = pair {
                    if value < bound {
                        issues.push(self.error(
                            record,
                            Some(field),
                            format!("{} ({}) 早于 {} ({})", field, value, reference, bound),
                        ));
                    }
                }
            }
            CrossFieldRule::NotGreaterThan { field, reference } => {
                let pair = (
                    record.get(field).and_then(FieldValue::as_number),
                    record.get(reference).and_then(FieldValue::as_number),
                );
                if let (Some(value), Some(bound)) = pair {
                    if value > bound {
                        issues.push(self.error(
                            record,
                            Some(field),
                            format!("{} ({}) 大于 {} ({})", field, value, reference, bound),
                        ));
                    }
                }
            }
        }
    }

    fn error(
        &self,
        record: &MappedRecord,
        field: Option<&str>,
        message: String,
    ) -> ValidationIssue {
        ValidationIssue::error(
            record.entity_type,
            record.source_row_index,
            IssueKind::Validation,
            field,
            message,
        )
    }

    fn warning(
        &self,
        record: &MappedRecord,
        field: Option<&str>,
        message: String,
    ) -> ValidationIssue {
        ValidationIssue::warning(
            record.entity_type,
            record.source_row_index,
            IssueKind::Validation,
            field,
            message,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::RawValues;
    use crate::domain::types::{EntityType, Severity};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn record(entity_type: EntityType, fields: Vec<(&str, FieldValue)>) -> MappedRecord {
        MappedRecord {
            entity_type,
            source_row_index: 2,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<BTreeMap<_, _>>(),
            raw_values: RawValues::new(),
        }
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn date(y: i32, m: u32, d: u32) -> FieldValue {
        FieldValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn validator() -> Validator {
        Validator::new(Arc::new(FieldRegistry::builtin()))
    }

    #[test]
    fn test_valid_account_has_no_issues() {
        let r = record(
            EntityType::Accounts,
            vec![
                ("external_id", text("A1")),
                ("name", text("Acme")),
                ("account_type", text("business")),
            ],
        );
        assert!(validator().validate(&r).is_empty());
    }

    #[test]
    fn test_missing_required_field() {
        let r = record(
            EntityType::Accounts,
            vec![("external_id", text("A1")), ("name", FieldValue::Null)],
        );
        let issues = validator().validate(&r);

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field.as_deref(), Some("name"));
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_invalid_enum_and_length() {
        let r = record(
            EntityType::Accounts,
            vec![
                ("external_id", text(&"x".repeat(65))),
                ("name", text("Acme")),
                ("account_type", text("partner")),
            ],
        );
        let issues = validator().validate(&r);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.is_blocking()));
    }

    #[test]
    fn test_cross_field_date_rule() {
        let r = record(
            EntityType::Cases,
            vec![
                ("external_id", text("C1")),
                ("account_ref", text("A1")),
                ("title", text("Claim")),
                ("status", text("closed")),
                ("opened_on", date(2024, 5, 1)),
                ("closed_on", date(2024, 4, 1)),
            ],
        );
        let issues = validator().validate(&r);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field.as_deref(), Some("closed_on"));
    }

    #[test]
    fn test_amount_rules() {
        let r = record(
            EntityType::Invoices,
            vec![
                ("external_id", text("I1")),
                ("account_ref", text("A1")),
                ("invoice_number", text("INV-1")),
                ("issued_on", date(1850, 1, 1)),
                ("total_amount", FieldValue::Decimal(2_000_000.0)),
                ("amount_paid", FieldValue::Decimal(2_500_000.0)),
            ],
        );
        let issues = validator().validate(&r);

        let errors: Vec<_> = issues.iter().filter(|i| i.is_blocking()).collect();
        let warnings: Vec<_> = issues.iter().filter(|i| !i.is_blocking()).collect();
        assert_eq!(errors.len(), 1); // amount_paid > total_amount
        assert_eq!(warnings.len(), 3); // 两个金额偏大 + 日期不合理
    }

    #[test]
    fn test_type_mismatch() {
        let r = record(
            EntityType::CaseActivities,
            vec![
                ("external_id", text("T1")),
                ("case_ref", text("C1")),
                ("activity_type", text("call")),
                ("occurred_on", text("yesterday")),
                ("duration_minutes", FieldValue::Integer(-5)),
            ],
        );
        let issues = validator().validate(&r);
        assert_eq!(issues.len(), 2);
    }
}
