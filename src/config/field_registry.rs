// ==========================================
// 案件管理系统数据迁移 - 标准字段注册表
// ==========================================
// 职责: 每个实体类型的标准字段、类型、必填、跨字段规则
// 用途:
// - ColumnMapper 按字段类型做值转换
// - Validator 按字段规格做模式校验
// - RecordProcessor 按 Reference 字段解析跨实体引用
// 约束: 映射器/校验器不含任何实体特定逻辑，领域知识只在此处
// ==========================================

use crate::domain::types::EntityType;
use crate::importer::error::{MigrationError, MigrationResult};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// 所有实体共用的业务主键字段
pub const NATURAL_KEY_FIELD: &str = "external_id";

// ==========================================
// FieldType - 字段类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldType {
    Text { max_len: Option<usize> },
    Integer { min: Option<i64>, max: Option<i64> },
    /// warn_above: 超过即给出可疑值警告（常见于单位/小数点错位）
    Decimal { min: Option<f64>, warn_above: Option<f64> },
    Boolean,
    Date,
    Enum(&'static [&'static str]),
    /// 引用其他实体的业务主键
    Reference(EntityType),
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text { .. } => "text",
            FieldType::Integer { .. } => "integer",
            FieldType::Decimal { .. } => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Enum(_) => "enum",
            FieldType::Reference(_) => "reference",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

// ==========================================
// CrossFieldRule - 跨字段规则
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossFieldRule {
    /// 日期 field 不得早于 reference
    NotBefore {
        field: &'static str,
        reference: &'static str,
    },
    /// 数值 field 不得大于 reference
    NotGreaterThan {
        field: &'static str,
        reference: &'static str,
    },
}

// ==========================================
// EntitySchema - 实体模式
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    pub entity_type: EntityType,
    pub natural_key: &'static str,
    pub fields: Vec<FieldSpec>,
    pub rules: Vec<CrossFieldRule>,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 引用字段: (字段名, 目标实体)
    pub fn references(&self) -> impl Iterator<Item = (&'static str, EntityType)> + '_ {
        self.fields.iter().filter_map(|f| match f.field_type {
            FieldType::Reference(target) => Some((f.name, target)),
            _ => None,
        })
    }
}

// ===== 字段构造辅助 =====

const fn text(name: &'static str, max_len: usize, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        field_type: FieldType::Text {
            max_len: Some(max_len),
        },
        required,
    }
}

const fn date(name: &'static str, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        field_type: FieldType::Date,
        required,
    }
}

const fn reference(name: &'static str, target: EntityType, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        field_type: FieldType::Reference(target),
        required,
    }
}

const fn enumeration(
    name: &'static str,
    values: &'static [&'static str],
    required: bool,
) -> FieldSpec {
    FieldSpec {
        name,
        field_type: FieldType::Enum(values),
        required,
    }
}

const fn money(name: &'static str, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        field_type: FieldType::Decimal {
            min: Some(0.0),
            warn_above: Some(1_000_000.0),
        },
        required,
    }
}

const fn natural_key() -> FieldSpec {
    text(NATURAL_KEY_FIELD, 64, true)
}

// ==========================================
// FieldRegistry - 注册表
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRegistry {
    schemas: BTreeMap<EntityType, EntitySchema>,
}

impl FieldRegistry {
    pub fn empty() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// 注册/替换实体模式
    pub fn with_schema(mut self, schema: EntitySchema) -> Self {
        self.schemas.insert(schema.entity_type, schema);
        self
    }

    pub fn schema(&self, entity_type: EntityType) -> Option<&EntitySchema> {
        self.schemas.get(&entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = EntityType> + '_ {
        self.schemas.keys().copied()
    }

    /// 产品内置模式
    pub fn builtin() -> Self {
        use EntityType::*;

        Self::empty()
            .with_schema(EntitySchema {
                entity_type: Accounts,
                natural_key: NATURAL_KEY_FIELD,
                fields: vec![
                    natural_key(),
                    text("name", 200, true),
                    enumeration("account_type", &["business", "individual", "government"], false),
                    text("email", 254, false),
                    date("created_on", false),
                    FieldSpec {
                        name: "is_active",
                        field_type: FieldType::Boolean,
                        required: false,
                    },
                ],
                rules: vec![],
            })
            .with_schema(EntitySchema {
                entity_type: Contacts,
                natural_key: NATURAL_KEY_FIELD,
                fields: vec![
                    natural_key(),
                    reference("account_ref", Accounts, true),
                    text("first_name", 100, false),
                    text("last_name", 100, true),
                    text("email", 254, false),
                    text("phone", 40, false),
                    date("date_of_birth", false),
                ],
                rules: vec![],
            })
            .with_schema(EntitySchema {
                entity_type: Cases,
                natural_key: NATURAL_KEY_FIELD,
                fields: vec![
                    natural_key(),
                    reference("account_ref", Accounts, true),
                    reference("primary_contact_ref", Contacts, false),
                    text("title", 255, true),
                    enumeration("status", &["open", "pending", "closed"], true),
                    date("opened_on", true),
                    date("closed_on", false),
                    enumeration("priority", &["low", "normal", "high", "urgent"], false),
                ],
                rules: vec![CrossFieldRule::NotBefore {
                    field: "closed_on",
                    reference: "opened_on",
                }],
            })
            .with_schema(EntitySchema {
                entity_type: CaseSubjects,
                natural_key: NATURAL_KEY_FIELD,
                fields: vec![
                    natural_key(),
                    reference("case_ref", Cases, true),
                    reference("contact_ref", Contacts, false),
                    enumeration("role", &["subject", "witness", "claimant", "respondent"], false),
                    text("full_name", 200, true),
                ],
                rules: vec![],
            })
            .with_schema(EntitySchema {
                entity_type: CaseActivities,
                natural_key: NATURAL_KEY_FIELD,
                fields: vec![
                    natural_key(),
                    reference("case_ref", Cases, true),
                    enumeration(
                        "activity_type",
                        &["note", "call", "email", "meeting", "task"],
                        true,
                    ),
                    date("occurred_on", true),
                    FieldSpec {
                        name: "duration_minutes",
                        field_type: FieldType::Integer {
                            min: Some(0),
                            max: Some(24 * 60),
                        },
                        required: false,
                    },
                    text("description", 4000, false),
                ],
                rules: vec![],
            })
            .with_schema(EntitySchema {
                entity_type: CaseFinances,
                natural_key: NATURAL_KEY_FIELD,
                fields: vec![
                    natural_key(),
                    reference("case_ref", Cases, true),
                    enumeration("entry_type", &["expense", "time", "fee", "payment"], false),
                    money("amount", true),
                    date("incurred_on", true),
                    FieldSpec {
                        name: "billable",
                        field_type: FieldType::Boolean,
                        required: false,
                    },
                ],
                rules: vec![],
            })
            .with_schema(EntitySchema {
                entity_type: Invoices,
                natural_key: NATURAL_KEY_FIELD,
                fields: vec![
                    natural_key(),
                    reference("account_ref", Accounts, true),
                    reference("case_ref", Cases, false),
                    text("invoice_number", 64, true),
                    date("issued_on", true),
                    date("due_on", false),
                    money("total_amount", true),
                    money("amount_paid", false),
                    enumeration("status", &["draft", "sent", "paid", "void"], false),
                ],
                rules: vec![
                    CrossFieldRule::NotBefore {
                        field: "due_on",
                        reference: "issued_on",
                    },
                    CrossFieldRule::NotGreaterThan {
                        field: "amount_paid",
                        reference: "total_amount",
                    },
                ],
            })
    }
}

// ==========================================
// 进程级注册表
// ==========================================
static REGISTRY: OnceLock<Arc<FieldRegistry>> = OnceLock::new();

/// 显式初始化进程级注册表（仅允许一次）
pub fn init_registry(registry: FieldRegistry) -> MigrationResult<()> {
    REGISTRY
        .set(Arc::new(registry))
        .map_err(|_| MigrationError::RegistryAlreadyInitialized)
}

/// 获取进程级注册表（未初始化时使用内置模式）
pub fn global_registry() -> Arc<FieldRegistry> {
    REGISTRY
        .get_or_init(|| Arc::new(FieldRegistry::builtin()))
        .clone()
}
