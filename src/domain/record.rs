// ==========================================
// 案件管理系统数据迁移 - 行记录模型
// ==========================================
// 职责: ParsedFile / RawRow / ParseError / MappedRecord / 存储记录
// 生命周期:
// - ParsedFile 上传时生成，解析后不可变
// - MappedRecord 每次运行派生，不单独持久化
// ==========================================

use crate::domain::types::EntityType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 存储侧记录 ID
pub type RecordId = String;

/// 原始行值（列名 → 原始单元格），用于错误追溯与修正
pub type RawValues = BTreeMap<String, String>;

// ==========================================
// RawRow - 原始行
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub source_row_index: usize, // 源文件行号（从 1 开始，含表头行）
    pub cells: Vec<String>,      // 有序单元格
}

// ==========================================
// ParseError - 解析错误
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    EmptyFile,           // 文件为空 / 无表头
    Encoding,            // 编码错误（非 UTF-8）
    DuplicateHeader,     // 表头重复
    ColumnCountMismatch, // 行列数与表头不一致
    MalformedRow,        // 其他行级格式错误
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseError {
    pub entity_type: EntityType,
    pub source_row_index: Option<usize>, // None 表示文件级错误
    pub kind: ParseErrorKind,
    pub message: String,
    pub raw_values: RawValues,
}

impl ParseError {
    pub fn file_level(entity_type: EntityType, kind: ParseErrorKind, message: String) -> Self {
        Self {
            entity_type,
            source_row_index: None,
            kind,
            message,
            raw_values: RawValues::new(),
        }
    }

    pub fn is_row_scoped(&self) -> bool {
        self.source_row_index.is_some()
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source_row_index {
            Some(row) => write!(f, "[{} 行 {}] {}", self.entity_type, row, self.message),
            None => write!(f, "[{}] {}", self.entity_type, self.message),
        }
    }
}

// ==========================================
// ParsedFile - 解析后的上传文件
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    pub entity_type: EntityType,
    pub header_row: Vec<String>,
    pub rows: Vec<RawRow>,          // 格式正确的数据行
    pub row_count: usize,           // 非空数据行总数（含格式错误行）
    pub row_errors: Vec<ParseError>, // 行级解析错误（对应行已排除）
}

impl ParsedFile {
    /// 列名 → 列下标
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.header_row.iter().position(|h| h == column)
    }

    /// 将一行转换为 列名 → 原始值
    pub fn raw_values(&self, row: &RawRow) -> RawValues {
        self.header_row
            .iter()
            .zip(row.cells.iter())
            .map(|(h, v)| (h.clone(), v.clone()))
            .collect()
    }

    /// 由 列名 → 值 的行集合重建 ParsedFile（修正重导入使用，保留原行号）
    ///
    /// 表头取所有行列名的并集（有序），缺失单元格以空串补齐
    pub fn from_raw_values(entity_type: EntityType, rows: Vec<(usize, RawValues)>) -> Self {
        let mut header_row: Vec<String> = rows
            .iter()
            .flat_map(|(_, values)| values.keys().cloned())
            .collect();
        header_row.sort();
        header_row.dedup();

        let mut raw_rows: Vec<RawRow> = rows
            .into_iter()
            .map(|(source_row_index, values)| RawRow {
                source_row_index,
                cells: header_row
                    .iter()
                    .map(|h| values.get(h).cloned().unwrap_or_default())
                    .collect(),
            })
            .collect();
        raw_rows.sort_by_key(|r| r.source_row_index);

        Self {
            entity_type,
            header_row,
            row_count: raw_rows.len(),
            rows: raw_rows,
            row_errors: Vec::new(),
        }
    }
}

// ==========================================
// FieldValue - 类型化字段值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl FieldValue {
    /// 空值判定: Null 或空白文本
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// 数值视图（整数/小数）
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Decimal(_) => "decimal",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Date(_) => "date",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Decimal(d) => write!(f, "{}", d),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

// ==========================================
// MappedRecord - 映射后的行记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedRecord {
    pub entity_type: EntityType,
    pub source_row_index: usize,
    pub fields: BTreeMap<String, FieldValue>, // 标准字段 → 类型化值
    pub raw_values: RawValues,                // 原始行（错误追溯）
}

impl MappedRecord {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// 读取文本字段（去除首尾空白，空值返回 None）
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(|v| v.as_text())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ==========================================
// 存储记录
// ==========================================

/// 待写入记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub entity_type: EntityType,
    pub natural_key: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub batch_id: Option<String>,
}

/// 已写入存储的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub entity_type: EntityType,
    pub natural_key: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub batch_id: Option<String>,
}

/// 覆盖写入结果（保留原值以便回滚恢复）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedRecord {
    pub id: RecordId,
    pub previous_fields: BTreeMap<String, FieldValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_values_union_header() {
        let mut first = RawValues::new();
        first.insert("name".to_string(), "Acme".to_string());
        first.insert("id".to_string(), "A1".to_string());
        let mut second = RawValues::new();
        second.insert("id".to_string(), "A2".to_string());
        second.insert("email".to_string(), "x@y.z".to_string());

        let file = ParsedFile::from_raw_values(EntityType::Accounts, vec![(5, second), (3, first)]);

        assert_eq!(file.header_row, vec!["email", "id", "name"]);
        assert_eq!(file.rows.len(), 2);
        assert_eq!(file.rows[0].source_row_index, 3);
        assert_eq!(file.rows[0].cells, vec!["", "A1", "Acme"]);
        assert_eq!(file.row_count, 2);
    }

    #[test]
    fn test_field_value_blank() {
        assert!(FieldValue::Null.is_blank());
        assert!(FieldValue::Text("   ".to_string()).is_blank());
        assert!(!FieldValue::Integer(0).is_blank());
    }

    #[test]
    fn test_field_value_serde_tagged() {
        let json = serde_json::to_string(&FieldValue::Integer(7)).unwrap();
        assert_eq!(json, r#"{"type":"integer","value":7}"#);
        let back: FieldValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FieldValue::Integer(7));
    }
}
