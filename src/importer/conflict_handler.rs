// ==========================================
// 案件管理系统数据迁移 - 冲突处理器实现
// ==========================================
// 职责: 检测同一上传文件内重复的业务主键
// 策略: 首次出现的行保留，后续重复行以 DuplicateKey 拒绝
// 说明: 与已存在存储记录的冲突由 RecordProcessor 逐行判定
// ==========================================

use crate::domain::record::MappedRecord;
use std::collections::HashMap;

pub struct ConflictHandler;

impl ConflictHandler {
    /// 检测同批次内重复业务主键
    ///
    /// # 返回
    /// - Vec<(行号, 业务主键, 首次出现行号)>: 重复记录列表（不包括第一次出现）
    pub fn detect_duplicates<'a, I>(
        &self,
        records: I,
        key_field: &str,
    ) -> Vec<(usize, String, usize)>
    where
        I: IntoIterator<Item = &'a MappedRecord>,
    {
        let mut first_occurrence: HashMap<String, usize> = HashMap::new();
        let mut duplicates = Vec::new();

        for record in records {
            if let Some(key) = record.text(key_field) {
                match first_occurrence.get(key) {
                    Some(&first_row) => {
                        duplicates.push((record.source_row_index, key.to_string(), first_row))
                    }
                    None => {
                        first_occurrence.insert(key.to_string(), record.source_row_index);
                    }
                }
            }
        }

        duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{FieldValue, RawValues};
    use crate::domain::types::EntityType;
    use std::collections::BTreeMap;

    fn create_test_record(external_id: Option<&str>, row: usize) -> MappedRecord {
        let mut fields = BTreeMap::new();
        fields.insert(
            "external_id".to_string(),
            external_id
                .map(|s| FieldValue::Text(s.to_string()))
                .unwrap_or(FieldValue::Null),
        );
        MappedRecord {
            entity_type: EntityType::Accounts,
            source_row_index: row,
            fields,
            raw_values: RawValues::new(),
        }
    }

    #[test]
    fn test_detect_duplicates_none() {
        let records = vec![
            create_test_record(Some("A1"), 2),
            create_test_record(Some("A2"), 3),
        ];

        assert!(ConflictHandler.detect_duplicates(&records, "external_id").is_empty());
    }

    #[test]
    fn test_detect_duplicates_multiple() {
        let records = vec![
            create_test_record(Some("A1"), 2),
            create_test_record(Some("A1"), 3), // 重复
            create_test_record(None, 4),       // 主键缺失不参与
            create_test_record(Some(" A1 "), 5), // 去空白后重复
        ];

        let duplicates = ConflictHandler.detect_duplicates(&records, "external_id");

        assert_eq!(duplicates.len(), 2);
        assert_eq!(duplicates[0], (3, "A1".to_string(), 2));
        assert_eq!(duplicates[1].0, 5);
    }
}
