// ==========================================
// 案件管理系统数据迁移 - 内存记录存储
// ==========================================
// 职责: RecordStore 的内存实现（测试 / 嵌入式预演底座）
// ==========================================

use crate::domain::record::{FieldValue, NewRecord, RecordId, StoredRecord, UpdatedRecord};
use crate::domain::types::EntityType;
use crate::engine::storage::{RecordStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

type Key = (EntityType, String);

#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<Key, StoredRecord>>,
    next_id: AtomicU64,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<Key, StoredRecord>>> {
        self.records
            .lock()
            .map_err(|e| StoreError::Backend(format!("锁获取失败: {}", e)))
    }

    /// 记录总数
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 某实体类型的记录数
    pub fn count(&self, entity_type: EntityType) -> usize {
        self.records
            .lock()
            .map(|r| r.keys().filter(|(e, _)| *e == entity_type).count())
            .unwrap_or(0)
    }

    pub fn get(&self, entity_type: EntityType, key: &str) -> Option<StoredRecord> {
        self.records
            .lock()
            .ok()
            .and_then(|r| r.get(&(entity_type, key.to_string())).cloned())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn exists(&self, entity_type: EntityType, key: &str) -> StoreResult<bool> {
        Ok(self.lock()?.contains_key(&(entity_type, key.to_string())))
    }

    async fn insert(&self, record: NewRecord) -> StoreResult<RecordId> {
        let mut records = self.lock()?;
        let key = (record.entity_type, record.natural_key.clone());
        if records.contains_key(&key) {
            return Err(StoreError::Duplicate {
                entity_type: record.entity_type,
                key: record.natural_key,
            });
        }

        let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        records.insert(
            key,
            StoredRecord {
                id: id.clone(),
                entity_type: record.entity_type,
                natural_key: record.natural_key,
                fields: record.fields,
                batch_id: record.batch_id,
            },
        );
        Ok(id)
    }

    async fn update(
        &self,
        entity_type: EntityType,
        key: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> StoreResult<UpdatedRecord> {
        let mut records = self.lock()?;
        let stored = records
            .get_mut(&(entity_type, key.to_string()))
            .ok_or_else(|| StoreError::NotFound {
                entity_type,
                key: key.to_string(),
            })?;

        let previous_fields = std::mem::replace(&mut stored.fields, fields);
        Ok(UpdatedRecord {
            id: stored.id.clone(),
            previous_fields,
        })
    }

    async fn delete(&self, entity_type: EntityType, id: &RecordId) -> StoreResult<()> {
        let mut records = self.lock()?;
        let key = records
            .iter()
            .find(|((e, _), r)| *e == entity_type && &r.id == id)
            .map(|(k, _)| k.clone())
            .ok_or_else(|| StoreError::NotFound {
                entity_type,
                key: id.clone(),
            })?;
        records.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_update_delete() {
        let store = InMemoryRecordStore::new();
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), FieldValue::Text("Acme".to_string()));

        let id = store
            .insert(NewRecord {
                entity_type: EntityType::Accounts,
                natural_key: "A1".to_string(),
                fields: fields.clone(),
                batch_id: Some("b-1".to_string()),
            })
            .await
            .unwrap();
        assert!(store.exists(EntityType::Accounts, "A1").await.unwrap());
        assert!(!store.exists(EntityType::Contacts, "A1").await.unwrap());

        let mut changed = BTreeMap::new();
        changed.insert("name".to_string(), FieldValue::Text("Acme Ltd".to_string()));
        let updated = store
            .update(EntityType::Accounts, "A1", changed)
            .await
            .unwrap();
        assert_eq!(updated.id, id);
        assert_eq!(updated.previous_fields, fields);

        store.delete(EntityType::Accounts, &id).await.unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            store.delete(EntityType::Accounts, &id).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
