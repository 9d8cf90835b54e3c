// ==========================================
// 案件管理系统数据迁移 - 预演草稿存储
// ==========================================
// 职责: 在只读底层存储之上叠加本次预演的"虚拟写入"
// 约束:
// - 从不调用底层存储的 insert / update / delete
// - 底层 exists 结果按 (实体, 主键) 缓存，同一主键只查询一次
// ==========================================

use crate::domain::record::{FieldValue, NewRecord, RecordId, UpdatedRecord};
use crate::domain::types::EntityType;
use crate::engine::storage::{RecordStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Key = (EntityType, String);

pub struct OverlayStore {
    base: Arc<dyn RecordStore>,
    created: Mutex<HashMap<RecordId, Key>>,
    created_keys: Mutex<HashSet<Key>>,
    exists_cache: Mutex<HashMap<Key, bool>>,
    next_id: AtomicU64,
}

impl OverlayStore {
    pub fn new(base: Arc<dyn RecordStore>) -> Self {
        Self {
            base,
            created: Mutex::new(HashMap::new()),
            created_keys: Mutex::new(HashSet::new()),
            exists_cache: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 草稿层新建记录数
    pub fn created_count(&self) -> usize {
        self.created_keys.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn lock_err<E: std::fmt::Display>(e: E) -> StoreError {
        StoreError::Backend(format!("草稿层锁获取失败: {}", e))
    }

    fn synthetic_id(&self) -> RecordId {
        format!("dry-run-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn created_contains(&self, key: &Key) -> StoreResult<bool> {
        Ok(self.created_keys.lock().map_err(Self::lock_err)?.contains(key))
    }

    async fn base_exists(&self, entity_type: EntityType, key: &str) -> StoreResult<bool> {
        let cache_key = (entity_type, key.to_string());
        if let Some(hit) = self
            .exists_cache
            .lock()
            .map_err(Self::lock_err)?
            .get(&cache_key)
            .copied()
        {
            return Ok(hit);
        }

        let found = self.base.exists(entity_type, key).await?;
        self.exists_cache
            .lock()
            .map_err(Self::lock_err)?
            .insert(cache_key, found);
        Ok(found)
    }
}

#[async_trait]
impl RecordStore for OverlayStore {
    async fn exists(&self, entity_type: EntityType, key: &str) -> StoreResult<bool> {
        if self.created_contains(&(entity_type, key.to_string()))? {
            return Ok(true);
        }
        self.base_exists(entity_type, key).await
    }

    async fn insert(&self, record: NewRecord) -> StoreResult<RecordId> {
        if self.exists(record.entity_type, &record.natural_key).await? {
            return Err(StoreError::Duplicate {
                entity_type: record.entity_type,
                key: record.natural_key,
            });
        }

        let id = self.synthetic_id();
        let key = (record.entity_type, record.natural_key);
        self.created_keys
            .lock()
            .map_err(Self::lock_err)?
            .insert(key.clone());
        self.created
            .lock()
            .map_err(Self::lock_err)?
            .insert(id.clone(), key);
        Ok(id)
    }

    async fn update(
        &self,
        entity_type: EntityType,
        key: &str,
        _fields: BTreeMap<String, FieldValue>,
    ) -> StoreResult<UpdatedRecord> {
        if !self.exists(entity_type, key).await? {
            return Err(StoreError::NotFound {
                entity_type,
                key: key.to_string(),
            });
        }
        Ok(UpdatedRecord {
            id: self.synthetic_id(),
            previous_fields: BTreeMap::new(),
        })
    }

    async fn delete(&self, _entity_type: EntityType, id: &RecordId) -> StoreResult<()> {
        let removed = self.created.lock().map_err(Self::lock_err)?.remove(id);
        if let Some(key) = removed {
            self.created_keys.lock().map_err(Self::lock_err)?.remove(&key);
        }
        Ok(())
    }
}
