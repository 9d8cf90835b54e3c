// ==========================================
// 案件管理系统数据迁移 - 实体依赖排序
// ==========================================
// 职责: 维护实体类型依赖图，给出导入顺序与回滚顺序
// 约束:
// - 依赖必须先注册，图按构造即无环
// - 同一实体类型只能注册一次，不允许自依赖
// - 排序稳定：同序号的输入保持原相对顺序
// ==========================================

use crate::domain::types::EntityType;
use crate::importer::error::{MigrationError, MigrationResult};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// 产品内置依赖表（按导入顺序排列）
const PRODUCT_DEPENDENCIES: &[(EntityType, &[EntityType])] = &[
    (EntityType::Accounts, &[]),
    (EntityType::Contacts, &[EntityType::Accounts]),
    (EntityType::Cases, &[EntityType::Accounts, EntityType::Contacts]),
    (EntityType::CaseSubjects, &[EntityType::Cases, EntityType::Contacts]),
    (EntityType::CaseActivities, &[EntityType::Cases]),
    (EntityType::CaseFinances, &[EntityType::Cases]),
    (EntityType::Invoices, &[EntityType::Accounts, EntityType::Cases]),
];

static PRODUCT_GRAPH: OnceLock<DependencyGraph> = OnceLock::new();

#[derive(Debug, Clone)]
struct Node {
    entity_type: EntityType,
    dependencies: Vec<EntityType>,
}

// ==========================================
// DependencyGraph - 实体依赖图
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>, // 注册顺序即拓扑顺序
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 产品依赖图（进程内共享）
    pub fn product() -> &'static DependencyGraph {
        PRODUCT_GRAPH.get_or_init(|| {
            let mut graph = DependencyGraph::new();
            for (entity_type, deps) in PRODUCT_DEPENDENCIES {
                graph.push(*entity_type, deps);
            }
            graph
        })
    }

    /// 注册实体类型及其直接依赖
    ///
    /// # 错误
    /// - 重复注册 / 自依赖 / 依赖尚未注册 → InvalidDependency
    pub fn register(
        &mut self,
        entity_type: EntityType,
        dependencies: &[EntityType],
    ) -> MigrationResult<()> {
        if self.contains(entity_type) {
            return Err(MigrationError::InvalidDependency {
                entity: entity_type,
                message: "实体类型已注册".to_string(),
            });
        }
        if dependencies.contains(&entity_type) {
            return Err(MigrationError::InvalidDependency {
                entity: entity_type,
                message: "实体类型不能依赖自身".to_string(),
            });
        }
        if let Some(missing) = dependencies.iter().find(|d| !self.contains(**d)) {
            return Err(MigrationError::InvalidDependency {
                entity: entity_type,
                message: format!("依赖的实体类型尚未注册: {}", missing),
            });
        }

        self.push(entity_type, dependencies);
        Ok(())
    }

    fn push(&mut self, entity_type: EntityType, dependencies: &[EntityType]) {
        let mut deps = dependencies.to_vec();
        deps.dedup();
        self.nodes.push(Node {
            entity_type,
            dependencies: deps,
        });
    }

    pub fn contains(&self, entity_type: EntityType) -> bool {
        self.rank(entity_type).is_some()
    }

    /// 导入序号（越小越先导入）
    pub fn rank(&self, entity_type: EntityType) -> Option<usize> {
        self.nodes.iter().position(|n| n.entity_type == entity_type)
    }

    /// 直接依赖
    pub fn dependencies_of(&self, entity_type: EntityType) -> &[EntityType] {
        self.nodes
            .iter()
            .find(|n| n.entity_type == entity_type)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// 全部传递依赖
    pub fn transitive_dependencies_of(&self, entity_type: EntityType) -> BTreeSet<EntityType> {
        let mut result = BTreeSet::new();
        let mut stack: Vec<EntityType> = self.dependencies_of(entity_type).to_vec();
        while let Some(dep) = stack.pop() {
            if result.insert(dep) {
                stack.extend_from_slice(self.dependencies_of(dep));
            }
        }
        result
    }

    pub fn import_order(&self) -> Vec<EntityType> {
        self.nodes.iter().map(|n| n.entity_type).collect()
    }

    /// 回滚顺序（导入顺序的逆序）
    pub fn rollback_order(&self) -> Vec<EntityType> {
        self.nodes.iter().rev().map(|n| n.entity_type).collect()
    }

    /// 按导入顺序稳定排序（未注册的实体类型排在最后）
    pub fn sort_by_import_order<T, F>(&self, items: &mut [T], entity_of: F)
    where
        F: Fn(&T) -> EntityType,
    {
        items.sort_by_key(|item| self.rank(entity_of(item)).unwrap_or(usize::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_table_passes_checked_registration() {
        let mut graph = DependencyGraph::new();
        for (entity_type, deps) in PRODUCT_DEPENDENCIES {
            graph.register(*entity_type, deps).unwrap();
        }
        assert_eq!(graph.import_order(), DependencyGraph::product().import_order());
        assert_eq!(graph.import_order(), EntityType::ALL.to_vec());
    }

    #[test]
    fn test_register_rejects_invalid_edges() {
        let mut graph = DependencyGraph::new();
        assert!(graph.register(EntityType::Contacts, &[EntityType::Accounts]).is_err());
        graph.register(EntityType::Accounts, &[]).unwrap();
        assert!(graph.register(EntityType::Accounts, &[]).is_err());
        assert!(graph
            .register(EntityType::Contacts, &[EntityType::Contacts])
            .is_err());
    }

    #[test]
    fn test_transitive_dependencies() {
        let graph = DependencyGraph::product();
        let deps = graph.transitive_dependencies_of(EntityType::CaseSubjects);
        assert_eq!(
            deps.into_iter().collect::<Vec<_>>(),
            vec![EntityType::Accounts, EntityType::Contacts, EntityType::Cases]
        );
        assert!(graph.transitive_dependencies_of(EntityType::Accounts).is_empty());
    }

    #[test]
    fn test_sort_is_stable() {
        let graph = DependencyGraph::product();
        let mut items = vec![
            (EntityType::Invoices, 1),
            (EntityType::Accounts, 2),
            (EntityType::Invoices, 3),
            (EntityType::Contacts, 4),
        ];
        graph.sort_by_import_order(&mut items, |i| i.0);
        assert_eq!(
            items.iter().map(|i| i.1).collect::<Vec<_>>(),
            vec![2, 4, 1, 3]
        );
        assert_eq!(graph.rollback_order().first(), Some(&EntityType::Invoices));
    }
}
