// ==========================================
// 案件管理系统数据迁移 - 进度通知
// ==========================================
// 职责: 定义进度回调 trait，调用方按需实现
// 约束: 回调仅用于观察，不得影响导入结果
// ==========================================

use crate::domain::types::EntityType;
use std::sync::Arc;

pub trait ProgressSink: Send + Sync {
    /// 进度通知
    ///
    /// # 参数
    /// - entity_type: 当前实体类型
    /// - processed: 已处理行数
    /// - total: 该实体类型总行数
    /// - message: 说明文字
    fn on_progress(&self, entity_type: EntityType, processed: usize, total: usize, message: &str);
}

/// 空实现（不需要进度时使用）
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(
        &self,
        _entity_type: EntityType,
        _processed: usize,
        _total: usize,
        _message: &str,
    ) {
    }
}

/// 闭包适配器
pub struct FnProgress<F>(pub F);

impl<F> ProgressSink for FnProgress<F>
where
    F: Fn(EntityType, usize, usize, &str) + Send + Sync,
{
    fn on_progress(&self, entity_type: EntityType, processed: usize, total: usize, message: &str) {
        (self.0)(entity_type, processed, total, message)
    }
}

pub fn noop_progress() -> Arc<dyn ProgressSink> {
    Arc::new(NoopProgress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fn_progress_forwards_calls() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            FnProgress(move |e: EntityType, p: usize, t: usize, _m: &str| {
                seen.lock().unwrap().push((e, p, t));
            })
        };
        sink.on_progress(EntityType::Cases, 10, 100, "处理中");
        NoopProgress.on_progress(EntityType::Cases, 1, 1, "ignored");

        assert_eq!(*seen.lock().unwrap(), vec![(EntityType::Cases, 10, 100)]);
    }
}
