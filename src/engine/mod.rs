// ==========================================
// 案件管理系统数据迁移 - 引擎层
// ==========================================
// 职责: 依赖排序 / 行处理 / 预演 / 执行 / 回滚 / 修正重导入
// 红线: Engine 不拼 SQL，存储访问全部经由 RecordStore / ImportLedger
// ==========================================

pub mod correction;
pub mod dry_run;
pub mod executor;
pub mod orderer;
pub mod overlay;
pub mod plan;
pub mod processor;
pub mod progress;
pub mod rollback;
pub mod storage;

// 重导出核心引擎
pub use correction::{CorrectionService, RowCorrection};
pub use dry_run::DryRunSimulator;
pub use executor::{ExecutionEngine, ExecutionOptions};
pub use orderer::DependencyGraph;
pub use overlay::OverlayStore;
pub use plan::{build_plan, EntityStage, ImportPlan};
pub use processor::{ProcessedRow, RecordProcessor, RowOutcome};
pub use progress::{noop_progress, FnProgress, NoopProgress, ProgressSink};
pub use rollback::{rollback, JournalEntry, RollbackReport, WriteJournal};
pub use storage::{RecordStore, StorageCallPolicy, StoreError, StoreResult, TenantStores};
