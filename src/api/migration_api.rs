// ==========================================
// 案件管理系统数据迁移 - 迁移API
// ==========================================
// 职责: 封装 解析 → 预演 → 执行 → 台账查询 → 修正重导入
// 约束:
// - 组织隔离: 批次只对所属组织可见，记录存储按组织取视图
// - 每次预演/执行按组织重新读取导入参数
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::config_manager::ConfigManager;
use crate::config::field_registry::{global_registry, FieldRegistry};
use crate::config::import_config_trait::ImportConfigReader;
use crate::config::import_settings::ImportSettings;
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::batch::{BatchRequest, ImportBatch, ImportError};
use crate::domain::mapping::MappingConfig;
use crate::domain::record::ParsedFile;
use crate::domain::report::{DryRunResult, ImportExecutionResult};
use crate::domain::types::EntityType;
use crate::engine::correction::{CorrectionService, RowCorrection};
use crate::engine::dry_run::DryRunSimulator;
use crate::engine::executor::{ExecutionEngine, ExecutionOptions};
use crate::engine::storage::TenantStores;
use crate::importer::file_parser::{ParseOutcome, UniversalFileParser};
use crate::repository::import_ledger::ImportLedger;
use crate::repository::import_ledger_impl::SqliteImportLedger;
use crate::repository::record_store_impl::SqliteTenantStores;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// 迁移API
pub struct MigrationApi {
    registry: Arc<FieldRegistry>,
    stores: Arc<dyn TenantStores>,
    ledger: Arc<dyn ImportLedger>,
    config: Arc<dyn ImportConfigReader>,
    parser: UniversalFileParser,
}

impl MigrationApi {
    pub fn new(
        registry: Arc<FieldRegistry>,
        stores: Arc<dyn TenantStores>,
        ledger: Arc<dyn ImportLedger>,
        config: Arc<dyn ImportConfigReader>,
    ) -> Self {
        Self {
            registry,
            stores,
            ledger,
            config,
            parser: UniversalFileParser,
        }
    }

    /// 打开 SQLite 数据库（台账、记录存储、配置共用一个连接）
    pub fn open(db_path: &str) -> ApiResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        init_schema(&conn).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        let conn = Arc::new(Mutex::new(conn));

        Ok(Self::new(
            global_registry(),
            Arc::new(SqliteTenantStores::from_connection(conn.clone())),
            Arc::new(SqliteImportLedger::from_connection(conn.clone())),
            Arc::new(ConfigManager::from_connection(conn)?),
        ))
    }

    // ==========================================
    // 解析
    // ==========================================

    /// 解析上传内容（文件名决定格式）
    ///
    /// # 返回
    /// - Ok(ParsedFile): 解析成功（行级错误在 row_errors 中）
    /// - Err(ApiError::FileParseFailed): 文件级错误
    pub fn parse_upload(
        &self,
        entity_type: EntityType,
        file_name: &str,
        bytes: &[u8],
    ) -> ApiResult<ParsedFile> {
        Self::accept(
            entity_type,
            self.parser.parse_upload(entity_type, file_name, bytes)?,
        )
    }

    pub fn parse_path<P: AsRef<Path>>(
        &self,
        entity_type: EntityType,
        path: P,
    ) -> ApiResult<ParsedFile> {
        Self::accept(entity_type, self.parser.parse_path(entity_type, path)?)
    }

    fn accept(entity_type: EntityType, outcome: ParseOutcome) -> ApiResult<ParsedFile> {
        outcome.map_err(|errors| {
            warn!(entity_type = %entity_type, errors = errors.len(), "文件级解析失败");
            ApiError::FileParseFailed { entity_type, errors }
        })
    }

    // ==========================================
    // 预演 / 执行
    // ==========================================

    /// 预演（不写入存储、不创建批次）
    pub async fn preview(
        &self,
        files: &[ParsedFile],
        mapping: &MappingConfig,
    ) -> ApiResult<DryRunResult> {
        let settings = self.settings(&mapping.organization_id).await?;
        let store = self.stores.store_for(&mapping.organization_id);
        let simulator = DryRunSimulator::new(self.registry.clone(), store, settings);
        Ok(simulator.simulate(files, mapping).await?)
    }

    /// 执行导入
    pub async fn execute(
        &self,
        request: &BatchRequest,
        files: &[ParsedFile],
        mapping: &MappingConfig,
        options: ExecutionOptions,
    ) -> ApiResult<ImportExecutionResult> {
        if mapping.organization_id != request.organization_id {
            return Err(ApiError::InvalidInput(format!(
                "映射配置所属组织({})与请求组织({})不一致",
                mapping.organization_id, request.organization_id
            )));
        }

        let engine = self.engine(&request.organization_id).await?;
        let result = engine.execute(request, files, mapping, options).await?;
        info!(batch_id = %result.batch.id, status = %result.batch.status, "导入执行完成");
        Ok(result)
    }

    // ==========================================
    // 台账查询
    // ==========================================

    pub async fn list_batches(&self, organization_id: &str) -> ApiResult<Vec<ImportBatch>> {
        Ok(self.ledger.list_batches(organization_id).await?)
    }

    /// 查询批次（其他组织的批次视为不存在）
    pub async fn get_batch(&self, organization_id: &str, batch_id: &str) -> ApiResult<ImportBatch> {
        match self.ledger.get_batch(batch_id).await? {
            Some(batch) if batch.organization_id == organization_id => Ok(batch),
            _ => Err(ApiError::NotFound(format!("批次(id={})不存在", batch_id))),
        }
    }

    pub async fn get_errors(
        &self,
        organization_id: &str,
        batch_id: &str,
    ) -> ApiResult<Vec<ImportError>> {
        self.get_batch(organization_id, batch_id).await?;
        Ok(self.ledger.get_errors(batch_id).await?)
    }

    // ==========================================
    // 修正重导入
    // ==========================================

    /// 失败行（供用户修正）
    pub async fn failed_rows(
        &self,
        organization_id: &str,
        batch_id: &str,
    ) -> ApiResult<Vec<RowCorrection>> {
        self.get_batch(organization_id, batch_id).await?;
        let service = self.correction_service(organization_id).await?;
        Ok(service.failed_rows(batch_id).await?)
    }

    pub async fn reimport_corrections(
        &self,
        organization_id: &str,
        batch_id: &str,
        corrections: Vec<RowCorrection>,
        options: ExecutionOptions,
    ) -> ApiResult<ImportExecutionResult> {
        self.get_batch(organization_id, batch_id).await?;
        let service = self.correction_service(organization_id).await?;
        Ok(service.reimport(batch_id, corrections, options).await?)
    }

    // ==========================================
    // 内部装配
    // ==========================================

    async fn settings(&self, organization_id: &str) -> ApiResult<ImportSettings> {
        Ok(ImportSettings::load(self.config.as_ref(), organization_id).await?)
    }

    async fn engine(&self, organization_id: &str) -> ApiResult<ExecutionEngine> {
        let settings = self.settings(organization_id).await?;
        Ok(ExecutionEngine::new(
            self.registry.clone(),
            self.stores.store_for(organization_id),
            self.ledger.clone(),
            settings,
        ))
    }

    async fn correction_service(&self, organization_id: &str) -> ApiResult<CorrectionService> {
        let engine = self.engine(organization_id).await?;
        Ok(CorrectionService::new(self.ledger.clone(), Arc::new(engine)))
    }
}
