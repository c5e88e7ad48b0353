// ==========================================
// 供应商订单文件系统 - 应用状态
// ==========================================
// 职责: 打开数据库、装配仓储 / 对象存储 / 引擎 / API
// 说明: 规则文档在启动时加载一次; 供应商列表在每次构建快照时重新读取
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::OrderFileApi;
use crate::collector::CollectorOrchestrator;
use crate::config::{ConfigManager, PipelineSettings, PipelineSnapshot, RuleBook, SnapshotError};
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::{FileLifecycleService, MergeEngine, StaleLeaseSweeper};
use crate::repository::{
    FileRecordRepository, MergeRecordRepository, ProcessingEventRepository, SupplierRepository,
};
use crate::storage::{FsObjectStore, ObjectStore};

/// 应用状态
///
/// 一个进程一份; 所有仓储共享同一连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 启动时读取的运行参数
    pub settings: PipelineSettings,

    /// 启动时加载的转换规则
    pub rules: Arc<RuleBook>,

    pub config_manager: Arc<ConfigManager>,
    pub supplier_repo: Arc<SupplierRepository>,
    pub file_repo: Arc<FileRecordRepository>,
    pub event_repo: Arc<ProcessingEventRepository>,
    pub merge_repo: Arc<MergeRecordRepository>,
    pub store: Arc<dyn ObjectStore>,

    pub lifecycle: Arc<FileLifecycleService>,
    pub merge_engine: Arc<MergeEngine>,

    /// 订单文件API
    pub order_file_api: Arc<OrderFileApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// 该方法会：
    /// 1. 打开数据库并确保表结构
    /// 2. 读取运行参数与规则文档
    /// 3. 装配仓储、对象存储、引擎与API
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库表结构初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone()).map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let settings = config_manager
            .load_settings()
            .map_err(|e| format!("运行参数读取失败: {}", e))?;

        // ==========================================
        // Repository层
        // ==========================================
        let supplier_repo = Arc::new(SupplierRepository::new(conn.clone()));
        let file_repo = Arc::new(FileRecordRepository::new(conn.clone()));
        let event_repo = Arc::new(ProcessingEventRepository::new(conn.clone()));
        let merge_repo = Arc::new(MergeRecordRepository::new(conn));

        let rules: Arc<RuleBook> = PipelineSnapshot::load(&config_manager, &supplier_repo)
            .map(|snapshot| snapshot.rules)
            .map_err(|e| format!("规则文档加载失败: {}", e))?;

        // ==========================================
        // 对象存储
        // ==========================================
        let store: Arc<dyn ObjectStore> = Arc::new(
            FsObjectStore::new(&settings.storage_root).map_err(|e| format!("对象存储初始化失败: {}", e))?,
        );

        // ==========================================
        // Engine层
        // ==========================================
        let lifecycle = Arc::new(FileLifecycleService::new(
            file_repo.clone(),
            event_repo.clone(),
            supplier_repo.clone(),
            store.clone(),
            settings.lease_timeout(),
        ));
        let merge_engine = Arc::new(MergeEngine::new(
            file_repo.clone(),
            merge_repo.clone(),
            store.clone(),
            settings.merge_tag_source_file,
        ));

        // ==========================================
        // API层
        // ==========================================
        let order_file_api = Arc::new(OrderFileApi::new(
            file_repo.clone(),
            supplier_repo.clone(),
            lifecycle.clone(),
            merge_engine.clone(),
            rules.clone(),
            settings.dedupe_by_content_hash,
        ));

        tracing::info!(
            rules = rules.len(),
            storage_root = %settings.storage_root.display(),
            "AppState初始化完成"
        );

        Ok(Self {
            db_path,
            settings,
            rules,
            config_manager,
            supplier_repo,
            file_repo,
            event_repo,
            merge_repo,
            store,
            lifecycle,
            merge_engine,
            order_file_api,
        })
    }

    /// 构建一次运行快照（重新读取启用的供应商）
    pub fn snapshot(&self) -> Result<PipelineSnapshot, SnapshotError> {
        let suppliers = self.supplier_repo.list(true)?;
        Ok(PipelineSnapshot {
            settings: self.settings.clone(),
            suppliers,
            rules: self.rules.clone(),
        })
    }

    /// 按运行参数装配采集编排器
    pub fn collector(&self) -> CollectorOrchestrator {
        CollectorOrchestrator::with_default_fetchers(self.lifecycle.clone(), &self.settings)
    }

    pub fn stale_sweeper(&self) -> StaleLeaseSweeper {
        StaleLeaseSweeper::new(self.lifecycle.clone(), self.settings.sweep_interval())
    }
}

/// 获取默认数据库路径
///
/// 优先使用环境变量 SUPPLIER_ORDER_FLOW_DB_PATH, 其次用户数据目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("SUPPLIER_ORDER_FLOW_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./supplier_order_flow.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("supplier-order-flow");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("supplier_order_flow.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_app_state_initializes_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("app.db").to_string_lossy().to_string();

        // 对象存储目录指向临时目录
        {
            let conn = open_sqlite_connection(&db_path).unwrap();
            ensure_schema(&conn).unwrap();
            let cfg = ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap();
            cfg.set_global_config_value(
                crate::config::config_keys::STORAGE_ROOT,
                &dir.path().join("store").to_string_lossy(),
            )
            .unwrap();
        }

        let state = AppState::new(db_path).unwrap();
        assert!(state.rules.is_empty());
        assert!(state.snapshot().unwrap().suppliers.is_empty());
        assert!(dir.path().join("store").is_dir());
    }
}
