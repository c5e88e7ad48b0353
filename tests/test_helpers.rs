// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库 + 临时对象存储 + 组件装配 + 测试数据
// ==========================================
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use supplier_order_flow::config::RuleBook;
use supplier_order_flow::db::{ensure_schema, open_sqlite_connection};
use supplier_order_flow::domain::{FileRecord, SourceConfig, Supplier, SupplierDraft};
use supplier_order_flow::engine::{FileLifecycleService, MergeEngine, RegisterOutcome, RegisterRequest};
use supplier_order_flow::repository::{
    FileRecordRepository, MergeRecordRepository, ProcessingEventRepository, SupplierRepository,
};
use supplier_order_flow::storage::{FsObjectStore, ObjectStore};
use supplier_order_flow::SourceKind;
use tempfile::{NamedTempFile, TempDir};

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().ok_or("临时路径非 UTF-8")?.to_string();

    let conn = open_sqlite_connection(&db_path)?;
    ensure_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 完整测试环境（临时库 + 临时对象存储 + 全部组件）
pub struct TestEnv {
    pub _db_file: NamedTempFile,
    pub storage_dir: TempDir,
    pub db_path: String,
    pub conn: Arc<Mutex<Connection>>,
    pub suppliers: Arc<SupplierRepository>,
    pub files: Arc<FileRecordRepository>,
    pub events: Arc<ProcessingEventRepository>,
    pub merges: Arc<MergeRecordRepository>,
    pub store: Arc<dyn ObjectStore>,
    pub lifecycle: Arc<FileLifecycleService>,
    pub merge_engine: MergeEngine,
}

pub fn setup_env() -> TestEnv {
    let (db_file, db_path) = create_test_db().unwrap();
    let storage_dir = tempfile::tempdir().unwrap();

    let conn = Arc::new(Mutex::new(open_sqlite_connection(&db_path).unwrap()));
    let suppliers = Arc::new(SupplierRepository::new(conn.clone()));
    let files = Arc::new(FileRecordRepository::new(conn.clone()));
    let events = Arc::new(ProcessingEventRepository::new(conn.clone()));
    let merges = Arc::new(MergeRecordRepository::new(conn.clone()));
    let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(storage_dir.path()).unwrap());

    let lifecycle = Arc::new(FileLifecycleService::new(
        files.clone(),
        events.clone(),
        suppliers.clone(),
        store.clone(),
        chrono::Duration::minutes(30),
    ));
    let merge_engine = MergeEngine::new(files.clone(), merges.clone(), store.clone(), true);

    TestEnv {
        _db_file: db_file,
        storage_dir,
        db_path,
        conn,
        suppliers,
        files,
        events,
        merges,
        store,
        lifecycle,
        merge_engine,
    }
}

pub fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
}

pub fn supplier_draft(code: &str, patterns: &[&str], source: SourceConfig) -> SupplierDraft {
    SupplierDraft {
        supplier_code: code.to_string(),
        name: format!("Fournisseur {}", code),
        active: true,
        file_patterns: patterns.iter().map(|p| p.to_string()).collect(),
        source,
        rule_id: None,
        min_order_amount: None,
        notes: None,
    }
}

pub fn create_supplier(env: &TestEnv, code: &str, patterns: &[&str], source: SourceConfig) -> Supplier {
    let id = env.suppliers.create(&supplier_draft(code, patterns, source)).unwrap();
    env.suppliers.find_by_id(&id).unwrap().unwrap()
}

pub fn manual_supplier(env: &TestEnv, code: &str) -> Supplier {
    create_supplier(env, code, &["*.csv"], SourceConfig::Manual)
}

/// 登记一个 pending 文件
pub fn register(env: &TestEnv, supplier: &Supplier, filename: &str, payload: &[u8], day: u32) -> FileRecord {
    let req = RegisterRequest {
        supplier,
        filename,
        payload,
        received_date: date(day),
        actor: "tester",
        source: SourceKind::Manual,
        dedupe_by_content_hash: false,
    };
    match env.lifecycle.register_file(&req).unwrap() {
        RegisterOutcome::Created(record) => record,
        other => panic!("expected new record, got {:?}", other),
    }
}

/// 参考规则: Ref → product_ref (大写), Qté → quantity (整数), 追加 date_commande
pub fn sample_rule_book(code: &str) -> RuleBook {
    let raw = format!(
        r#"{{
            "{code}": {{
                "rename": {{"Ref": "product_ref", "Qté": "quantity"}},
                "add": {{"date_commande": "today"}},
                "remove": ["Commentaire"],
                "format": {{"product_ref": "uppercase", "quantity": "integer"}},
                "required_columns": ["Ref"]
            }}
        }}"#
    );
    RuleBook::from_json_str(&raw).unwrap()
}

/// 加锁 + 转换, 返回转换后的文件记录
pub fn lock_and_transform(env: &TestEnv, file_id: &str, operator: &str, rules: &RuleBook) -> FileRecord {
    env.lifecycle.acquire_lock(file_id, operator).unwrap();
    env.lifecycle.run_transform(file_id, operator, rules).unwrap();
    env.files.find_by_id(file_id).unwrap().unwrap()
}
