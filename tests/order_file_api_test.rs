// ==========================================
// 订单文件 API 端到端测试
// ==========================================
// 职责: 通过 AppState 装配的 OrderFileApi 走完整流程
// 人工导入 → 查询 → 加锁冲突 → 转换 → 发送标记 → 合并 → 统计
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod order_file_api_test {
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use supplier_order_flow::api::ApiError;
    use supplier_order_flow::app::AppState;
    use supplier_order_flow::config::{config_keys, ConfigManager};
    use supplier_order_flow::db::open_sqlite_connection;
    use supplier_order_flow::domain::{FileQuery, SourceConfig};
    use supplier_order_flow::engine::{LockOutcome, RegisterOutcome};
    use supplier_order_flow::{EventAction, FileStatus};
    use tempfile::TempDir;

    use crate::test_helpers::*;

    const RULES: &str = r#"{
        "acme-v1": {
            "rename": {"Ref": "product_ref", "Qté": "quantity"},
            "add": {"source": "portail"},
            "format": {"product_ref": "uppercase", "quantity": "integer"}
        }
    }"#;

    struct Fixture {
        _dir: TempDir,
        state: AppState,
        supplier_id: String,
    }

    fn setup() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("flow.db").to_string_lossy().to_string();
        let rules_path = dir.path().join("rules.json");
        std::fs::write(&rules_path, RULES).unwrap();

        {
            let conn = open_sqlite_connection(&db_path).unwrap();
            supplier_order_flow::db::ensure_schema(&conn).unwrap();
            let cfg = ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap();
            cfg.set_global_config_value(config_keys::STORAGE_ROOT, &dir.path().join("store").to_string_lossy())
                .unwrap();
            cfg.set_global_config_value(config_keys::RULES_PATH, &rules_path.to_string_lossy())
                .unwrap();
        }

        let state = AppState::new(db_path).unwrap();
        let mut draft = supplier_draft("ACME", &["*.csv"], SourceConfig::Manual);
        draft.rule_id = Some("acme-v1".to_string());
        let supplier_id = state.supplier_repo.create(&draft).unwrap();

        Fixture {
            _dir: dir,
            state,
            supplier_id,
        }
    }

    fn import(fx: &Fixture, filename: &str, body: &str, day: u32) -> String {
        match fx
            .state
            .order_file_api
            .register_manual_file(&fx.supplier_id, filename, body.as_bytes(), "alice", Some(date(day)))
            .unwrap()
        {
            RegisterOutcome::Created(record) => record.file_id,
            other => panic!("expected new file, got {:?}", other),
        }
    }

    #[test]
    fn test_full_operator_flow() {
        let fx = setup();
        let api = &fx.state.order_file_api;

        let a = import(&fx, "cmd_a.csv", "Ref,Qté\nabc,2\n", 10);
        let b = import(&fx, "cmd_b.csv", "Ref,Qté\ndef,5\nghi,1\n", 11);

        let pending = api
            .list_files(&FileQuery {
                status: Some(FileStatus::Pending),
                ..FileQuery::default()
            })
            .unwrap();
        assert_eq!(pending.len(), 2);
        // 收件日期倒序
        assert_eq!(pending[0].file_id, b);

        // 加锁冲突: 消息中包含持有人
        assert!(matches!(
            api.acquire_lock(&a, "alice").unwrap(),
            LockOutcome::Acquired { .. }
        ));
        let err = api.acquire_lock(&a, "bob").unwrap_err();
        assert!(matches!(err, ApiError::LockConflict { .. }));
        assert!(err.to_string().contains("alice"));

        let outcome = api.run_transform(&a, "alice").unwrap();
        assert_eq!(outcome.columns, vec!["product_ref", "quantity", "source"]);

        api.acquire_lock(&b, "bob").unwrap();
        api.run_transform(&b, "bob").unwrap();

        api.mark_sent(&a, "alice", json!({"channel": "edi"})).unwrap();

        let merge = api
            .merge_files(&fx.supplier_id, &[a.clone(), b.clone()], "carol")
            .unwrap();
        assert_eq!(merge.row_count, 3);
        assert_eq!(merge.created_by, "carol");

        let summary = api.status_summary(Some(&fx.supplier_id)).unwrap();
        let merged = summary.iter().find(|c| c.status == FileStatus::Merged).unwrap();
        assert_eq!(merged.count, 2);

        let actions: Vec<EventAction> = api.file_history(&a).unwrap().into_iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                EventAction::Uploaded,
                EventAction::Locked,
                EventAction::Transformed,
                EventAction::Sent,
                EventAction::Merged,
            ]
        );
    }

    #[test]
    fn test_manual_import_validation() {
        let fx = setup();
        let api = &fx.state.order_file_api;

        assert!(matches!(
            api.register_manual_file(&fx.supplier_id, "a.csv", b"Ref\nx", "  ", None),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            api.register_manual_file(&fx.supplier_id, "../a.csv", b"Ref\nx", "alice", None),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            api.register_manual_file("missing", "a.csv", b"Ref\nx", "alice", None),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            api.register_manual_file(&fx.supplier_id, "a.docx", b"x", "alice", None),
            Err(ApiError::UnsupportedFile(_))
        ));

        import(&fx, "a.csv", "Ref\nx\n", 10);
        assert!(matches!(
            api.register_manual_file(&fx.supplier_id, "a.csv", b"Ref\nx\n", "bob", Some(date(12)))
                .unwrap(),
            RegisterOutcome::Duplicate { .. }
        ));
    }

    #[test]
    fn test_merge_rejection_surfaces_reason() {
        let fx = setup();
        let api = &fx.state.order_file_api;
        let a = import(&fx, "a.csv", "Ref,Qté\nx,1\n", 10);

        let err = api.merge_files(&fx.supplier_id, &[a.clone()], "carol").unwrap_err();
        assert!(matches!(err, ApiError::MergeRejected(_)));
        assert_eq!(api.get_file(&a).unwrap().status, FileStatus::Pending);

        assert!(matches!(api.get_file("nope"), Err(ApiError::NotFound(_))));
    }
}
