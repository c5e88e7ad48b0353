// ==========================================
// 供应商订单文件系统 - 采集任务入口
// ==========================================
// 一次运行: 读取配置 → 构建快照 → 回收过期租约 → 采集 → 输出 JSON 汇总
// 用法:
//   supplier-order-flow [--json-log] [db_path]
// ==========================================

use anyhow::Context;
use supplier_order_flow::app::{get_default_db_path, AppState};
use supplier_order_flow::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut json_log = false;
    let mut db_path: Option<String> = None;
    for arg in std::env::args().skip(1) {
        if arg == "--json-log" {
            json_log = true;
        } else {
            db_path = Some(arg);
        }
    }

    if json_log {
        logging::init_json();
    } else {
        logging::init();
    }

    tracing::info!("==================================================");
    tracing::info!("{} v{}", supplier_order_flow::APP_NAME, supplier_order_flow::VERSION);
    tracing::info!("==================================================");

    let db_path = db_path.unwrap_or_else(get_default_db_path);
    let state = AppState::new(db_path).map_err(anyhow::Error::msg)?;

    if let Ok(snapshot) = state.config_manager.get_config_snapshot() {
        tracing::info!(config = %snapshot, "运行配置");
    }

    let snapshot = state.snapshot().context("构建运行快照失败")?;

    let reclaimed = state.stale_sweeper().sweep_once().await;
    tracing::info!(reclaimed, "启动时过期租约回收完成");

    let summary = state.collector().run(&snapshot).await;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
