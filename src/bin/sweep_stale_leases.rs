// 手动回收过期租约（不启动采集）
//
// 用法:
//   sweep_stale_leases [db_path] [--watch]
//
// --watch: 按 stale_sweep_interval_secs 持续回收, Ctrl-C 退出

use supplier_order_flow::app::{get_default_db_path, AppState};
use supplier_order_flow::logging;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let mut watch_mode = false;
    let mut db_path: Option<String> = None;
    for arg in std::env::args().skip(1) {
        if arg == "--watch" {
            watch_mode = true;
        } else {
            db_path = Some(arg);
        }
    }

    let state = AppState::new(db_path.unwrap_or_else(get_default_db_path))?;
    let sweeper = state.stale_sweeper();

    if !watch_mode {
        let reclaimed = sweeper.sweep_once().await;
        println!("reclaimed={}", reclaimed);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = sweeper.spawn(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    let _ = shutdown_tx.send(true);
    handle.await?;
    Ok(())
}
