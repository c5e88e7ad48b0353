// ==========================================
// 供应商订单文件系统 - 过期租约后台回收
// ==========================================
// 周期性执行 reset_stale_leases; 与普通加锁并发安全（同样走条件更新）
// 通过 watch 通道停止
// ==========================================

use crate::engine::file_lifecycle::FileLifecycleService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct StaleLeaseSweeper {
    lifecycle: Arc<FileLifecycleService>,
    interval: Duration,
}

impl StaleLeaseSweeper {
    pub fn new(lifecycle: Arc<FileLifecycleService>, interval: Duration) -> Self {
        Self { lifecycle, interval }
    }

    /// 执行一次回收，返回回收数量; 失败只记录日志
    pub async fn sweep_once(&self) -> usize {
        let lifecycle = self.lifecycle.clone();
        match tokio::task::spawn_blocking(move || lifecycle.sweep_stale()).await {
            Ok(Ok(reclaimed)) => {
                if !reclaimed.is_empty() {
                    info!(count = reclaimed.len(), "本轮回收过期租约");
                }
                reclaimed.len()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "过期租约回收失败");
                0
            }
            Err(e) => {
                error!(error = %e, "过期租约回收任务异常退出");
                0
            }
        }
    }

    /// 循环执行直到收到停止信号
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "StaleLeaseSweeper started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            self.sweep_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        info!("StaleLeaseSweeper stopped");
    }

    /// 在后台任务中运行
    pub fn spawn(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown_rx).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{FileRecordRepository, ProcessingEventRepository, SupplierRepository};
    use crate::storage::{FsObjectStore, ObjectStore};
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn lifecycle(dir: &tempfile::TempDir) -> Arc<FileLifecycleService> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path()).unwrap());
        Arc::new(FileLifecycleService::new(
            Arc::new(FileRecordRepository::new(conn.clone())),
            Arc::new(ProcessingEventRepository::new(conn.clone())),
            Arc::new(SupplierRepository::new(conn)),
            store,
            chrono::Duration::minutes(30),
        ))
    }

    #[tokio::test]
    async fn test_sweep_once_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let sweeper = StaleLeaseSweeper::new(lifecycle(&dir), Duration::from_secs(60));
        assert_eq!(sweeper.sweep_once().await, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let dir = tempfile::tempdir().unwrap();
        let sweeper = StaleLeaseSweeper::new(lifecycle(&dir), Duration::from_secs(3600));
        let (tx, rx) = watch::channel(false);
        let handle = sweeper.spawn(rx);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
