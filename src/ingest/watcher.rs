use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::ingest::loader::CardLoader;

/// 卡表文件变更 → 自动重新 ingestion。
///
/// notify 回调里只做 try_send：队列满说明已有待处理的重载在排队，
/// 事件本身没有 payload，丢了也不损失信息。debounce 窗口把编辑器的
/// 连环写事件合并成一次重载。
pub struct ReloadWatcher;

impl ReloadWatcher {
    /// 启动监听。返回的 watcher 必须由调用方持有，否则会被 drop 掉。
    pub fn start(
        loader: Arc<CardLoader>,
        debounce: Duration,
    ) -> anyhow::Result<notify::RecommendedWatcher> {
        let target = loader.path().clone();
        let (tx, mut rx) = mpsc::channel::<()>(8);

        let watched = target.clone();
        let mut watcher = notify::RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    // 只认落在目标文件上的事件（rename 替换也会带上目标路径）
                    if event.paths.iter().any(|p| p == &watched) {
                        let _ = tx.try_send(());
                    }
                }
            },
            notify::Config::default(),
        )?;

        // 监听父目录：编辑器常用 write-tmp-then-rename，盯文件本身会跟丢
        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!(path = %target.display(), "watching card list for changes");

        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                tokio::time::sleep(debounce).await;
                // 把 debounce 期间挤进来的事件清空，合并成一次重载
                while rx.try_recv().is_ok() {}
                match loader.load_all().await {
                    Ok(report) => {
                        info!(saved = report.saved, skipped = report.skipped, "auto reload done");
                    }
                    Err(e) => warn!("auto reload failed: {e}"),
                }
            }
        });

        Ok(watcher)
    }
}
