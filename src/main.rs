use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cardex::catalog::CardStore;
use cardex::config::Config;
use cardex::ingest::{CardLoader, ReloadWatcher};
use cardex::query::{ApiServer, QueryEngine};
use cardex::storage::{KeySpace, MemoryStore, SnapshotStore};
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "cardex", about = "Set-indexed card catalog and query service")]
struct Args {
    /// TOML 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP 监听端口（覆盖配置文件）
    #[arg(long)]
    port: Option<u16>,

    /// 卡表文件路径（覆盖配置文件）
    #[arg(long)]
    card_list: Option<PathBuf>,

    /// 存储命名空间（覆盖配置文件）
    #[arg(long)]
    namespace: Option<String>,

    /// 前端源，用于 CORS（覆盖配置文件）
    #[arg(long)]
    front_end_origin: Option<String>,

    /// 关闭卡表文件的变更监听
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        cfg.port = port;
    }
    if let Some(path) = args.card_list {
        cfg.card_list = path;
    }
    if let Some(ns) = args.namespace {
        cfg.namespace = ns;
    }
    if args.front_end_origin.is_some() {
        cfg.front_end_origin = args.front_end_origin;
    }
    if args.no_watch {
        cfg.watch = false;
    }

    info!("Starting cardex: set-indexed card catalog");

    // 后端句柄显式构造，启动恢复、退出落盘，不走模块级单例
    let backend = Arc::new(MemoryStore::new());
    let snapshot = SnapshotStore::new(cfg.snapshot_path());
    match snapshot.load() {
        Ok(Some(dump)) => {
            let hashes = dump.hashes.len();
            backend.import(dump);
            info!(cards = hashes, "keyspace restored from snapshot");
        }
        Ok(None) => {}
        Err(e) => warn!("snapshot rejected, starting empty: {e}"),
    }

    let store = Arc::new(CardStore::new(
        backend.clone(),
        KeySpace::new(&cfg.namespace),
    ));
    let engine = Arc::new(QueryEngine::new(store.clone()));
    let loader = Arc::new(CardLoader::new(store.clone(), cfg.card_list.clone()));

    // watcher 由 main 持有，drop 即停止监听
    let _watcher = if cfg.watch {
        match ReloadWatcher::start(loader.clone(), Duration::from_millis(500)) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("card list watch disabled: {e}");
                None
            }
        }
    } else {
        None
    };

    let server = ApiServer::new(
        engine,
        store,
        loader,
        cfg.front_end_origin.as_deref(),
    )?;
    tokio::spawn(server.run(cfg.port));

    info!(
        "cardex ready. Query via: http://localhost:{}/?artist=...&connective=AND",
        cfg.port
    );

    // 优雅退出：keyspace 落一次盘
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    if let Err(e) = snapshot.save(&backend.export()) {
        warn!("final snapshot failed: {e}");
    }

    Ok(())
}
