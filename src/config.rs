use std::path::{Path, PathBuf};

use serde::Deserialize;

/// 服务配置。TOML 文件可选，CLI 参数覆盖文件值。
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP 监听端口
    pub port: u16,
    /// 存储 key 的命名空间前缀
    pub namespace: String,
    /// 卡表文件路径
    pub card_list: PathBuf,
    /// keyspace 快照文件；不配则落在 data_dir 下
    pub snapshot_path: Option<PathBuf>,
    /// 前端部署源（CORS Allow-Origin）；不配则不加 CORS 头
    pub front_end_origin: Option<String>,
    /// 监听卡表文件变更并自动重载
    pub watch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 6070,
            namespace: "cardex:store".to_string(),
            card_list: PathBuf::from("cardlist.csv"),
            snapshot_path: None,
            front_end_origin: None,
            watch: true,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| anyhow::anyhow!("config {}: {e}", p.display()))?;
                Ok(toml::from_str(&text)?)
            }
            None => Ok(Config::default()),
        }
    }

    /// snapshot 的实际落点：显式配置优先，否则 data_dir，最后退到 temp。
    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("cardex")
                .join("store.snap")
        })
    }
}
