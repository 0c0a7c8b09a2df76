use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::CardStore;
use crate::core::card::CardPatch;
use crate::ingest::csv;

/// 一次全量 ingestion 的结果。
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct LoadReport {
    pub saved: usize,
    pub skipped: usize,
}

/// 卡表文件 → 卡记录的装载器。
///
/// 单条记录的错误（坏颜色、坏 instrument 列表、save 校验失败）跳过并记日志，
/// 装载继续；文件级的结构错误（读不到、CSV 解析失败）让整次 load 失败。
pub struct CardLoader {
    store: Arc<CardStore>,
    path: PathBuf,
}

impl CardLoader {
    pub fn new(store: Arc<CardStore>, path: PathBuf) -> Self {
        CardLoader { store, path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// 重读整个卡表并逐条 save。
    pub async fn load_all(&self) -> anyhow::Result<LoadReport> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let rows = csv::parse(&text)?;

        let mut report = LoadReport::default();
        for (i, row) in rows.iter().enumerate() {
            let patch = match row_to_patch(row) {
                Ok(p) => p,
                Err(e) => {
                    warn!("bad record at row {}: {}", i + 1, e);
                    report.skipped += 1;
                    continue;
                }
            };
            match self.store.save(&patch).await {
                Ok(_) => report.saved += 1,
                Err(e) => {
                    warn!("error saving card at row {}: {}", i + 1, e);
                    report.skipped += 1;
                }
            }
        }
        info!(
            saved = report.saved,
            skipped = report.skipped,
            path = %self.path.display(),
            "card list ingested"
        );
        Ok(report)
    }
}

/// 一行卡表 → 一个 save patch，含颜色展开契约：
///
/// - `Wild`：四色全亮，`|` 分隔的 4 元 instrument 列表按黄红蓝绿定序展开，
///   isMulti=true，power 强制 4；列表长度不是 4 则整条拒绝
/// - `Lead`/`Loop`/`Beat`/`Bass`：只亮对应一色及其 instrument
/// - `White`：isWhite + isFX，Notes 进 FXRuleText，power 强制 4
/// - 其它颜色值：整条拒绝
/// - power 默认取 level，上述强制项覆盖
pub fn row_to_patch(row: &HashMap<String, String>) -> anyhow::Result<CardPatch> {
    let get = |key: &str| row.get(key).map(String::as_str).unwrap_or("");

    let season = get("Season");
    let card_no = get("CardNo");
    if season.is_empty() || card_no.is_empty() {
        anyhow::bail!("missing Season/CardNo");
    }

    let mut patch = CardPatch::new(format!("{season}-{card_no}"));
    patch.set("season", season)?;
    patch.set("level", get("Level"))?;
    patch.set("power", get("Level"))?; // 默认 power = level，Wild/White 下面覆盖
    patch.set("artist", get("Artist"))?;
    patch.set("song", get("Title"))?;
    patch.set("playlist", get("Playlist"))?;
    patch.set("artHash", get("ArtHash"))?;
    patch.set("cardHash", get("CardHash"))?;

    match get("Color") {
        "Wild" => {
            let instrument = get("Instrument");
            let parts: Vec<&str> = instrument.split('|').collect();
            if parts.len() != 4 {
                anyhow::bail!("bad instrument value: {instrument:?}");
            }
            patch.set("isMulti", true)?;
            patch.set("isYellow", true)?;
            patch.set("yellowInstrument", parts[0])?;
            patch.set("isRed", true)?;
            patch.set("redInstrument", parts[1])?;
            patch.set("isBlue", true)?;
            patch.set("blueInstrument", parts[2])?;
            patch.set("isGreen", true)?;
            patch.set("greenInstrument", parts[3])?;
            patch.set("power", 4i64)?;
        }
        "Lead" => {
            patch.set("isYellow", true)?;
            patch.set("yellowInstrument", get("Instrument"))?;
        }
        "Loop" => {
            patch.set("isRed", true)?;
            patch.set("redInstrument", get("Instrument"))?;
        }
        "Beat" => {
            patch.set("isBlue", true)?;
            patch.set("blueInstrument", get("Instrument"))?;
        }
        "Bass" => {
            patch.set("isGreen", true)?;
            patch.set("greenInstrument", get("Instrument"))?;
        }
        "White" => {
            patch.set("isWhite", true)?;
            patch.set("isFX", true)?;
            patch.set("FXRuleText", get("Notes"))?;
            patch.set("power", 4i64)?;
        }
        other => anyhow::bail!("bad color: {other:?}"),
    }

    Ok(patch)
}
