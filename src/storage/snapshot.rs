use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Snapshot 文件 Header
const MAGIC: u32 = 0xCADE_0001;
const VERSION: u32 = 1;
const HEADER_SIZE: usize = 4 + 4 + 4 + 4; // magic + version + data_len + checksum

/// keyspace 的持久化形态（MemoryStore::export / import 的交换格式）。
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreDump {
    pub hashes: HashMap<String, HashMap<String, String>>,
    pub sets: HashMap<String, Vec<String>>,
}

fn checksum(data: &[u8]) -> u32 {
    // 轻量校验：足够发现截断/随机翻转，不是 cryptographic。
    let mut s: u32 = 0;
    for &b in data {
        s = s.wrapping_add(b as u32);
        s = s.rotate_left(3);
    }
    s
}

/// 原子快照存储（atomic replacement）。
///
/// 落盘流程：
/// 1) bincode 序列化整个 dump
/// 2) header（magic/version/len/checksum）+ body 写到 `<path>.tmp`
/// 3) fsync(tmp)
/// 4) rename(tmp, target) — 原子替换（POSIX 保证）
///
/// 加载时校验 magic + version + data_len + checksum，任何不一致都整体拒绝，
/// 绝不部分恢复：半个 keyspace 比没有 keyspace 更糟（索引会和数据脱节）。
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        SnapshotStore { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, dump: &StoreDump) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = bincode::serialize(dump)?;
        let len: u32 = body.len().try_into()?;
        let crc = checksum(&body);

        let tmp = self.path.with_extension("tmp");
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        f.write_all(&MAGIC.to_le_bytes())?;
        f.write_all(&VERSION.to_le_bytes())?;
        f.write_all(&len.to_le_bytes())?;
        f.write_all(&crc.to_le_bytes())?;
        f.write_all(&body)?;
        f.sync_all()?;
        drop(f);

        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// 文件不存在返回 None；存在但校验不过返回 Err（由调用方决定忽略还是报警）。
    pub fn load(&self) -> anyhow::Result<Option<StoreDump>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut f = File::open(&self.path)?;
        let mut hdr = [0u8; HEADER_SIZE];
        f.read_exact(&mut hdr)
            .map_err(|e| anyhow::anyhow!("snapshot header unreadable: {e}"))?;

        let magic = u32::from_le_bytes(hdr[0..4].try_into()?);
        let version = u32::from_le_bytes(hdr[4..8].try_into()?);
        let len = u32::from_le_bytes(hdr[8..12].try_into()?) as usize;
        let crc = u32::from_le_bytes(hdr[12..16].try_into()?);

        if magic != MAGIC {
            anyhow::bail!("snapshot magic mismatch");
        }
        if version != VERSION {
            anyhow::bail!("snapshot version {version} unsupported");
        }

        let mut body = vec![0u8; len];
        f.read_exact(&mut body)
            .map_err(|e| anyhow::anyhow!("snapshot body truncated: {e}"))?;
        if checksum(&body) != crc {
            anyhow::bail!("snapshot checksum mismatch");
        }

        let dump: StoreDump = bincode::deserialize(&body)?;
        Ok(Some(dump))
    }
}
