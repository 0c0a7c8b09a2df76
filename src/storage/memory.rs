use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::error::StoreResult;
use crate::storage::backend::{HashOp, KvBackend, MutationBatch, RawHash, SetOp};
use crate::storage::snapshot::StoreDump;

#[derive(Default)]
struct Inner {
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
}

/// 进程内存储后端。
///
/// 整个 keyspace 挂在一把 RwLock 下：`apply` 拿写锁一口气做完整个 batch，
/// 读者要么看到 batch 之前、要么看到之后，不存在中间态。
/// set 成员清零时顺手摘掉 set 本身的 key，不留空集占位。
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 导出全量 keyspace（snapshot 落盘用）。
    pub fn export(&self) -> StoreDump {
        let inner = self.inner.read();
        StoreDump {
            hashes: inner.hashes.clone(),
            sets: inner
                .sets
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
                .collect(),
        }
    }

    /// 整体替换 keyspace（snapshot 恢复用）。
    pub fn import(&self, dump: StoreDump) {
        let mut inner = self.inner.write();
        inner.hashes = dump.hashes;
        inner.sets = dump
            .sets
            .into_iter()
            .filter(|(_, members)| !members.is_empty())
            .map(|(k, v)| (k, v.into_iter().collect()))
            .collect();
    }
}

impl Inner {
    fn apply_batch(&mut self, batch: MutationBatch) {
        for op in batch.hash_ops {
            match op {
                HashOp::Set { key, field, value } => {
                    self.hashes.entry(key).or_default().insert(field, value);
                }
                HashOp::Del { key, field } => {
                    if let Some(hash) = self.hashes.get_mut(&key) {
                        hash.remove(&field);
                        // 字段清空后的空 hash 等价于不存在
                        if hash.is_empty() {
                            self.hashes.remove(&key);
                        }
                    }
                }
                HashOp::DelAll { key } => {
                    self.hashes.remove(&key);
                }
            }
        }
        for op in batch.set_ops {
            match op {
                SetOp::Add { key, member } => {
                    self.sets.entry(key).or_default().insert(member);
                }
                SetOp::Rem { key, member } => {
                    if let Some(set) = self.sets.get_mut(&key) {
                        set.remove(&member);
                        if set.is_empty() {
                            self.sets.remove(&key);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl KvBackend for MemoryStore {
    async fn read_hash(&self, key: &str) -> StoreResult<Option<RawHash>> {
        Ok(self.inner.read().hashes.get(key).cloned())
    }

    async fn read_hashes(&self, keys: &[String]) -> StoreResult<Vec<Option<RawHash>>> {
        let inner = self.inner.read();
        Ok(keys.iter().map(|k| inner.hashes.get(k).cloned()).collect())
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.read();
        Ok(inner
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_intersection(&self, keys: &[String]) -> StoreResult<Vec<String>> {
        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };
        let inner = self.inner.read();
        let Some(base) = inner.sets.get(first) else {
            // 任一 set 缺席，交集即空
            return Ok(Vec::new());
        };
        let mut acc: Vec<String> = base.iter().cloned().collect();
        for key in rest {
            match inner.sets.get(key) {
                Some(set) => acc.retain(|m| set.contains(m)),
                None => return Ok(Vec::new()),
            }
            if acc.is_empty() {
                break;
            }
        }
        Ok(acc)
    }

    async fn set_union(&self, keys: &[String]) -> StoreResult<Vec<String>> {
        let inner = self.inner.read();
        let mut acc: HashSet<String> = HashSet::new();
        for key in keys {
            if let Some(set) = inner.sets.get(key) {
                acc.extend(set.iter().cloned());
            }
        }
        Ok(acc.into_iter().collect())
    }

    async fn apply(&self, batch: MutationBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.inner.write().apply_batch(batch);
        Ok(())
    }

    async fn hash_count(&self, prefix: &str) -> StoreResult<usize> {
        let inner = self.inner.read();
        Ok(inner.hashes.keys().filter(|k| k.starts_with(prefix)).count())
    }

    async fn set_count(&self, prefix: &str) -> StoreResult<usize> {
        let inner = self.inner.read();
        Ok(inner.sets.keys().filter(|k| k.starts_with(prefix)).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn batch_is_applied_as_a_unit() {
        let store = MemoryStore::new();
        let mut batch = MutationBatch::new();
        batch.hset("d:1", "season", "S01".to_string());
        batch.hset("d:1", "level", "2".to_string());
        batch.sadd("s:season:S01".to_string(), "1");
        store.apply(batch).await.unwrap();

        let hash = store.read_hash("d:1").await.unwrap().unwrap();
        assert_eq!(hash.get("season").unwrap(), "S01");
        assert_eq!(
            store.set_members("s:season:S01").await.unwrap(),
            vec!["1".to_string()]
        );
    }

    #[tokio::test]
    async fn empty_sets_leave_no_artifacts() {
        let store = MemoryStore::new();
        let mut batch = MutationBatch::new();
        batch.sadd("s:x".to_string(), "1");
        store.apply(batch).await.unwrap();
        assert_eq!(store.set_count("s:").await.unwrap(), 1);

        let mut batch = MutationBatch::new();
        batch.srem("s:x".to_string(), "1");
        store.apply(batch).await.unwrap();
        // 清零的 set 不能留下空壳
        assert_eq!(store.set_count("s:").await.unwrap(), 0);
        assert!(store.set_members("s:x").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn intersection_with_missing_set_is_empty() {
        let store = MemoryStore::new();
        let mut batch = MutationBatch::new();
        batch.sadd("s:a".to_string(), "1");
        batch.sadd("s:a".to_string(), "2");
        store.apply(batch).await.unwrap();

        let keys = vec!["s:a".to_string(), "s:missing".to_string()];
        assert!(store.set_intersection(&keys).await.unwrap().is_empty());

        let mut union = store.set_union(&keys).await.unwrap();
        union.sort();
        assert_eq!(union, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn read_hashes_preserves_request_order() {
        let store = MemoryStore::new();
        let mut batch = MutationBatch::new();
        batch.hset("d:a", "id", "a".to_string());
        batch.hset("d:c", "id", "c".to_string());
        store.apply(batch).await.unwrap();

        let keys = vec!["d:c".to_string(), "d:b".to_string(), "d:a".to_string()];
        let got = store.read_hashes(&keys).await.unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].as_ref().unwrap().get("id").unwrap(), "c");
        assert!(got[1].is_none());
        assert_eq!(got[2].as_ref().unwrap().get("id").unwrap(), "a");
    }

    #[tokio::test]
    async fn export_import_round_trips() {
        let store = MemoryStore::new();
        let mut batch = MutationBatch::new();
        batch.hset("d:1", "id", "1".to_string());
        batch.sadd("s:a".to_string(), "1");
        store.apply(batch).await.unwrap();

        let dump = store.export();
        let restored = MemoryStore::new();
        restored.import(dump);
        assert!(restored.read_hash("d:1").await.unwrap().is_some());
        assert_eq!(
            restored.set_members("s:a").await.unwrap(),
            vec!["1".to_string()]
        );
    }
}
