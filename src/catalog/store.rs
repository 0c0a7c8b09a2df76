use std::sync::Arc;

use crate::catalog::diff;
use crate::core::card::{Card, CardPatch, FieldUpdate};
use crate::core::error::{StoreError, StoreResult};
use crate::storage::backend::{KvBackend, RawHash};
use crate::storage::keys::KeySpace;

/// 卡片的规范存取入口。字段值的所有权在这里；派生索引的维护委托给 diff。
///
/// 持有显式构造的后端句柄（启动时 open、退出时收尾），不搞模块级单例。
pub struct CardStore {
    backend: Arc<dyn KvBackend>,
    keys: KeySpace,
}

impl CardStore {
    pub fn new(backend: Arc<dyn KvBackend>, keys: KeySpace) -> Self {
        CardStore { backend, keys }
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// 点查。读矫正宽松：单个坏字段原样吐出，不拒绝整条记录。
    pub async fn get(&self, id: &str) -> StoreResult<Option<Card>> {
        let raw = self.backend.read_hash(&self.keys.data_key(id)).await?;
        Ok(raw.map(|h| hydrate(id, &h)))
    }

    /// save：读旧快照 → diff → 原子 batch。返回合并后的完整记录。
    ///
    /// 同一 id 的并发 save 之间没有串行化，read-diff-write 可能基于过期快照
    /// （接受的限制；要更强保证在这里挂 per-id 锁）。
    pub async fn save(&self, patch: &CardPatch) -> StoreResult<Card> {
        let id = diff::require_id(patch)?;
        let data_key = self.keys.data_key(id);
        let old = self.backend.read_hash(&data_key).await?;

        let batch = diff::compute_save_batch(&self.keys, old.as_ref(), patch)?;

        // 合并视图在 apply 前按同一套规则算好，apply 成功后它就是落库状态
        let merged = merge_raw(id, old, patch)?;

        if batch.is_empty() {
            tracing::debug!(id, "save: no effective change");
            return Ok(hydrate(id, &merged));
        }
        self.backend.apply(batch).await?;
        Ok(hydrate(id, &merged))
    }

    /// delete：撤掉记录持有的全部索引成员，再删数据 hash，同一个 batch。
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let data_key = self.keys.data_key(id);
        let stored = self
            .backend
            .read_hash(&data_key)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let batch = diff::compute_delete_batch(&self.keys, id, &stored);
        self.backend.apply(batch).await
    }

    /// 批量 hydration：一次后端多读，与请求 id 同序配对，缺席的 id 跳过。
    /// 不信任后端行序之外的任何对应关系：每条结果都盖上请求方的 id。
    pub async fn get_many(&self, ids: &[String]) -> StoreResult<Vec<Card>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let data_keys: Vec<String> = ids.iter().map(|id| self.keys.data_key(id)).collect();
        let rows = self.backend.read_hashes(&data_keys).await?;

        Ok(ids
            .iter()
            .zip(rows)
            .filter_map(|(id, row)| row.map(|h| hydrate(id, &h)))
            .collect())
    }
}

/// 原始 hash → 类型化 Card，并确保 id 字段以请求 id 为准。
fn hydrate(id: &str, raw: &RawHash) -> Card {
    let mut card = Card::from_raw(raw);
    card.fields
        .insert("id".to_string(), crate::core::card::FieldValue::Str(id.to_string()));
    card
}

/// 把 patch 的效果合到旧 hash 上，得到 save 之后的落库形态。
/// 与 diff 共用同一套写矫正，保证返回值和存储不会各说各话。
fn merge_raw(id: &str, old: Option<RawHash>, patch: &CardPatch) -> StoreResult<RawHash> {
    use crate::core::card::coerce_write;
    use crate::core::schema;

    let is_new = old.is_none();
    let mut merged = old.unwrap_or_default();
    merged.insert("id".to_string(), id.to_string());

    for (name, update) in &patch.updates {
        if *name == "id" {
            continue;
        }
        // updates 的 key 来自 schema::lookup，这里再查必中
        let Some(field) = schema::lookup(name) else {
            continue;
        };
        match update {
            FieldUpdate::Set(value) => {
                merged.insert(name.to_string(), coerce_write(value, field)?.encode());
            }
            FieldUpdate::Clear => {
                if !is_new {
                    merged.remove(*name);
                }
            }
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::card::FieldValue;
    use crate::storage::memory::MemoryStore;

    fn new_store() -> CardStore {
        CardStore::new(Arc::new(MemoryStore::new()), KeySpace::new("t"))
    }

    fn full_patch(id: &str) -> CardPatch {
        let mut p = CardPatch::new(id);
        p.set("season", "S01").unwrap();
        p.set("level", 2i64).unwrap();
        p.set("power", 2i64).unwrap();
        p.set("artist", "Dolly Parton").unwrap();
        p.set("song", "Jolene").unwrap();
        p.set("isYellow", true).unwrap();
        p.set("yellowInstrument", "Vocals").unwrap();
        p
    }

    #[tokio::test]
    async fn save_then_get_round_trips_types() {
        let store = new_store();
        store.save(&full_patch("S01-C001")).await.unwrap();

        let card = store.get("S01-C001").await.unwrap().unwrap();
        assert_eq!(card.id(), Some("S01-C001"));
        assert_eq!(card.get("level"), Some(&FieldValue::Int(2)));
        assert_eq!(card.get("isYellow"), Some(&FieldValue::Bool(true)));
        assert_eq!(
            card.get("artist"),
            Some(&FieldValue::Str("Dolly Parton".to_string()))
        );
    }

    #[tokio::test]
    async fn save_without_id_is_rejected() {
        let store = new_store();
        let p = CardPatch::new("");
        assert!(matches!(
            store.save(&p).await.unwrap_err(),
            StoreError::MissingId
        ));
    }

    #[tokio::test]
    async fn saving_twice_is_idempotent() {
        let store = new_store();
        let p = full_patch("S01-C001");
        let first = store.save(&p).await.unwrap();
        let second = store.save(&p).await.unwrap();
        assert_eq!(first, second);

        // 索引成员也必须一致：重复 save 不会复制或漂移成员
        let members = store
            .backend()
            .set_members(&store.keys().set_key("season", "S01"))
            .await
            .unwrap();
        assert_eq!(members, vec!["S01-C001".to_string()]);
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields_alone() {
        let store = new_store();
        store.save(&full_patch("S01-C001")).await.unwrap();

        let mut p = CardPatch::new("S01-C001");
        p.set("song", "New Title").unwrap();
        store.save(&p).await.unwrap();

        let card = store.get("S01-C001").await.unwrap().unwrap();
        assert_eq!(
            card.get("song"),
            Some(&FieldValue::Str("New Title".to_string()))
        );
        assert_eq!(
            card.get("artist"),
            Some(&FieldValue::Str("Dolly Parton".to_string()))
        );
        // 未触及字段的索引成员原样保留
        let members = store
            .backend()
            .set_members(&store.keys().set_key("artist", "Dolly Parton"))
            .await
            .unwrap();
        assert_eq!(members, vec!["S01-C001".to_string()]);
    }

    #[tokio::test]
    async fn clear_removes_field_and_membership() {
        let store = new_store();
        store.save(&full_patch("S01-C001")).await.unwrap();

        let mut p = CardPatch::new("S01-C001");
        p.clear("isYellow").unwrap();
        store.save(&p).await.unwrap();

        let card = store.get("S01-C001").await.unwrap().unwrap();
        assert!(card.get("isYellow").is_none());
        let members = store
            .backend()
            .set_members(&store.keys().set_key("isYellow", "true"))
            .await
            .unwrap();
        assert!(members.is_empty());
    }

    #[tokio::test]
    async fn stale_memberships_do_not_survive_value_change() {
        let store = new_store();
        store.save(&full_patch("S01-C001")).await.unwrap();

        let mut p = CardPatch::new("S01-C001");
        p.set("season", "S02").unwrap();
        store.save(&p).await.unwrap();

        let old_members = store
            .backend()
            .set_members(&store.keys().set_key("season", "S01"))
            .await
            .unwrap();
        assert!(old_members.is_empty());
        let new_members = store
            .backend()
            .set_members(&store.keys().set_key("season", "S02"))
            .await
            .unwrap();
        assert_eq!(new_members, vec!["S01-C001".to_string()]);
    }

    #[tokio::test]
    async fn delete_retracts_all_and_get_reports_absent() {
        let store = new_store();
        store.save(&full_patch("S01-C001")).await.unwrap();

        store.delete("S01-C001").await.unwrap();
        assert!(store.get("S01-C001").await.unwrap().is_none());

        for (field, value) in [("season", "S01"), ("isYellow", "true"), ("artist", "Dolly Parton")]
        {
            let members = store
                .backend()
                .set_members(&store.keys().set_key(field, value))
                .await
                .unwrap();
            assert!(members.is_empty(), "{field} membership survived delete");
        }
    }

    #[tokio::test]
    async fn delete_of_missing_id_is_not_found() {
        let store = new_store();
        assert!(matches!(
            store.delete("nope").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn new_card_nulls_are_not_persisted() {
        let store = new_store();
        let mut p = CardPatch::new("S01-C009");
        p.set("season", "S01").unwrap();
        p.clear("playlist").unwrap();
        let card = store.save(&p).await.unwrap();
        assert!(card.get("playlist").is_none());

        let raw = store
            .backend()
            .read_hash(&store.keys().data_key("S01-C009"))
            .await
            .unwrap()
            .unwrap();
        assert!(!raw.contains_key("playlist"));
    }

    #[tokio::test]
    async fn get_many_pairs_results_with_requested_ids() {
        let store = new_store();
        store.save(&full_patch("S01-C001")).await.unwrap();
        store.save(&full_patch("S01-C003")).await.unwrap();

        let ids = vec![
            "S01-C003".to_string(),
            "S01-C002".to_string(), // 不存在：跳过
            "S01-C001".to_string(),
        ];
        let cards = store.get_many(&ids).await.unwrap();
        let got: Vec<&str> = cards.iter().filter_map(|c| c.id()).collect();
        assert_eq!(got, vec!["S01-C003", "S01-C001"]);
    }

    #[tokio::test]
    async fn malformed_stored_integer_is_returned_as_text() {
        let store = new_store();
        // 直接往后端塞坏数据，模拟历史遗留
        let mut batch = crate::storage::backend::MutationBatch::new();
        batch.hset("t:data:BAD-1", "id", "BAD-1".to_string());
        batch.hset("t:data:BAD-1", "level", "not-a-number".to_string());
        store.backend().apply(batch).await.unwrap();

        let card = store.get("BAD-1").await.unwrap().unwrap();
        assert_eq!(
            card.get("level"),
            Some(&FieldValue::Str("not-a-number".to_string()))
        );
    }
}
