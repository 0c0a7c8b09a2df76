use crate::core::card::{coerce_write, CardPatch, FieldUpdate};
use crate::core::error::{StoreError, StoreResult};
use crate::core::schema::CARD_FIELDS;
use crate::storage::backend::{MutationBatch, RawHash};
use crate::storage::keys::KeySpace;

/// save 的 diff 核心：旧 hash 快照 × 三态 patch → 最小变更 batch。
///
/// 底层 store 没有"改 hash 字段顺便修派生索引"的原语，索引一致性全靠这里：
/// - 字段没变：不产生任何数据/索引操作
/// - 字段变更且新值非空：写 hash 字段；有索引时撤旧值成员、加新值成员
/// - 字段变更且为 Clear：删 hash 字段；有索引且旧值存在时撤旧值成员
/// - 新卡上的 Clear 没有旧值可清，直接丢弃
///
/// 纯同步内存计算，无 await 点；产出的 batch 由后端一次性原子生效。
pub fn compute_save_batch(
    keys: &KeySpace,
    old: Option<&RawHash>,
    patch: &CardPatch,
) -> StoreResult<MutationBatch> {
    let id = patch.id.as_str();
    let is_new = old.is_none();
    let data_key = keys.data_key(id);
    let mut batch = MutationBatch::new();

    if is_new {
        batch.hset(&data_key, "id", id.to_string());
    }

    // 按 schema 表顺序走一遍，batch 内容对同一输入是确定的
    for field in CARD_FIELDS {
        let Some(update) = patch.updates.get(field.name) else {
            continue;
        };
        // id 不可变：patch 里对 id 的更新一律不理会，新卡的 id 已在上面写入
        if field.name == "id" {
            continue;
        }
        let old_value = old.and_then(|h| h.get(field.name));

        match update {
            FieldUpdate::Set(value) => {
                let encoded = coerce_write(value, field)?.encode();
                let changing = is_new || old_value != Some(&encoded);
                if !changing {
                    continue;
                }
                batch.hset(&data_key, field.name, encoded.clone());
                if field.indexed {
                    if let Some(prev) = old_value {
                        batch.srem(keys.set_key(field.name, prev), id);
                    }
                    batch.sadd(keys.set_key(field.name, &encoded), id);
                }
            }
            FieldUpdate::Clear => {
                if is_new {
                    // 新卡不存在待清的旧值
                    continue;
                }
                batch.hdel(&data_key, field.name);
                if field.indexed {
                    if let Some(prev) = old_value {
                        batch.srem(keys.set_key(field.name, prev), id);
                    }
                }
            }
        }
    }

    Ok(batch)
}

/// delete 的变更集：整个 hash 删除 + 撤掉每个有值索引字段的成员。
///
/// 撤销不看值的真假：isYellow=false 同样占着 `(isYellow,false)` 的成员位。
pub fn compute_delete_batch(keys: &KeySpace, id: &str, stored: &RawHash) -> MutationBatch {
    let mut batch = MutationBatch::new();
    batch.del_hash(&keys.data_key(id));
    for field in CARD_FIELDS {
        if !field.indexed {
            continue;
        }
        if let Some(value) = stored.get(field.name) {
            batch.srem(keys.set_key(field.name, value), id);
        }
    }
    batch
}

/// 校验 patch 携带了可用的 id。
pub fn require_id(patch: &CardPatch) -> StoreResult<&str> {
    if patch.id.is_empty() {
        return Err(StoreError::MissingId);
    }
    Ok(patch.id.as_str())
}
