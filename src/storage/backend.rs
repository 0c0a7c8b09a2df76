use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::error::StoreResult;

/// 卡片在存储层的原始形态：字段名 → 规范文本。类型矫正是上层（catalog）的事。
pub type RawHash = HashMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HashOp {
    /// 写入/覆盖 hash 的一个字段
    Set {
        key: String,
        field: String,
        value: String,
    },
    /// 删除 hash 的一个字段
    Del { key: String, field: String },
    /// 整个 hash 删除（delete card）
    DelAll { key: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetOp {
    Add { key: String, member: String },
    Rem { key: String, member: String },
}

/// 一次 save/delete 的全部数据 + 索引变更。
///
/// ## 契约（重要）
/// - batch 整体生效或整体失败，后端不得让并发读者看到中间态
/// - 任何子操作失败都视为整个 batch 失败，即使其余子操作名义上已成功
#[derive(Clone, Debug, Default)]
pub struct MutationBatch {
    pub hash_ops: Vec<HashOp>,
    pub set_ops: Vec<SetOp>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.hash_ops.is_empty() && self.set_ops.is_empty()
    }

    pub fn hset(&mut self, key: &str, field: &str, value: String) {
        self.hash_ops.push(HashOp::Set {
            key: key.to_string(),
            field: field.to_string(),
            value,
        });
    }

    pub fn hdel(&mut self, key: &str, field: &str) {
        self.hash_ops.push(HashOp::Del {
            key: key.to_string(),
            field: field.to_string(),
        });
    }

    pub fn del_hash(&mut self, key: &str) {
        self.hash_ops.push(HashOp::DelAll {
            key: key.to_string(),
        });
    }

    pub fn sadd(&mut self, key: String, member: &str) {
        self.set_ops.push(SetOp::Add {
            key,
            member: member.to_string(),
        });
    }

    pub fn srem(&mut self, key: String, member: &str) {
        self.set_ops.push(SetOp::Rem {
            key,
            member: member.to_string(),
        });
    }
}

/// 存储后端抽象：hash + set + 原子 batch。
///
/// ## 契约（重要）
/// - `read_hashes` 必须与请求 key 同序返回，一个 key 对应一个 Option
/// - 不存在的 set 按空集处理，不是错误
/// - `apply` 的原子性见 [`MutationBatch`]
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn read_hash(&self, key: &str) -> StoreResult<Option<RawHash>>;

    async fn read_hashes(&self, keys: &[String]) -> StoreResult<Vec<Option<RawHash>>>;

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn set_intersection(&self, keys: &[String]) -> StoreResult<Vec<String>>;

    async fn set_union(&self, keys: &[String]) -> StoreResult<Vec<String>>;

    async fn apply(&self, batch: MutationBatch) -> StoreResult<()>;

    /// 指定前缀下的 hash 数量（status 用）
    async fn hash_count(&self, prefix: &str) -> StoreResult<usize>;

    /// 指定前缀下的 set 数量（status 用）
    async fn set_count(&self, prefix: &str) -> StoreResult<usize>;
}
