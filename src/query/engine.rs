use std::sync::Arc;

use serde::Deserialize;

use crate::catalog::CardStore;
use crate::core::card::Card;
use crate::core::error::StoreResult;

/// 多条件的布尔连接方式。
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SearchMode {
    And,
    Or,
}

impl SearchMode {
    /// 请求方的 connective 参数：只有字面 "OR" 选并集，其余一律交集。
    pub fn from_connective(raw: Option<&str>) -> Self {
        match raw {
            Some("OR") => SearchMode::Or,
            _ => SearchMode::And,
        }
    }
}

/// 一个检索条件：(field, value) 等值对。
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SearchTerm {
    pub field: String,
    pub value: String,
}

impl SearchTerm {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        SearchTerm {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// 基于索引 set 的布尔检索。
///
/// 每个条件解析成一个 set key；AND 取交集、OR 取并集；命中的 id 走一次
/// 批量 hydration 还原成完整记录。不存在的 set 按空集算，不是错误。
/// 结果不保证顺序；排序是调用方 hydration 之后的事。
pub struct QueryEngine {
    store: Arc<CardStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<CardStore>) -> Self {
        QueryEngine { store }
    }

    /// 空条件列表返回空结果：无约束查询（全表）这里明确不支持。
    pub async fn search(&self, terms: &[SearchTerm], mode: SearchMode) -> StoreResult<Vec<Card>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let set_keys: Vec<String> = terms
            .iter()
            .map(|t| self.store.keys().set_key(&t.field, &t.value))
            .collect();

        let backend = self.store.backend();
        let ids = match mode {
            SearchMode::And => backend.set_intersection(&set_keys).await?,
            SearchMode::Or => backend.set_union(&set_keys).await?,
        };
        self.store.get_many(&ids).await
    }
}
