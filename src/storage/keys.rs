/// Key 派生：所有 key 都长成 `namespace:category:rest`，可直接肉眼检查。
///
/// - `data` 分类下是每张卡的 hash
/// - `sets` 分类下是 `(field, value)` 对应的 id 集合
#[derive(Clone, Debug)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        KeySpace {
            namespace: namespace.into(),
        }
    }

    pub fn data_key(&self, id: &str) -> String {
        format!("{}:data:{}", self.namespace, id)
    }

    /// `value` 必须已经是规范编码文本（FieldValue::encode 的输出）。
    pub fn set_key(&self, field: &str, value: &str) -> String {
        format!("{}:sets:{}:{}", self.namespace, field, value)
    }

    pub fn data_prefix(&self) -> String {
        format!("{}:data:", self.namespace)
    }

    pub fn sets_prefix(&self) -> String {
        format!("{}:sets:", self.namespace)
    }
}
