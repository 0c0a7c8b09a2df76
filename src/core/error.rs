/// 存储层错误分类。
///
/// - 校验类（MissingId / UnknownField / BadFieldType）：单次 save 中止，绝不吞掉
/// - NotFound：对不存在 id 的 delete / 点查
/// - Storage：底层 batch 失败或只部分生效，一律按整体失败处理，防索引漂移
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a card id is required")]
    MissingId,

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("{field} is not of type {expected}")]
    BadFieldType { field: String, expected: &'static str },

    #[error("card id {0:?} does not exist")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// 写入校验类错误（区别于 NotFound / Storage），用于 ingestion 的按条跳过统计。
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::MissingId | StoreError::UnknownField(_) | StoreError::BadFieldType { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
