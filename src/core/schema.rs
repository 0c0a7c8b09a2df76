/// 字段的声明类型。读路径宽松（坏数据原样吐出），写路径严格（解析失败整次拒绝）。
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FieldType {
    Str,
    Int,
    Bool,
}

/// 单个字段的静态描述：类型、是否参与 set 索引、共享索引组。
///
/// 读侧的类型矫正和写侧的 diff 都只认这张表，不做任何运行时反射。
#[derive(Copy, Clone, Debug)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub ty: FieldType,
    pub indexed: bool,
    /// 逻辑索引组标签（如四个 instrument 字段共享 "instrument"）。
    /// 目前每个字段仍各自落在 field-qualified key 下，留作跨色查询的钩子。
    pub common_index: Option<&'static str>,
}

const fn field(name: &'static str, ty: FieldType, indexed: bool) -> FieldDescriptor {
    FieldDescriptor {
        name,
        ty,
        indexed,
        common_index: None,
    }
}

const fn grouped(
    name: &'static str,
    ty: FieldType,
    indexed: bool,
    group: &'static str,
) -> FieldDescriptor {
    FieldDescriptor {
        name,
        ty,
        indexed,
        common_index: Some(group),
    }
}

/// 全量字段表。id 形如 "S01-C001"（season 与卡号拼接），不可变。
pub static CARD_FIELDS: &[FieldDescriptor] = &[
    field("id", FieldType::Str, false),
    field("season", FieldType::Str, true),
    // level 1-3，power 1-4（Wild/White 强制为 4）
    field("level", FieldType::Int, true),
    field("power", FieldType::Int, true),
    field("artist", FieldType::Str, true),
    field("song", FieldType::Str, true),
    field("isYellow", FieldType::Bool, true),
    grouped("yellowInstrument", FieldType::Str, true, "instrument"),
    field("isRed", FieldType::Bool, true),
    grouped("redInstrument", FieldType::Str, true, "instrument"),
    field("isBlue", FieldType::Bool, true),
    grouped("blueInstrument", FieldType::Str, true, "instrument"),
    field("isGreen", FieldType::Bool, true),
    grouped("greenInstrument", FieldType::Str, true, "instrument"),
    field("isWhite", FieldType::Bool, true),
    field("isMulti", FieldType::Bool, true),
    field("playlist", FieldType::Str, true),
    field("playlistIndex", FieldType::Int, false),
    field("isFX", FieldType::Bool, true),
    field("FXRuleText", FieldType::Str, false),
    field("artURL", FieldType::Str, false),
    field("artHash", FieldType::Str, false),
    field("cardHash", FieldType::Str, false),
];

/// 按名字查描述符。字段数是常量级的，线性扫比建表更划算。
pub fn lookup(name: &str) -> Option<&'static FieldDescriptor> {
    CARD_FIELDS.iter().find(|f| f.name == name)
}
