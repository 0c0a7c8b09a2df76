use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use unicode_normalization::{is_nfc, UnicodeNormalization};

use crate::core::error::{StoreError, StoreResult};
use crate::core::schema::{self, FieldDescriptor, FieldType};

/// 字段的类型化取值。untagged：JSON 输出就是裸的 string/int/bool。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl FieldValue {
    /// 落库的规范文本形式，也是索引 set key 里 value 的形式。
    /// 变更检测按这个编码比较，"3" 和 3 视为同值。
    pub fn encode(&self) -> String {
        match self {
            FieldValue::Str(s) => s.clone(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// NFC 规范化：同一个字符串的不同组合形式必须落到同一个索引 set key。
fn nfc(s: &str) -> String {
    if is_nfc(s) {
        s.to_string()
    } else {
        s.nfc().collect()
    }
}

/// 存量文本的布尔解读。规范值之外的非空文本按真处理（历史数据兜底）。
pub fn bool_from_text(raw: &str) -> bool {
    !matches!(raw, "" | "false" | "0")
}

/// 读路径矫正：宽松。整数解析失败时原样吐出文本，绝不因为单个坏字段拒绝整条记录。
pub fn coerce_read(raw: &str, ty: FieldType) -> FieldValue {
    match ty {
        FieldType::Str => FieldValue::Str(raw.to_string()),
        FieldType::Bool => FieldValue::Bool(bool_from_text(raw)),
        FieldType::Int => match raw.trim().parse::<i64>() {
            Ok(i) => FieldValue::Int(i),
            // 坏数据，但照样返回
            Err(_) => FieldValue::Str(raw.to_string()),
        },
    }
}

/// 写路径矫正：严格。声明为 integer 的字段解析不出整数时整次 save 失败，
/// 不允许新写入制造坏数据（与宽松读是有意的不对称）。
pub fn coerce_write(value: &FieldValue, field: &FieldDescriptor) -> StoreResult<FieldValue> {
    match field.ty {
        FieldType::Str => Ok(FieldValue::Str(nfc(&value.encode()))),
        FieldType::Bool => Ok(FieldValue::Bool(match value {
            FieldValue::Bool(b) => *b,
            FieldValue::Int(i) => *i != 0,
            FieldValue::Str(s) => bool_from_text(s),
        })),
        FieldType::Int => match value {
            FieldValue::Int(i) => Ok(FieldValue::Int(*i)),
            FieldValue::Str(s) => s.trim().parse::<i64>().map(FieldValue::Int).map_err(|_| {
                StoreError::BadFieldType {
                    field: field.name.to_string(),
                    expected: "integer",
                }
            }),
            FieldValue::Bool(_) => Err(StoreError::BadFieldType {
                field: field.name.to_string(),
                expected: "integer",
            }),
        },
    }
}

/// 一张卡的完整字段映射。序列化结果就是扁平 JSON 对象。
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Card {
    pub fields: BTreeMap<String, FieldValue>,
}

impl Card {
    pub fn id(&self) -> Option<&str> {
        match self.fields.get("id") {
            Some(FieldValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// 从原始 hash 还原：已声明字段按表矫正，未声明字段原样透传为文本。
    pub fn from_raw<'a, I>(raw: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut fields = BTreeMap::new();
        for (name, raw_value) in raw {
            let value = match schema::lookup(name) {
                Some(f) => coerce_read(raw_value, f.ty),
                None => FieldValue::Str(raw_value.clone()),
            };
            fields.insert(name.clone(), value);
        }
        Card { fields }
    }
}

/// 单字段的三态更新：缺席 = 不动，Clear = 删除并撤索引，Set = 覆盖。
/// 用显式变体替代"key 在不在对象上"的运行时试探。
#[derive(Clone, Debug, PartialEq)]
pub enum FieldUpdate {
    Clear,
    Set(FieldValue),
}

/// 一次 save 的输入：目标 id + 每字段更新。未提及的字段保持原值。
#[derive(Clone, Debug)]
pub struct CardPatch {
    pub id: String,
    pub updates: BTreeMap<&'static str, FieldUpdate>,
}

impl CardPatch {
    pub fn new(id: impl Into<String>) -> Self {
        CardPatch {
            id: id.into(),
            updates: BTreeMap::new(),
        }
    }

    /// 设置字段值。未声明的字段直接拒绝，不做静默忽略。
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> StoreResult<&mut Self> {
        let field = schema::lookup(name).ok_or_else(|| StoreError::UnknownField(name.to_string()))?;
        self.updates.insert(field.name, FieldUpdate::Set(value.into()));
        Ok(self)
    }

    /// 清除字段：从 hash 删除并撤掉旧值的索引成员。
    pub fn clear(&mut self, name: &str) -> StoreResult<&mut Self> {
        let field = schema::lookup(name).ok_or_else(|| StoreError::UnknownField(name.to_string()))?;
        self.updates.insert(field.name, FieldUpdate::Clear);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_coercion_is_permissive() {
        assert_eq!(coerce_read("3", FieldType::Int), FieldValue::Int(3));
        // 坏整数：原样透传，不报错
        assert_eq!(
            coerce_read("oops", FieldType::Int),
            FieldValue::Str("oops".to_string())
        );
        assert_eq!(coerce_read("true", FieldType::Bool), FieldValue::Bool(true));
        assert_eq!(coerce_read("false", FieldType::Bool), FieldValue::Bool(false));
        assert_eq!(coerce_read("0", FieldType::Bool), FieldValue::Bool(false));
        assert_eq!(coerce_read("yes", FieldType::Bool), FieldValue::Bool(true));
    }

    #[test]
    fn write_coercion_rejects_bad_integers() {
        let level = schema::lookup("level").unwrap();
        assert_eq!(
            coerce_write(&FieldValue::Str("2".to_string()), level).unwrap(),
            FieldValue::Int(2)
        );
        let err = coerce_write(&FieldValue::Str("two".to_string()), level).unwrap_err();
        assert!(matches!(err, StoreError::BadFieldType { ref field, .. } if field == "level"));
    }

    #[test]
    fn write_coercion_normalizes_strings_to_nfc() {
        let artist = schema::lookup("artist").unwrap();
        // "é" 的分解形式（e + combining acute）必须规范化成组合形式
        let decomposed = "Beyonce\u{0301}";
        let got = coerce_write(&FieldValue::Str(decomposed.to_string()), artist).unwrap();
        assert_eq!(got, FieldValue::Str("Beyonc\u{00e9}".to_string()));
    }

    #[test]
    fn patch_rejects_unknown_fields() {
        let mut p = CardPatch::new("S01-C001");
        assert!(p.set("season", "S01").is_ok());
        assert!(matches!(
            p.set("bogus", "x").unwrap_err(),
            StoreError::UnknownField(_)
        ));
        assert!(matches!(
            p.clear("bogus").unwrap_err(),
            StoreError::UnknownField(_)
        ));
    }

    #[test]
    fn card_json_is_flat_and_typed() {
        let raw: std::collections::HashMap<String, String> = [
            ("id".to_string(), "S01-C001".to_string()),
            ("level".to_string(), "2".to_string()),
            ("isYellow".to_string(), "true".to_string()),
        ]
        .into_iter()
        .collect();
        let card = Card::from_raw(&raw);
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["id"], "S01-C001");
        assert_eq!(json["level"], 2);
        assert_eq!(json["isYellow"], true);
    }
}
