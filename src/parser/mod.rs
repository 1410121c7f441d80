//! テキスト解析モジュール - モデル出力のJSON化と価格の正規化

mod price;

pub use price::{ParsedPrice, parse_price};

use crate::error::ContentParseError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// モデルに渡す抽出指示
pub const EXTRACTION_INSTRUCTION: &str = "请识别图中店名和菜品名价格,以json格式返回。";

/// モデル出力から抽出されたメニュー
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MenuExtraction {
    /// 店名
    #[serde(rename = "店名", alias = "shop_name", alias = "restaurant_name", default)]
    pub shop_name: String,
    /// 菜品
    #[serde(rename = "菜品", alias = "dishes", default)]
    pub dishes: Vec<DishEntry>,
}

/// 1品分のデータ
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DishEntry {
    #[serde(rename = "名称", alias = "name", default)]
    pub name: String,
    /// 価格は文字列のまま保持（数値で返ってきた場合も文字列化）
    #[serde(rename = "价格", alias = "price", default, deserialize_with = "price_text")]
    pub price: String,
}

impl MenuExtraction {
    /// オブジェクト1つ、または配列から取り出す
    ///
    /// 店名が読めない要素が1つでもあればエラー（未知のキーだけのオブジェクトを含む）。
    pub fn from_value(value: &Value) -> Result<Vec<Self>, ContentParseError> {
        match value {
            Value::Array(items) => items.iter().map(Self::from_object).collect(),
            other => Ok(vec![Self::from_object(other)?]),
        }
    }

    fn from_object(value: &Value) -> Result<Self, ContentParseError> {
        let menu = Self::deserialize(value)?;
        if menu.shop_name.trim().is_empty() {
            let mut keys: Vec<&str> = value
                .as_object()
                .map(|o| o.keys().map(String::as_str).collect())
                .unwrap_or_default();
            keys.sort_unstable();
            return Err(ContentParseError::MissingShopName(keys.join(", ")));
        }
        Ok(menu)
    }
}

fn price_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// 前後のコードフェンス（```json / ```）を取り除く
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```").and_then(|s| s.strip_suffix("```")) else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}

/// モデル出力をJSONとして解析
///
/// 失敗した場合でも呼び出し側は元のテキストを保持すること。
pub fn parse_content(content: &str) -> Result<Value, ContentParseError> {
    let body = strip_code_fence(content);
    if !(body.starts_with('{') || body.starts_with('[')) {
        return Err(ContentParseError::NotJson);
    }
    Ok(serde_json::from_str(body)?)
}
