//! 結果ストア - 抽出内容を店舗・料理レコードにして保存する
//!
//! 店舗IDはストア側で採番される。価格が読めなかった料理は 0 で保存する。

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::{MemoryStore, StoredMenu};
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use crate::batch::ExtractedContent;
use crate::error::{ContentParseError, StoreError};
use crate::parser::{DishEntry, MenuExtraction, parse_content, parse_price};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// 料理1件分のレコード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItemRecord {
    pub restaurant_name: String,
    pub dish_name: String,
    pub price_min: Decimal,
    pub price_max: Decimal,
    pub original_price_text: String,
    pub image_url: String,
}

impl MenuItemRecord {
    /// 価格を解析してレコードを作る（解析できなければ 0）
    pub fn from_dish(restaurant_name: &str, dish: &DishEntry, image_url: &str) -> Self {
        let parsed = parse_price(&dish.price);
        let (price_min, price_max) = parsed.or_zero();

        Self {
            restaurant_name: restaurant_name.to_string(),
            dish_name: dish.name.clone(),
            price_min,
            price_max,
            original_price_text: parsed.original_text,
            image_url: image_url.to_string(),
        }
    }
}

/// 店舗と料理の保存先
#[async_trait]
pub trait MenuStore: Send + Sync {
    /// 店舗を登録して料理を保存し、採番された店舗IDを返す
    async fn save_menu(&self, restaurant_name: &str, records: &[MenuItemRecord]) -> Result<i64, StoreError>;
}

/// 抽出内容1件を店舗ごとのレコードに変換
pub fn menu_records(entry: &ExtractedContent) -> Result<Vec<(String, Vec<MenuItemRecord>)>, ContentParseError> {
    let value = match &entry.content {
        Value::String(text) => parse_content(text)?,
        other => other.clone(),
    };

    let menus = MenuExtraction::from_value(&value)?;
    Ok(menus
        .iter()
        .map(|menu| {
            let records = menu
                .dishes
                .iter()
                .map(|dish| MenuItemRecord::from_dish(&menu.shop_name, dish, &entry.image))
                .collect();
            (menu.shop_name.clone(), records)
        })
        .collect())
}

/// 取り込み結果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub restaurants: usize,
    pub dishes: usize,
    /// 価格が読めず 0 で保存した料理
    pub unpriced_dishes: usize,
    /// 取り込めなかった画像とその理由
    pub skipped: Vec<(String, String)>,
}

/// 抽出内容をストアに取り込む
///
/// 1件の失敗では止まらず、skipped に記録して次へ進む。
pub async fn import_contents<S: MenuStore + ?Sized>(store: &S, entries: &[ExtractedContent]) -> ImportSummary {
    let mut summary = ImportSummary::default();

    for entry in entries {
        let menus = match menu_records(entry) {
            Ok(menus) => menus,
            Err(e) => {
                warn!(image = %entry.image, error = %e, "メニューとして解析できません");
                summary.skipped.push((entry.image.clone(), e.to_string()));
                continue;
            }
        };

        for (name, records) in menus {
            match store.save_menu(&name, &records).await {
                Ok(id) => {
                    info!(restaurant_id = id, restaurant = %name, dishes = records.len(), "店舗を保存");
                    summary.restaurants += 1;
                    summary.dishes += records.len();
                    summary.unpriced_dishes += records
                        .iter()
                        .filter(|r| parse_price(&r.original_price_text).is_empty())
                        .count();
                }
                Err(e) => {
                    warn!(image = %entry.image, restaurant = %name, error = %e, "店舗の保存に失敗");
                    summary.skipped.push((entry.image.clone(), e.to_string()));
                }
            }
        }
    }

    summary
}
