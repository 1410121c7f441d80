//! メモリ上のストア（テスト・ドライラン用）

use super::{MenuItemRecord, MenuStore};
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Mutex;

/// 保存された店舗
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMenu {
    pub id: i64,
    pub name: String,
    pub dishes: Vec<MenuItemRecord>,
}

/// メモリ上のストア。IDは1から順に採番する
#[derive(Default)]
pub struct MemoryStore {
    menus: Mutex<Vec<StoredMenu>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存済みの店舗一覧
    pub fn menus(&self) -> Vec<StoredMenu> {
        self.menus.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl MenuStore for MemoryStore {
    async fn save_menu(&self, restaurant_name: &str, records: &[MenuItemRecord]) -> Result<i64, StoreError> {
        let mut menus = self
            .menus
            .lock()
            .map_err(|_| StoreError::Database("ストアのロックに失敗".into()))?;

        let id = menus.len() as i64 + 1;
        menus.push(StoredMenu {
            id,
            name: restaurant_name.to_string(),
            dishes: records.to_vec(),
        });
        Ok(id)
    }
}
