//! メニュースキャナー - Vision モデルを使ったメニュー写真からの店名・料理・価格抽出
//!
//! # 機能
//! - 画像のトークン消費見積もりと圧縮シナリオの分析
//! - 圧縮・待機付きの順次バッチ処理（1枚の失敗で止まらない）
//! - 自由記述の価格テキストを (最小, 最大) に正規化
//! - 抽出結果の店舗・料理レコードへの取り込み

pub mod analysis;
pub mod batch;
pub mod config;
pub mod error;
pub mod imaging;
pub mod parser;
pub mod store;
pub mod vision;

pub use batch::{BatchProcessor, BatchSummary, ExtractionResult};
pub use config::{BatchConfig, VisionConfig};
pub use parser::{ParsedPrice, parse_price};
pub use store::MenuItemRecord;
