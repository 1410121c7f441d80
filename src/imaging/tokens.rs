//! 画像入力のトークン消費見積もり
//!
//! 長辺2048pxに収まるよう縮小した後、512x512のタイル単位で課金される。
//! 1タイル170トークン、固定分85トークン。

use crate::error::ImageError;
use serde::{Deserialize, Serialize};

const MAX_DIMENSION: u32 = 2048;
const TILE_SIZE: u32 = 512;
const TOKENS_PER_TILE: u32 = 170;
const BASE_TOKENS: u32 = 85;

/// トークン見積もり結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEstimate {
    pub tiles_wide: u32,
    pub tiles_high: u32,
    pub total_tiles: u32,
    pub tokens: u32,
}

/// 幅・高さからトークン数を見積もる
pub fn estimate_tokens(width: u32, height: u32) -> Result<TokenEstimate, ImageError> {
    if width == 0 || height == 0 {
        return Err(ImageError::InvalidDimension { width, height });
    }

    let (width, height) = fit_within_cap(width, height);

    let tiles_wide = width.div_ceil(TILE_SIZE).max(1);
    let tiles_high = height.div_ceil(TILE_SIZE).max(1);
    let total_tiles = tiles_wide * tiles_high;

    Ok(TokenEstimate {
        tiles_wide,
        tiles_high,
        total_tiles,
        tokens: total_tiles * TOKENS_PER_TILE + BASE_TOKENS,
    })
}

/// 長辺が2048を超える場合は縦横同率で縮小（小数点以下切り捨て）
fn fit_within_cap(width: u32, height: u32) -> (u32, u32) {
    let max_dim = width.max(height);
    if max_dim <= MAX_DIMENSION {
        return (width, height);
    }

    let scale = f64::from(MAX_DIMENSION) / f64::from(max_dim);
    (
        (f64::from(width) * scale) as u32,
        (f64::from(height) * scale) as u32,
    )
}
