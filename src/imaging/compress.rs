//! 画像圧縮 - 送信前に縮小・JPEG再エンコードしてトークン消費を抑える

use super::tokens::estimate_tokens;
use crate::error::ImageError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 圧縮シナリオの候補サイズ（長辺px）
pub const DEFAULT_CANDIDATE_SIZES: [u32; 4] = [512, 768, 1024, 1280];

/// 長辺を target に合わせた場合の縮小後サイズ
///
/// 長辺が target 以下ならそのまま。短辺は比率を保って切り捨てる。
pub fn scaled_dimensions(width: u32, height: u32, target: u32) -> (u32, u32) {
    if width.max(height) <= target {
        return (width, height);
    }

    let scale = |side: u32, long: u32| -> u32 {
        let scaled = u64::from(side) * u64::from(target) / u64::from(long);
        (scaled as u32).max(1)
    };

    if width > height {
        (target, scale(height, width))
    } else {
        (scale(width, height), target)
    }
}

/// 画像を縮小してJPEGバイト列にする
///
/// アルファ・パレットは RGB に変換される（透過部分は合成せず捨てる）。
/// 縮小が不要でも必ず再エンコードする。
/// `image` の JPEG エンコーダには最適化ハフマン表などの指定が無く、調整できるのは品質のみ。
pub fn compress(image: &DynamicImage, target_max_dimension: u32, quality: u8) -> Result<Vec<u8>, ImageError> {
    if target_max_dimension == 0 {
        return Err(ImageError::InvalidDimension {
            width: target_max_dimension,
            height: target_max_dimension,
        });
    }

    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let (new_width, new_height) = scaled_dimensions(width, height, target_max_dimension);

    let rgb = if (new_width, new_height) == (width, height) {
        rgb
    } else {
        imageops::resize(&rgb, new_width, new_height, FilterType::Lanczos3)
    };

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder).map_err(ImageError::Encode)?;

    Ok(buffer)
}

/// ファイルを読み込んで圧縮
pub fn compress_file(path: impl AsRef<Path>, target_max_dimension: u32, quality: u8) -> Result<Vec<u8>, ImageError> {
    let path = path.as_ref();
    let image = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| ImageError::read(path, e))?
        .decode()
        .map_err(|e| ImageError::read(path, e))?;

    compress(&image, target_max_dimension, quality)
}

/// 候補サイズごとの圧縮見積もり
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionScenario {
    pub target_max_dimension: u32,
    pub resulting_dimensions: (u32, u32),
    pub tokens: u32,
    /// 元画像との差（大きい候補では負になりうる）
    pub token_savings: i64,
    pub compression_ratio: f64,
}

/// 候補サイズごとのシナリオを列挙
pub fn scenarios(width: u32, height: u32, candidates: &[u32]) -> Result<Vec<CompressionScenario>, ImageError> {
    let original = estimate_tokens(width, height)?.tokens;

    candidates
        .iter()
        .map(|&target| {
            let resulting_dimensions = scaled_dimensions(width, height, target);
            let tokens = estimate_tokens(resulting_dimensions.0, resulting_dimensions.1)?.tokens;
            Ok(CompressionScenario {
                target_max_dimension: target,
                resulting_dimensions,
                tokens,
                token_savings: i64::from(original) - i64::from(tokens),
                compression_ratio: f64::from(tokens) / f64::from(original),
            })
        })
        .collect()
}

/// トークン数が最小のシナリオ（削減量が正の場合のみ）
pub fn recommended(scenarios: &[CompressionScenario]) -> Option<&CompressionScenario> {
    scenarios
        .iter()
        .min_by_key(|s| s.tokens)
        .filter(|s| s.token_savings > 0)
}
