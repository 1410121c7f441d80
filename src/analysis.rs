//! トークン消費分析 - 画像ごとの見積もりと圧縮シナリオのレポート

use crate::imaging::{self, CompressionScenario, TokenEstimate};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// この値を超える画像は圧縮を勧める
pub const HIGH_TOKEN_THRESHOLD: u32 = 1000;

/// 1Kトークンあたりの想定単価 (USD)
pub const USD_PER_1K_TOKENS: f64 = 0.01;

/// 画像1枚の分析結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub path: PathBuf,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_dimensions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_kb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<TokenEstimate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compressed_scenarios: Vec<CompressionScenario>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageAnalysis {
    pub fn original_tokens(&self) -> Option<u32> {
        self.estimate.map(|e| e.tokens)
    }

    /// 推奨される圧縮シナリオ
    pub fn recommended(&self) -> Option<&CompressionScenario> {
        imaging::recommended(&self.compressed_scenarios)
    }

    fn failed(path: &Path, error: impl ToString) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            original_dimensions: None,
            file_size_kb: None,
            estimate: None,
            compressed_scenarios: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// 画像1枚を分析
pub fn analyze_image(path: impl AsRef<Path>, candidates: &[u32]) -> ImageAnalysis {
    let path = path.as_ref();

    let info = match imaging::inspect(path) {
        Ok(info) => info,
        Err(e) => return ImageAnalysis::failed(path, e),
    };

    let analysed = imaging::estimate_tokens(info.width, info.height)
        .and_then(|estimate| imaging::scenarios(info.width, info.height, candidates).map(|s| (estimate, s)));

    match analysed {
        Ok((estimate, scenarios)) => ImageAnalysis {
            path: path.to_path_buf(),
            success: true,
            original_dimensions: Some(info.dimensions_label()),
            file_size_kb: Some(info.byte_size as f64 / 1024.0),
            estimate: Some(estimate),
            compressed_scenarios: scenarios,
            error: None,
        },
        Err(e) => ImageAnalysis::failed(path, e),
    }
}

/// 候補サイズごとの合計
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTotal {
    pub max_size: u32,
    pub tokens: u64,
    pub savings: i64,
    pub savings_percent: f64,
}

/// フォルダ全体の分析レポート
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub images: Vec<ImageAnalysis>,
    pub total_original_tokens: u64,
    pub per_target: Vec<TargetTotal>,
    /// HIGH_TOKEN_THRESHOLD を超える画像の数
    pub high_token_images: usize,
    pub estimated_cost_usd: f64,
}

impl AnalysisReport {
    pub fn succeeded(&self) -> usize {
        self.images.iter().filter(|i| i.success).count()
    }

    /// JSONファイルに保存
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("レポートのシリアライズに失敗")?;
        std::fs::write(path, json).with_context(|| format!("レポートの書き込みに失敗: {:?}", path))
    }
}

/// 複数画像を分析して集計
pub fn analyze_images(paths: &[PathBuf], candidates: &[u32]) -> AnalysisReport {
    let images: Vec<ImageAnalysis> = paths.iter().map(|p| analyze_image(p, candidates)).collect();

    let total_original_tokens: u64 = images
        .iter()
        .filter_map(ImageAnalysis::original_tokens)
        .map(u64::from)
        .sum();

    let per_target = candidates
        .iter()
        .map(|&max_size| {
            let tokens: u64 = images
                .iter()
                .flat_map(|i| i.compressed_scenarios.iter())
                .filter(|s| s.target_max_dimension == max_size)
                .map(|s| u64::from(s.tokens))
                .sum();
            let savings = total_original_tokens as i64 - tokens as i64;
            let savings_percent = if total_original_tokens > 0 {
                savings as f64 / total_original_tokens as f64 * 100.0
            } else {
                0.0
            };
            TargetTotal {
                max_size,
                tokens,
                savings,
                savings_percent,
            }
        })
        .collect();

    let high_token_images = images
        .iter()
        .filter(|i| i.original_tokens().is_some_and(|t| t > HIGH_TOKEN_THRESHOLD))
        .count();

    AnalysisReport {
        estimated_cost_usd: total_original_tokens as f64 / 1000.0 * USD_PER_1K_TOKENS,
        images,
        total_original_tokens,
        per_target,
        high_token_images,
    }
}
