//! バッチ処理 - 画像を1枚ずつ順番に Vision API へ送る
//!
//! 1枚ごとに サイズ調査 → トークン見積もり → 圧縮（任意）→ 推論 → 記録 を行い、
//! 次の画像の前に設定された時間だけ待つ。1枚の失敗でバッチは止まらない。

mod report;

pub use report::{BatchOutput, ExtractedContent, ResultJournal, extracted_contents, run_timestamp, save_results};

use crate::config::BatchConfig;
use crate::error::{ImageError, ProcessError, VisionError};
use crate::imaging::{self, ImageDescriptor, ImageFormatKind};
use crate::parser::EXTRACTION_INSTRUCTION;
use crate::vision::{ImagePayload, Inference, Usage, VisionModel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// 画像1枚分の処理結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub image_path: PathBuf,
    pub success: bool,
    pub image_info: Option<ImageDescriptor>,
    /// APIレスポンス全体
    pub response: Option<Value>,
    /// モデルが返した本文
    pub content: Option<String>,
    pub usage: Option<Usage>,
    pub error: Option<String>,
    pub elapsed_seconds: f64,
}

impl ExtractionResult {
    fn succeeded(path: &Path, info: ImageDescriptor, inference: Inference, elapsed: Duration) -> Self {
        Self {
            image_path: path.to_path_buf(),
            success: true,
            image_info: Some(info),
            response: Some(inference.raw),
            content: Some(inference.content),
            usage: inference.usage,
            error: None,
            elapsed_seconds: elapsed.as_secs_f64(),
        }
    }

    fn failed(path: &Path, info: Option<ImageDescriptor>, err: &ProcessError, elapsed: Duration) -> Self {
        Self {
            image_path: path.to_path_buf(),
            success: false,
            image_info: info,
            response: None,
            content: None,
            usage: None,
            error: Some(err.to_string()),
            elapsed_seconds: elapsed.as_secs_f64(),
        }
    }

    /// ファイル名部分
    pub fn image_name(&self) -> String {
        self.image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// バッチ全体の集計
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 成功分の実トークン消費合計
    pub total_tokens: u64,
    /// 成功分の平均処理時間
    pub average_elapsed_seconds: Option<f64>,
}

impl BatchSummary {
    pub fn from_results(results: &[ExtractionResult]) -> Self {
        let successes: Vec<&ExtractionResult> = results.iter().filter(|r| r.success).collect();

        let total_tokens = successes
            .iter()
            .filter_map(|r| r.usage.map(|u| u.total_tokens))
            .sum();

        let average_elapsed_seconds = (!successes.is_empty()).then(|| {
            successes.iter().map(|r| r.elapsed_seconds).sum::<f64>() / successes.len() as f64
        });

        Self {
            total: results.len(),
            succeeded: successes.len(),
            failed: results.len() - successes.len(),
            total_tokens,
            average_elapsed_seconds,
        }
    }
}

/// 画像を順番に処理するバッチ処理器
pub struct BatchProcessor<V> {
    vision: V,
    config: BatchConfig,
}

impl<V: VisionModel> BatchProcessor<V> {
    pub fn new(vision: V, config: BatchConfig) -> Self {
        Self { vision, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// 全画像を処理する
    ///
    /// 各結果は生成直後に journal へ追記される。
    pub async fn run(&self, paths: &[PathBuf], mut journal: Option<&mut ResultJournal>) -> Vec<ExtractionResult> {
        let total = paths.len();
        let mut results = Vec::with_capacity(total);

        info!(
            total,
            compress = self.config.compress,
            max_size = self.config.target_max_dimension,
            delay_secs = self.config.inter_request_delay.as_secs_f64(),
            "バッチ処理開始"
        );

        for (i, path) in paths.iter().enumerate() {
            info!(index = i + 1, total, image = %path.display(), "画像を処理中");

            let result = self.process_image(path).await;

            if let Some(journal) = journal.as_deref_mut() {
                if let Err(e) = journal.append(&result) {
                    warn!(error = %e, "途中結果の書き込みに失敗");
                }
            }
            results.push(result);

            // 最後の画像の後は待たない
            if i + 1 < total {
                tokio::time::sleep(self.config.inter_request_delay).await;
            }
        }

        results
    }

    /// 画像1枚を処理する（失敗も結果として返す）
    pub async fn process_image(&self, path: &Path) -> ExtractionResult {
        let started = Instant::now();

        let info = match imaging::inspect(path) {
            Ok(info) => info,
            Err(e) => {
                let err = ProcessError::from(e);
                error!(image = %path.display(), error = %err, "画像情報の取得に失敗");
                return ExtractionResult::failed(path, None, &err, started.elapsed());
            }
        };

        info!(
            dimensions = %info.dimensions_label(),
            size_kb = %format!("{:.1}", info.byte_size as f64 / 1024.0),
            "元画像"
        );
        if let Ok(estimate) = imaging::estimate_tokens(info.width, info.height) {
            info!(estimated_tokens = estimate.tokens, tiles = estimate.total_tiles, "予想トークン");
        }

        match self.request(path, &info).await {
            Ok((inference, elapsed)) => {
                match inference.usage {
                    Some(usage) => info!(
                        elapsed_secs = %format!("{:.2}", elapsed.as_secs_f64()),
                        total_tokens = usage.total_tokens,
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "リクエスト完了"
                    ),
                    None => info!(elapsed_secs = %format!("{:.2}", elapsed.as_secs_f64()), "リクエスト完了"),
                }
                ExtractionResult::succeeded(path, info, inference, elapsed)
            }
            Err(err) => {
                error!(image = %path.display(), error = %err, "処理に失敗");
                ExtractionResult::failed(path, Some(info), &err, started.elapsed())
            }
        }
    }

    async fn request(&self, path: &Path, info: &ImageDescriptor) -> Result<(Inference, Duration), ProcessError> {
        let payload = self.load_payload(path, info)?;

        let started = Instant::now();
        let inference = self.infer_with_retry(&payload).await?;
        Ok((inference, started.elapsed()))
    }

    /// 送信用の画像データを用意（圧縮する場合はJPEG）
    fn load_payload(&self, path: &Path, info: &ImageDescriptor) -> Result<ImagePayload, ImageError> {
        if self.config.compress {
            let bytes = imaging::compress_file(path, self.config.target_max_dimension, self.config.jpeg_quality)?;
            info!(compressed_kb = %format!("{:.1}", bytes.len() as f64 / 1024.0), "圧縮後");
            Ok(ImagePayload::new(bytes, ImageFormatKind::Jpeg.mime_type()))
        } else {
            let bytes = std::fs::read(path).map_err(|e| ImageError::read(path, e))?;
            Ok(ImagePayload::new(bytes, info.format.mime_type()))
        }
    }

    async fn infer_with_retry(&self, payload: &ImagePayload) -> Result<Inference, VisionError> {
        let mut attempt = 0;
        loop {
            match self.vision.infer(payload, EXTRACTION_INSTRUCTION).await {
                Ok(inference) => return Ok(inference),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(attempt, max_retries = self.config.max_retries, error = %e, "再試行します");
                    tokio::time::sleep(self.config.inter_request_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
