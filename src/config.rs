//! 設定 - 環境変数とバッチ処理オプション

use crate::error::VisionError;
use std::time::Duration;

/// DashScope の OpenAI 互換エンドポイント
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_MODEL: &str = "qwen-vl-max-2025-04-08";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Vision API の接続設定
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl VisionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// 環境変数から読み込む
    ///
    /// `DASHSCOPE_API_KEY` は必須。`VISION_BASE_URL` / `VISION_MODEL` /
    /// `VISION_TIMEOUT_SECS` は任意。
    pub fn from_env() -> Result<Self, VisionError> {
        let api_key = std::env::var("DASHSCOPE_API_KEY")
            .map_err(|_| VisionError::Config("DASHSCOPE_API_KEY が設定されていません".into()))?;

        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("VISION_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("VISION_MODEL") {
            config.model = model;
        }
        if let Some(secs) = std::env::var("VISION_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()) {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

/// バッチ処理のオプション
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// 送信前に圧縮するか
    pub compress: bool,
    /// 圧縮後の長辺px
    pub target_max_dimension: u32,
    /// リクエスト間の待ち時間（最後の画像の後は待たない）
    pub inter_request_delay: Duration,
    /// JPEG品質 (1-100)
    pub jpeg_quality: u8,
    /// 通信エラー時の追加試行回数
    pub max_retries: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            compress: false,
            target_max_dimension: 1024,
            inter_request_delay: Duration::from_secs(1),
            jpeg_quality: 85,
            max_retries: 0,
        }
    }
}
