//! Vision API モジュール

mod client;

pub use client::VisionClient;

use crate::error::VisionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 送信する画像
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn to_data_uri(&self) -> String {
        crate::imaging::to_data_uri(&self.bytes, &self.mime_type)
    }
}

/// トークン使用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// 推論結果
#[derive(Debug, Clone)]
pub struct Inference {
    /// モデルが返したテキスト（JSONとは限らない）
    pub content: String,
    pub usage: Option<Usage>,
    /// レスポンス全体
    pub raw: Value,
}

/// 画像と指示文を受け取り、テキストを返すモデル
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn infer(&self, image: &ImagePayload, instruction: &str) -> Result<Inference, VisionError>;
}
