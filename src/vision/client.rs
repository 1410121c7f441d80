//! Vision API クライアント（OpenAI 互換 chat/completions）

use super::{ImagePayload, Inference, Usage, VisionModel};
use crate::config::VisionConfig;
use crate::error::VisionError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Vision APIクライアント
pub struct VisionClient {
    config: VisionConfig,
    http_client: reqwest::Client,
}

impl VisionClient {
    /// 新しいクライアントを作成
    pub fn new(config: VisionConfig) -> Result<Self, VisionError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VisionError::Config(e.to_string()))?;

        Ok(Self { config, http_client })
    }

    /// 環境変数の設定で作成
    pub fn from_env() -> Result<Self, VisionError> {
        Self::new(VisionConfig::from_env()?)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl VisionModel for VisionClient {
    async fn infer(&self, image: &ImagePayload, instruction: &str) -> Result<Inference, VisionError> {
        let data_uri = image.to_data_uri();
        let request = build_request(&self.config.model, &data_uri, instruction);

        debug!(model = %self.config.model, payload_bytes = image.bytes.len(), "Vision APIリクエスト送信");

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Vision APIリクエストに失敗");
                VisionError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %body, "Vision API エラー");
            return Err(VisionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| VisionError::Parse(e.to_string()))?;

        read_response(raw)
    }
}

/// 画像1枚 + 指示文1つのリクエストを組み立てる
fn build_request<'a>(model: &'a str, data_uri: &'a str, instruction: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_uri },
                },
                ContentPart::Text { text: instruction },
            ],
        }],
    }
}

/// レスポンスから本文と使用量を取り出す
fn read_response(raw: Value) -> Result<Inference, VisionError> {
    let content = raw
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| VisionError::Parse("choices[0].message.content がありません".into()))?
        .to_string();

    let usage = raw
        .get("usage")
        .filter(|u| !u.is_null())
        .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());

    Ok(Inference { content, usage, raw })
}

// chat/completions リクエスト構造体

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    ImageUrl { image_url: ImageUrl<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_has_image_then_instruction() {
        let request = build_request("qwen-vl", "data:image/jpeg;base64,AAAA", "识别");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "model": "qwen-vl",
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,AAAA"}},
                        {"type": "text", "text": "识别"}
                    ]
                }]
            })
        );
    }

    #[test]
    fn response_content_and_usage() {
        let raw = json!({
            "choices": [{"message": {"role": "assistant", "content": "```json\n{}\n```"}}],
            "usage": {"prompt_tokens": 900, "completion_tokens": 100, "total_tokens": 1000}
        });

        let inference = read_response(raw).unwrap();
        assert_eq!(inference.content, "```json\n{}\n```");
        assert_eq!(
            inference.usage,
            Some(Usage {
                prompt_tokens: 900,
                completion_tokens: 100,
                total_tokens: 1000
            })
        );
    }

    #[test]
    fn response_without_usage() {
        let raw = json!({"choices": [{"message": {"content": "ok"}}], "usage": null});
        assert_eq!(read_response(raw).unwrap().usage, None);
    }

    #[test]
    fn response_without_content_is_parse_error() {
        let raw = json!({"choices": []});
        assert!(matches!(read_response(raw), Err(VisionError::Parse(_))));
    }
}
