//! エラー型定義

use std::path::PathBuf;
use thiserror::Error;

/// 画像処理のエラー
#[derive(Debug, Error)]
pub enum ImageError {
    /// 幅または高さが0
    #[error("画像サイズが不正: {width}x{height}")]
    InvalidDimension { width: u32, height: u32 },

    /// ファイルが存在しない、または壊れている
    #[error("画像の読み込みに失敗: {path:?}: {message}")]
    Read { path: PathBuf, message: String },

    /// JPEG再エンコードの失敗
    #[error("画像のエンコードに失敗: {0}")]
    Encode(#[source] image::ImageError),
}

impl ImageError {
    pub(crate) fn read(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Read {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Vision API呼び出しのエラー
#[derive(Debug, Error)]
pub enum VisionError {
    /// APIキー未設定など
    #[error("設定エラー: {0}")]
    Config(String),

    /// 接続失敗・タイムアウト
    #[error("ネットワークエラー: {0}")]
    Network(String),

    /// 2xx以外のレスポンス
    #[error("Vision API エラー ({status}): {body}")]
    Api { status: u16, body: String },

    /// レスポンスの形式が想定外
    #[error("レスポンスのパースに失敗: {0}")]
    Parse(String),
}

impl VisionError {
    /// 再試行で回復する見込みがあるか
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Config(_) | Self::Parse(_) => false,
        }
    }
}

/// モデル出力をJSONとして解釈できなかった
#[derive(Debug, Error)]
pub enum ContentParseError {
    #[error("JSONで始まっていません")]
    NotJson,

    #[error("JSONの解析に失敗: {0}")]
    Json(#[from] serde_json::Error),

    /// 店名キーが無い、または空のオブジェクト
    #[error("店名がありません: {0}")]
    MissingShopName(String),
}

/// 1枚の画像処理で発生し、バッチ側で失敗結果に変換されるエラー
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Vision(#[from] VisionError),
}

/// 結果ストアのエラー
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("データベースエラー: {0}")]
    Database(String),

    #[error("メニューデータが不正: {0}")]
    InvalidMenu(String),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}
