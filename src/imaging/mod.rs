//! 画像処理モジュール - サイズ調査・トークン見積もり・圧縮

mod compress;
mod tokens;

pub use compress::{
    CompressionScenario, DEFAULT_CANDIDATE_SIZES, compress, compress_file, recommended, scaled_dimensions,
    scenarios,
};
pub use tokens::{TokenEstimate, estimate_tokens};

use crate::error::ImageError;
use base64::{Engine, engine::general_purpose::STANDARD};
use image::{ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 処理対象とする拡張子
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

/// 画像フォーマット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormatKind {
    Jpeg,
    Png,
    Bmp,
    Tiff,
    WebP,
    Gif,
    Other,
}

impl ImageFormatKind {
    /// data URI に埋め込むMIMEタイプ
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
            Self::Other => "application/octet-stream",
        }
    }
}

impl From<ImageFormat> for ImageFormatKind {
    fn from(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Jpeg => Self::Jpeg,
            ImageFormat::Png => Self::Png,
            ImageFormat::Bmp => Self::Bmp,
            ImageFormat::Tiff => Self::Tiff,
            ImageFormat::WebP => Self::WebP,
            ImageFormat::Gif => Self::Gif,
            _ => Self::Other,
        }
    }
}

/// 元画像の情報（処理ごとに一度だけ調べる）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub format: ImageFormatKind,
}

impl ImageDescriptor {
    /// 長辺のピクセル数
    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height)
    }

    /// "幅x高さ" 形式
    pub fn dimensions_label(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// ヘッダだけを読んで画像のサイズとフォーマットを取得
pub fn inspect(path: impl AsRef<Path>) -> Result<ImageDescriptor, ImageError> {
    let path = path.as_ref();

    let byte_size = std::fs::metadata(path)
        .map_err(|e| ImageError::read(path, e))?
        .len();

    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| ImageError::read(path, e))?;

    let format = reader.format().map_or(ImageFormatKind::Other, ImageFormatKind::from);
    let (width, height) = reader.into_dimensions().map_err(|e| ImageError::read(path, e))?;

    if width == 0 || height == 0 {
        return Err(ImageError::InvalidDimension { width, height });
    }

    Ok(ImageDescriptor {
        width,
        height,
        byte_size,
        format,
    })
}

/// フォルダ直下の画像ファイルを列挙（パス順）
pub fn find_images(folder: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(folder.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image_path(p))
        .collect();

    images.sort();
    Ok(images)
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// バイト列を data URI に変換
pub fn to_data_uri(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn inspect_reads_dimensions_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("menu.png");
        RgbImage::from_pixel(40, 30, Rgb([200, 10, 10])).save(&path).unwrap();

        let info = inspect(&path).unwrap();
        assert_eq!((info.width, info.height), (40, 30));
        assert_eq!(info.format, ImageFormatKind::Png);
        assert!(info.byte_size > 0);
        assert_eq!(info.dimensions_label(), "40x30");
    }

    #[test]
    fn inspect_missing_file_is_read_error() {
        let err = inspect("/definitely/not/here.jpg").unwrap_err();
        assert!(matches!(err, ImageError::Read { .. }));
    }

    #[test]
    fn find_images_filters_extensions_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.JPG", "a.png", "notes.txt", "c.webp"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let names: Vec<String> = find_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.JPG", "c.webp"]);
    }

    #[test]
    fn data_uri_has_mime_and_base64_payload() {
        assert_eq!(to_data_uri(b"abc", "image/jpeg"), "data:image/jpeg;base64,YWJj");
    }
}
