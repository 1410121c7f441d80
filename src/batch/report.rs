//! 処理結果の保存

use super::{BatchSummary, ExtractionResult};
use crate::parser::parse_content;
use crate::vision::Usage;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 出力ファイル名に付けるタイムスタンプ
pub fn run_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// 1件ずつ追記するJSON Linesファイル
///
/// 途中でプロセスが止まっても処理済みの結果は残る。
pub struct ResultJournal {
    path: PathBuf,
    file: File,
}

impl ResultJournal {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("出力フォルダの作成に失敗: {:?}", parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("ジャーナルのオープンに失敗: {:?}", path))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 1件追記してすぐに書き出す
    pub fn append(&mut self, result: &ExtractionResult) -> Result<()> {
        let line = serde_json::to_string(result).context("結果のシリアライズに失敗")?;
        writeln!(self.file, "{}", line).context("ジャーナルへの書き込みに失敗")?;
        self.file.flush().context("ジャーナルのフラッシュに失敗")?;
        Ok(())
    }

    /// JSON Lines ファイルを読み戻す
    pub fn read(path: impl AsRef<Path>) -> Result<Vec<ExtractionResult>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("ジャーナルの読み込みに失敗: {:?}", path))?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("ジャーナル行のパースに失敗"))
            .collect()
    }
}

/// 成功した画像ごとの抽出内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub image: String,
    /// モデルが返したテキスト、またはJSONとして解析済みの値
    pub content: Value,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// 成功結果から抽出内容を作る
///
/// 本文がJSONとして読めればその値を、読めなければ元のテキストを保持する。
pub fn extracted_contents(results: &[ExtractionResult]) -> Vec<ExtractedContent> {
    results
        .iter()
        .filter(|r| r.success)
        .map(|r| {
            let text = r.content.clone().unwrap_or_default();
            let content = match parse_content(&text) {
                Ok(value) => value,
                Err(e) => {
                    warn!(image = %r.image_name(), error = %e, "本文をJSONとして解析できません。テキストのまま保存します");
                    Value::String(text)
                }
            };
            ExtractedContent {
                image: r.image_name(),
                content,
                usage: r.usage,
            }
        })
        .collect()
}

/// 保存したファイル
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub results_file: PathBuf,
    pub content_file: Option<PathBuf>,
    pub summary: BatchSummary,
}

/// 全結果と抽出内容をJSONで保存
pub fn save_results(results: &[ExtractionResult], output_dir: impl AsRef<Path>, timestamp: &str) -> Result<BatchOutput> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir).with_context(|| format!("出力フォルダの作成に失敗: {:?}", output_dir))?;

    let results_file = output_dir.join(format!("batch_results_{}.json", timestamp));
    write_json(&results_file, results)?;
    info!(path = %results_file.display(), "全結果を保存");

    let contents = extracted_contents(results);
    let content_file = if contents.is_empty() {
        None
    } else {
        let path = output_dir.join(format!("extracted_content_{}.json", timestamp));
        write_json(&path, &contents)?;
        info!(path = %path.display(), count = contents.len(), "抽出内容を保存");
        Some(path)
    };

    Ok(BatchOutput {
        results_file,
        content_file,
        summary: BatchSummary::from_results(results),
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("JSONのシリアライズに失敗")?;
    std::fs::write(path, json).with_context(|| format!("ファイルの書き込みに失敗: {:?}", path))
}
