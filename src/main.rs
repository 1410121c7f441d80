//! メニュースキャナー - メインエントリポイント

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use menu_scanner::analysis::analyze_images;
use menu_scanner::batch::{ExtractedContent, ResultJournal, run_timestamp, save_results};
use menu_scanner::imaging::{DEFAULT_CANDIDATE_SIZES, find_images};
use menu_scanner::parser::parse_content;
use menu_scanner::store::{ImportSummary, MemoryStore, import_contents};
use menu_scanner::vision::VisionClient;
use menu_scanner::{BatchConfig, BatchProcessor, BatchSummary};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "menu_scanner", version, about = "メニュー写真から店名・料理・価格を抽出")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// フォルダ内の画像をまとめて処理
    Batch {
        folder: PathBuf,
        /// 送信前に圧縮する
        #[arg(long)]
        compress: bool,
        /// 圧縮後の長辺px
        #[arg(long, default_value_t = 1024)]
        max_size: u32,
        /// リクエスト間隔（秒）
        #[arg(long, default_value_t = 1.0)]
        delay: f64,
        /// JPEG品質
        #[arg(long, default_value_t = 85)]
        quality: u8,
        /// 通信エラー時の再試行回数
        #[arg(long, default_value_t = 0)]
        retries: u32,
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// 画像1枚を処理
    Request {
        image: PathBuf,
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// トークン消費を分析
    Analyze {
        folder: PathBuf,
        #[arg(long, default_value = "token_analysis.json")]
        output: PathBuf,
    },
    /// 抽出内容をデータベースに取り込む
    Import {
        /// extracted_content_*.json
        file: PathBuf,
        /// 省略時は DATABASE_URL、どちらもなければ保存せずに集計のみ
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ロギング初期化
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 環境変数の読み込み
    dotenvy::dotenv().ok();

    match Cli::parse().command {
        Command::Batch {
            folder,
            compress,
            max_size,
            delay,
            quality,
            retries,
            output_dir,
        } => {
            let config = BatchConfig {
                compress,
                target_max_dimension: max_size,
                inter_request_delay: Duration::try_from_secs_f64(delay)
                    .with_context(|| format!("delay が不正: {}", delay))?,
                jpeg_quality: quality,
                max_retries: retries,
            };
            run_batch(&folder, config, &output_dir).await
        }
        Command::Request { image, output_dir } => run_request(&image, &output_dir).await,
        Command::Analyze { folder, output } => run_analyze(&folder, &output),
        Command::Import { file, database_url } => {
            let database_url = database_url.or_else(|| std::env::var("DATABASE_URL").ok());
            run_import(&file, database_url.as_deref()).await
        }
    }
}

async fn run_batch(folder: &Path, config: BatchConfig, output_dir: &Path) -> Result<()> {
    let images = find_images(folder).with_context(|| format!("フォルダが読めません: {:?}", folder))?;
    if images.is_empty() {
        bail!("画像ファイルが見つかりません: {:?}", folder);
    }

    println!("{} 枚の画像が見つかりました", images.len());
    println!(
        "設定: 圧縮={}, 最大サイズ={}px, 間隔={}秒",
        if config.compress { "あり" } else { "なし" },
        config.target_max_dimension,
        config.inter_request_delay.as_secs_f64()
    );

    let processor = BatchProcessor::new(VisionClient::from_env()?, config);

    let timestamp = run_timestamp();
    let mut journal = ResultJournal::create(output_dir.join(format!("batch_results_{}.jsonl", timestamp)))?;

    let results = processor.run(&images, Some(&mut journal)).await;

    let output = save_results(&results, output_dir, &timestamp)?;
    println!("全結果: {}", output.results_file.display());
    if let Some(ref content_file) = output.content_file {
        println!("抽出内容: {}", content_file.display());
    }
    print_summary(&output.summary);
    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!("処理統計:");
    println!("   総画像数: {}", summary.total);
    println!("   成功: {}", summary.succeeded);
    println!("   失敗: {}", summary.failed);
    if let Some(avg) = summary.average_elapsed_seconds {
        println!("   総トークン消費: {}", summary.total_tokens);
        println!("   平均処理時間: {:.2}秒", avg);
    }
}

async fn run_request(image: &Path, output_dir: &Path) -> Result<()> {
    let config = BatchConfig {
        inter_request_delay: Duration::ZERO,
        ..BatchConfig::default()
    };
    let processor = BatchProcessor::new(VisionClient::from_env()?, config);

    let result = processor.process_image(image).await;
    if !result.success {
        bail!("処理に失敗: {}", result.error.unwrap_or_default());
    }

    let stem = image.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    let timestamp = run_timestamp();
    std::fs::create_dir_all(output_dir).with_context(|| format!("出力フォルダの作成に失敗: {:?}", output_dir))?;

    let response_path = output_dir.join(format!("result_{}_{}.json", stem, timestamp));
    std::fs::write(&response_path, serde_json::to_string_pretty(&result.response)?)
        .with_context(|| format!("ファイルの書き込みに失敗: {:?}", response_path))?;
    println!("レスポンスを保存: {}", response_path.display());

    let content = result.content.unwrap_or_default();
    println!("{}", content);

    let content_path = output_dir.join(format!("content_{}_{}.txt", stem, timestamp));
    std::fs::write(&content_path, &content).with_context(|| format!("ファイルの書き込みに失敗: {:?}", content_path))?;

    match parse_content(&content) {
        Ok(parsed) => {
            let parsed_path = output_dir.join(format!("parsed_{}_{}.json", stem, timestamp));
            std::fs::write(&parsed_path, serde_json::to_string_pretty(&parsed)?)
                .with_context(|| format!("ファイルの書き込みに失敗: {:?}", parsed_path))?;
            println!("解析後のJSONを保存: {}", parsed_path.display());
        }
        Err(e) => println!("JSONとして解析できません: {}", e),
    }
    Ok(())
}

fn run_analyze(folder: &Path, output: &Path) -> Result<()> {
    let images = find_images(folder).with_context(|| format!("フォルダが読めません: {:?}", folder))?;
    if images.is_empty() {
        bail!("画像ファイルが見つかりません: {:?}", folder);
    }

    let report = analyze_images(&images, &DEFAULT_CANDIDATE_SIZES);

    for image in report.images.iter().filter(|i| i.success) {
        let name = image.path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        let tokens = image.original_tokens().unwrap_or_default();
        println!(
            "{}  {} | {:.1}KB | Token: {}",
            name,
            image.original_dimensions.as_deref().unwrap_or("-"),
            image.file_size_kb.unwrap_or_default(),
            tokens
        );
        match image.recommended() {
            Some(best) => println!(
                "   推奨: {}px に圧縮 -> {} tokens (-{:.1}%)",
                best.target_max_dimension,
                best.tokens,
                best.token_savings as f64 / f64::from(tokens) * 100.0
            ),
            None => println!("   現在のサイズが最適"),
        }
    }

    println!();
    println!("成功: {}/{}", report.succeeded(), report.images.len());
    println!("元の総トークン: {}", report.total_original_tokens);
    for target in &report.per_target {
        println!(
            "   {}px に圧縮: {} tokens (節約 {}, {:.1}%)",
            target.max_size, target.tokens, target.savings, target.savings_percent
        );
    }
    if report.high_token_images > 0 {
        println!(
            "{} 枚が 1000 tokens を超えています。--compress --max-size 1024 を推奨",
            report.high_token_images
        );
    }
    println!("推定コスト: ~{:.4} USD", report.estimated_cost_usd);

    report.save(output)?;
    println!("詳細: {}", output.display());
    Ok(())
}

async fn run_import(file: &Path, database_url: Option<&str>) -> Result<()> {
    let text = std::fs::read_to_string(file).with_context(|| format!("ファイルの読み込みに失敗: {:?}", file))?;
    let entries: Vec<ExtractedContent> = serde_json::from_str(&text).context("抽出内容のパースに失敗")?;

    let summary = match database_url {
        Some(url) => import_into_database(url, &entries).await?,
        None => {
            println!("DATABASE_URL が未指定のため保存せずに集計します");
            import_contents(&MemoryStore::new(), &entries).await
        }
    };

    println!(
        "取り込み完了: 店舗 {} 件, 料理 {} 件 (価格不明 {} 件)",
        summary.restaurants, summary.dishes, summary.unpriced_dishes
    );
    for (image, reason) in &summary.skipped {
        println!("   スキップ: {} ({})", image, reason);
    }
    Ok(())
}

#[cfg(feature = "postgres")]
async fn import_into_database(url: &str, entries: &[ExtractedContent]) -> Result<ImportSummary> {
    let store = menu_scanner::store::PostgresStore::connect(url).await?;
    Ok(import_contents(&store, entries).await)
}

#[cfg(not(feature = "postgres"))]
async fn import_into_database(_url: &str, _entries: &[ExtractedContent]) -> Result<ImportSummary> {
    bail!("PostgreSQL への保存には `postgres` フィーチャーを有効にしてビルドしてください")
}
