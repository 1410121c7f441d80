//! バッチ処理の結合テスト（Vision モデルはスタブ）

use async_trait::async_trait;
use menu_scanner::batch::{ResultJournal, extracted_contents};
use menu_scanner::error::VisionError;
use menu_scanner::store::{MemoryStore, import_contents};
use menu_scanner::vision::{ImagePayload, Inference, Usage, VisionModel};
use menu_scanner::{BatchConfig, BatchProcessor, BatchSummary};
use serde_json::json;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const MENU_JSON: &str = "```json\n{\"店名\": \"川味小馆\", \"菜品\": [{\"名称\": \"水煮鱼\", \"价格\": \"小份38元，大份58元\"}]}\n```";

#[derive(Debug, Clone)]
struct Call {
    at: Instant,
    mime_type: String,
    bytes: Vec<u8>,
}

/// 呼び出しを記録し、予定された失敗を順に返すスタブ
#[derive(Clone, Default)]
struct StubVision {
    calls: Arc<Mutex<Vec<Call>>>,
    script: Arc<Mutex<VecDeque<Option<VisionError>>>>,
}

impl StubVision {
    fn with_script(script: Vec<Option<VisionError>>) -> Self {
        Self {
            calls: Arc::default(),
            script: Arc::new(Mutex::new(script.into())),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionModel for StubVision {
    async fn infer(&self, image: &ImagePayload, instruction: &str) -> Result<Inference, VisionError> {
        assert!(instruction.contains("店名"));
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            mime_type: image.mime_type.clone(),
            bytes: image.bytes.clone(),
        });

        if let Some(Some(err)) = self.script.lock().unwrap().pop_front() {
            return Err(err);
        }

        Ok(Inference {
            content: MENU_JSON.to_string(),
            usage: Some(Usage {
                prompt_tokens: 800,
                completion_tokens: 200,
                total_tokens: 1000,
            }),
            raw: json!({"choices": [{"message": {"content": MENU_JSON}}]}),
        })
    }
}

fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::new(width, height).save(&path).unwrap();
    path
}

fn config(delay_secs: u64) -> BatchConfig {
    BatchConfig {
        inter_request_delay: Duration::from_secs(delay_secs),
        ..BatchConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn failed_remote_call_does_not_stop_batch_or_skip_delay() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = (1..=3)
        .map(|i| write_image(dir.path(), &format!("{}.png", i), 64, 48))
        .collect();

    let vision = StubVision::with_script(vec![None, Some(VisionError::Network("connection reset".into())), None]);
    let processor = BatchProcessor::new(vision.clone(), config(1));

    let started = Instant::now();
    let results = processor.run(&paths, None).await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 3);
    let flags: Vec<bool> = results.iter().map(|r| r.success).collect();
    assert_eq!(flags, vec![true, false, true]);
    assert!(results[1].error.as_deref().unwrap().contains("connection reset"));
    assert!(results[1].content.is_none());

    let calls = vision.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[1].at - calls[0].at >= Duration::from_secs(1));
    assert!(calls[2].at - calls[1].at >= Duration::from_secs(1));

    // 最後の画像の後は待たない
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(3));

    let summary = BatchSummary::from_results(&results);
    assert_eq!((summary.succeeded, summary.failed), (2, 1));
    assert_eq!(summary.total_tokens, 2000);
}

#[tokio::test(start_paused = true)]
async fn missing_file_is_recorded_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_image(dir.path(), "good.png", 32, 32);
    let missing = dir.path().join("missing.jpg");

    let vision = StubVision::default();
    let processor = BatchProcessor::new(vision.clone(), config(0));

    let results = processor.run(&[missing, good], None).await;

    assert!(!results[0].success);
    assert!(results[0].image_info.is_none());
    assert!(results[1].success);
    assert_eq!(vision.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn compression_sends_resized_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "large.png", 1600, 1200);

    let vision = StubVision::default();
    let processor = BatchProcessor::new(
        vision.clone(),
        BatchConfig {
            compress: true,
            target_max_dimension: 800,
            ..config(0)
        },
    );

    let result = processor.process_image(&path).await;
    assert!(result.success);
    assert_eq!(result.image_info.as_ref().map(|i| (i.width, i.height)), Some((1600, 1200)));

    let call = &vision.calls()[0];
    assert_eq!(call.mime_type, "image/jpeg");
    let sent = image::load_from_memory(&call.bytes).unwrap();
    assert_eq!((sent.width(), sent.height()), (800, 600));
}

#[tokio::test(start_paused = true)]
async fn uncompressed_payload_keeps_original_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "menu.png", 20, 10);

    let vision = StubVision::default();
    let processor = BatchProcessor::new(vision.clone(), config(0));
    processor.process_image(&path).await;

    let call = &vision.calls()[0];
    assert_eq!(call.mime_type, "image/png");
    assert_eq!(call.bytes, std::fs::read(&path).unwrap());
}

#[tokio::test(start_paused = true)]
async fn retryable_errors_are_retried_up_to_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "menu.png", 20, 10);

    let vision = StubVision::with_script(vec![Some(VisionError::Api {
        status: 503,
        body: "busy".into(),
    })]);
    let processor = BatchProcessor::new(
        vision.clone(),
        BatchConfig {
            max_retries: 1,
            ..config(1)
        },
    );

    let result = processor.process_image(&path).await;
    assert!(result.success);
    assert_eq!(vision.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "menu.png", 20, 10);

    let vision = StubVision::with_script(vec![Some(VisionError::Api {
        status: 400,
        body: "bad request".into(),
    })]);
    let processor = BatchProcessor::new(
        vision.clone(),
        BatchConfig {
            max_retries: 3,
            ..config(0)
        },
    );

    let result = processor.process_image(&path).await;
    assert!(!result.success);
    assert_eq!(vision.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn journal_receives_results_as_they_are_produced() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        write_image(dir.path(), "a.png", 16, 16),
        write_image(dir.path(), "b.png", 16, 16),
    ];
    let journal_path = dir.path().join("results").join("run.jsonl");
    let mut journal = ResultJournal::create(&journal_path).unwrap();

    let processor = BatchProcessor::new(StubVision::default(), config(0));
    let results = processor.run(&paths, Some(&mut journal)).await;

    let saved = ResultJournal::read(&journal_path).unwrap();
    assert_eq!(saved.len(), results.len());
    assert_eq!(saved[1].image_path, paths[1]);
}

#[tokio::test(start_paused = true)]
async fn batch_output_imports_into_store() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![write_image(dir.path(), "menu.png", 16, 16)];

    let processor = BatchProcessor::new(StubVision::default(), config(0));
    let results = processor.run(&paths, None).await;

    let store = MemoryStore::new();
    let summary = import_contents(&store, &extracted_contents(&results)).await;
    assert_eq!(summary.restaurants, 1);

    let menus = store.menus();
    assert_eq!(menus[0].name, "川味小馆");
    let dish = &menus[0].dishes[0];
    assert_eq!(dish.dish_name, "水煮鱼");
    assert_eq!(dish.price_min.to_string(), "38");
    assert_eq!(dish.price_max.to_string(), "58");
    assert_eq!(dish.image_url, "menu.png");
}
