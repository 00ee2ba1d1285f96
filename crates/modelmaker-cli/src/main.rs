use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{Duration, Instant, sleep};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modelmaker_core::app::AppBuilder;
use modelmaker_core::config::AppConfig;
use modelmaker_core::domain::{
    AnalysisPayload, AppFile, FileUpload, GeneratedModel, Label, NewTask, OwnerId, Result,
};
use modelmaker_core::impls::{
    HttpModelGenerator, HttpVisionAnalyzer, InMemoryObjectStorage, LocalObjectStorage,
    LogNotifier, StaticTokenVerifier, WebhookNotifier,
};
use modelmaker_core::ports::{ModelGenerator, Notifier, ObjectStorage, VisionAnalyzer};

const DEMO_TOKEN: &str = "demo-token";

/// 外部サービスの URL が無いときに使うローカル版ステージ
struct DemoVision;

#[async_trait]
impl VisionAnalyzer for DemoVision {
    async fn analyze(&self, input: &AppFile) -> Result<AnalysisPayload> {
        Ok(AnalysisPayload {
            labels: vec![Label {
                name: "object".into(),
                confidence: 0.5,
            }],
            geometry_hints: serde_json::json!({ "input_bytes": input.size }),
        })
    }
}

/// 単位立方体の OBJ を返す
struct DemoGenerator;

#[async_trait]
impl ModelGenerator for DemoGenerator {
    async fn generate(&self, analysis: &AnalysisPayload, _input: &AppFile) -> Result<GeneratedModel> {
        let name = analysis
            .primary_label()
            .map(|l| l.name.as_str())
            .unwrap_or("object");
        let mut obj = format!("o {name}\n");
        for v in [
            "0 0 0", "1 0 0", "1 1 0", "0 1 0", "0 0 1", "1 0 1", "1 1 1", "0 1 1",
        ] {
            obj.push_str(&format!("v {v}\n"));
        }
        for f in ["1 2 3 4", "5 6 7 8", "1 2 6 5", "2 3 7 6", "3 4 8 7", "4 1 5 8"] {
            obj.push_str(&format!("f {f}\n"));
        }
        Ok(GeneratedModel::new(obj.into_bytes(), "model/obj", "obj"))
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

async fn load_upload() -> std::result::Result<FileUpload, std::io::Error> {
    match std::env::args().nth(1) {
        Some(path) => {
            let path = Path::new(&path);
            let bytes = tokio::fs::read(path).await?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload")
                .to_string();
            Ok(FileUpload::new(name, content_type_for(path), bytes))
        }
        // PNG シグネチャだけのダミー画像
        None => Ok(FileUpload::new(
            "sample.png",
            "image/png",
            vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a],
        )),
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modelmaker_core=debug,modelmaker_cli=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(workers = config.workers, capacity = config.queue_capacity, "config loaded");

    // (A) 依存を組み立てる
    let objects: Arc<dyn ObjectStorage> = match &config.storage_dir {
        Some(dir) => Arc::new(LocalObjectStorage::new(dir)),
        None => Arc::new(InMemoryObjectStorage::new()),
    };
    let vision: Arc<dyn VisionAnalyzer> = match &config.vision_url {
        Some(url) => Arc::new(HttpVisionAnalyzer::new(url, Arc::clone(&objects))),
        None => Arc::new(DemoVision),
    };
    let generator: Arc<dyn ModelGenerator> = match &config.generation_url {
        Some(url) => Arc::new(HttpModelGenerator::new(url)),
        None => Arc::new(DemoGenerator),
    };
    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            let webhook = WebhookNotifier::new(url)?;
            tracing::info!(url = %webhook.url(), "webhook notifications enabled");
            Arc::new(webhook)
        }
        None => Arc::new(LogNotifier),
    };

    let app = AppBuilder::new()
        .config(config)
        .object_storage(objects)
        .vision(vision)
        .generator(generator)
        .notifier(notifier)
        .identity(Arc::new(
            StaticTokenVerifier::new().with_token(DEMO_TOKEN, OwnerId::new("demo-user")),
        ))
        .build()?;

    // (B) worker を起動
    let workers = app.start_workers();
    let service = Arc::clone(&app.service);

    // (C) create -> upload -> start
    let owner = service.authenticate(&format!("Bearer {DEMO_TOKEN}")).await?;
    let task = service
        .create_task(&owner, NewTask::new("demo model").with_description("CLI demo run"))
        .await?;
    let input = service.upload_file(&owner, task.id, load_upload().await?).await?;
    let stored = service.get_input_file(&owner, task.id, input.id).await?;
    tracing::info!(file_id = %input.id, bytes = stored.size(), "input stored");
    // キューに入れる前の下見（status は変わらない）
    match service.analyze_task(&owner, task.id).await {
        Ok(analysis) => println!(
            "preview: {}",
            analysis.primary_label().map(|l| l.name.as_str()).unwrap_or("no labels")
        ),
        Err(e) => println!("preview unavailable: {e}"),
    }
    service.start_process(&owner, task.id).await?;

    // (D) 終端状態をポーリングで待つ（Ctrl-C で中断）
    let deadline = Instant::now() + Duration::from_secs(600);
    let detail = loop {
        let detail = service.get_task(&owner, task.id).await?;
        if detail.task.status.is_terminal() || Instant::now() >= deadline {
            break detail;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted");
                break detail;
            }
            _ = sleep(Duration::from_millis(100)) => {}
        }
    };

    println!("final status: {:?}", detail.task.status);
    for message in &detail.messages {
        println!("  [{:?}/{:?}] {}", message.author, message.kind, message.body);
    }
    match service.get_output_artifact(&owner, task.id).await {
        Ok(artifact) => println!(
            "output: key={} content_type={} size={}",
            artifact.key,
            artifact.content_type,
            artifact.size()
        ),
        Err(e) => println!("no output: {e}"),
    }
    println!("queue: {:?}", service.queue_counts().await);

    // (E) graceful shutdown
    workers.shutdown_and_join().await;
    Ok(())
}
