//! HTTP クライアントによるステージ実装
//!
//! - **HttpVisionAnalyzer**: 入力画像のバイト列をそのまま POST し、JSON の解析結果を受け取る
//! - **HttpModelGenerator**: 解析結果と入力画像の参照を JSON で POST し、モデルのバイト列を受け取る
//!
//! タイムアウトはパイプライン側（ステージごと）で掛けるので、ここでは設定しない。

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use crate::domain::{AnalysisPayload, AppFile, GeneratedModel, ModelMakerError, Result, Stage};
use crate::ports::{ModelGenerator, ObjectStorage, VisionAnalyzer};

fn external(stage: Stage, err: impl std::fmt::Display) -> ModelMakerError {
    ModelMakerError::external(stage, err.to_string())
}

async fn check_status(stage: Stage, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(ModelMakerError::external(
        stage,
        format!("HTTP {}: {snippet}", status.as_u16()),
    ))
}

/// Map a model content type to a file extension.
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence {
        "model/gltf-binary" => "glb",
        "model/gltf+json" => "gltf",
        "model/obj" | "text/plain" => "obj",
        "model/stl" | "application/sla" => "stl",
        "model/vnd.usdz+zip" => "usdz",
        _ => "bin",
    }
}

pub struct HttpVisionAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    storage: Arc<dyn ObjectStorage>,
}

impl HttpVisionAnalyzer {
    pub fn new(endpoint: impl Into<String>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint, storage)
    }

    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            storage,
        }
    }
}

#[async_trait]
impl VisionAnalyzer for HttpVisionAnalyzer {
    async fn analyze(&self, input: &AppFile) -> Result<AnalysisPayload> {
        let stage = Stage::VisionAnalysis;
        let image = self
            .storage
            .get(&input.storage_key)
            .await
            .map_err(|e| external(stage, e))?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, image.content_type)
            .body(image.bytes)
            .send()
            .await
            .map_err(|e| external(stage, e))?;
        let response = check_status(stage, response).await?;

        response
            .json::<AnalysisPayload>()
            .await
            .map_err(|e| external(stage, format!("invalid analysis payload: {e}")))
    }
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    analysis: &'a AnalysisPayload,
    image_key: &'a str,
    image_content_type: &'a str,
}

pub struct HttpModelGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpModelGenerator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ModelGenerator for HttpModelGenerator {
    async fn generate(&self, analysis: &AnalysisPayload, input: &AppFile) -> Result<GeneratedModel> {
        let stage = Stage::ModelGeneration;
        let request = GenerationRequest {
            analysis,
            image_key: &input.storage_key,
            image_content_type: &input.content_type,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| external(stage, e))?;
        let response = check_status(stage, response).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await.map_err(|e| external(stage, e))?;
        if bytes.is_empty() {
            return Err(ModelMakerError::external(stage, "empty model response"));
        }

        let extension = extension_for(&content_type);
        Ok(GeneratedModel::new(bytes.to_vec(), content_type, extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, FileId, FileKind, TaskId};
    use crate::domain::Label;
    use crate::impls::InMemoryObjectStorage;
    use chrono::Utc;
    use mockito::Matcher;
    use rstest::rstest;
    use ulid::Ulid;

    fn input(key: &str) -> AppFile {
        AppFile {
            id: FileId::from_ulid(Ulid::new()),
            task_id: TaskId::from_ulid(Ulid::new()),
            kind: FileKind::Input,
            storage_key: key.into(),
            content_type: "image/png".into(),
            size: 4,
            created_at: Utc::now(),
        }
    }

    async fn analyzer_with_image(endpoint: String) -> (HttpVisionAnalyzer, AppFile) {
        let storage = Arc::new(InMemoryObjectStorage::new());
        storage.put("t/photo.png", b"png-bytes".to_vec(), "image/png").await.unwrap();
        (HttpVisionAnalyzer::new(endpoint, storage), input("t/photo.png"))
    }

    fn analysis() -> AnalysisPayload {
        AnalysisPayload {
            labels: vec![Label {
                name: "mug".into(),
                confidence: 0.9,
            }],
            geometry_hints: serde_json::json!({ "symmetry": "radial" }),
        }
    }

    #[rstest]
    #[case("model/gltf-binary", "glb")]
    #[case("model/gltf-binary; charset=binary", "glb")]
    #[case("model/stl", "stl")]
    #[case("application/octet-stream", "bin")]
    fn maps_content_type_to_extension(#[case] content_type: &str, #[case] ext: &str) {
        assert_eq!(extension_for(content_type), ext);
    }

    #[tokio::test]
    async fn missing_input_object_is_an_external_failure() {
        let storage = Arc::new(InMemoryObjectStorage::new());
        let analyzer = HttpVisionAnalyzer::new("http://127.0.0.1:9/analyze", storage);

        let err = analyzer.analyze(&input("gone.png")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalService);
        assert!(err.to_string().starts_with("vision analysis failed"));
    }

    #[tokio::test]
    async fn vision_posts_image_bytes_and_decodes_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/analyze")
            .match_header("content-type", "image/png")
            .match_body("png-bytes")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"labels":[{"name":"mug","confidence":0.9}],"geometry_hints":{"symmetry":"radial"}}"#)
            .create_async()
            .await;
        let (analyzer, input) = analyzer_with_image(format!("{}/analyze", server.url())).await;

        let payload = analyzer.analyze(&input).await.unwrap();

        mock.assert_async().await;
        assert_eq!(payload, analysis());
    }

    #[tokio::test]
    async fn vision_non_success_status_carries_code_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/analyze")
            .with_status(503)
            .with_body("model overloaded")
            .create_async()
            .await;
        let (analyzer, input) = analyzer_with_image(format!("{}/analyze", server.url())).await;

        let err = analyzer.analyze(&input).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ExternalService);
        assert_eq!(
            err.to_string(),
            "vision analysis failed: HTTP 503: model overloaded"
        );
    }

    #[tokio::test]
    async fn vision_rejects_malformed_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/analyze")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"labels": "not a list"}"#)
            .create_async()
            .await;
        let (analyzer, input) = analyzer_with_image(format!("{}/analyze", server.url())).await;

        let err = analyzer.analyze(&input).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ExternalService);
        assert!(err.to_string().contains("invalid analysis payload"));
    }

    #[tokio::test]
    async fn generator_sends_analysis_and_keeps_response_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/generate")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "analysis": { "labels": [{ "name": "mug" }] },
                "image_key": "t/photo.png",
                "image_content_type": "image/png",
            })))
            .with_status(200)
            .with_header("content-type", "model/gltf-binary")
            .with_body("glTF-bytes")
            .create_async()
            .await;
        let generator = HttpModelGenerator::new(format!("{}/generate", server.url()));

        let model = generator
            .generate(&analysis(), &input("t/photo.png"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(model.bytes, b"glTF-bytes".to_vec());
        assert_eq!(model.content_type, "model/gltf-binary");
        assert_eq!(model.extension, "glb");
    }

    #[rstest]
    #[case::server_error(500, "boom", "HTTP 500: boom")]
    #[case::empty_body(200, "", "empty model response")]
    #[tokio::test]
    async fn generator_failures_are_external(
        #[case] status: usize,
        #[case] body: &str,
        #[case] expected: &str,
    ) {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/generate")
            .with_status(status)
            .with_body(body)
            .create_async()
            .await;
        let generator = HttpModelGenerator::new(format!("{}/generate", server.url()));

        let err = generator
            .generate(&analysis(), &input("t/photo.png"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ExternalService);
        assert!(err.to_string().starts_with("model generation failed"));
        assert!(err.to_string().ends_with(expected), "{err}");
    }
}
