//! Pipeline stages and the payloads that flow between them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the processing pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    VisionAnalysis,
    ModelGeneration,
    ArtifactStorage,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::VisionAnalysis => "vision analysis",
            Stage::ModelGeneration => "model generation",
            Stage::ArtifactStorage => "artifact storage",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A label detected in the input image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub confidence: f32,
}

/// Structured output of vision analysis.
///
/// `geometry_hints` は生成サービスへそのまま渡すので形を縛らない。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub labels: Vec<Label>,

    #[serde(default)]
    pub geometry_hints: serde_json::Value,
}

impl AnalysisPayload {
    /// Highest-confidence label, if any.
    pub fn primary_label(&self) -> Option<&Label> {
        self.labels
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}

/// Blob produced by model generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedModel {
    pub bytes: Vec<u8>,
    pub content_type: String,
    /// File extension without the dot (e.g. `glb`, `obj`).
    pub extension: String,
}

impl GeneratedModel {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
            extension: extension.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}
