//! AppFile: stored files (input images, output artifacts) attached to a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ModelMakerError, Result};
use super::ids::{FileId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppFile {
    pub id: FileId,
    pub task_id: TaskId,
    pub kind: FileKind,
    pub storage_key: String,
    pub content_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// A file as received from the request layer, before it is stored.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// 入力画像として受け付けられるか検証する
    pub fn validate(&self, max_bytes: u64) -> Result<()> {
        if self.file_name.trim().is_empty() {
            return Err(ModelMakerError::validation("file name must not be empty"));
        }
        if self.bytes.is_empty() {
            return Err(ModelMakerError::validation("file must not be empty"));
        }
        if self.bytes.len() as u64 > max_bytes {
            return Err(ModelMakerError::validation(format!(
                "file is {} bytes, limit is {max_bytes}",
                self.bytes.len()
            )));
        }
        if !self.content_type.starts_with("image/") {
            return Err(ModelMakerError::validation(format!(
                "unsupported content type {:?}, expected image/*",
                self.content_type
            )));
        }
        Ok(())
    }

    /// File name reduced to characters that are safe inside a storage key.
    pub fn sanitized_name(&self) -> String {
        let base = self
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        let cleaned: String = base
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let cleaned = cleaned.trim_start_matches('.');
        if cleaned.is_empty() {
            "upload".to_string()
        } else {
            cleaned.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ErrorKind;
    use rstest::rstest;

    fn png(bytes: usize) -> FileUpload {
        FileUpload::new("photo.png", "image/png", vec![1; bytes])
    }

    #[test]
    fn accepts_small_image() {
        assert!(png(10).validate(100).is_ok());
    }

    #[rstest]
    #[case::empty(png(0))]
    #[case::too_big(png(101))]
    #[case::not_an_image(FileUpload::new("notes.txt", "text/plain", vec![1]))]
    #[case::no_name(FileUpload::new("  ", "image/png", vec![1]))]
    fn rejects_invalid_uploads(#[case] upload: FileUpload) {
        let err = upload.validate(100).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[rstest]
    #[case("photo.png", "photo.png")]
    #[case("../../etc/passwd", "passwd")]
    #[case("C:\\Users\\me\\my photo.jpg", "my_photo.jpg")]
    #[case("...", "upload")]
    fn sanitizes_file_names(#[case] raw: &str, #[case] expected: &str) {
        let upload = FileUpload::new(raw, "image/png", vec![1]);
        assert_eq!(upload.sanitized_name(), expected);
    }
}
