use std::path::Path;

use super::MediaAsset;
use crate::utils::sanitize_title;
use crate::{ClipError, Result};

/// Extensions accepted for uploaded media files.
const ALLOWED_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "aac", "mp4", "avi", "mkv"];

/// Fixed name the staged copy gets inside the workspace.
const STAGED_NAME: &str = "source_upload";

/// Stages a user-provided local file into the job workspace.
pub struct UploadSource;

impl UploadSource {
    /// Validate the upload and copy it into `workspace` under a fixed name.
    ///
    /// The display title comes from the original filename stem; the staged
    /// copy keeps the original extension so downstream tools can sniff the
    /// container.
    pub async fn stage(&self, original: &Path, workspace: &Path) -> Result<MediaAsset> {
        if !original.exists() {
            return Err(ClipError::NotFound(format!(
                "file does not exist: {}",
                original.display()
            )));
        }

        if !original.is_file() {
            return Err(ClipError::NotFound(format!(
                "path is not a file: {}",
                original.display()
            )));
        }

        let extension = original
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| {
                ClipError::UnsupportedFormat(format!(
                    "{} has no file extension",
                    original.display()
                ))
            })?;

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ClipError::UnsupportedFormat(format!(
                ".{} (allowed: {})",
                extension,
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        let staged = workspace.join(format!("{}.{}", STAGED_NAME, extension));
        tracing::debug!(
            "Staging upload {} as {}",
            original.display(),
            staged.display()
        );
        tokio::fs::copy(original, &staged).await?;

        let title = original
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("");

        Ok(MediaAsset {
            path: staged,
            title: sanitize_title(title),
            duration: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stage_copies_into_workspace() {
        let uploads = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();

        let original = uploads.path().join("My Song (live).mp3");
        tokio::fs::write(&original, b"ID3fake").await.unwrap();

        let asset = UploadSource
            .stage(&original, workspace.path())
            .await
            .unwrap();

        assert_eq!(asset.path, workspace.path().join("source_upload.mp3"));
        assert_eq!(
            tokio::fs::read(&asset.path).await.unwrap(),
            b"ID3fake".to_vec()
        );
        // Parentheses are outside the safe character set.
        assert_eq!(asset.title, "My Song live");
        // The original is copied, not moved.
        assert!(original.exists());
    }

    #[tokio::test]
    async fn test_stage_accepts_uppercase_extension() {
        let uploads = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();

        let original = uploads.path().join("video.MP4");
        tokio::fs::write(&original, b"data").await.unwrap();

        let asset = UploadSource
            .stage(&original, workspace.path())
            .await
            .unwrap();
        assert_eq!(asset.path, workspace.path().join("source_upload.mp4"));
    }

    #[tokio::test]
    async fn test_stage_rejects_disallowed_extension() {
        let uploads = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();

        let original = uploads.path().join("notes.txt");
        tokio::fs::write(&original, b"text").await.unwrap();

        let result = UploadSource.stage(&original, workspace.path()).await;
        assert!(matches!(result, Err(ClipError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_stage_rejects_extensionless_file() {
        let uploads = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();

        let original = uploads.path().join("mystery");
        tokio::fs::write(&original, b"data").await.unwrap();

        let result = UploadSource.stage(&original, workspace.path()).await;
        assert!(matches!(result, Err(ClipError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_stage_rejects_missing_file() {
        let workspace = tempfile::tempdir().unwrap();

        let result = UploadSource
            .stage(Path::new("/nonexistent/clip.mp3"), workspace.path())
            .await;
        assert!(matches!(result, Err(ClipError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_stage_rejects_directory() {
        let uploads = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();

        let dir = uploads.path().join("album.mp3");
        tokio::fs::create_dir(&dir).await.unwrap();

        let result = UploadSource.stage(&dir, workspace.path()).await;
        assert!(matches!(result, Err(ClipError::NotFound(_))));
    }
}
