use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{self, ClientConfig};
use crate::errors::AppResult;
use crate::image_processor;
use crate::security::FileSystemGuard;
use crate::uploader::ResultPayload;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Where a finished result should be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    /// Exact output path, overwritten if present
    File(PathBuf),
    /// Directory; the name is derived from the uploaded file
    Directory(PathBuf),
}

/// Directory results go to when nothing else was asked for.
pub fn default_export_dir(config: &ClientConfig) -> AppResult<PathBuf> {
    match &config.output_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(config::get_temp_directory()?.join("results")),
    }
}

/// Write the payload verbatim and return the path it landed at.
pub async fn write_result(
    payload: &ResultPayload,
    source_name: &str,
    target: &ExportTarget,
) -> AppResult<PathBuf> {
    let path = match target {
        ExportTarget::File(path) => path.clone(),
        ExportTarget::Directory(dir) => {
            tokio::fs::create_dir_all(dir).await?;
            unused_path(dir, &image_processor::result_stem(source_name), payload.extension())
        }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::fs::write(&path, payload.as_bytes()).await?;
    log::info!(
        "Saved {} bytes of result to {}",
        payload.as_bytes().len(),
        path.display()
    );
    Ok(path)
}

/// Write the payload to a fresh temp file suitable for handing to a share
/// or open-with affordance.
pub async fn write_shareable(payload: &ResultPayload) -> AppResult<PathBuf> {
    let dir = config::get_temp_directory()?.join("share");
    let path = FileSystemGuard::create_secure_temp_file(&dir, payload.extension())?;
    write_result(payload, "", &ExportTarget::File(path)).await
}

/// Remove shared and exported files older than `days` from the temp area.
pub fn cleanup_exports(days: u64) -> AppResult<usize> {
    let temp_dir = config::get_temp_directory()?;
    let max_age = max_export_age(days);

    let mut removed = 0;
    for sub in ["share", "results"] {
        removed += FileSystemGuard::cleanup_old_files(&temp_dir.join(sub), max_age)?;
    }

    if removed > 0 {
        log::info!("Removed {} old result files", removed);
    }
    Ok(removed)
}

fn max_export_age(days: u64) -> Duration {
    Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY))
}

fn unused_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.{}", stem, extension));
    if !candidate.exists() {
        return candidate;
    }

    (1..)
        .map(|n| dir.join(format!("{}_{}.{}", stem, n, extension)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    #[tokio::test]
    async fn test_vector_result_named_after_source() {
        let dir = tempfile::tempdir().unwrap();
        let payload = ResultPayload::Vector("<svg></svg>".to_string());
        let target = ExportTarget::Directory(dir.path().to_path_buf());

        let first = write_result(&payload, "holiday.jpg", &target).await.unwrap();
        assert_eq!(first, dir.path().join("holiday.svg"));
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "<svg></svg>");

        let second = write_result(&payload, "holiday.jpg", &target).await.unwrap();
        assert_eq!(second, dir.path().join("holiday_1.svg"));
    }

    #[tokio::test]
    async fn test_raster_result_to_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let payload = ResultPayload::Raster {
            bytes: bytes.clone(),
            format: ImageFormat::Png,
        };
        let path = dir.path().join("nested").join("out.png");

        let written = write_result(&payload, "ignored.jpg", &ExportTarget::File(path.clone()))
            .await
            .unwrap();
        assert_eq!(written, path);
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_shareable_copy_keeps_extension() {
        let payload = ResultPayload::Vector("<svg/>".to_string());
        let path = write_shareable(&payload).await.unwrap();

        assert_eq!(path.extension().unwrap(), "svg");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<svg/>");
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_export_age_saturates() {
        assert_eq!(max_export_age(2), Duration::from_secs(2 * 86_400));
        assert_eq!(max_export_age(u64::MAX / 1000), Duration::from_secs(u64::MAX));
        assert_eq!(cleanup_exports(u64::MAX).unwrap(), 0);
    }

    #[test]
    fn test_default_export_dir_prefers_config() {
        let config = ClientConfig {
            output_dir: Some(PathBuf::from("/srv/vecpic")),
            ..ClientConfig::default()
        };
        assert_eq!(
            default_export_dir(&config).unwrap(),
            PathBuf::from("/srv/vecpic")
        );
    }
}
