use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::errors::{AppError, AppResult};

fn unsafe_filename_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid filename regex"))
}

pub struct InputValidator;

impl InputValidator {
    pub fn validate_endpoint(url: &str) -> AppResult<reqwest::Url> {
        let trimmed = url.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation("endpoint", "Endpoint URL cannot be empty"));
        }

        if trimmed.len() > 2048 {
            return Err(AppError::validation("endpoint", "Endpoint URL too long"));
        }

        let parsed = reqwest::Url::parse(trimmed).map_err(|e| {
            log::debug!("Endpoint {} failed to parse: {}", trimmed, e);
            AppError::invalid_endpoint(trimmed)
        })?;

        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(AppError::invalid_endpoint(trimmed));
        }

        Ok(parsed)
    }

    /// Checks a picked file before its bytes are read.
    pub fn validate_image_path(
        path: &Path,
        valid_extensions: &[String],
        max_size_bytes: u64,
    ) -> AppResult<()> {
        let display = path.to_string_lossy();

        if display.trim().is_empty() {
            return Err(AppError::validation("file_path", "File path cannot be empty"));
        }

        match path.extension() {
            Some(extension) => {
                let ext = extension.to_string_lossy().to_lowercase();
                if !valid_extensions.iter().any(|v| v.eq_ignore_ascii_case(&ext)) {
                    return Err(AppError::invalid_file_type(&display));
                }
            }
            None => {
                return Err(AppError::validation("file_path", "File must have an extension"));
            }
        }

        if !path.exists() {
            return Err(AppError::file_not_found(&display));
        }

        if !path.is_file() {
            return Err(AppError::validation("file_path", "Path is not a file"));
        }

        let size = FileSystemGuard::get_file_size(path)?;
        if size == 0 {
            return Err(AppError::validation("file_path", "File is empty"));
        }
        if size > max_size_bytes {
            return Err(AppError::file_too_large(
                &display,
                max_size_bytes / (1024 * 1024),
            ));
        }

        Ok(())
    }

    pub fn sanitize_filename(filename: &str) -> String {
        let sanitized = unsafe_filename_chars().replace_all(filename.trim(), "_");

        if sanitized.chars().count() > 255 {
            let truncated: String = sanitized.chars().take(252).collect();
            format!("{}...", truncated)
        } else {
            sanitized.to_string()
        }
    }
}

// File system helpers for exported results
pub struct FileSystemGuard;

impl FileSystemGuard {
    pub fn create_secure_temp_file(dir: &Path, extension: &str) -> AppResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let random_name = uuid::Uuid::new_v4().to_string();
        let extension = if extension.is_empty() { "tmp" } else { extension };

        Ok(dir.join(format!("{}.{}", random_name, extension)))
    }

    pub fn cleanup_old_files(directory: &Path, max_age: std::time::Duration) -> AppResult<usize> {
        if !directory.exists() {
            return Ok(0);
        }

        let cutoff_time = std::time::SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(std::time::UNIX_EPOCH);
        let mut removed = 0;

        for entry in std::fs::read_dir(directory)? {
            let entry = entry?;
            let path = entry.path();

            if !path.is_file() {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };

            if modified < cutoff_time {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::warn!("Failed to remove old file {}: {}", path.display(), e);
                } else {
                    log::debug!("Removed old file: {}", path.display());
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }

    pub fn get_file_size(path: &Path) -> AppResult<u64> {
        let metadata = std::fs::metadata(path)?;
        Ok(metadata.len())
    }
}
