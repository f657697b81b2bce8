use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::{AppError, AppResult};

const APP_DIR_NAME: &str = "VecPic";
const MAX_FILE_SIZE_LIMIT_MB: u64 = 1024;

/// How a 200 response body is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Body is raw image bytes (PNG, JPEG, ...)
    Raster,
    /// Body is UTF-8 vector markup (SVG)
    Vector,
    /// Decide from the response Content-Type
    Auto,
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseMode::Raster => "raster",
            ResponseMode::Vector => "vector",
            ResponseMode::Auto => "auto",
        };
        f.write_str(name)
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raster" => Ok(ResponseMode::Raster),
            "vector" | "svg" => Ok(ResponseMode::Vector),
            "auto" => Ok(ResponseMode::Auto),
            other => Err(format!(
                "unknown response mode '{}', expected raster, vector or auto",
                other
            )),
        }
    }
}

/// A processing mode accepted by the backend, always one of the configured presets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Preset(String);

impl Preset {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: String,
    pub file_field: String,
    pub preset_field: String,
    /// Redundant filename field some servers read; `None` leaves it out
    pub filename_field: Option<String>,
    pub presets: Vec<String>,
    pub default_preset: String,
    pub response_mode: ResponseMode,
    pub timeout_secs: u64,
    pub max_file_size_mb: u64,
    pub valid_extensions: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000/vecpic".to_string(),
            file_field: "file".to_string(),
            preset_field: "colormode".to_string(),
            filename_field: Some("filename".to_string()),
            presets: vec!["color".to_string(), "binary".to_string()],
            default_preset: "color".to_string(),
            response_mode: ResponseMode::Vector,
            timeout_secs: 120,
            max_file_size_mb: 25,
            valid_extensions: vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()],
            output_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Look up a configured preset by name.
    pub fn preset(&self, name: &str) -> AppResult<Preset> {
        let trimmed = name.trim();
        self.presets
            .iter()
            .find(|p| p.as_str() == trimmed)
            .map(|p| Preset(p.clone()))
            .ok_or_else(|| {
                AppError::validation(
                    "preset",
                    &format!(
                        "'{}' is not one of the configured presets ({})",
                        trimmed,
                        self.presets.join(", ")
                    ),
                )
            })
    }

    pub fn default_preset(&self) -> AppResult<Preset> {
        self.preset(&self.default_preset)
    }

    /// Verbosity to apply once the config is known; unknown names fall back to info.
    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

pub fn get_config_path() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join(APP_DIR_NAME);

    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("config.json"))
}

pub fn load_config() -> AppResult<ClientConfig> {
    load_config_from(&get_config_path()?)
}

/// Load a config file, writing the defaults there first if it does not exist yet.
pub fn load_config_from(config_path: &Path) -> AppResult<ClientConfig> {
    if config_path.exists() {
        let config_str = fs::read_to_string(config_path)?;
        let config: ClientConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
            log::warn!("Failed to parse config file: {}. Using defaults.", e);
            ClientConfig::default()
        });

        validate_config(&config)?;
        Ok(config)
    } else {
        let default_config = ClientConfig::default();
        save_config_to(&default_config, config_path)?;
        Ok(default_config)
    }
}

pub fn save_config_to(config: &ClientConfig, config_path: &Path) -> AppResult<()> {
    validate_config(config)?;

    if config_path.exists() {
        let backup_path = config_path.with_extension("json.bak");
        if let Err(e) = fs::copy(config_path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(config_path, config_str)?;

    log::info!("Configuration saved to {}", config_path.display());
    Ok(())
}

pub fn get_temp_directory() -> AppResult<PathBuf> {
    let temp_dir = std::env::temp_dir().join("vecpic");
    fs::create_dir_all(&temp_dir)?;
    Ok(temp_dir)
}

pub fn validate_config(config: &ClientConfig) -> AppResult<()> {
    crate::security::InputValidator::validate_endpoint(&config.endpoint)?;

    if config.file_field.trim().is_empty() {
        return Err(AppError::validation("file_field", "Must not be empty"));
    }

    if config.preset_field.trim().is_empty() {
        return Err(AppError::validation("preset_field", "Must not be empty"));
    }

    if let Some(field) = &config.filename_field {
        if field.trim().is_empty() {
            return Err(AppError::validation(
                "filename_field",
                "Must not be empty when set",
            ));
        }
    }

    if config.presets.is_empty() {
        return Err(AppError::validation("presets", "At least one preset is required"));
    }

    for (i, preset) in config.presets.iter().enumerate() {
        if preset.trim().is_empty() {
            return Err(AppError::validation("presets", "Preset names must not be empty"));
        }
        if config.presets[..i].contains(preset) {
            return Err(AppError::validation("presets", "Preset names must be unique"));
        }
    }

    if !config.presets.contains(&config.default_preset) {
        return Err(AppError::validation(
            "default_preset",
            "Must be one of the configured presets",
        ));
    }

    if config.timeout_secs == 0 || config.timeout_secs > 600 {
        return Err(AppError::validation("timeout_secs", "Must be between 1 and 600"));
    }

    if config.max_file_size_mb == 0 || config.max_file_size_mb > MAX_FILE_SIZE_LIMIT_MB {
        return Err(AppError::validation(
            "max_file_size_mb",
            &format!("Must be between 1 and {}", MAX_FILE_SIZE_LIMIT_MB),
        ));
    }

    if config.valid_extensions.is_empty() {
        return Err(AppError::validation(
            "valid_extensions",
            "At least one extension is required",
        ));
    }

    let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}

// Reset configuration to defaults
pub fn reset_config_at(config_path: &Path) -> AppResult<()> {
    if config_path.exists() {
        let backup_path = config_path.with_extension("json.reset_backup");
        fs::copy(config_path, &backup_path)?;
        log::info!("Existing config backed up to {}", backup_path.display());
    }

    save_config_to(&ClientConfig::default(), config_path)?;

    log::info!("Configuration reset to defaults");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.default_preset().unwrap().as_str(), "color");
    }

    #[test]
    fn test_preset_lookup() {
        let config = ClientConfig {
            presets: vec!["bw".into(), "poster".into(), "photo".into()],
            default_preset: "poster".into(),
            ..ClientConfig::default()
        };

        assert!(validate_config(&config).is_ok());
        assert_eq!(config.preset(" photo ").unwrap().as_str(), "photo");
        assert!(matches!(
            config.preset("color"),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ClientConfig {
            default_preset: "sepia".into(),
            ..ClientConfig::default()
        };
        assert!(validate_config(&config).is_err());

        config.default_preset = "color".into();
        config.presets.push("color".into());
        assert!(validate_config(&config).is_err());

        config = ClientConfig {
            endpoint: "ftp://example.com/vecpic".into(),
            ..ClientConfig::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(AppError::InvalidEndpoint { .. })
        ));

        config = ClientConfig {
            timeout_secs: 0,
            ..ClientConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_size_limit_is_bounded() {
        let mut config = ClientConfig {
            max_file_size_mb: 1024,
            ..ClientConfig::default()
        };
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.max_file_size_bytes(), 1024 * 1024 * 1024);

        config.max_file_size_mb = u64::MAX / 1024;
        assert!(matches!(
            validate_config(&config),
            Err(AppError::Validation { .. })
        ));
        assert_eq!(config.max_file_size_bytes(), u64::MAX);
    }

    #[test]
    fn test_log_level_filter() {
        let mut config = ClientConfig::default();
        assert_eq!(config.log_level_filter(), log::LevelFilter::Info);

        config.log_level = "debug".into();
        assert_eq!(config.log_level_filter(), log::LevelFilter::Debug);

        config.log_level = "chatty".into();
        assert_eq!(config.log_level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn test_response_mode_parsing() {
        assert_eq!("SVG".parse::<ResponseMode>(), Ok(ResponseMode::Vector));
        assert_eq!("raster".parse::<ResponseMode>(), Ok(ResponseMode::Raster));
        assert!("pdf".parse::<ResponseMode>().is_err());
        assert_eq!(ResponseMode::Auto.to_string(), "auto");
    }

    #[test]
    fn test_load_creates_defaults_and_save_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let loaded = load_config_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(loaded.endpoint, ClientConfig::default().endpoint);

        let updated = ClientConfig {
            response_mode: ResponseMode::Raster,
            ..loaded
        };
        save_config_to(&updated, &path).unwrap();
        assert!(path.with_extension("json.bak").exists());

        let reloaded = load_config_from(&path).unwrap();
        assert_eq!(reloaded.response_mode, ResponseMode::Raster);

        reset_config_at(&path).unwrap();
        assert_eq!(
            load_config_from(&path).unwrap().response_mode,
            ResponseMode::Vector
        );
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"endpoint": "https://vec.example.com/api/convert"}"#).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.endpoint, "https://vec.example.com/api/convert");
        assert_eq!(config.preset_field, "colormode");
    }
}
