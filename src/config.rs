//! Loader configuration: where input images live.
//!
//! Read from `comfy_meta_link.yaml` → `.yml` → `.json` in the config directory,
//! then overridden by `COMFY_META_INPUT_DIR` when set. Unreadable or invalid
//! files fall back to defaults.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

const CONFIG_FILE_STEM: &str = "comfy_meta_link";
pub const INPUT_DIR_ENV: &str = "COMFY_META_INPUT_DIR";
const DEFAULT_INPUT_DIR: &str = "input";
/// Suffix hosts append to names of files in the managed input folder.
const INPUT_ANNOTATION: &str = " [input]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from(DEFAULT_INPUT_DIR)
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
        }
    }
}

impl LoaderConfig {
    pub fn with_input_dir(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
        }
    }

    /// Loads the config file from `config_dir` and applies the environment override.
    pub fn load(config_dir: &Path) -> Self {
        let config = read_config(config_dir).unwrap_or_default();
        config.with_env_override(std::env::var_os(INPUT_DIR_ENV))
    }

    fn with_env_override(mut self, input_dir: Option<OsString>) -> Self {
        if let Some(input_dir) = input_dir.filter(|value| !value.is_empty()) {
            self.input_dir = PathBuf::from(input_dir);
        }
        self
    }

    /// Resolves an input name (optionally annotated with ` [input]`) to a path.
    pub fn annotated_path(&self, name: &str) -> PathBuf {
        let name = name.strip_suffix(INPUT_ANNOTATION).unwrap_or(name);
        self.input_dir.join(name)
    }

    pub fn annotated_path_exists(&self, name: &str) -> bool {
        self.annotated_path(name).is_file()
    }
}

fn read_config(config_dir: &Path) -> Option<LoaderConfig> {
    for ext in &["yaml", "yml", "json"] {
        let path = config_dir.join(format!("{}.{}", CONFIG_FILE_STEM, ext));
        if path.exists() {
            return read_config_file(&path);
        }
    }
    None
}

fn read_config_file(path: &Path) -> Option<LoaderConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) => {
            log::warn!("Failed to read config {}: {}", path.display(), error);
            return None;
        }
    };

    let parsed: Result<LoaderConfig, String> = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| e.to_string()),
        _ => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
    };

    match parsed {
        Ok(config) => Some(config),
        Err(error) => {
            log::warn!("Ignoring invalid config {}: {}", path.display(), error);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_config_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "comfy_meta_link_config_{}_{}",
            label,
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_reads_yaml_before_json() {
        let dir = temp_config_dir("yaml");
        fs::write(dir.join("comfy_meta_link.yaml"), "input_dir: /data/yaml-inputs\n").unwrap();
        fs::write(
            dir.join("comfy_meta_link.json"),
            r#"{"input_dir":"/data/json-inputs"}"#,
        )
        .unwrap();

        let config = read_config(&dir).expect("should read yaml config");
        assert_eq!(config.input_dir, PathBuf::from("/data/yaml-inputs"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_json_fallback_and_missing_fields() {
        let dir = temp_config_dir("json");
        fs::write(dir.join("comfy_meta_link.json"), "{}").unwrap();

        let config = read_config(&dir).expect("should read json config");
        assert_eq!(config, LoaderConfig::default());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_config_falls_back_to_none() {
        let dir = temp_config_dir("invalid");
        fs::write(dir.join("comfy_meta_link.yml"), "input_dir: [unterminated").unwrap();

        assert!(read_config(&dir).is_none());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_env_override_replaces_input_dir() {
        let config = LoaderConfig::with_input_dir("/from/file")
            .with_env_override(Some(OsString::from("/from/env")));
        assert_eq!(config.input_dir, PathBuf::from("/from/env"));

        let config =
            LoaderConfig::with_input_dir("/from/file").with_env_override(Some(OsString::new()));
        assert_eq!(config.input_dir, PathBuf::from("/from/file"));

        let config = LoaderConfig::with_input_dir("/from/file").with_env_override(None);
        assert_eq!(config.input_dir, PathBuf::from("/from/file"));
    }

    #[test]
    fn test_annotated_path_strips_input_suffix() {
        let config = LoaderConfig::with_input_dir("/inputs");
        assert_eq!(
            config.annotated_path("photo.png [input]"),
            PathBuf::from("/inputs/photo.png")
        );
        assert_eq!(
            config.annotated_path("photo.png"),
            PathBuf::from("/inputs/photo.png")
        );
    }
}
