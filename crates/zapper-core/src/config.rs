use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::PathBuf;

/// How MIME types are determined for hashed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDetectorKind {
    /// Shell out to `file -b --mime-type`.
    File,
    /// Guess from the file extension.
    Extension,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub debug: bool,
    pub log_file_path: String,
    pub db_path: String,
    pub zap_data_path: String,
    pub batch_size: usize,
    pub max_concurrent_file_operations: usize,
    pub file_names_to_ignore: Vec<String>,
    pub folder_names_to_ignore: Vec<String>,
    pub type_detector: TypeDetectorKind,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_file_path: "./logs/zapper.log".to_string(),
            db_path: "zapper.db".to_string(),
            zap_data_path: "./zap".to_string(),
            batch_size: 1000,
            max_concurrent_file_operations: 8,
            file_names_to_ignore: vec![".DS_Store".to_string()],
            folder_names_to_ignore: Vec::new(),
            type_detector: TypeDetectorKind::File,
        }
    }
}

impl AppConfig {
    pub fn is_file_ignored(&self, name: &str) -> bool {
        self.file_names_to_ignore.iter().any(|n| n == name)
    }

    pub fn is_folder_ignored(&self, name: &str) -> bool {
        self.folder_names_to_ignore.iter().any(|n| n == name)
    }

    pub fn zap_data_path(&self) -> PathBuf {
        PathBuf::from(&self.zap_data_path)
    }

    /// Batch size and concurrency of zero would stall every stage.
    fn normalized(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.max_concurrent_file_operations = self.max_concurrent_file_operations.max(1);
        self
    }
}

/// Load `config.{yaml,toml,json}` from the working directory if present, then
/// `ZAPPER_*` environment variables, over the built-in defaults.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let defaults = AppConfig::default();
    let builder = Config::builder()
        .set_default("debug", defaults.debug)?
        .set_default("log_file_path", defaults.log_file_path)?
        .set_default("db_path", defaults.db_path)?
        .set_default("zap_data_path", defaults.zap_data_path)?
        .set_default("batch_size", defaults.batch_size as i64)?
        .set_default(
            "max_concurrent_file_operations",
            defaults.max_concurrent_file_operations as i64,
        )?
        .set_default("file_names_to_ignore", defaults.file_names_to_ignore)?
        .set_default("folder_names_to_ignore", defaults.folder_names_to_ignore)?
        .set_default("type_detector", "file")?
        .add_source(ConfigFile::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("ZAPPER")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("file_names_to_ignore")
                .with_list_parse_key("folder_names_to_ignore"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>().map(AppConfig::normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_lists_match_exact_names() {
        let config = AppConfig {
            file_names_to_ignore: vec![".DS_Store".to_string(), "Thumbs.db".to_string()],
            folder_names_to_ignore: vec![".git".to_string()],
            ..AppConfig::default()
        };
        assert!(config.is_file_ignored(".DS_Store"));
        assert!(config.is_file_ignored("Thumbs.db"));
        assert!(!config.is_file_ignored("thumbs.db"));
        assert!(config.is_folder_ignored(".git"));
        assert!(!config.is_folder_ignored(".github"));
    }

    #[test]
    fn test_normalized_clamps_zero_values() {
        let config = AppConfig {
            batch_size: 0,
            max_concurrent_file_operations: 0,
            ..AppConfig::default()
        }
        .normalized();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_concurrent_file_operations, 1);
    }
}
