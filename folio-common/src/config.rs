//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. A missing file is not
//! fatal: a warning is logged and built-in defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "FOLIO_ROOT_FOLDER";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5780;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and asset store
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Interface to bind the HTTP server to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally visible base URL, used for absolute image links in Markdown exports
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub image_api: ImageApiConfig,

    #[serde(default)]
    pub speech_api: SpeechApiConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Hosted identity provider used to validate bearer tokens
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Image generation API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageApiConfig {
    #[serde(default = "default_ai_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_image_model")]
    pub model: String,
}

/// Text-to-speech API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechApiConfig {
    #[serde(default = "default_ai_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_speech_model")]
    pub model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
}

/// Export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// pandoc binary used for DOCX conversion
    #[serde(default = "default_pandoc_path")]
    pub pandoc_path: PathBuf,

    /// Number of chunks covered by one image archive part
    #[serde(default = "default_images_per_archive")]
    pub images_per_archive: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_public_base_url() -> String {
    format!("http://127.0.0.1:{}", DEFAULT_PORT)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ai_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_speech_model() -> String {
    "tts-1".to_string()
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_pandoc_path() -> PathBuf {
    PathBuf::from("pandoc")
}

fn default_images_per_archive() -> usize {
    50
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ImageApiConfig {
    fn default() -> Self {
        Self {
            url: default_ai_url(),
            api_key: None,
            model: default_image_model(),
        }
    }
}

impl Default for SpeechApiConfig {
    fn default() -> Self {
        Self {
            url: default_ai_url(),
            api_key: None,
            model: default_speech_model(),
            voice: default_voice(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            pandoc_path: default_pandoc_path(),
            images_per_archive: default_images_per_archive(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_addr: default_bind_addr(),
            port: default_port(),
            public_base_url: default_public_base_url(),
            logging: LoggingConfig::default(),
            identity: IdentityConfig::default(),
            image_api: ImageApiConfig::default(),
            speech_api: SpeechApiConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from a file, falling back to defaults when it is missing
    ///
    /// A file that exists but fails to parse is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file not found at {}, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

/// Default configuration file path for the platform
///
/// `~/.config/folio/config.toml` on Linux, the platform config dir elsewhere.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("folio").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("folio.toml"))
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config `root_folder`
/// 4. OS-dependent default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("folio"))
        .unwrap_or_else(|| PathBuf::from("./folio_data"))
}

/// Resolve an API key: environment variable first, then the TOML value
///
/// Blank values count as absent.
pub fn resolve_api_key(env_var_name: &str, toml_value: Option<&str>) -> Option<String> {
    let from_env = std::env::var(env_var_name).ok().filter(|k| is_valid_key(k));
    if from_env.is_some() {
        info!("{} loaded from environment", env_var_name);
        return from_env;
    }

    toml_value.filter(|k| is_valid_key(k)).map(str::to_string)
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Directory layout below the root folder
#[derive(Debug, Clone)]
pub struct RootLayout {
    pub root: PathBuf,
}

impl RootLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the root folder if needed
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("folio.db")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }
}
