use std::env;
use std::path::{Path, PathBuf};
use tracing::Level;

use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 32 * 1024 * 1024;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    /// Root for the face cascade lookup and the default storage folders
    pub base_dir: PathBuf,
    pub upload_folder: PathBuf,
    pub results_folder: PathBuf,
    /// Request body limit in bytes
    pub max_content_length: usize,
    /// Scheme and authority used for absolute result URLs instead of the Host header
    pub public_base_url: Option<String>,
}

impl Config {
    /// Load `.env` if present, read the environment, validate
    pub fn new() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();

        let config = Self::from_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Self {
        let base_dir = env::var("BASE_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = Self::with_base_dir(base_dir);
        config.host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        config.port = env::var("PORT")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);
        config.debug = env::var("DEBUG")
            .map(|s| parse_flag(&s))
            .unwrap_or(true);
        if let Ok(dir) = env::var("UPLOAD_FOLDER") {
            config.upload_folder = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("RESULTS_FOLDER") {
            config.results_folder = PathBuf::from(dir);
        }
        config.max_content_length = env::var("MAX_CONTENT_LENGTH")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_MAX_CONTENT_LENGTH);
        config.public_base_url = env::var("PUBLIC_BASE_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());
        config
    }

    /// Defaults rooted at `base_dir`, without touching the environment
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            debug: true,
            upload_folder: base_dir.join("uploads"),
            results_folder: base_dir.join("results"),
            base_dir,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            public_base_url: None,
        }
    }

    /// Point the base directory somewhere else, moving the default folders with it
    pub fn rebase(&mut self, base_dir: impl Into<PathBuf>) {
        let base_dir = base_dir.into();
        if self.upload_folder == self.base_dir.join("uploads") {
            self.upload_folder = base_dir.join("uploads");
        }
        if self.results_folder == self.base_dir.join("results") {
            self.results_folder = base_dir.join("results");
        }
        self.base_dir = base_dir;
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.max_content_length == 0 {
            return Err(ConfigError::InvalidContentLength(self.max_content_length));
        }
        Ok(())
    }

    /// Create the upload and result folders
    pub fn ensure_directories(&self) -> ConfigResult<()> {
        for dir in [&self.upload_folder, &self.results_folder] {
            create_dir(dir)?;
        }
        Ok(())
    }

    pub fn log_level(&self) -> Level {
        if self.debug {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn create_dir(path: &Path) -> ConfigResult<()> {
    std::fs::create_dir_all(path).map_err(|source| ConfigError::DirectoryCreationFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// `1`, `true`, `yes` and `on` (any case) enable a flag
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
