//! Configuration management for TextPress.
//!
//! Parses `textpress.toml` with serde and discovers the file in the current
//! directory or its parents.
//!
//! ```toml
//! [markup]
//! default_parser = "default"
//! comment_parser = "comment"
//! optimize = true
//! paragraph_containers = ["div", "blockquote"]
//!
//! [cache]
//! enabled = true
//! dir = ".textpress/cache"
//! ```
//!
//! `cache.dir` may reference environment variables (`$VAR`, `${VAR}`,
//! `${VAR:-default}`) or start with `~`, and is resolved against the
//! directory holding the config file.

mod cache_dir;

use serde::Deserialize;
use std::path::{Path, PathBuf};

use cache_dir::DEFAULT_CACHE_DIR;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "textpress.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Markup pipeline settings.
    pub markup: MarkupConfig,
    /// Cache settings as written in the file.
    cache: CacheConfigRaw,

    /// Resolved cache configuration (set after loading).
    #[serde(skip)]
    pub cache_resolved: CacheConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Markup pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MarkupConfig {
    /// Parser used for posts and pages when none is given.
    pub default_parser: String,
    /// Parser used for comments.
    pub comment_parser: String,
    /// Whether parsed trees are collapsed into static HTML when possible.
    pub optimize: bool,
    /// Containers the `autoparagraph` parser splits into paragraphs.
    pub paragraph_containers: Vec<String>,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            default_parser: "default".to_owned(),
            comment_parser: "comment".to_owned(),
            optimize: true,
            paragraph_containers: vec!["div".to_owned(), "blockquote".to_owned()],
        }
    }
}

impl MarkupConfig {
    /// Reset `key` to its default value. Returns `false` for unknown keys.
    pub fn revert_to_default(&mut self, key: &str) -> bool {
        let defaults = Self::default();
        match key {
            "default_parser" => self.default_parser = defaults.default_parser,
            "comment_parser" => self.comment_parser = defaults.comment_parser,
            "optimize" => self.optimize = defaults.optimize,
            "paragraph_containers" => self.paragraph_containers = defaults.paragraph_containers,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CacheConfigRaw {
    enabled: Option<bool>,
    dir: Option<String>,
}

/// Resolved cache configuration with an absolute directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Whether rendered markup is cached.
    pub enabled: bool,
    /// Cache directory.
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`cache.dir`").
        field: String,
        /// Error message (e.g., "${`CACHE_ROOT`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise
    /// searches for `textpress.toml` in the current directory and parents,
    /// falling back to defaults relative to the current directory.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)
        } else {
            Ok(Self::default_with_cwd())
        }
    }

    /// Parse configuration text, resolving relative paths against
    /// `config_dir`.
    pub fn from_toml_str(content: &str, config_dir: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.resolve(config_dir)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.markup.default_parser, "markup.default_parser")?;
        require_non_empty(&self.markup.comment_parser, "markup.comment_parser")?;
        if self.markup.paragraph_containers.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "markup.paragraph_containers cannot contain empty names".to_owned(),
            ));
        }
        if self.cache_resolved.dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation("cache.dir cannot be empty".to_owned()));
        }
        Ok(())
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::discover_from(&current)
    }

    fn discover_from(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILENAME))
            .find(|candidate| candidate.exists())
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            markup: MarkupConfig::default(),
            cache: CacheConfigRaw::default(),
            cache_resolved: CacheConfig {
                enabled: true,
                dir: base.join(DEFAULT_CACHE_DIR),
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config_dir = path.parent().unwrap_or(Path::new("."));
        let mut config = Self::from_toml_str(&content, config_dir)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn resolve(&mut self, config_dir: &Path) -> Result<(), ConfigError> {
        self.cache_resolved = CacheConfig {
            enabled: self.cache.enabled.unwrap_or(true),
            dir: cache_dir::resolve(self.cache.dir.as_deref(), config_dir)?,
        };
        Ok(())
    }
}
