// Configuration loading and parsing (config/wicket.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::stats::StatsRules;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "wicket.toml";

#[derive(Debug, Clone)]
pub struct Config {
    pub auction: AuctionConfig,
    pub animation: AnimationConfig,
    pub budget: StatsRules,
    pub roster: RosterConfig,
    pub db_path: String,
}

// ---------------------------------------------------------------------------
// wicket.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire wicket.toml file.
#[derive(Debug, Clone, Deserialize)]
struct WicketFile {
    auction: AuctionConfig,
    animation: AnimationConfig,
    #[serde(default)]
    budget: Option<StatsRules>,
    #[serde(default)]
    database: Option<DatabaseSection>,
    #[serde(default)]
    roster: Option<RosterConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuctionConfig {
    pub pool_size: u32,
    /// Fixed RNG seed; `None` seeds from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnimationConfig {
    pub tick_ms: u64,
    pub min_ticks: usize,
    pub max_ticks: usize,
}

impl AnimationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        AnimationConfig {
            tick_ms: 45,
            min_ticks: 12,
            max_ticks: 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterConfig {
    /// Base URL of the data API. Team stats are disabled when absent.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_team_gender")]
    pub team_gender: String,
    #[serde(default = "default_asset_extension")]
    pub asset_extension: String,
}

impl Default for RosterConfig {
    fn default() -> Self {
        RosterConfig {
            base_url: None,
            team_gender: default_team_gender(),
            asset_extension: default_asset_extension(),
        }
    }
}

fn default_team_gender() -> String {
    "male".into()
}

fn default_asset_extension() -> String {
    "png".into()
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/wicket.toml` relative to the
/// given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let file: WicketFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let db_path = match file.database {
        Some(section) => section.path,
        None => default_db_path(),
    };

    let config = Config {
        auction: file.auction,
        animation: file.animation,
        budget: file.budget.unwrap_or_default(),
        roster: file.roster.unwrap_or_default(),
        db_path,
    };

    validate(&config)?;

    Ok(config)
}

/// Copy every file in `defaults/` that has no counterpart in `config/` yet.
/// Existing config files are never touched and `.example` files are skipped.
/// Returns the paths written.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.is_dir() {
        return if config_dir.is_dir() {
            Ok(Vec::new())
        } else {
            Err(copy_error(format!(
                "neither defaults/ nor config/ directory found in {}",
                base_dir.display()
            )))
        };
    }

    std::fs::create_dir_all(&config_dir)
        .map_err(|e| copy_error(format!("cannot create {}: {e}", config_dir.display())))?;

    let sources = std::fs::read_dir(&defaults_dir)
        .map_err(|e| copy_error(format!("cannot list {}: {e}", defaults_dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) != Some("example"));

    let mut copied = Vec::new();
    for source in sources {
        let Some(name) = source.file_name() else {
            continue;
        };
        let target = config_dir.join(name);
        if target.exists() {
            continue;
        }
        std::fs::copy(&source, &target).map_err(|e| {
            copy_error(format!(
                "cannot copy {} to {}: {e}",
                source.display(),
                target.display()
            ))
        })?;
        copied.push(target);
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

/// Platform data directory when `[database]` is omitted, falling back to the
/// working directory.
fn default_db_path() -> String {
    directories::ProjectDirs::from("", "", "wicket")
        .map(|dirs| dirs.data_dir().join("wicket.db"))
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| "wicket.db".into())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn copy_error(message: String) -> ConfigError {
    ConfigError::DefaultsCopyError { message }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.auction.pool_size == 0 {
        return Err(invalid("auction.pool_size", "must be at least 1"));
    }

    let anim = &config.animation;
    if anim.tick_ms == 0 {
        return Err(invalid("animation.tick_ms", "must be at least 1"));
    }
    if anim.min_ticks == 0 {
        return Err(invalid("animation.min_ticks", "a reveal needs at least one frame"));
    }
    if anim.max_ticks < anim.min_ticks {
        return Err(invalid(
            "animation.max_ticks",
            format!("{} is below min_ticks ({})", anim.max_ticks, anim.min_ticks),
        ));
    }

    let budget = &config.budget;
    if budget.total_points <= 0 {
        return Err(invalid(
            "budget.total_points",
            format!("must be positive, got {}", budget.total_points),
        ));
    }
    if budget.required_players == 0 {
        return Err(invalid("budget.required_players", "must be at least 1"));
    }
    if budget.base_point < 0 {
        return Err(invalid(
            "budget.base_point",
            format!("cannot be negative, got {}", budget.base_point),
        ));
    }

    if config.db_path.trim().is_empty() {
        return Err(invalid("database.path", "must not be empty"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
