// src/config/mod.rs
mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;
use config::{Config as ConfigLoader, FileFormat};
use tracing::{info, warn, Level};

pub use schema::{Config, GlobalConfig, GroupConfig, ServiceConfig, UserConfig};

use crate::engine::{AsyncTaskGroup, TaskGroup};
use crate::error::{TaskScopeResult, TaskScopeError};

/// Centralized configuration handling
impl Config {
    /// Load configuration, layering built-in defaults, a user file and the environment
    pub fn load(config_path: Option<&Path>) -> TaskScopeResult<Self> {
        info!("Loading configuration");

        let mut config_builder = ConfigLoader::builder();

        // Default configuration
        config_builder = config_builder.add_source(
            config::File::from_str(
                include_str!("../../config/default.toml"),
                FileFormat::Toml
            )
        );

        // User-provided configuration
        if let Some(path) = config_path {
            if path.exists() {
                config_builder = config_builder.add_source(config::File::from(path));
                info!("Loading user configuration from: {}", path.display());
            } else {
                warn!("Specified configuration file not found: {}", path.display());
            }
        } else {
            let default_path = Self::get_default_config_path();
            if default_path.exists() {
                config_builder = config_builder.add_source(config::File::from(default_path.as_path()));
                info!("Loading default configuration from: {}", default_path.display());
            } else {
                info!("No existing configuration found, using built-in defaults");
            }
        }

        // Environment variables, e.g. TASKSCOPE__GROUP__MAX_CONCURRENCY=2
        config_builder = config_builder.add_source(
            config::Environment::with_prefix("TASKSCOPE").separator("__")
        );

        let config: Config = config_builder
            .build()
            .map_err(|e| TaskScopeError::ConfigError(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| TaskScopeError::ConfigError(format!("Failed to parse configuration: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration path
    pub fn get_default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".taskscope/config.toml")
    }

    /// Write the default configuration to the default location
    pub fn init(force: bool) -> TaskScopeResult<PathBuf> {
        let config_path = Self::get_default_config_path();
        Self::init_at(&config_path, force)?;
        Ok(config_path)
    }

    /// Write the default configuration to `config_path`
    pub fn init_at(config_path: &Path, force: bool) -> TaskScopeResult<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TaskScopeError::FileError {
                    path: parent.to_path_buf(),
                    message: format!("Failed to create directory: {}", e),
                })?;
        }

        if config_path.exists() && !force {
            return Err(TaskScopeError::ConfigError(
                format!("Configuration already exists at {}. Use --force to overwrite.", config_path.display())
            ));
        }

        Config::default().save(config_path)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> TaskScopeResult<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| TaskScopeError::SerializationError(format!("Failed to serialize configuration: {}", e)))?;

        std::fs::write(path, config_str)
            .map_err(|e| TaskScopeError::FileError {
                path: path.to_path_buf(),
                message: format!("Failed to write configuration: {}", e),
            })?;

        info!("Configuration saved to {}", path.display());

        Ok(())
    }

    /// Log level from `global.log_level`, falling back to INFO
    pub fn log_level(&self) -> Level {
        self.global.log_level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.global.log_level);
            Level::INFO
        })
    }

    /// A thread-backed group configured from `[group]`
    pub fn task_group<'a>(&self) -> TaskGroup<'a> {
        TaskGroup::new()
            .with_max_concurrency(self.group.max_concurrency)
            .with_unique_labels(self.group.unique_labels)
    }

    /// An async group configured from `[group]`
    pub fn async_task_group(&self) -> AsyncTaskGroup {
        let group = AsyncTaskGroup::new()
            .with_max_concurrency(self.group.max_concurrency)
            .with_unique_labels(self.group.unique_labels);

        match self.group.timeout_ms {
            Some(ms) => group.with_timeout(Duration::from_millis(ms)),
            None => group,
        }
    }
}
