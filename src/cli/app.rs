use anyhow::Result;
use std::path::Path;
use tracing::{info, debug};

use crate::config::Config;
use crate::error::{TaskScopeResult, TaskScopeError};

use super::commands::{self, Commands};

/// The main application struct
pub struct App {
    config: Option<Config>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Create a new application instance
    pub fn new() -> Self {
        Self {
            config: None,
        }
    }

    /// Load configuration from `config_path` or the default locations
    pub fn initialize_with_config(&mut self, config_path: Option<&Path>) -> TaskScopeResult<()> {
        let config = Config::load(config_path)?;
        debug!("Loaded configuration: {:?}", config);
        self.config = Some(config);
        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> TaskScopeResult<&Config> {
        self.config.as_ref().ok_or_else(|| TaskScopeError::ConfigError("Application configuration not loaded".to_string()))
    }

    /// Execute one command against the loaded configuration
    pub async fn run_command(&mut self, command: &Commands) -> Result<()> {
        let config = self.config.as_mut()
            .ok_or_else(|| TaskScopeError::ConfigError("Application configuration not loaded".to_string()))?;

        info!("Starting taskscope v{}", env!("CARGO_PKG_VERSION"));
        commands::execute_command(command, config).await
    }
}
