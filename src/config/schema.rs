use serde::{Serialize, Deserialize};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub global: GlobalConfig,
    pub group: GroupConfig,
    pub service: ServiceConfig,
    pub user: UserConfig,
}

/// Global configuration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub log_level: String,
}

/// Task group defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub max_concurrency: usize,
    pub unique_labels: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Simulated service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub delay_ms: u64,
    pub names: Vec<String>,
    pub cooperative: bool,
}

/// Greeting demo settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    pub default_age: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: GlobalConfig {
                log_level: "info".to_string(),
            },
            group: GroupConfig {
                max_concurrency: 0,
                unique_labels: false,
                timeout_ms: None,
            },
            service: ServiceConfig {
                delay_ms: 1000,
                names: vec!["Service A".to_string(), "Service B".to_string()],
                cooperative: false,
            },
            user: UserConfig {
                default_age: 25,
            },
        }
    }
}
