//! Runboard configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunboardConfig {
    /// Address the dashboard server listens on
    pub listen_addr: String,

    /// Path to the pre-generated test catalog (JSON)
    pub catalog_path: PathBuf,

    /// Maximum retained log entries before FIFO eviction
    pub log_capacity: usize,

    /// Seconds to wait after SIGTERM before SIGKILL on cancel
    pub grace_period_secs: u64,

    /// Test runner invocation
    pub runner: RunnerConfig,
}

/// Test runner invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl Default for RunboardConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            catalog_path: PathBuf::from("test-catalog.json"),
            log_capacity: 10_000,
            grace_period_secs: 5,
            runner: RunnerConfig {
                program: "npx".to_string(),
                args: vec!["playwright".to_string(), "test".to_string()],
                cwd: None,
                env: Vec::new(),
            },
        }
    }
}

impl RunboardConfig {
    /// Load configuration from file, falling back to defaults when the
    /// file does not exist
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
