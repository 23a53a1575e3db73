//! Orchestrator configuration stored in `autodev.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Orchestrator configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable
/// and automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Number of parallel workers for the task runner.
    pub workers: usize,

    /// Base branch for the merge loop. Detected (`main`/`master`) when
    /// empty.
    pub base_branch: String,

    /// Directory for the run log and per-task feedback logs.
    pub log_dir: String,

    /// Directory for completed/failed task archives.
    pub archive_dir: String,

    pub guard: GuardConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GuardConfig {
    /// Path prefixes (relative to the project root) no operation may
    /// target. The tasks file is always guarded in addition to these.
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Model name; `OPENAI_MODEL` overrides at runtime.
    pub model: String,
    /// API base URL; `OPENAI_BASE_URL` overrides. Empty means the
    /// provider default.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Upper bound on model output tokens.
    pub max_output_tokens: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            paths: vec![
                "autodev.toml".to_string(),
                "logs".to_string(),
                "archive".to_string(),
                ".git".to_string(),
            ],
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: String::new(),
            timeout_secs: 120,
            max_output_tokens: 3000,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            base_branch: String::new(),
            log_dir: "logs".to_string(),
            archive_dir: "archive".to_string(),
            guard: GuardConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(anyhow!("workers must be > 0"));
        }
        if self.gateway.timeout_secs == 0 {
            return Err(anyhow!("gateway.timeout_secs must be > 0"));
        }
        if self.gateway.model.trim().is_empty() {
            return Err(anyhow!("gateway.model must not be empty"));
        }
        if self.log_dir.trim().is_empty() || self.archive_dir.trim().is_empty() {
            return Err(anyhow!("log_dir and archive_dir must not be empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
