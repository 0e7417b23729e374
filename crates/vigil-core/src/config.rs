//! Engine configuration, injected at construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{EngineError, Result};

/// ntfy push notification settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NtfyConfig {
    /// Server base URL.
    #[serde(default = "default_ntfy_server")]
    pub server: String,

    /// Topic to publish to.
    pub topic: String,

    /// Optional URL opened when the notification is clicked.
    #[serde(default)]
    pub click: Option<String>,
}

fn default_ntfy_server() -> String {
    "https://ntfy.sh".to_string()
}

impl NtfyConfig {
    pub fn new(topic: &str) -> Self {
        NtfyConfig {
            server: default_ntfy_server(),
            topic: topic.to_string(),
            click: None,
        }
    }

    /// Build from `VIGIL_NTFY_TOPIC` / `VIGIL_NTFY_SERVER`. `None` when no topic is set.
    pub fn from_env() -> Option<Self> {
        let topic = std::env::var("VIGIL_NTFY_TOPIC").ok()?;
        if topic.trim().is_empty() {
            return None;
        }
        let server = std::env::var("VIGIL_NTFY_SERVER").unwrap_or_else(|_| default_ntfy_server());
        Some(NtfyConfig {
            server,
            topic,
            click: None,
        })
    }

    /// Full publish URL.
    pub fn url(&self) -> String {
        format!("{}/{}", self.server.trim_end_matches('/'), self.topic)
    }
}

/// Configuration for one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory the stages run in.
    pub project_root: PathBuf,

    /// Where attempt logs, gate logs, reports and the lock file live.
    pub audit_dir: PathBuf,

    /// Maximum remediation rounds per invocation.
    pub max_fix_attempts: u32,

    /// Per-stage timeout.
    pub stage_timeout_secs: u64,

    /// Cap on issues extracted from one stage outcome.
    pub max_issues_per_stage: usize,

    /// Run the stages of one verification pass concurrently.
    pub parallel_stages: bool,

    /// Upper bound on a single notification delivery.
    pub notification_timeout_secs: u64,

    pub ntfy: Option<NtfyConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            project_root: PathBuf::from("."),
            audit_dir: PathBuf::from(".vigil"),
            max_fix_attempts: 3,
            stage_timeout_secs: 60,
            max_issues_per_stage: 10,
            parallel_stages: false,
            notification_timeout_secs: 5,
            ntfy: None,
        }
    }
}

impl EngineConfig {
    /// Config rooted at `project_root`, with the audit dir inside it.
    pub fn for_project(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let audit_dir = project_root.join(".vigil");
        EngineConfig {
            project_root,
            audit_dir,
            ..Default::default()
        }
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_fix_attempts(mut self, n: u32) -> Self {
        self.max_fix_attempts = n;
        self
    }

    pub fn with_audit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.audit_dir = dir.into();
        self
    }

    pub fn with_parallel_stages(mut self, parallel: bool) -> Self {
        self.parallel_stages = parallel;
        self
    }

    pub fn with_stage_timeout_secs(mut self, secs: u64) -> Self {
        self.stage_timeout_secs = secs;
        self
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_fix_attempts < 1 {
            return Err(EngineError::InvalidConfig(
                "max_fix_attempts must be at least 1".to_string(),
            ));
        }
        if self.stage_timeout_secs < 1 {
            return Err(EngineError::InvalidConfig(
                "stage_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.max_issues_per_stage < 1 {
            return Err(EngineError::InvalidConfig(
                "max_issues_per_stage must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
