//! Invocation payload and session helpers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::Stage;
use crate::strategy::StrategyProfile;

/// One tool call from the session that triggered the invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolUse {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// What the caller hands the engine. camelCase on the wire, snake_case accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InvocationPayload {
    #[serde(alias = "project_root", default)]
    pub project_root: Option<PathBuf>,

    /// Empty means "ask the profile resolver".
    #[serde(alias = "stage_config", default)]
    pub stage_config: Vec<Stage>,

    /// Utterance to check for a completion signal (gate only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,

    /// Overrides profile detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<StrategyProfile>,

    #[serde(alias = "session_id", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(alias = "tools_used", default)]
    pub tools_used: Vec<ToolUse>,
}

impl InvocationPayload {
    pub fn from_json(raw: &str) -> crate::domain::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

const EDITING_TOOLS: [&str; 3] = ["Edit", "MultiEdit", "Write"];

/// Unique `file_path` params of editing tool calls, in first-seen order.
pub fn changed_files(tools_used: &[ToolUse]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for tool in tools_used.iter().filter(|t| EDITING_TOOLS.contains(&t.name.as_str())) {
        let Some(path) = tool.params.get("file_path").and_then(|v| v.as_str()) else {
            continue;
        };
        if !path.is_empty() && !files.iter().any(|f| f == path) {
            files.push(path.to_string());
        }
    }
    files
}
