//! Best-effort notifications, sent only after the report is finalized.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::NtfyConfig;
use crate::domain::RemediationStatus;
use crate::obs;
use crate::report::RemediationReport;

/// ntfy priority levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Min,
    Low,
    Default,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Min => "min",
            Priority::Low => "low",
            Priority::Default => "default",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub tags: Vec<String>,
}

impl Notification {
    /// The notification for a finished remediation, if any.
    ///
    /// A first pass that was already clean sends nothing.
    pub fn for_report(report: &RemediationReport) -> Option<Self> {
        match report.status {
            RemediationStatus::Verified => None,
            RemediationStatus::AllFixed => Some(Self {
                title: "Auto-Fix: Success".to_string(),
                body: format!(
                    "All issues fixed automatically!\nFixed: {} issues\nStages: all passing",
                    report.fixed_count
                ),
                priority: Priority::Low,
                tags: tags(&["test", "autofix", "success"]),
            }),
            RemediationStatus::PartiallyFixed if report.fixed_count > 0 => Some(Self {
                title: "Auto-Fix: Partial".to_string(),
                body: format!(
                    "Partial auto-fix completed\nFixed: {} issues\nRemaining: {} issues\nManual intervention required",
                    report.fixed_count, report.remaining_count
                ),
                priority: Priority::Default,
                tags: tags(&["test", "autofix", "partial"]),
            }),
            RemediationStatus::PartiallyFixed => {
                let mut body = format!(
                    "Checks failed - manual fixes needed\nFailures: {}\n",
                    report.remaining_count
                );
                for issue in report.residual_issues.iter().filter(|i| i.file.is_some()).take(3) {
                    let file = issue.file.as_deref().unwrap_or_default();
                    let message: String = issue.message.chars().take(50).collect();
                    body.push_str(&format!("- {}: {}\n", file, message));
                }
                Some(Self {
                    title: "Auto-Fix: Manual Required".to_string(),
                    body,
                    priority: Priority::High,
                    tags: tags(&["test", "failure"]),
                })
            }
        }
    }

    /// Header-safe title and the body to send with it. A non-ASCII title is
    /// moved into the body and stripped down to its ASCII characters.
    pub fn ascii_parts(&self) -> (String, String) {
        if self.title.is_ascii() {
            return (self.title.clone(), self.body.clone());
        }
        let stripped: String = self.title.chars().filter(char::is_ascii).collect();
        let stripped = stripped.trim();
        let title = if stripped.is_empty() {
            "Vigil Notification".to_string()
        } else {
            stripped.to_string()
        };
        (title, format!("{}\n\n{}", self.title, self.body))
    }
}

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

/// Somewhere notifications go.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl NotificationSink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    async fn send(&self, _notification: &Notification) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Publishes to an ntfy topic over HTTP.
pub struct NtfySink {
    config: NtfyConfig,
    http_client: reqwest::Client,
}

impl NtfySink {
    pub fn new(config: NtfyConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl NotificationSink for NtfySink {
    fn name(&self) -> &str {
        "ntfy"
    }

    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        let (title, body) = notification.ascii_parts();
        let mut request = self
            .http_client
            .post(self.config.url())
            .header("Title", title)
            .header("Priority", notification.priority.as_str())
            .body(body);
        if !notification.tags.is_empty() {
            request = request.header("Tags", notification.tags.join(","));
        }
        if let Some(click) = &self.config.click {
            request = request.header("Click", click.as_str());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("ntfy returned {}", response.status());
        }
        Ok(())
    }
}

/// Send with a timeout, logging and swallowing every failure.
pub async fn notify_best_effort(sink: &dyn NotificationSink, notification: &Notification, timeout: Duration) {
    match tokio::time::timeout(timeout, sink.send(notification)).await {
        Ok(Ok(())) => tracing::debug!(sink = sink.name(), title = %notification.title, "notification sent"),
        Ok(Err(e)) => obs::emit_notification_dropped(sink.name(), &e),
        Err(_) => obs::emit_notification_dropped(sink.name(), &"timed out"),
    }
}
