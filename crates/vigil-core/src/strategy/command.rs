//! Strategies that shell out to a fixer tool.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use super::{Strategy, StrategyContext};
use crate::domain::Issue;

/// Runs command templates in order until one exits 0.
///
/// Templates may reference `{file}` (the issue's file, shell-quoted) and
/// `{module}` (parsed from "No module named 'x'"). A template whose
/// placeholder cannot be filled is skipped.
#[derive(Debug, Clone)]
pub struct CommandStrategy {
    name: String,
    commands: Vec<String>,
}

impl CommandStrategy {
    pub fn new<I, S>(name: impl Into<String>, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Project-wide auto-fixers tried when nothing kind-specific is registered.
    pub fn generic_fallback() -> Self {
        Self::new(
            "generic-fallback",
            [
                "npm run lint -- --fix",
                "ruff check --fix",
                "autopep8 --in-place --recursive .",
            ],
        )
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    fn render(&self, template: &str, issue: &Issue) -> Option<String> {
        let mut command = template.to_string();
        if command.contains("{file}") {
            let file = issue.file.as_deref()?;
            command = command.replace("{file}", &shell_quote(file));
        }
        if command.contains("{module}") {
            let module = missing_module(&issue.message)?;
            command = command.replace("{module}", &module);
        }
        Some(command)
    }
}

#[async_trait]
impl Strategy for CommandStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, issue: &Issue, ctx: &StrategyContext) -> anyhow::Result<bool> {
        for template in &self.commands {
            let Some(command) = self.render(template, issue) else {
                tracing::debug!(strategy = %self.name, template = %template, "template not applicable");
                continue;
            };

            let output = ctx.executor.execute(&command, ctx.timeout).await;
            tracing::debug!(
                strategy = %self.name,
                command = %command,
                exit_code = output.exit_code,
                "fix command finished"
            );
            if output.success() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn module_pattern() -> Option<&'static Regex> {
    static MODULE: OnceLock<Option<Regex>> = OnceLock::new();
    MODULE
        .get_or_init(|| Regex::new(r"No module named '([A-Za-z0-9_][A-Za-z0-9_.\-]*)'").ok())
        .as_ref()
}

/// Top-level package named in a Python import failure.
pub fn missing_module(message: &str) -> Option<String> {
    let caps = module_pattern()?.captures(message)?;
    let dotted = caps.get(1)?.as_str();
    dotted.split('.').next().map(str::to_string)
}

/// Single-quote `s` for `sh -c`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
