//! Strategies that edit a source file in place.

use async_trait::async_trait;

use super::{Strategy, StrategyContext};
use crate::domain::Issue;

/// Prepends a well-known import when a symbol "is not defined".
#[derive(Debug, Clone)]
pub struct PrependImport {
    known: Vec<(String, String)>,
}

impl PrependImport {
    pub fn new(known: Vec<(String, String)>) -> Self {
        Self { known }
    }

    /// Knows `React` only.
    pub fn react() -> Self {
        Self::new(vec![(
            "React".to_string(),
            "import React from 'react';".to_string(),
        )])
    }
}

#[async_trait]
impl Strategy for PrependImport {
    fn name(&self) -> &str {
        "prepend-import"
    }

    async fn attempt(&self, issue: &Issue, ctx: &StrategyContext) -> anyhow::Result<bool> {
        let Some(file) = issue.file.as_deref() else {
            return Ok(false);
        };
        let Some((symbol, import)) = self
            .known
            .iter()
            .find(|(symbol, _)| issue.message.contains(&format!("'{}' is not defined", symbol)))
        else {
            return Ok(false);
        };

        let path = ctx.resolve(file);
        let content = tokio::fs::read_to_string(&path).await?;
        if content.contains(&format!("import {}", symbol)) {
            return Ok(false);
        }

        tokio::fs::write(&path, format!("{}\n{}", import, content)).await?;
        tracing::debug!(file = %path.display(), symbol = %symbol, "import prepended");
        Ok(true)
    }
}

/// Repairs the reported JavaScript line: drops a trailing comma on the last
/// line of the file, otherwise appends a missing semicolon.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsLineRepair;

#[async_trait]
impl Strategy for JsLineRepair {
    fn name(&self) -> &str {
        "js-line-repair"
    }

    async fn attempt(&self, issue: &Issue, ctx: &StrategyContext) -> anyhow::Result<bool> {
        let (Some(file), Some(line)) = (issue.file.as_deref(), issue.line) else {
            return Ok(false);
        };
        let path = ctx.resolve(file);
        let content = tokio::fs::read_to_string(&path).await?;
        let mut lines = split_lines(&content);

        let idx = line as usize;
        if idx == 0 || idx > lines.len() {
            return Ok(false);
        }
        let is_last = idx == lines.len();
        let (body, ending) = lines[idx - 1].clone();
        let trimmed = body.trim_end();

        let repaired = if is_last && trimmed.ends_with(',') {
            trimmed[..trimmed.len() - 1].to_string()
        } else if !trimmed.is_empty() && !trimmed.ends_with(';') && !trimmed.ends_with('{') {
            format!("{};", trimmed)
        } else {
            return Ok(false);
        };

        lines[idx - 1] = (repaired, ending);
        tokio::fs::write(&path, join_lines(&lines)).await?;
        Ok(true)
    }
}

/// Indents the body line of a Python block opener that ends in `:`.
///
/// The reported line may be the opener itself or the unindented line after it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PyBlockIndent;

#[async_trait]
impl Strategy for PyBlockIndent {
    fn name(&self) -> &str {
        "py-block-indent"
    }

    async fn attempt(&self, issue: &Issue, ctx: &StrategyContext) -> anyhow::Result<bool> {
        let (Some(file), Some(line)) = (issue.file.as_deref(), issue.line) else {
            return Ok(false);
        };
        let path = ctx.resolve(file);
        let content = tokio::fs::read_to_string(&path).await?;
        let mut lines = split_lines(&content);

        let idx = line as usize;
        if idx == 0 || idx > lines.len() {
            return Ok(false);
        }

        let opens_block = |i: usize| lines[i].0.trim_end().ends_with(':');
        let target = if opens_block(idx - 1) && idx < lines.len() {
            idx
        } else if idx >= 2 && opens_block(idx - 2) {
            idx - 1
        } else {
            return Ok(false);
        };

        let opener_indent = leading_whitespace(&lines[target - 1].0);
        let body = &lines[target].0;
        if leading_whitespace(body).len() > opener_indent.len() {
            return Ok(false);
        }
        let indented = format!("{}    {}", opener_indent, body.trim_start());
        lines[target].0 = indented;

        tokio::fs::write(&path, join_lines(&lines)).await?;
        Ok(true)
    }
}

/// Split into `(body, line ending)` pairs so rewriting keeps the file's endings.
fn split_lines(content: &str) -> Vec<(String, String)> {
    content
        .split_inclusive('\n')
        .map(|raw| {
            let body = raw.trim_end_matches(['\n', '\r']);
            (body.to_string(), raw[body.len()..].to_string())
        })
        .collect()
}

fn join_lines(lines: &[(String, String)]) -> String {
    lines
        .iter()
        .map(|(body, ending)| format!("{}{}", body, ending))
        .collect()
}

fn leading_whitespace(s: &str) -> &str {
    &s[..s.len() - s.trim_start().len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IssueKind;
    use crate::fakes::ScriptedExecutor;
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx(root: &std::path::Path) -> StrategyContext {
        StrategyContext::new(root, Arc::new(ScriptedExecutor::new()), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_prepend_react_import() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("App.jsx"), "export const App = () => <div/>;\n").expect("write");

        let issue = Issue::new(IssueKind::MissingImport, "lint", "'React' is not defined")
            .with_location("App.jsx", Some(1), Some(1));
        let applied = PrependImport::react()
            .attempt(&issue, &ctx(dir.path()))
            .await
            .expect("attempt");

        assert!(applied);
        let content = std::fs::read_to_string(dir.path().join("App.jsx")).expect("read");
        assert!(content.starts_with("import React from 'react';\n"));

        // Second attempt sees the import and leaves the file alone.
        let again = PrependImport::react()
            .attempt(&issue, &ctx(dir.path()))
            .await
            .expect("attempt");
        assert!(!again);
    }

    #[tokio::test]
    async fn test_prepend_import_unknown_symbol() {
        let dir = tempfile::tempdir().expect("tempdir");
        let issue = Issue::new(IssueKind::MissingImport, "lint", "'lodash' is not defined")
            .with_location("a.js", Some(1), None);
        let applied = PrependImport::react()
            .attempt(&issue, &ctx(dir.path()))
            .await
            .expect("attempt");
        assert!(!applied);
    }

    #[tokio::test]
    async fn test_js_adds_semicolon() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("app.js"), "const a = 1\nconst b = 2;\n").expect("write");
        let issue = Issue::new(IssueKind::SyntaxError, "build", "Missing semicolon")
            .with_location("app.js", Some(1), Some(12));

        assert!(JsLineRepair.attempt(&issue, &ctx(dir.path())).await.expect("attempt"));
        let content = std::fs::read_to_string(dir.path().join("app.js")).expect("read");
        assert_eq!(content, "const a = 1;\nconst b = 2;\n");
    }

    #[tokio::test]
    async fn test_js_drops_trailing_comma_on_last_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("list.js"), "const xs = [\n  1,\n  2,").expect("write");
        let issue = Issue::new(IssueKind::SyntaxError, "build", "Unexpected token")
            .with_location("list.js", Some(3), None);

        assert!(JsLineRepair.attempt(&issue, &ctx(dir.path())).await.expect("attempt"));
        let content = std::fs::read_to_string(dir.path().join("list.js")).expect("read");
        assert_eq!(content, "const xs = [\n  1,\n  2");
    }

    #[tokio::test]
    async fn test_js_line_out_of_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("app.js"), "x;\n").expect("write");
        let issue = Issue::new(IssueKind::SyntaxError, "build", "bad")
            .with_location("app.js", Some(9), None);
        assert!(!JsLineRepair.attempt(&issue, &ctx(dir.path())).await.expect("attempt"));
    }

    #[tokio::test]
    async fn test_js_missing_file_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let issue = Issue::new(IssueKind::SyntaxError, "build", "bad")
            .with_location("gone.js", Some(1), None);
        assert!(JsLineRepair.attempt(&issue, &ctx(dir.path())).await.is_err());
    }

    #[tokio::test]
    async fn test_py_indents_line_after_opener() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("app.py"),
            "def f():\n    if True:\n    return 1\n",
        )
        .expect("write");

        // Python reports the unindented line.
        let issue = Issue::new(IssueKind::SyntaxError, "pytest", "SyntaxError: invalid syntax")
            .with_location("app.py", Some(3), None);
        assert!(PyBlockIndent.attempt(&issue, &ctx(dir.path())).await.expect("attempt"));

        let content = std::fs::read_to_string(dir.path().join("app.py")).expect("read");
        assert_eq!(content, "def f():\n    if True:\n        return 1\n");
    }

    #[tokio::test]
    async fn test_py_opener_reported_directly() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("app.py"), "for x in xs:\nprint(x)\n").expect("write");
        let issue = Issue::new(IssueKind::SyntaxError, "pytest", "SyntaxError")
            .with_location("app.py", Some(1), None);
        assert!(PyBlockIndent.attempt(&issue, &ctx(dir.path())).await.expect("attempt"));

        let content = std::fs::read_to_string(dir.path().join("app.py")).expect("read");
        assert_eq!(content, "for x in xs:\n    print(x)\n");
    }

    #[tokio::test]
    async fn test_py_nothing_to_indent() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("app.py"), "x = 1\ny = 2\n").expect("write");
        let issue = Issue::new(IssueKind::SyntaxError, "pytest", "SyntaxError")
            .with_location("app.py", Some(2), None);
        assert!(!PyBlockIndent.attempt(&issue, &ctx(dir.path())).await.expect("attempt"));
    }

    #[test]
    fn test_split_join_preserves_endings() {
        let raw = "a\r\nb\nc";
        assert_eq!(join_lines(&split_lines(raw)), raw);
    }
}
