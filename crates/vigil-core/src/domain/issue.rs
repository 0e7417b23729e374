//! Classified failure types.

use serde::{Deserialize, Serialize};

/// Closed set of failure kinds the classifier can produce.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    TestFailure,
    LintError,
    TypeError,
    BuildError,
    YamlError,
    DockerfileError,
    SyntaxError,
    ImportError,
    MissingImport,
    IndentationError,
}

impl IssueKind {
    /// Every kind, in declaration order.
    pub const ALL: [IssueKind; 10] = [
        IssueKind::TestFailure,
        IssueKind::LintError,
        IssueKind::TypeError,
        IssueKind::BuildError,
        IssueKind::YamlError,
        IssueKind::DockerfileError,
        IssueKind::SyntaxError,
        IssueKind::ImportError,
        IssueKind::MissingImport,
        IssueKind::IndentationError,
    ];

    /// Stable identifier, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::TestFailure => "test_failure",
            IssueKind::LintError => "lint_error",
            IssueKind::TypeError => "type_error",
            IssueKind::BuildError => "build_error",
            IssueKind::YamlError => "yaml_error",
            IssueKind::DockerfileError => "dockerfile_error",
            IssueKind::SyntaxError => "syntax_error",
            IssueKind::ImportError => "import_error",
            IssueKind::MissingImport => "missing_import",
            IssueKind::IndentationError => "indentation_error",
        }
    }

    /// Heading used when grouping blocking issues for humans.
    pub fn heading(&self) -> &'static str {
        match self {
            IssueKind::TestFailure => "test",
            IssueKind::LintError => "lint",
            IssueKind::TypeError => "type-check",
            IssueKind::BuildError => "build",
            IssueKind::YamlError => "yaml",
            IssueKind::DockerfileError => "dockerfile",
            IssueKind::SyntaxError => "syntax",
            IssueKind::ImportError => "import",
            IssueKind::MissingImport => "missing-import",
            IssueKind::IndentationError => "indentation",
        }
    }

    /// Terse remediation hint shown under each blocking issue.
    pub fn hint(&self) -> &'static str {
        match self {
            IssueKind::TestFailure => "Run the failing test locally and fix the assertion or the code under test",
            IssueKind::LintError => "Run the linter's auto-fix (e.g. `npm run lint -- --fix`, `ruff check --fix`) or edit the line",
            IssueKind::TypeError => "Fix the type at the reported location, then re-run the type checker",
            IssueKind::BuildError => "Read the build log above the error and fix the first failure",
            IssueKind::YamlError => "Fix the YAML syntax (indentation, quoting) in the compose file",
            IssueKind::DockerfileError => "Fix the failing Dockerfile instruction",
            IssueKind::SyntaxError => "Fix the syntax at the reported line",
            IssueKind::ImportError => "Install the missing module or correct the import path",
            IssueKind::MissingImport => "Add the missing import at the top of the file",
            IssueKind::IndentationError => "Re-indent the block (e.g. `autopep8 --in-place <file>`)",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single classified failure. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Failure kind.
    pub kind: IssueKind,

    /// Name of the stage whose output produced this issue.
    pub source_stage: String,

    /// Source file path as printed by the tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Line number (1-indexed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    /// Column number (1-indexed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    /// Human-readable message.
    pub message: String,

    /// Whether the strategy registry may be consulted for this issue.
    pub fixable: bool,
}

impl Issue {
    /// Create an issue with no location.
    pub fn new(kind: IssueKind, source_stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            source_stage: source_stage.into(),
            file: None,
            line: None,
            column: None,
            message: message.into(),
            fixable: false,
        }
    }

    /// Set file location.
    pub fn with_location(mut self, file: impl Into<String>, line: Option<u32>, column: Option<u32>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self.column = column;
        self
    }

    /// Set the fixable flag.
    pub fn with_fixable(mut self, fixable: bool) -> Self {
        self.fixable = fixable;
        self
    }

    /// `file:line`, `file`, or `None` when no location was discovered.
    pub fn location(&self) -> Option<String> {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => Some(format!("{}:{}", file, line)),
            (Some(file), None) => Some(file.clone()),
            _ => None,
        }
    }

    /// Identity used to match an issue across verification passes.
    pub fn fingerprint(&self) -> IssueFingerprint {
        IssueFingerprint {
            stage: self.source_stage.clone(),
            kind: self.kind,
            file: self.file.clone(),
            message: self.message.clone(),
        }
    }

    /// Key used to drop duplicates within one verification pass.
    pub(crate) fn dedup_key(&self) -> (&str, Option<&str>, Option<u32>, &str) {
        (
            self.source_stage.as_str(),
            self.file.as_deref(),
            self.line,
            self.message.as_str(),
        )
    }
}

/// Identity of an issue across passes.
///
/// Lines and columns are left out: an edit elsewhere in the file moves them
/// without fixing anything. Several issues may share one fingerprint, so
/// passes are compared as multisets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IssueFingerprint {
    pub stage: String,
    pub kind: IssueKind,
    pub file: Option<String>,
    pub message: String,
}
