//! Failure classification.
//!
//! Raw stage output is turned into typed [`Issue`]s by a declarative, ordered
//! table of extraction rules. Supporting a new tool means adding rows to
//! [`RULES`], not new branching code.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{Issue, IssueKind, StageKind, StageOutcome};

/// Re-types an extracted issue whose message contains `needle`.
#[derive(Debug, Clone, Copy)]
pub struct Refinement {
    pub needle: &'static str,
    pub kind: IssueKind,
}

/// One row of the extraction table.
///
/// `pattern` may use the named groups `file`, `line`, `column` and `message`.
/// Without a `message` group the whole match becomes the message.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRule {
    pub stage_kinds: &'static [StageKind],
    pub issue_kind: IssueKind,
    pub pattern: &'static str,
    /// Case-insensitive substring the stage command must contain.
    pub command_filter: Option<&'static str>,
    /// First matching refinement wins.
    pub refinements: &'static [Refinement],
}

const LINT_REFINEMENTS: &[Refinement] = &[
    Refinement {
        needle: "IndentationError",
        kind: IssueKind::IndentationError,
    },
    Refinement {
        needle: "unexpected indent",
        kind: IssueKind::IndentationError,
    },
    Refinement {
        needle: "SyntaxError",
        kind: IssueKind::SyntaxError,
    },
    Refinement {
        needle: "Parsing error",
        kind: IssueKind::SyntaxError,
    },
    Refinement {
        needle: "is not defined",
        kind: IssueKind::MissingImport,
    },
];

const PY_COMPILE_REFINEMENTS: &[Refinement] = &[
    Refinement {
        needle: "IndentationError",
        kind: IssueKind::IndentationError,
    },
    Refinement {
        needle: "TabError",
        kind: IssueKind::IndentationError,
    },
];

/// The extraction table. Every row for a stage kind runs, in order.
pub static RULES: &[ExtractionRule] = &[
    // Jest: "FAIL src/app.test.js"
    ExtractionRule {
        stage_kinds: &[StageKind::Test],
        issue_kind: IssueKind::TestFailure,
        pattern: r"(?m)^\s*FAIL\s+(?P<file>[^\s:]+)\s*$",
        command_filter: None,
        refinements: &[],
    },
    // pytest short summary: "FAILED tests/test_app.py::test_add - assert 1 == 2"
    ExtractionRule {
        stage_kinds: &[StageKind::Test],
        issue_kind: IssueKind::TestFailure,
        pattern: r"(?m)^FAILED\s+(?P<file>[^\s:]+)::(?P<message>.+?)\s*$",
        command_filter: None,
        refinements: &[],
    },
    // Bare assertion errors outside pytest's summary.
    ExtractionRule {
        stage_kinds: &[StageKind::Test],
        issue_kind: IssueKind::TestFailure,
        pattern: r"(?m)^AssertionError:\s+.+$",
        command_filter: None,
        refinements: &[],
    },
    // Python import failures, optionally behind pytest's "E   " prefix.
    ExtractionRule {
        stage_kinds: &[StageKind::Test, StageKind::Build],
        issue_kind: IssueKind::ImportError,
        pattern: r"(?m)^(?:E\s+)?(?P<message>(?:ModuleNotFoundError|ImportError): .+?)\s*$",
        command_filter: None,
        refinements: &[],
    },
    // Python compile errors with their traceback location.
    ExtractionRule {
        stage_kinds: &[StageKind::Test, StageKind::Build],
        issue_kind: IssueKind::SyntaxError,
        pattern: r#"(?m)File "(?P<file>[^"]+)", line (?P<line>\d+)[^\n]*\n(?:[^\n]*\n){0,4}?(?:E\s+)?(?P<message>(?:SyntaxError|IndentationError|TabError): [^\n]+)"#,
        command_filter: None,
        refinements: PY_COMPILE_REFINEMENTS,
    },
    // Babel: "SyntaxError: src/app.js: Unexpected token (12:3)"
    ExtractionRule {
        stage_kinds: &[StageKind::Test, StageKind::Build],
        issue_kind: IssueKind::SyntaxError,
        pattern: r"(?m)SyntaxError:\s+(?P<file>[^\s:]+):\s+(?P<message>.+?)\s+\((?P<line>\d+):(?P<column>\d+)\)",
        command_filter: None,
        refinements: &[],
    },
    // ESLint unix/compact, ruff, flake8: "app.js:12:3: error: Missing semicolon"
    ExtractionRule {
        stage_kinds: &[StageKind::Lint],
        issue_kind: IssueKind::LintError,
        pattern: r"(?m)^(?P<file>[^\s:]+):(?P<line>\d+):(?P<column>\d+):?\s+(?:error:?\s+)?(?P<message>.+?)\s*$",
        command_filter: None,
        refinements: LINT_REFINEMENTS,
    },
    // tsc: "src/a.ts(3,5): error TS2322: ..."
    ExtractionRule {
        stage_kinds: &[StageKind::TypeCheck, StageKind::Build],
        issue_kind: IssueKind::TypeError,
        pattern: r"(?m)^(?P<file>[^\s(]+)\((?P<line>\d+),(?P<column>\d+)\):\s+error\s+(?P<message>TS\d+:.+?)\s*$",
        command_filter: None,
        refinements: &[],
    },
    // tsc --pretty: "src/a.ts:3:5 - error TS2322: ..."
    ExtractionRule {
        stage_kinds: &[StageKind::TypeCheck, StageKind::Build],
        issue_kind: IssueKind::TypeError,
        pattern: r"(?m)^(?P<file>[^\s:]+):(?P<line>\d+):(?P<column>\d+)\s+-\s+error\s+(?P<message>.+?)\s*$",
        command_filter: None,
        refinements: &[],
    },
    // mypy: "app.py:3: error: Incompatible types ..."
    ExtractionRule {
        stage_kinds: &[StageKind::TypeCheck],
        issue_kind: IssueKind::TypeError,
        pattern: r"(?m)^(?P<file>[^\s:]+):(?P<line>\d+):(?:(?P<column>\d+):)?\s+error:\s+(?P<message>.+?)\s*$",
        command_filter: None,
        refinements: &[],
    },
    // docker-compose YAML parse errors.
    ExtractionRule {
        stage_kinds: &[StageKind::Test, StageKind::Build],
        issue_kind: IssueKind::YamlError,
        pattern: r"(?mi)^(?P<message>.*\bya?ml\b.*?(?:error|line \d+|invalid|not allowed).*?)\s*$",
        command_filter: Some("docker"),
        refinements: &[],
    },
    // BuildKit: "Dockerfile:12 ..."
    ExtractionRule {
        stage_kinds: &[StageKind::Build],
        issue_kind: IssueKind::DockerfileError,
        pattern: r"(?m)^.*?(?P<file>Dockerfile[\w.-]*):(?P<line>\d+)\b.*$",
        command_filter: Some("docker"),
        refinements: &[],
    },
];

fn compiled_rules() -> &'static [Option<Regex>] {
    static COMPILED: OnceLock<Vec<Option<Regex>>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|rule| match Regex::new(rule.pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern = rule.pattern, error = %e, "skipping invalid extraction rule");
                    None
                }
            })
            .collect()
    })
}

fn ansi_escape() -> Option<&'static Regex> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").ok())
        .as_ref()
}

/// Remove terminal colour codes so patterns see plain text.
pub fn strip_ansi(raw: &str) -> String {
    match ansi_escape() {
        Some(re) => re.replace_all(raw, "").into_owned(),
        None => raw.to_string(),
    }
}

/// Turns stage outcomes into issues. Pure: same outcome, same issues.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    max_issues_per_stage: usize,
    fixable_kinds: HashSet<IssueKind>,
}

impl FailureClassifier {
    /// `fixable_kinds` are the kinds the strategy registry can act on for the
    /// current profile.
    pub fn new(max_issues_per_stage: usize, fixable_kinds: impl IntoIterator<Item = IssueKind>) -> Self {
        Self {
            max_issues_per_stage,
            fixable_kinds: fixable_kinds.into_iter().collect(),
        }
    }

    pub fn classify(&self, outcome: &StageOutcome) -> Vec<Issue> {
        if outcome.succeeded {
            return Vec::new();
        }

        let stage = &outcome.stage;
        let output = strip_ansi(&outcome.raw_output);
        let command = stage.command.to_ascii_lowercase();
        let mut issues = Vec::new();

        for (rule, re) in RULES.iter().zip(compiled_rules()) {
            let Some(re) = re else { continue };
            if !rule.stage_kinds.contains(&stage.kind) {
                continue;
            }
            if let Some(filter) = rule.command_filter {
                if !command.contains(filter) {
                    continue;
                }
            }

            for caps in re.captures_iter(&output) {
                let message = caps
                    .name("message")
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                let kind = refine(rule, &message);

                issues.push(Issue {
                    kind,
                    source_stage: stage.name.clone(),
                    file: caps.name("file").map(|m| m.as_str().to_string()),
                    line: caps.name("line").and_then(|m| m.as_str().parse().ok()),
                    column: caps.name("column").and_then(|m| m.as_str().parse().ok()),
                    message,
                    fixable: self.fixable_kinds.contains(&kind),
                });
            }
        }

        if issues.is_empty() {
            return vec![unclassified(outcome, &output)];
        }

        issues.truncate(self.max_issues_per_stage);
        issues
    }
}

fn refine(rule: &ExtractionRule, message: &str) -> IssueKind {
    rule.refinements
        .iter()
        .find(|r| message.contains(r.needle))
        .map(|r| r.kind)
        .unwrap_or(rule.issue_kind)
}

/// The single issue reported for a failed stage no rule understood.
fn unclassified(outcome: &StageOutcome, output: &str) -> Issue {
    let message = output
        .lines()
        .map(str::trim)
        .find(|l| {
            let lower = l.to_ascii_lowercase();
            lower.contains("error") || lower.contains("failed")
        })
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "stage '{}' failed with exit code {}",
                outcome.stage.name, outcome.exit_code
            )
        });

    Issue::new(outcome.stage.kind.default_issue_kind(), &outcome.stage.name, message)
}
