//! Project profile detection and default stage sets.

use std::path::Path;

use crate::domain::{Stage, StageKind};
use crate::strategy::StrategyProfile;

/// A detected profile together with the stages to run for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectProfile {
    pub profile: StrategyProfile,
    pub stages: Vec<Stage>,
}

/// Decides which profile a project has and which stages verify it.
pub trait ProfileResolver: Send + Sync {
    fn resolve(&self, project_root: &Path) -> ProjectProfile;
}

/// Resolves by marker files in the project root.
///
/// `package.json` wins, then `requirements.txt`/`setup.py`, then
/// `docker-compose.yml`. Otherwise the top-level `.js`/`.ts` and `.py` files
/// are counted and the larger group decides, ties going to python.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerFileResolver;

impl MarkerFileResolver {
    pub fn detect(project_root: &Path) -> StrategyProfile {
        if project_root.join("package.json").exists() {
            return StrategyProfile::Javascript;
        }
        if project_root.join("requirements.txt").exists() || project_root.join("setup.py").exists() {
            return StrategyProfile::Python;
        }
        if project_root.join("docker-compose.yml").exists() {
            return StrategyProfile::Docker;
        }

        let (mut js, mut py) = (0usize, 0usize);
        if let Ok(entries) = std::fs::read_dir(project_root) {
            for entry in entries.flatten() {
                let path = entry.path();
                match path.extension().and_then(|e| e.to_str()) {
                    Some("js") | Some("ts") => js += 1,
                    Some("py") => py += 1,
                    _ => {}
                }
            }
        }
        if js > py {
            StrategyProfile::Javascript
        } else {
            StrategyProfile::Python
        }
    }
}

impl ProfileResolver for MarkerFileResolver {
    fn resolve(&self, project_root: &Path) -> ProjectProfile {
        let profile = Self::detect(project_root);
        tracing::debug!(project_root = %project_root.display(), profile = %profile, "profile detected");
        ProjectProfile {
            profile,
            stages: default_stages(profile),
        }
    }
}

/// The stage set each profile runs when none is configured.
pub fn default_stages(profile: StrategyProfile) -> Vec<Stage> {
    let table: &[(&str, &str, StageKind)] = match profile {
        StrategyProfile::Javascript => &[
            ("test", "npm test", StageKind::Test),
            ("lint", "npm run lint", StageKind::Lint),
            ("type-check", "npm run type-check", StageKind::TypeCheck),
            ("build", "npm run build", StageKind::Build),
        ],
        StrategyProfile::Python => &[
            ("test", "python -m pytest", StageKind::Test),
            ("lint", "ruff check", StageKind::Lint),
            ("type-check", "mypy .", StageKind::TypeCheck),
            ("build", "python setup.py build", StageKind::Build),
        ],
        StrategyProfile::Docker => &[
            ("test", "docker-compose config", StageKind::Test),
            ("build", "docker-compose build", StageKind::Build),
        ],
    };
    table
        .iter()
        .map(|(name, command, kind)| Stage::new(*name, *command, *kind))
        .collect()
}
