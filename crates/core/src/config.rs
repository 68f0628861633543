use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

/// Locations searched for the rule file, relative to the repository root.
/// The first one that exists wins.
pub const CONFIG_PATHS: [&str; 4] = [
    "ghprcomment.yaml",
    "ghprcomment.yml",
    ".github/ghprcomment.yaml",
    ".github/ghprcomment.yml",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ghprcomment configuration not found. Searched at {}", join_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },
    #[error("Failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}

/// One configured reaction to a failing job.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Rule {
    pub job_name: String,
    /// Restricts the rule to runs of the workflow with exactly this name.
    pub workflow_name: Option<String>,
    /// Comment text. A rule without a message is never posted.
    pub message: Option<String>,
    /// Post this rule's comment in addition to the primary comment.
    pub always: bool,
}

impl Rule {
    pub fn new(job_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            workflow_name: None,
            message: Some(message.into()),
            always: false,
        }
    }

    pub fn applies_to(&self, workflow_name: &str) -> bool {
        self.workflow_name.as_deref().is_none_or(|w| w == workflow_name)
    }
}

/// The parsed rule file.
///
/// Rules are kept in file order, which is also their priority order: when
/// several failing jobs have a rule, the first one in the file is the one
/// that gets the primary comment.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
    pub label: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    job_name: Option<String>,
    workflow_name: Option<String>,
    message: Option<String>,
    always: Option<Flag>,
    label: Option<String>,
}

// `always: true` and `always: "true"` are both accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn value(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Text(s) => s.trim().eq_ignore_ascii_case("true"),
        }
    }
}

impl RuleSet {
    pub fn from_yaml_str(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let entries: Option<Vec<Option<RawEntry>>> = serde_yaml::from_str(contents)?;
        let mut result = Self::default();
        for (index, entry) in entries.unwrap_or_default().into_iter().flatten().enumerate() {
            if result.label.is_none()
                && let Some(label) = entry.label.filter(|l| !l.trim().is_empty())
            {
                result.label = Some(label);
            }
            let Some(job_name) = entry.job_name.filter(|j| !j.is_empty()) else {
                if entry.message.is_some() || entry.workflow_name.is_some() {
                    tracing::warn!("Ignoring entry {} without jobName", index + 1);
                }
                continue;
            };
            result.rules.push(Rule {
                job_name,
                workflow_name: entry.workflow_name,
                message: entry.message,
                always: entry.always.as_ref().is_some_and(Flag::value),
            });
        }
        tracing::trace!("Parsed rules {:?}", result);
        Ok(result)
    }
}

/// Provides the rule set for a run.
pub trait ConfigSource {
    fn load(&self) -> Result<RuleSet, ConfigError>;
}

/// Loads the rule file from the first of [`CONFIG_PATHS`] that exists under `root`.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    root: PathBuf,
}

impl Default for FileConfigSource {
    fn default() -> Self { Self { root: PathBuf::from(".") } }
}

impl FileConfigSource {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        CONFIG_PATHS.iter().map(|p| self.root.join(p)).collect()
    }

    pub fn locate(&self) -> Result<PathBuf, ConfigError> {
        let searched = self.search_paths();
        match searched.iter().find(|p| p.is_file()) {
            Some(path) => Ok(path.clone()),
            None => Err(ConfigError::NotFound { searched }),
        }
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<RuleSet, ConfigError> {
        let path = self.locate()?;
        tracing::debug!("Using configuration {}", path.display());
        load_file(&path)
    }
}

fn load_file(path: &Path) -> Result<RuleSet, ConfigError> {
    let contents = fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    RuleSet::from_yaml_str(&contents)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}
