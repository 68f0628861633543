use std::{collections::BTreeSet, fmt, str::FromStr, sync::OnceLock};

use regex::Regex;

use crate::Error;

/// Gateway-assigned identifier of a pull request comment.
pub type CommentId = u64;

/// A `owner/name` repository reference, as passed on the command line.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepositoryRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static REGEX: OnceLock<Regex> = OnceLock::new();
        let caps = REGEX
            .get_or_init(|| {
                Regex::new(r"^(?P<owner>[A-Za-z0-9_.\-]+)/(?P<name>[A-Za-z0-9_.\-]+)$").unwrap()
            })
            .captures(s.trim())
            .ok_or_else(|| Error::RepositoryReferenceInvalid(s.to_string()))?;
        Ok(Self { owner: caps["owner"].to_string(), name: caps["name"].to_string() })
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A comment currently present on the pull request.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExistingComment {
    pub id: CommentId,
    pub body: String,
}

/// Conclusion of a single workflow job, as reported by the CI provider.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum JobConclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
    TimedOut,
    Neutral,
    ActionRequired,
    Other,
}

impl FromStr for JobConclusion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "cancelled" => Ok(Self::Cancelled),
            "skipped" => Ok(Self::Skipped),
            "timed_out" => Ok(Self::TimedOut),
            "neutral" => Ok(Self::Neutral),
            "action_required" => Ok(Self::ActionRequired),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkflowJob {
    pub name: String,
    /// `None` while the job is still queued or running.
    pub conclusion: Option<JobConclusion>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkflowRun {
    pub name: String,
    pub jobs: Vec<WorkflowJob>,
}

/// Names of the jobs that failed in one workflow run.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct FailureSet(BTreeSet<String>);

impl FailureSet {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a WorkflowJob>) -> Self {
        Self(
            jobs.into_iter()
                .filter(|job| job.conclusion == Some(JobConclusion::Failure))
                .map(|job| job.name.clone())
                .collect(),
        )
    }

    pub fn contains(&self, job_name: &str) -> bool { self.0.contains(job_name) }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl<S: Into<String>> FromIterator<S> for FailureSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for FailureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, job) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(job)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_ref() {
        let cases: &[(&str, Option<(&str, &str)>)] = &[
            ("JabRef/jabref", Some(("JabRef", "jabref"))),
            (" foo/bar.rs ", Some(("foo", "bar.rs"))),
            ("foo", None),
            ("foo/bar/baz", None),
            ("/bar", None),
            ("", None),
        ];
        for &(input, expected) in cases {
            let parsed = input.parse::<RepositoryRef>().ok();
            assert_eq!(
                parsed.as_ref().map(|r| (r.owner.as_str(), r.name.as_str())),
                expected,
                "{input:?}"
            );
        }
        let err = "nope".parse::<RepositoryRef>().unwrap_err();
        assert!(matches!(err, Error::RepositoryReferenceInvalid(ref s) if s == "nope"));
    }

    #[test]
    fn test_failure_set_from_jobs() {
        let jobs = vec![
            WorkflowJob { name: "build".into(), conclusion: Some(JobConclusion::Failure) },
            WorkflowJob { name: "lint".into(), conclusion: Some(JobConclusion::Success) },
            WorkflowJob { name: "tests".into(), conclusion: Some(JobConclusion::Failure) },
            WorkflowJob { name: "docs".into(), conclusion: None },
            WorkflowJob { name: "flaky".into(), conclusion: Some(JobConclusion::Cancelled) },
        ];
        let failures = FailureSet::from_jobs(&jobs);
        assert!(failures.contains("build"));
        assert!(failures.contains("tests"));
        assert!(!failures.contains("lint"));
        assert_eq!(failures.to_string(), "[build, tests]");
    }

    #[test]
    fn test_job_conclusion_from_str() {
        assert_eq!("failure".parse::<JobConclusion>(), Ok(JobConclusion::Failure));
        assert_eq!("timed_out".parse::<JobConclusion>(), Ok(JobConclusion::TimedOut));
        assert_eq!("startup_failure".parse::<JobConclusion>(), Err(()));
    }
}
