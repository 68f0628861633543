use std::env;

use anyhow::{Context, Result};
use ghprcomment_core::{
    Error, PullRequestGateway,
    models::{
        CommentId, ExistingComment, JobConclusion, RepositoryRef, WorkflowJob, WorkflowRun,
    },
};
use http::StatusCode;
use octocrab::{GitHubError, Octocrab};
use serde::Deserialize;

/// GitHub connection settings, read from the environment.
#[derive(Debug, Clone, Default)]
pub struct GitHubConfig {
    pub token: Option<String>,
    /// API base URL, for GitHub Enterprise Server.
    pub api_url: Option<String>,
}

impl GitHubConfig {
    pub const TOKEN_VARS: [&'static str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];
    pub const API_URL_VAR: &'static str = "GITHUB_API_URL";

    pub fn from_env() -> Self {
        let token = Self::TOKEN_VARS
            .iter()
            .find_map(|var| env::var(var).ok().filter(|v| !v.trim().is_empty()));
        let api_url = env::var(Self::API_URL_VAR).ok().filter(|v| !v.trim().is_empty());
        Self { token, api_url }
    }

    pub fn build_client(&self) -> Result<Octocrab> {
        let mut builder = Octocrab::builder();
        if let Some(api_url) = &self.api_url {
            builder = builder
                .base_uri(api_url.as_str())
                .with_context(|| format!("Invalid GitHub API URL {api_url}"))?;
        }
        let client = match &self.token {
            Some(token) => builder.personal_token(token.clone()).build(),
            None => {
                tracing::warn!(
                    "No GitHub token found in {}, using anonymous access",
                    Self::TOKEN_VARS.join(" or ")
                );
                builder.build()
            }
        };
        client.context("Failed to create GitHub client")
    }
}

fn is_not_found(err: &octocrab::Error) -> bool {
    matches!(
        err,
        octocrab::Error::GitHub { source, .. }
            if matches!(**source, GitHubError { status_code: StatusCode::NOT_FOUND, .. })
    )
}

#[derive(serde::Serialize)]
struct PageParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    per_page: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
}

#[derive(Deserialize)]
struct RunResponse {
    name: Option<String>,
    /// Path of the workflow file, e.g. `.github/workflows/tests.yml`.
    path: Option<String>,
}

impl RunResponse {
    /// The run's workflow name, or its workflow file when the run has no name.
    fn workflow_name(self, run_id: u64) -> Result<String> {
        let non_empty = |v: &String| !v.trim().is_empty();
        if let Some(name) = self.name.filter(non_empty) {
            return Ok(name);
        }
        let path = self
            .path
            .filter(non_empty)
            .with_context(|| format!("Workflow run {run_id} has neither a name nor a path"))?;
        tracing::warn!("Workflow run {} has no name, using {}", run_id, path);
        Ok(path)
    }
}

#[derive(Deserialize)]
struct JobsResponse {
    total_count: u64,
    jobs: Vec<JobResponse>,
}

#[derive(Deserialize)]
struct JobResponse {
    name: String,
    conclusion: Option<String>,
}

impl From<JobResponse> for WorkflowJob {
    fn from(value: JobResponse) -> Self {
        Self {
            name: value.name,
            conclusion: value.conclusion.map(|c| c.parse().unwrap_or(JobConclusion::Other)),
        }
    }
}

/// [`PullRequestGateway`] for one pull request on GitHub.
#[derive(Clone)]
pub struct GitHubGateway {
    client: Octocrab,
    repository: RepositoryRef,
    pr_number: u64,
}

impl GitHubGateway {
    /// Checks that the repository and the pull request exist before anything
    /// on the pull request is touched.
    pub async fn connect(
        client: Octocrab,
        repository: RepositoryRef,
        pr_number: u64,
    ) -> Result<Self> {
        let RepositoryRef { owner, name } = &repository;
        tracing::info!("Connecting to {}...", repository);
        match client.repos(owner, name).get().await {
            Ok(_) => {}
            Err(e) if is_not_found(&e) => {
                return Err(Error::RepositoryReferenceInvalid(repository.to_string()).into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to fetch repository {repository}"));
            }
        }

        tracing::debug!("Pull Request number: {}", pr_number);
        match client.pulls(owner, name).get(pr_number).await {
            Ok(_) => {}
            Err(e) if is_not_found(&e) => {
                return Err(
                    Error::RepositoryReferenceInvalid(format!("{repository}#{pr_number}")).into()
                );
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to fetch pull request {repository}#{pr_number}")
                });
            }
        }
        Ok(Self { client, repository, pr_number })
    }

    async fn list_jobs(&self, run_id: u64) -> Result<Vec<WorkflowJob>> {
        let RepositoryRef { owner, name } = &self.repository;
        let route = format!("/repos/{owner}/{name}/actions/runs/{run_id}/jobs");
        let mut page = 1;
        let mut response: JobsResponse = self
            .client
            .get(&route, Some(&PageParams { per_page: Some(100), page: Some(page) }))
            .await?;
        let total = response.total_count as usize;
        let mut jobs = response.jobs.into_iter().map(WorkflowJob::from).collect::<Vec<_>>();
        while jobs.len() < total {
            page += 1;
            response = self
                .client
                .get(&route, Some(&PageParams { per_page: Some(100), page: Some(page) }))
                .await?;
            if response.jobs.is_empty() {
                break;
            }
            jobs.extend(response.jobs.into_iter().map(WorkflowJob::from));
        }
        Ok(jobs)
    }
}

impl PullRequestGateway for GitHubGateway {
    async fn list_comments(&self) -> Result<Vec<ExistingComment>> {
        let RepositoryRef { owner, name } = &self.repository;
        let first_page = self
            .client
            .issues(owner, name)
            .list_comments(self.pr_number)
            .per_page(100)
            .send()
            .await?;
        let comments = self.client.all_pages(first_page).await?;
        Ok(comments
            .into_iter()
            .map(|comment| ExistingComment {
                id: comment.id.into_inner(),
                body: comment.body.unwrap_or_default(),
            })
            .collect())
    }

    async fn delete_comment(&self, id: CommentId) -> Result<()> {
        let RepositoryRef { owner, name } = &self.repository;
        self.client.issues(owner, name).delete_comment(id.into()).await?;
        Ok(())
    }

    async fn create_comment(&self, body: &str) -> Result<()> {
        let RepositoryRef { owner, name } = &self.repository;
        let comment = self.client.issues(owner, name).create_comment(self.pr_number, body).await?;
        tracing::debug!("Created comment {}", comment.id);
        Ok(())
    }

    async fn workflow_run(&self, run_id: u64) -> Result<WorkflowRun> {
        let RepositoryRef { owner, name } = &self.repository;
        tracing::debug!("Fetching workflow run {}", run_id);
        let run: RunResponse = self
            .client
            .get(format!("/repos/{owner}/{name}/actions/runs/{run_id}"), None::<&()>)
            .await?;
        let jobs = self.list_jobs(run_id).await.context("Failed to fetch workflow jobs")?;
        Ok(WorkflowRun { name: run.workflow_name(run_id)?, jobs })
    }

    async fn add_label(&self, label: &str) -> Result<()> {
        let RepositoryRef { owner, name } = &self.repository;
        self.client.issues(owner, name).add_labels(self.pr_number, &[label.to_string()]).await?;
        Ok(())
    }

    async fn remove_label(&self, label: &str) -> Result<()> {
        let RepositoryRef { owner, name } = &self.repository;
        match self.client.issues(owner, name).remove_label(self.pr_number, label).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                tracing::debug!("Label {:?} not present on pull request", label);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_conclusions() {
        let response: JobsResponse = serde_json::from_str(
            r#"{
                "total_count": 3,
                "jobs": [
                    { "id": 1, "name": "build", "status": "completed", "conclusion": "failure" },
                    { "id": 2, "name": "lint", "status": "in_progress", "conclusion": null },
                    { "id": 3, "name": "tests", "status": "completed", "conclusion": "startup_failure" }
                ]
            }"#,
        )
        .unwrap();
        let jobs: Vec<WorkflowJob> = response.jobs.into_iter().map(WorkflowJob::from).collect();
        assert_eq!(jobs, vec![
            WorkflowJob { name: "build".into(), conclusion: Some(JobConclusion::Failure) },
            WorkflowJob { name: "lint".into(), conclusion: None },
            WorkflowJob { name: "tests".into(), conclusion: Some(JobConclusion::Other) },
        ]);
    }

    #[test]
    fn test_workflow_name() {
        let run: RunResponse =
            serde_json::from_str(r#"{ "name": "Tests", "path": ".github/workflows/tests.yml" }"#)
                .unwrap();
        assert_eq!(run.workflow_name(1).unwrap(), "Tests");

        let run: RunResponse =
            serde_json::from_str(r#"{ "name": "", "path": ".github/workflows/tests.yml" }"#)
                .unwrap();
        assert_eq!(run.workflow_name(1).unwrap(), ".github/workflows/tests.yml");

        let run: RunResponse = serde_json::from_str(r#"{ "name": null }"#).unwrap();
        let err = run.workflow_name(7).unwrap_err();
        assert!(err.to_string().contains("Workflow run 7"));
    }

    #[test]
    fn test_page_params() {
        let params = PageParams { per_page: Some(100), page: None };
        assert_eq!(serde_json::to_string(&params).unwrap(), r#"{"per_page":100}"#);
    }
}
