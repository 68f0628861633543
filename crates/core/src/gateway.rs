use anyhow::Result;

use crate::models::{CommentId, ExistingComment, WorkflowRun};

/// Remote operations on one pull request and its repository.
///
/// Implementations do not retry; any error aborts the current pass.
#[allow(async_fn_in_trait)]
pub trait PullRequestGateway {
    /// All comments on the pull request, oldest first.
    async fn list_comments(&self) -> Result<Vec<ExistingComment>>;

    async fn delete_comment(&self, id: CommentId) -> Result<()>;

    async fn create_comment(&self, body: &str) -> Result<()>;

    /// The workflow run's name and the conclusion of each of its jobs.
    async fn workflow_run(&self, run_id: u64) -> Result<WorkflowRun>;

    async fn add_label(&self, label: &str) -> Result<()>;

    /// Removing a label the pull request does not carry is not an error.
    async fn remove_label(&self, label: &str) -> Result<()>;
}
