use anyhow::{Context, Result, bail, ensure};

use crate::{
    config::RuleSet,
    gateway::PullRequestGateway,
    marker,
    models::FailureSet,
    reconcile::{Decision, LabelAction, reconcile},
};

/// Runs one reconciliation pass for a workflow run against the pull request
/// behind `gateway`, and returns what was applied.
pub async fn run_pass<G: PullRequestGateway>(
    gateway: &G,
    rules: &RuleSet,
    run_id: u64,
) -> Result<Decision> {
    let run = gateway
        .workflow_run(run_id)
        .await
        .with_context(|| format!("Failed to fetch workflow run {run_id}"))?;
    let failures = FailureSet::from_jobs(&run.jobs);
    tracing::debug!("Workflow {:?} run {}: failed jobs {}", run.name, run_id, failures);

    let comments = gateway.list_comments().await.context("Failed to list comments")?;
    tracing::debug!("Found {} comments", comments.len());
    for comment in &comments {
        tracing::trace!("Comment {} body: {}", comment.id, comment.body);
    }

    let decision = reconcile(&comments, &failures, rules, &run.name);
    tracing::debug!("Decision: {:?}", decision);
    apply(gateway, &decision, &run.name).await?;
    Ok(decision)
}

/// Applies a decision. Every deletion is issued before any post, so a job
/// whose comment is being replaced never has two live comments.
///
/// Nothing is changed when a comment to post could not be recognized on the
/// next pass.
pub async fn apply<G: PullRequestGateway>(
    gateway: &G,
    decision: &Decision,
    workflow_name: &str,
) -> Result<()> {
    if !decision.to_post.is_empty() {
        ensure!(
            marker::is_encodable(workflow_name),
            "Cannot mark comments with workflow name {workflow_name:?}"
        );
        if let Some(rule) = decision.to_post.iter().find(|r| !marker::is_encodable(&r.job_name)) {
            bail!("Cannot mark comments with job name {:?}", rule.job_name);
        }
    }
    for &id in &decision.to_delete {
        tracing::info!("Deleting comment {}", id);
        gateway
            .delete_comment(id)
            .await
            .with_context(|| format!("Failed to delete comment {id}"))?;
    }
    for (id, key) in &decision.kept {
        tracing::info!("Keeping comment {} for {}", id, key);
    }
    for rule in &decision.to_post {
        let Some(message) = rule.message.as_deref() else {
            continue;
        };
        tracing::info!("Posting comment for failed job {}", rule.job_name);
        let body = marker::encode(workflow_name, &rule.job_name, message);
        tracing::trace!("Comment body: {}", body);
        gateway
            .create_comment(&body)
            .await
            .with_context(|| format!("Failed to create comment for job {}", rule.job_name))?;
    }
    match &decision.label_action {
        LabelAction::Add(label) => {
            tracing::info!("Adding label {:?}", label);
            gateway.add_label(label).await.with_context(|| format!("Failed to add label {label}"))?;
        }
        LabelAction::Remove(label) => {
            tracing::info!("Removing label {:?}", label);
            gateway
                .remove_label(label)
                .await
                .with_context(|| format!("Failed to remove label {label}"))?;
        }
        LabelAction::None => {}
    }
    Ok(())
}
