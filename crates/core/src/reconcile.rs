use std::collections::{BTreeSet, HashSet};

use crate::{
    config::{Rule, RuleSet},
    marker::{self, CommentKey, Marker},
    models::{CommentId, ExistingComment, FailureSet},
};

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub enum LabelAction {
    Add(String),
    Remove(String),
    #[default]
    None,
}

/// Everything one pass has to change on the pull request.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Decision {
    pub to_delete: BTreeSet<CommentId>,
    /// Rules to post, in posting order. At most one per job.
    pub to_post: Vec<Rule>,
    /// Live comments that stay as they are.
    pub kept: Vec<(CommentId, CommentKey)>,
    /// Failing jobs whose rule would have been posted but has no message.
    pub skipped: Vec<String>,
    pub label_action: LabelAction,
}

impl Decision {
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty()
            && self.to_post.is_empty()
            && matches!(self.label_action, LabelAction::None)
    }
}

/// Computes which comments to delete and which rules to post so that the
/// pull request ends up with exactly one comment per failing job worth
/// mentioning.
///
/// Comments that carry no marker are never touched. Legacy markers are always
/// deleted. Current-format markers from another workflow are ignored; those
/// for jobs that no longer fail are deleted. Of the live ones, the comment of
/// the primary job (the first rule in file order whose job fails) is deleted
/// and posted again so it moves to the bottom of the conversation, while the
/// others are kept and not posted again.
pub fn reconcile(
    existing: &[ExistingComment],
    failures: &FailureSet,
    rules: &RuleSet,
    workflow_name: &str,
) -> Decision {
    let mut decision = Decision::default();

    let in_scope =
        |rule: &&Rule| rule.applies_to(workflow_name) && failures.contains(&rule.job_name);
    let primary = rules.rules.iter().find(in_scope);

    let mut commented = HashSet::new();
    for comment in existing {
        let key = match marker::decode(&comment.body) {
            None => continue,
            Some(Marker::V1) => {
                tracing::debug!("Deleting legacy comment {}", comment.id);
                decision.to_delete.insert(comment.id);
                continue;
            }
            Some(Marker::V2 { token }) => {
                tracing::debug!("Deleting legacy comment {} for {}", comment.id, token);
                decision.to_delete.insert(comment.id);
                continue;
            }
            Some(Marker::V3(key)) => key,
        };
        if key.workflow_name != workflow_name {
            continue;
        }
        if !failures.contains(&key.job_name) {
            tracing::debug!("Deleting comment {} for {}: job no longer fails", comment.id, key);
            decision.to_delete.insert(comment.id);
        } else if primary.is_some_and(|rule| rule.job_name == key.job_name) {
            tracing::debug!("Deleting comment {} for {}: primary is reposted", comment.id, key);
            decision.to_delete.insert(comment.id);
        } else if !commented.insert(key.job_name.clone()) {
            tracing::debug!("Deleting duplicate comment {} for {}", comment.id, key);
            decision.to_delete.insert(comment.id);
        } else {
            decision.kept.push((comment.id, key));
        }
    }

    if !failures.is_empty() {
        let always = rules
            .rules
            .iter()
            .filter(in_scope)
            .filter(|rule| rule.always && !commented.contains(&rule.job_name));
        let mut seen = HashSet::new();
        for rule in primary.into_iter().chain(always) {
            if !seen.insert(rule.job_name.as_str()) {
                continue;
            }
            if rule.message.is_none() {
                tracing::warn!("No message configured for failed job {}, skipping", rule.job_name);
                decision.skipped.push(rule.job_name.clone());
                continue;
            }
            decision.to_post.push(rule.clone());
        }
    }

    decision.label_action = match &rules.label {
        None => LabelAction::None,
        Some(label) if !decision.to_post.is_empty() => LabelAction::Add(label.clone()),
        Some(label) => LabelAction::Remove(label.clone()),
    };
    decision
}
