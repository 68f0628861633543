pub mod config;
pub mod driver;
pub mod gateway;
pub mod marker;
pub mod models;
pub mod reconcile;

pub use config::{ConfigError, ConfigSource, FileConfigSource, Rule, RuleSet};
pub use gateway::PullRequestGateway;
pub use reconcile::{Decision, LabelAction, reconcile};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Error in repository reference {0}")]
    RepositoryReferenceInvalid(String),
}
