use std::process::ExitCode;

use anyhow::Result;
use argp::FromArgs;
use ghprcomment_core::{
    ConfigError, ConfigSource, Error, FileConfigSource, driver, models::RepositoryRef,
};
use ghprcomment_github::{GitHubConfig, GitHubGateway};
use octocrab::Octocrab;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

const REPOSITORY_REFERENCE_ERROR: u8 = 1;
const CONFIG_NOT_FOUND: u8 = 2;
const FAILURE: u8 = 3;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Comments on a pull request with an explanation of its failed workflow jobs.
struct Args {
    #[argp(option, short = 'r')]
    /// the GitHub repository in the form owner/repository, e.g. JabRef/jabref
    repository: String,
    #[argp(option, short = 'w')]
    /// the id of the workflow run whose jobs are checked
    workflow_run_id: u64,
    #[argp(option, short = 'p')]
    /// the pull request number
    pr_number: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(env_filter),
        )
        .init();

    let args: Args = argp::parse_args_or_exit(argp::DEFAULT);
    let build_client = || GitHubConfig::from_env().build_client();
    match run(args, &FileConfigSource::default(), build_client).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:?}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(
    args: Args,
    config: &impl ConfigSource,
    build_client: impl FnOnce() -> Result<Octocrab>,
) -> Result<()> {
    // The rule file is checked before anything talks to GitHub.
    let rules = config.load()?;
    tracing::debug!("Loaded {} rules", rules.rules.len());
    if rules.rules.is_empty() {
        tracing::warn!("No rules configured, only stale comments will be removed");
    }

    let repository: RepositoryRef = args.repository.parse()?;
    let client = build_client()?;
    let gateway = GitHubGateway::connect(client, repository, args.pr_number).await?;

    let decision = driver::run_pass(&gateway, &rules, args.workflow_run_id).await?;
    if decision.is_noop() {
        tracing::info!("Nothing to do");
    } else {
        tracing::info!(
            "Deleted {} comments, posted {} comments, kept {} comments",
            decision.to_delete.len(),
            decision.to_post.len(),
            decision.kept.len()
        );
    }
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> u8 {
    let config_error =
        err.downcast_ref::<ConfigError>().or_else(|| match err.downcast_ref::<Error>() {
            Some(Error::Config(e)) => Some(e),
            _ => None,
        });
    if let Some(ConfigError::NotFound { .. }) = config_error {
        return CONFIG_NOT_FOUND;
    }
    match err.downcast_ref::<Error>() {
        Some(Error::RepositoryReferenceInvalid(_)) => REPOSITORY_REFERENCE_ERROR,
        _ => FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use anyhow::{Context, anyhow};
    use ghprcomment_core::RuleSet;

    use super::*;

    struct StaticConfig(Option<RuleSet>);

    impl ConfigSource for StaticConfig {
        fn load(&self) -> Result<RuleSet, ConfigError> {
            self.0.clone().ok_or_else(|| ConfigError::NotFound {
                searched: vec!["ghprcomment.yaml".into()],
            })
        }
    }

    fn args(repository: &str) -> Args {
        Args { repository: repository.to_string(), workflow_run_id: 1, pr_number: 2 }
    }

    #[tokio::test]
    async fn test_checks_before_building_client() {
        let built = Cell::new(false);
        let build_client = || {
            built.set(true);
            GitHubConfig::default().build_client()
        };
        let err = run(args("JabRef/jabref"), &StaticConfig(None), build_client).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::NotFound { .. })));
        assert_eq!(exit_code(&err), CONFIG_NOT_FOUND);
        assert!(!built.get());

        let config = StaticConfig(Some(RuleSet::default()));
        let err = run(args("not a repository"), &config, build_client).await.unwrap_err();
        assert_eq!(exit_code(&err), REPOSITORY_REFERENCE_ERROR);
        assert!(!built.get());
    }

    #[test]
    fn test_exit_codes() {
        let not_found = anyhow::Error::from(ConfigError::NotFound { searched: vec![] });
        assert_eq!(exit_code(&not_found), CONFIG_NOT_FOUND);

        let wrapped = anyhow::Error::from(Error::from(ConfigError::NotFound { searched: vec![] }));
        assert_eq!(exit_code(&wrapped), CONFIG_NOT_FOUND);

        let repository = "nope".parse::<RepositoryRef>().unwrap_err();
        let repository = anyhow::Error::from(repository).context("while connecting");
        assert_eq!(exit_code(&repository), REPOSITORY_REFERENCE_ERROR);

        let gateway: Result<()> = Err(anyhow!("HTTP 500")).context("Failed to list comments");
        assert_eq!(exit_code(&gateway.unwrap_err()), FAILURE);
    }
}
