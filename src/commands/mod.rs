pub mod display;
pub mod list;
pub mod plan;
pub mod reconcile;

use anyhow::{Context as _, Result};
use planner::{
    FileStore, GitRepository, JsonFileProvider, Object, PullRequest, PullRequestProvider,
    Reconciler, Repository, Terraform,
};
use std::path::Path;

use crate::Context;
use crate::cli::TemplateArgs;
use crate::config::Config;

/// Config plus a reconciler over the file store
pub struct Session {
    pub config: Config,
    pub reconciler: Reconciler<FileStore>,
}

impl Session {
    pub fn open(ctx: &Context) -> Result<Self> {
        let config = Config::load(ctx.config.as_deref())?;
        let dir = config.store_dir(ctx.store.as_deref())?;
        let store = FileStore::open(&dir)
            .with_context(|| format!("Could not open store at {}", dir.display()))?;
        let reconciler = Reconciler::new(store).with_policy(config.reference_policy());
        Ok(Self { config, reconciler })
    }

    /// Template and source named by the command line
    pub fn resolve(&self, target: &TemplateArgs) -> Result<(Terraform, GitRepository)> {
        self.reconciler
            .resolve(&target.namespace, &target.template)
            .with_context(|| {
                format!(
                    "Could not resolve template {}/{}",
                    target.namespace, target.template
                )
            })
    }

    /// Open pull requests for the repository `source` points at
    pub fn pull_requests(&self, source: &GitRepository, path: &Path) -> Result<Vec<PullRequest>> {
        let repository = match &self.config.repository {
            Some(repository) => repository.clone(),
            None => Repository::from_url(&source.spec.url).with_context(|| {
                format!(
                    "Cannot determine repository of {} from {}; set [repository] in the config",
                    source.key(),
                    source.spec.url
                )
            })?,
        };

        let prs = JsonFileProvider::new(path)
            .list_pull_requests(&repository)
            .with_context(|| format!("Could not load pull requests from {}", path.display()))?;
        log::info!("{} open pull requests for {}", prs.len(), repository);
        Ok(prs)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Fixture;
    use super::*;
    use std::fs;

    #[test]
    fn test_pull_requests_from_source_url() {
        let fixture = Fixture::new();
        let session = Session::open(&fixture.context()).unwrap();
        let (_, source) = session.resolve(&fixture.target()).unwrap();

        let prs = session.pull_requests(&source, &fixture.prs()).unwrap();
        let numbers: Vec<u64> = prs.iter().map(|pr| pr.number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_configured_repository_wins() {
        let fixture = Fixture::new();
        let config = fixture.dir.path().join("config.toml");
        fs::write(&config, "[repository]\norg = \"tf-controller\"\nname = \"other\"\n").unwrap();

        let session = Session::open(&fixture.context()).unwrap();
        let (_, source) = session.resolve(&fixture.target()).unwrap();
        let prs = session.pull_requests(&source, &fixture.prs()).unwrap();
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].number, 3);
    }

    #[test]
    fn test_resolve_missing_template() {
        let fixture = Fixture::new();
        let session = Session::open(&fixture.context()).unwrap();
        let target = TemplateArgs {
            namespace: "flux-system".into(),
            template: "missing".into(),
        };
        let err = session.resolve(&target).unwrap_err();
        assert!(err.to_string().contains("flux-system/missing"));
    }
}
