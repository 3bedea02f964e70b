//! Obtaining worker source from GitHub
//!
//! Two ways in: a git clone into a per-worker working tree (for the CLI
//! strategy) or raw-content probing for a single entry file (for the API
//! strategy).

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::deploy::runner::{CommandRunner, CommandSpec, EnvOverlay};
use crate::deploy::workspace::{WorkingTree, Workspace};
use crate::errors::DeployError;
use crate::models::artifact::ScriptArtifact;
use crate::models::repo::RepoUrl;
use crate::storage::settings::Settings;

/// Entry file candidates, in priority order
pub const DEFAULT_ENTRY_CANDIDATES: &[&str] = &[
    "index.js",
    "worker.js",
    "main.js",
    "app.js",
    "_worker.js",
    "dist/index.js",
    "src/index.js",
    "src/worker.js",
];

/// Source fetching options
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub raw_base_url: String,
    pub branches: Vec<String>,
    pub candidates: Vec<String>,
    pub probe_timeout: Duration,
    pub git_program: String,
    pub clone_timeout: Duration,
    pub output_limit: usize,
}

impl SourceOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            raw_base_url: settings.github.raw_base_url.clone(),
            branches: settings.github.branches.clone(),
            candidates: settings.github.entry_candidates.clone(),
            probe_timeout: Duration::from_secs(settings.github.probe_timeout_secs),
            git_program: settings.github.git_program.clone(),
            clone_timeout: Duration::from_secs(settings.cli.timeout_secs),
            output_limit: settings.cli.output_limit_bytes,
        }
    }
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Fetches repository content
pub struct SourceFetcher {
    runner: Arc<dyn CommandRunner>,
    http: Client,
    workspace: Arc<Workspace>,
    options: SourceOptions,
}

impl SourceFetcher {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        workspace: Arc<Workspace>,
        options: SourceOptions,
    ) -> Result<Self, DeployError> {
        let http = Client::builder().timeout(options.probe_timeout).build()?;

        Ok(Self {
            runner,
            http,
            workspace,
            options,
        })
    }

    pub fn options(&self) -> &SourceOptions {
        &self.options
    }

    /// Clone the repository into the worker's working tree.
    ///
    /// A full clone is tried first, then a shallow one. The tree is removed
    /// before any error is returned.
    pub async fn clone_repo(
        &self,
        source: &RepoUrl,
        worker_name: &str,
    ) -> Result<WorkingTree, DeployError> {
        let tree = self.workspace.prepare(worker_name).await?;
        info!("Cloning {} into {}", source, tree.path().display());

        if let Err(e) = self.try_clone(source, &tree, false).await {
            warn!("Full clone of {} failed ({}), retrying shallow", source, e);

            // The failed attempt may have left a partial checkout behind.
            let reset = async {
                tree.dir().delete().await?;
                tree.dir().create().await
            };
            if let Err(e) = reset.await {
                let _ = tree.destroy().await;
                return Err(e);
            }

            if let Err(e) = self.try_clone(source, &tree, true).await {
                let _ = tree.destroy().await;
                return Err(e);
            }
        }

        // A clone of an empty repository holds nothing but git metadata.
        match tree.dir().is_empty_ignoring(&[".git"]).await {
            Ok(false) => Ok(tree),
            Ok(true) => {
                let _ = tree.destroy().await;
                Err(DeployError::CloneFailed(format!(
                    "{} is empty",
                    source.slug()
                )))
            }
            Err(e) => {
                let _ = tree.destroy().await;
                Err(e)
            }
        }
    }

    async fn try_clone(
        &self,
        source: &RepoUrl,
        tree: &WorkingTree,
        shallow: bool,
    ) -> Result<(), DeployError> {
        let mut args = vec!["clone".to_string()];
        if shallow {
            args.extend(["--depth".to_string(), "1".to_string()]);
        }
        args.push(source.clone_url());
        args.push(tree.path().to_string_lossy().into_owned());

        let spec = CommandSpec::new(&self.options.git_program, args)
            .with_env(EnvOverlay::new().with("GIT_TERMINAL_PROMPT", "0"))
            .with_timeout(self.options.clone_timeout)
            .with_output_limit(self.options.output_limit);

        let output = self.runner.run(&spec).await.map_err(|e| match e {
            DeployError::Timeout(detail) => DeployError::CloneFailed(detail),
            other => DeployError::CloneFailed(other.to_string()),
        })?;
        if !output.success() {
            return Err(DeployError::CloneFailed(output.error_detail().to_string()));
        }
        Ok(())
    }

    /// Locate the entry file inside a cloned tree
    pub async fn locate_entry(&self, tree: &WorkingTree) -> Result<ScriptArtifact, DeployError> {
        for candidate in &self.options.candidates {
            let file = tree.dir().file(candidate);
            if !file.exists().await {
                continue;
            }
            match file.read_string().await {
                Ok(content) if !content.trim().is_empty() => {
                    debug!("Entry file {} found in working tree", candidate);
                    return Ok(ScriptArtifact::new(candidate.as_str(), content));
                }
                Ok(_) => debug!("Skipping empty {}", candidate),
                Err(e) => debug!("Skipping unreadable {}: {}", candidate, e),
            }
        }

        Err(self.entry_not_found())
    }

    /// Probe raw content URLs for the first non-empty entry file.
    ///
    /// Candidates are tried in order, each on every configured branch.
    pub async fn probe(&self, source: &RepoUrl) -> Result<ScriptArtifact, DeployError> {
        for candidate in &self.options.candidates {
            for branch in &self.options.branches {
                let url = source.raw_url(&self.options.raw_base_url, branch, candidate);
                debug!("Probing {}", url);

                let response = match self.http.get(&url).send().await {
                    Ok(response) => response,
                    Err(e) => {
                        debug!("Probe of {} failed: {}", url, e);
                        continue;
                    }
                };
                if !response.status().is_success() {
                    debug!("Probe of {} returned {}", url, response.status());
                    continue;
                }

                match response.text().await {
                    Ok(content) if !content.trim().is_empty() => {
                        info!("Found {} on branch {} of {}", candidate, branch, source);
                        return Ok(ScriptArtifact::new(candidate.as_str(), content)
                            .with_branch(branch.as_str()));
                    }
                    Ok(_) => debug!("{} is empty on {}", candidate, branch),
                    Err(e) => debug!("Reading {} failed: {}", url, e),
                }
            }
        }

        Err(self.entry_not_found())
    }

    fn entry_not_found(&self) -> DeployError {
        DeployError::EntryNotFound(self.options.candidates.join(", "))
    }
}
