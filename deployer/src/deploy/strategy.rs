//! Deployment strategies
//!
//! A strategy is one self-contained way to get a worker deployed. It reports
//! its own phases through the [`Reporter`] and always comes back with a
//! [`StrategyResult`]; internal errors never escape as `Err`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::deploy::api::ApiDeployer;
use crate::deploy::ci::CiGenerator;
use crate::deploy::cli::CliDeployer;
use crate::deploy::descriptor::{ConfigSynthesizer, DescriptorAction, DESCRIPTOR_FILE};
use crate::deploy::fsm::DeploymentEvent;
use crate::deploy::progress::Reporter;
use crate::deploy::source::SourceFetcher;
use crate::models::request::DeploymentRequest;
use crate::models::result::{CiFlavor, StrategyKind, StrategyResult};

#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn attempt(&self, request: &DeploymentRequest, reporter: &Reporter<'_>) -> StrategyResult;
}

/// Clone, write the descriptor, run the deploy CLI
pub struct CliStrategy {
    fetcher: Arc<SourceFetcher>,
    synthesizer: ConfigSynthesizer,
    deployer: CliDeployer,
}

impl CliStrategy {
    pub fn new(fetcher: Arc<SourceFetcher>, deployer: CliDeployer) -> Self {
        Self {
            fetcher,
            synthesizer: ConfigSynthesizer::new(),
            deployer,
        }
    }
}

#[async_trait]
impl Strategy for CliStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Cli
    }

    async fn attempt(&self, request: &DeploymentRequest, reporter: &Reporter<'_>) -> StrategyResult {
        let worker_name = request.worker_name();

        reporter
            .enter(
                DeploymentEvent::Fetch,
                &format!("📥 Cloning {}...", request.source()),
            )
            .await;
        let tree = match self.fetcher.clone_repo(request.source(), worker_name).await {
            Ok(tree) => tree,
            Err(e) => return StrategyResult::failed(self.kind(), &e),
        };

        let artifact = match self.fetcher.locate_entry(&tree).await {
            Ok(artifact) => artifact,
            Err(e) => {
                let _ = tree.destroy().await;
                return StrategyResult::failed(self.kind(), &e);
            }
        };
        reporter
            .notify(&format!(
                "✅ Entry file: {} ({})",
                artifact.entry_file(),
                artifact.kind().label()
            ))
            .await;

        reporter
            .enter(
                DeploymentEvent::Configure,
                &format!("📝 Preparing {}...", DESCRIPTOR_FILE),
            )
            .await;
        let synthesis = self
            .synthesizer
            .synthesize(
                &tree,
                worker_name,
                &artifact,
                Some(request.credentials().account_id()),
            )
            .await;
        let note = match synthesis.action {
            DescriptorAction::Created => "created a default config",
            DescriptorAction::Patched => "updated name and main",
            DescriptorAction::Replaced => "replaced an unreadable config",
        };
        reporter
            .notify(&format!("📝 {}: {}", DESCRIPTOR_FILE, note))
            .await;

        reporter
            .enter(
                DeploymentEvent::Attempt(self.kind()),
                "🚀 Running wrangler deploy...",
            )
            .await;
        self.deployer
            .deploy(tree, request.credentials(), worker_name)
            .await
    }
}

/// Probe for the entry file, upload it through the API
pub struct ApiStrategy {
    fetcher: Arc<SourceFetcher>,
    deployer: ApiDeployer,
}

impl ApiStrategy {
    pub fn new(fetcher: Arc<SourceFetcher>, deployer: ApiDeployer) -> Self {
        Self { fetcher, deployer }
    }
}

#[async_trait]
impl Strategy for ApiStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Api
    }

    async fn attempt(&self, request: &DeploymentRequest, reporter: &Reporter<'_>) -> StrategyResult {
        reporter
            .enter(DeploymentEvent::Fetch, "🔍 Looking for the entry file...")
            .await;
        let artifact = match self.fetcher.probe(request.source()).await {
            Ok(artifact) => artifact,
            Err(e) => return StrategyResult::failed(self.kind(), &e),
        };
        reporter
            .notify(&format!(
                "✅ Found {} on branch {} ({})",
                artifact.entry_file(),
                artifact.branch().unwrap_or("?"),
                artifact.kind().label()
            ))
            .await;

        reporter
            .enter(
                DeploymentEvent::Attempt(self.kind()),
                "🚀 Uploading via Cloudflare API...",
            )
            .await;
        self.deployer
            .deploy(request.credentials(), request.worker_name(), &artifact)
            .await
    }
}

/// Generate a CI pipeline for the user to commit
pub struct CiStrategy {
    flavor: CiFlavor,
    generator: Arc<CiGenerator>,
}

impl CiStrategy {
    pub fn new(flavor: CiFlavor, generator: Arc<CiGenerator>) -> Self {
        Self { flavor, generator }
    }
}

#[async_trait]
impl Strategy for CiStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ci(self.flavor)
    }

    async fn attempt(&self, request: &DeploymentRequest, reporter: &Reporter<'_>) -> StrategyResult {
        reporter
            .enter(
                DeploymentEvent::Attempt(self.kind()),
                &format!("📋 Generating {} pipeline...", self.flavor.label()),
            )
            .await;
        self.generator
            .generate(self.flavor, request.worker_name(), request.source())
            .await
    }
}
