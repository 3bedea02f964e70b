//! Sequencing strategies into a deployment flow

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::deploy::api::ApiDeployer;
use crate::deploy::ci::CiGenerator;
use crate::deploy::cli::{CliDeployer, CliOptions};
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::deploy::progress::{ProgressSink, Reporter};
use crate::deploy::runner::CommandRunner;
use crate::deploy::source::{SourceFetcher, SourceOptions};
use crate::deploy::strategy::{ApiStrategy, CiStrategy, CliStrategy, Strategy};
use crate::deploy::success::PhraseDetector;
use crate::deploy::workspace::Workspace;
use crate::errors::DeployError;
use crate::http::cloudflare::CloudflareClient;
use crate::models::request::DeploymentRequest;
use crate::models::result::{CiFlavor, DeploymentOutcome, StrategyKind, StrategyResult};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Preset strategy orders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// CLI, API, then both CI pipelines
    #[default]
    AllMethods,
    /// CLI, then API
    CliThenApi,
}

impl Flow {
    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        match self {
            Flow::AllMethods => vec![
                StrategyKind::Cli,
                StrategyKind::Api,
                StrategyKind::Ci(CiFlavor::GitHubActions),
                StrategyKind::Ci(CiFlavor::GitLabCi),
            ],
            Flow::CliThenApi => vec![StrategyKind::Cli, StrategyKind::Api],
        }
    }
}

impl FromStr for Flow {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "all" | "all_methods" => Ok(Flow::AllMethods),
            "cli_api" | "cli_then_api" => Ok(Flow::CliThenApi),
            other => Err(DeployError::Config(format!("Unknown flow: {}", other))),
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::AllMethods => f.write_str("all_methods"),
            Flow::CliThenApi => f.write_str("cli_then_api"),
        }
    }
}

/// Outcome plus the state machine that produced it
#[derive(Debug, Clone)]
pub struct FlowRun {
    pub outcome: DeploymentOutcome,
    pub fsm: DeploymentFsm,
}

/// Runs strategies in order until one deploys the worker.
///
/// A live success ends the flow. A CI-deferred success is kept but the flow
/// goes on, so every configured pipeline gets generated; the last one is
/// reported when nothing deployed live.
pub struct DeploymentOrchestrator {
    strategies: Vec<Arc<dyn Strategy>>,
    workspace: Arc<Workspace>,
}

impl DeploymentOrchestrator {
    pub fn new(workspace: Arc<Workspace>, strategies: Vec<Arc<dyn Strategy>>) -> Self {
        Self {
            strategies,
            workspace,
        }
    }

    /// Wire up the configured flow from settings
    pub fn from_settings(
        settings: &Settings,
        layout: &StorageLayout,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, DeployError> {
        let workspace = Arc::new(Workspace::new(layout.temp_dir()));
        let fetcher = Arc::new(SourceFetcher::new(
            runner.clone(),
            workspace.clone(),
            SourceOptions::from_settings(settings),
        )?);
        let client = Arc::new(CloudflareClient::new(
            &settings.cloudflare.api_base_url,
            Duration::from_secs(settings.cloudflare.timeout_secs),
        )?);
        let cli = CliDeployer::new(
            runner,
            Arc::new(PhraseDetector::new(settings.cli.success_phrases.clone())),
            CliOptions::from(&settings.cli),
        );
        let api = ApiDeployer::new(client);
        let generator = Arc::new(CiGenerator::new(layout.ci_dir()));

        let strategies = settings
            .flow
            .strategy_kinds()
            .into_iter()
            .map(|kind| -> Arc<dyn Strategy> {
                match kind {
                    StrategyKind::Cli => Arc::new(CliStrategy::new(fetcher.clone(), cli.clone())),
                    StrategyKind::Api => Arc::new(ApiStrategy::new(fetcher.clone(), api.clone())),
                    StrategyKind::Ci(flavor) => Arc::new(CiStrategy::new(flavor, generator.clone())),
                }
            })
            .collect();

        Ok(Self::new(workspace, strategies))
    }

    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    /// Deploy the requested worker
    pub async fn deploy(
        &self,
        request: &DeploymentRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DeploymentOutcome, DeployError> {
        Ok(self.run(request, sink).await?.outcome)
    }

    /// Deploy the requested worker, also returning the state machine
    pub async fn run(
        &self,
        request: &DeploymentRequest,
        sink: &dyn ProgressSink,
    ) -> Result<FlowRun, DeployError> {
        if self.strategies.is_empty() {
            return Err(DeployError::Config(
                "No deployment strategies configured".to_string(),
            ));
        }

        let worker_name = request.worker_name();
        let _guard = self.workspace.lock(worker_name).await;
        info!(
            "Deploying {} from {} with {} strategies",
            worker_name,
            request.source(),
            self.strategies.len()
        );

        let reporter = Reporter::new(sink);
        let started_at = Utc::now();
        let mut attempts: Vec<StrategyResult> = Vec::new();
        let mut live: Option<StrategyResult> = None;
        let mut deferred: Option<StrategyResult> = None;

        for (i, strategy) in self.strategies.iter().enumerate() {
            let label = strategy.kind().label();
            let announce = match attempts.last() {
                Some(previous) if !previous.success => format!(
                    "🔄 {} failed, trying method {}: {}",
                    previous.label(),
                    i + 1,
                    label
                ),
                _ => format!("🔄 Method {}: {}", i + 1, label),
            };
            reporter.notify(&announce).await;

            let result = strategy.attempt(request, &reporter).await;
            attempts.push(result.clone());

            if result.success && !result.is_deferred() {
                live = Some(result);
                break;
            }
            if result.success {
                deferred = Some(result);
            }
        }

        self.workspace.sweep(worker_name).await;

        let result = match live.or(deferred) {
            Some(result) => {
                info!("{} finished via {}", worker_name, result.label());
                let message = if result.is_deferred() {
                    format!("📋 Pipeline ready ({})", result.label())
                } else {
                    format!("✅ Deployed via {}", result.label())
                };
                reporter.enter(DeploymentEvent::Succeed, &message).await;
                result
            }
            None => {
                error!("Every strategy failed for {}", worker_name);
                reporter
                    .enter(DeploymentEvent::Exhaust, "❌ All deployment methods failed")
                    .await;
                attempts.last().cloned().ok_or_else(|| {
                    DeployError::UnknownError("No strategy produced a result".to_string())
                })?
            }
        };

        Ok(FlowRun {
            outcome: DeploymentOutcome {
                result,
                attempts,
                started_at,
                finished_at: Utc::now(),
            },
            fsm: reporter.into_fsm(),
        })
    }
}
