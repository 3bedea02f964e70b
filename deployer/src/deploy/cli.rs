//! Deploying a working tree with the wrangler CLI

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::deploy::runner::{CommandRunner, CommandSpec, EnvOverlay};
use crate::deploy::success::SuccessDetector;
use crate::deploy::workspace::WorkingTree;
use crate::errors::DeployError;
use crate::models::request::Credentials;
use crate::models::result::{StrategyKind, StrategyResult};
use crate::storage::settings::CliSettings;

static WORKERS_DEV_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://[A-Za-z0-9.-]+\.workers\.dev").expect("workers.dev url regex")
});

/// CLI invocation options
#[derive(Debug, Clone)]
pub struct CliOptions {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub output_limit: usize,
}

impl From<&CliSettings> for CliOptions {
    fn from(settings: &CliSettings) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            output_limit: settings.output_limit_bytes,
        }
    }
}

impl Default for CliOptions {
    fn default() -> Self {
        Self::from(&CliSettings::default())
    }
}

/// Runs the deploy CLI inside a working tree
#[derive(Clone)]
pub struct CliDeployer {
    runner: Arc<dyn CommandRunner>,
    detector: Arc<dyn SuccessDetector>,
    options: CliOptions,
}

impl CliDeployer {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        detector: Arc<dyn SuccessDetector>,
        options: CliOptions,
    ) -> Self {
        Self {
            runner,
            detector,
            options,
        }
    }

    /// Variables handed to the CLI process
    pub fn environment(credentials: &Credentials) -> EnvOverlay {
        let env = EnvOverlay::new()
            .with("CLOUDFLARE_API_TOKEN", credentials.api_token())
            .with("CLOUDFLARE_ACCOUNT_ID", credentials.account_id())
            .with("NODE_ENV", "production");
        match credentials.zone_id() {
            Some(zone_id) => env.with("CLOUDFLARE_ZONE_ID", zone_id),
            None => env,
        }
    }

    /// Deploy the tree. The tree is destroyed before this returns.
    pub async fn deploy(
        &self,
        tree: WorkingTree,
        credentials: &Credentials,
        worker_name: &str,
    ) -> StrategyResult {
        let outcome = self.run(&tree, credentials).await;

        if let Err(e) = tree.destroy().await {
            warn!("Failed to clean up after CLI deploy: {}", e);
        }

        match outcome {
            Ok(stdout) => {
                info!("Worker {} deployed via CLI", worker_name);
                let mut message = format!(
                    "✅ Worker deployed via Wrangler CLI!\n\n📝 Name: {}",
                    worker_name
                );
                if let Some(url) = WORKERS_DEV_URL.find(&stdout) {
                    message.push_str(&format!("\n🔗 URL: {}", url.as_str()));
                }
                StrategyResult::succeeded(StrategyKind::Cli, message)
            }
            Err(e) => {
                error!("CLI deploy of {} failed: {}", worker_name, e);
                StrategyResult::failed(StrategyKind::Cli, &e)
            }
        }
    }

    async fn run(&self, tree: &WorkingTree, credentials: &Credentials) -> Result<String, DeployError> {
        let spec = CommandSpec::new(&self.options.program, self.options.args.clone())
            .with_cwd(tree.path())
            .with_env(Self::environment(credentials))
            .with_timeout(self.options.timeout)
            .with_output_limit(self.options.output_limit);

        let output = self.runner.run(&spec).await?;
        debug!(
            "`{}` exited with {:?}\nstdout: {}\nstderr: {}",
            spec.display(),
            output.exit_code,
            output.stdout,
            output.stderr
        );

        if !output.success() {
            let code = output
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(DeployError::DeployNotConfirmed(format!(
                "exit {}: {}",
                code,
                output.error_detail()
            )));
        }
        if !self.detector.is_success(&output.stdout, &output.stderr) {
            return Err(DeployError::DeployNotConfirmed(
                output.error_detail().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}
