//! wdeploy - Entry Point
//!
//! Deploys a Cloudflare Worker from a GitHub repository, falling back through
//! the wrangler CLI, the Cloudflare API and generated CI pipelines.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use tracing::{error, info};

use wdeploy::deploy::orchestrator::{DeploymentOrchestrator, Flow};
use wdeploy::deploy::progress::ProgressSink;
use wdeploy::deploy::runner::ProcessRunner;
use wdeploy::filesys::file::File;
use wdeploy::http::cloudflare::CloudflareClient;
use wdeploy::logs::{init_logging, LogOptions};
use wdeploy::models::request::{Credentials, DeploymentRequest};
use wdeploy::storage::layout::StorageLayout;
use wdeploy::storage::session::{JsonSessionRepository, SessionRepository, UserRecord};
use wdeploy::storage::settings::Settings;
use wdeploy::utils::version_info;

const USAGE: &str = "\
Usage:
  wdeploy --repo=<github url> --name=<worker> [credentials] [--flow=all|cli-then-api]
  wdeploy --save-user=<id> --token=<token> --account=<id> [--zone=<id>]
  wdeploy --list [credentials]
  wdeploy --delete=<worker> [credentials]
  wdeploy --verify [credentials]
  wdeploy --version

Credentials: --token=<token> --account=<id> [--zone=<id>], or --user=<id>
Options: --settings=<path>";

/// Prints progress lines to the terminal
struct TerminalProgress;

#[async_trait::async_trait]
impl ProgressSink for TerminalProgress {
    async fn notify(&self, message: &str) {
        println!("{}", message.dimmed());
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}", e),
        }
        return ExitCode::SUCCESS;
    }

    if cli_args.contains_key("help") || cli_args.is_empty() {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    // Retrieve the settings file
    let layout = StorageLayout::default();
    let settings_file = match cli_args.get("settings") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let mut settings = match Settings::load_or_default(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", "Unable to read settings file:".red(), e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings
            .log_to_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    if let Some(flow) = cli_args.get("flow") {
        match flow.parse::<Flow>() {
            Ok(flow) => settings.flow = flow,
            Err(e) => {
                eprintln!("{}", e.to_string().red());
                return ExitCode::FAILURE;
            }
        }
    }

    let result = if cli_args.contains_key("save-user") {
        save_user(&cli_args, &layout).await
    } else if cli_args.contains_key("list") {
        list_scripts(&cli_args, &settings, &layout).await
    } else if cli_args.contains_key("delete") {
        delete_script(&cli_args, &settings, &layout).await
    } else if cli_args.contains_key("verify") {
        verify(&cli_args, &settings, &layout).await
    } else {
        deploy(&cli_args, &settings, &layout).await
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn credentials(
    cli_args: &HashMap<String, String>,
    layout: &StorageLayout,
) -> anyhow::Result<Credentials> {
    if let Some(user) = cli_args.get("user") {
        let repo = JsonSessionRepository::new(layout.sessions_file());
        let record = repo
            .get(user)
            .await?
            .ok_or_else(|| anyhow!("No saved credentials for user {}", user))?;
        return Ok(record.credentials()?);
    }

    let token = cli_args
        .get("token")
        .context("--token is required (or --user)")?;
    let account = cli_args
        .get("account")
        .context("--account is required (or --user)")?;
    Ok(Credentials::new(
        token.as_str(),
        account.as_str(),
        cli_args.get("zone").cloned(),
    )?)
}

fn client(settings: &Settings) -> anyhow::Result<CloudflareClient> {
    Ok(CloudflareClient::new(
        &settings.cloudflare.api_base_url,
        Duration::from_secs(settings.cloudflare.timeout_secs),
    )?)
}

async fn deploy(
    cli_args: &HashMap<String, String>,
    settings: &Settings,
    layout: &StorageLayout,
) -> anyhow::Result<bool> {
    let (Some(repo), Some(name)) = (cli_args.get("repo"), cli_args.get("name")) else {
        bail!("--repo and --name are required\n\n{}", USAGE);
    };
    let request = DeploymentRequest::from_input(credentials(cli_args, layout).await?, name.as_str(), repo)?;

    layout.setup().await.context("Failed to prepare storage")?;
    let orchestrator =
        DeploymentOrchestrator::from_settings(settings, layout, Arc::new(ProcessRunner))?;
    info!(
        "Running flow {} ({:?})",
        settings.flow,
        orchestrator.strategy_kinds()
    );

    let outcome = orchestrator.deploy(&request, &TerminalProgress).await?;
    println!();
    if outcome.success() {
        println!("{}", outcome.summary().green());
        if let Some(artifact) = &outcome.result.artifact {
            println!("\nPipeline file: {}", artifact.display());
        }
    } else {
        println!("{}", outcome.summary().red());
    }
    Ok(outcome.success())
}

async fn save_user(cli_args: &HashMap<String, String>, layout: &StorageLayout) -> anyhow::Result<bool> {
    let user = cli_args
        .get("save-user")
        .filter(|u| u.as_str() != "true")
        .context("--save-user needs a user id")?;
    let token = cli_args.get("token").context("--token is required")?;
    let account = cli_args.get("account").context("--account is required")?;

    // Validate before storing.
    let credentials = Credentials::new(token.as_str(), account.as_str(), cli_args.get("zone").cloned())?;
    let record = UserRecord {
        api_token: credentials.api_token().to_string(),
        account_id: credentials.account_id().to_string(),
        zone_id: credentials.zone_id().map(str::to_string),
        temp_worker_name: cli_args.get("name").cloned(),
    };

    let repo = JsonSessionRepository::new(layout.sessions_file());
    repo.set(user, record).await?;
    println!("{} {}", "Saved credentials for user".green(), user);
    Ok(true)
}

async fn list_scripts(
    cli_args: &HashMap<String, String>,
    settings: &Settings,
    layout: &StorageLayout,
) -> anyhow::Result<bool> {
    let credentials = credentials(cli_args, layout).await?;
    let scripts = client(settings)?
        .list_scripts(credentials.api_token(), credentials.account_id())
        .await?;

    if scripts.is_empty() {
        println!("No workers in this account");
    }
    for script in scripts {
        println!(
            "{}  {}",
            script.id.bold(),
            script.modified_on.unwrap_or_default().dimmed()
        );
    }
    Ok(true)
}

async fn delete_script(
    cli_args: &HashMap<String, String>,
    settings: &Settings,
    layout: &StorageLayout,
) -> anyhow::Result<bool> {
    let name = cli_args
        .get("delete")
        .filter(|n| n.as_str() != "true")
        .context("--delete needs a worker name")?;
    let credentials = credentials(cli_args, layout).await?;
    client(settings)?
        .delete_script(credentials.api_token(), credentials.account_id(), name)
        .await?;
    println!("{} {}", "Deleted".green(), name);
    Ok(true)
}

async fn verify(
    cli_args: &HashMap<String, String>,
    settings: &Settings,
    layout: &StorageLayout,
) -> anyhow::Result<bool> {
    let credentials = credentials(cli_args, layout).await?;
    let client = client(settings)?;

    client
        .verify_account(credentials.api_token(), credentials.account_id())
        .await
        .context("Account check failed")?;
    println!("{} account {}", "✓".green(), credentials.account_id());

    if let Some(zone_id) = credentials.zone_id() {
        client
            .verify_zone(credentials.api_token(), zone_id)
            .await
            .context("Zone check failed")?;
        println!("{} zone {}", "✓".green(), zone_id);
    }
    Ok(true)
}
