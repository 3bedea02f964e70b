//! CI pipeline generation
//!
//! These strategies never deploy anything. They write a pipeline definition
//! the user commits to their repository; the secrets it references are
//! configured in the CI provider and never leave this process.

use tracing::{error, info};

use crate::deploy::descriptor::COMPATIBILITY_DATE;
use crate::filesys::dir::Dir;
use crate::models::repo::RepoUrl;
use crate::models::result::{CiFlavor, StrategyKind, StrategyResult};

/// Secret names the pipelines expect
pub const CI_SECRETS: &[&str] = &["CF_API_TOKEN", "CF_ACCOUNT_ID", "CF_ZONE_ID"];

/// Pipeline file location inside a repository
pub fn pipeline_path(flavor: CiFlavor) -> &'static str {
    match flavor {
        CiFlavor::GitHubActions => ".github/workflows/deploy.yml",
        CiFlavor::GitLabCi => ".gitlab-ci.yml",
    }
}

/// Shell snippet that deploys, writing a minimal descriptor when the
/// repository has none
fn deploy_script(worker_name: &str, indent: &str) -> String {
    [
        "if [ ! -f wrangler.toml ]; then".to_string(),
        format!("  echo 'name = \"{}\"' > wrangler.toml", worker_name),
        "  echo 'main = \"index.js\"' >> wrangler.toml".to_string(),
        format!(
            "  echo 'compatibility_date = \"{}\"' >> wrangler.toml",
            COMPATIBILITY_DATE
        ),
        "fi".to_string(),
        "npx --yes wrangler deploy".to_string(),
    ]
    .iter()
    .map(|line| format!("{}{}\n", indent, line))
    .collect()
}

/// Render the pipeline definition
pub fn render(flavor: CiFlavor, worker_name: &str, repo: &RepoUrl) -> String {
    match flavor {
        CiFlavor::GitHubActions => format!(
            r#"# Deploys {worker} to Cloudflare Workers
# Repository: {repo}
name: Deploy Cloudflare Worker

on:
  push:
    branches: [ main, master ]
  workflow_dispatch:

jobs:
  deploy:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4

      - name: Setup Node.js
        uses: actions/setup-node@v4
        with:
          node-version: '20'

      - name: Deploy to Cloudflare Workers
        env:
          CLOUDFLARE_API_TOKEN: ${{{{ secrets.CF_API_TOKEN }}}}
          CLOUDFLARE_ACCOUNT_ID: ${{{{ secrets.CF_ACCOUNT_ID }}}}
          CLOUDFLARE_ZONE_ID: ${{{{ secrets.CF_ZONE_ID }}}}
        run: |
{script}"#,
            worker = worker_name,
            repo = repo,
            script = deploy_script(worker_name, "          "),
        ),
        CiFlavor::GitLabCi => format!(
            r#"# Deploys {worker} to Cloudflare Workers
# Repository: {repo}
stages:
  - deploy

deploy_worker:
  stage: deploy
  image: node:20
  variables:
    CLOUDFLARE_API_TOKEN: $CF_API_TOKEN
    CLOUDFLARE_ACCOUNT_ID: $CF_ACCOUNT_ID
    CLOUDFLARE_ZONE_ID: $CF_ZONE_ID
  script:
    - |
{script}  rules:
    - if: '$CI_COMMIT_BRANCH == "main" || $CI_COMMIT_BRANCH == "master"'
"#,
            worker = worker_name,
            repo = repo,
            script = deploy_script(worker_name, "      "),
        ),
    }
}

/// Writes pipeline files under `<output_root>/<worker_name>/`
#[derive(Debug, Clone)]
pub struct CiGenerator {
    output_root: Dir,
}

impl CiGenerator {
    pub fn new(output_root: Dir) -> Self {
        Self { output_root }
    }

    pub fn output_root(&self) -> &Dir {
        &self.output_root
    }

    pub async fn generate(
        &self,
        flavor: CiFlavor,
        worker_name: &str,
        repo: &RepoUrl,
    ) -> StrategyResult {
        let kind = StrategyKind::Ci(flavor);
        let relative = pipeline_path(flavor);
        let file = self.output_root.subdir(worker_name).file(relative);

        if let Err(e) = file.write_string(&render(flavor, worker_name, repo)).await {
            error!("Failed to write {} pipeline: {}", flavor.label(), e);
            return StrategyResult::failed(kind, &e);
        }
        info!("{} pipeline for {} written to {}", flavor.label(), worker_name, file.path().display());

        let secrets: String = CI_SECRETS.iter().map(|s| format!("\n- {}", s)).collect();
        let message = format!(
            "📋 {} pipeline generated (not deployed yet)\n\n📝 Name: {}\n📁 File: {}\n\n🔑 Add these secrets in your CI settings:{}\n\n🚀 Commit the file to {} and push to trigger the deployment.",
            flavor.label(),
            worker_name,
            relative,
            secrets,
            repo
        );
        StrategyResult::succeeded(kind, message).with_artifact(file.path())
    }
}
