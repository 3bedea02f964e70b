//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use wdeploy::deploy::progress::ProgressSink;
use wdeploy::deploy::runner::{CommandOutput, CommandRunner, CommandSpec};
use wdeploy::errors::DeployError;
use wdeploy::models::request::{Credentials, DeploymentRequest};
use wdeploy::storage::layout::StorageLayout;
use wdeploy::storage::settings::Settings;

pub const TOKEN: &str = "abcdefghijklmnopqrstuvwxyz012345";
pub const ACCOUNT: &str = "0123456789abcdef0123456789abcdef";
pub const WORKER: &str = "demo-worker";
pub const REPO: &str = "https://github.com/acme/demo";

pub const ES_MODULE: &str =
    "export default {\n  async fetch(request) {\n    return new Response('hi');\n  }\n};\n";

/// Stands in for git and the deploy CLI.
///
/// `git clone` writes `files` into the target directory. Any other program
/// records the descriptor it would have read and returns `cli_output`.
pub struct FakeRunner {
    pub files: Vec<(String, String)>,
    pub clone_fails: bool,
    pub cli_output: CommandOutput,
    pub cli_delay: Duration,
    pub calls: Mutex<Vec<CommandSpec>>,
    pub descriptors: Mutex<Vec<Option<String>>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl FakeRunner {
    pub fn new(files: &[(&str, &str)], cli_output: CommandOutput) -> Self {
        Self {
            files: files
                .iter()
                .map(|(name, content)| (name.to_string(), content.to_string()))
                .collect(),
            clone_fails: false,
            cli_output,
            cli_delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            descriptors: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn failing_clone(mut self) -> Self {
        self.clone_fails = true;
        self
    }

    pub fn with_cli_delay(mut self, delay: Duration) -> Self {
        self.cli_delay = delay;
        self
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.program.clone())
            .collect()
    }

    pub fn last_descriptor(&self) -> Option<String> {
        self.descriptors.lock().unwrap().last().cloned().flatten()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, DeployError> {
        self.calls.lock().unwrap().push(spec.clone());

        if spec.program == "git" {
            if self.clone_fails {
                return Ok(output(128, "", "fatal: could not read Username for 'https://github.com'"));
            }
            let target = PathBuf::from(spec.args.last().expect("clone target"));
            for (name, content) in &self.files {
                let path = target.join(name);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, content).unwrap();
            }
            return Ok(output(0, "", "Cloning into 'demo-worker'..."));
        }

        let cwd = spec.cwd.clone().expect("cli runs in the working tree");
        let descriptor = std::fs::read_to_string(cwd.join("wrangler.toml")).ok();
        self.descriptors.lock().unwrap().push(descriptor);

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.cli_delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        Ok(self.cli_output.clone())
    }
}

pub fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(exit_code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

/// Collects progress messages
#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

pub fn credentials() -> Credentials {
    Credentials::new(TOKEN, ACCOUNT, None).unwrap()
}

pub fn request() -> DeploymentRequest {
    DeploymentRequest::from_input(credentials(), WORKER, REPO).unwrap()
}

/// Settings pointing every remote endpoint at `server_uri`
pub fn settings(server_uri: &str) -> Settings {
    let mut settings = Settings::default();
    settings.cloudflare.api_base_url = server_uri.to_string();
    settings.github.raw_base_url = server_uri.to_string();
    settings.github.probe_timeout_secs = 2;
    settings
}

pub fn layout(root: &Path) -> StorageLayout {
    StorageLayout::new(root)
}

pub fn tree_path(layout: &StorageLayout) -> PathBuf {
    layout.temp_dir().path().join(WORKER)
}
