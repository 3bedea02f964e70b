//! Settings file management

use serde::{Deserialize, Serialize};

use crate::deploy::orchestrator::Flow;
use crate::deploy::source::DEFAULT_ENTRY_CANDIDATES;
use crate::deploy::success::DEFAULT_SUCCESS_PHRASES;
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Deployer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily-rolling log files under the storage layout
    #[serde(default)]
    pub log_to_file: bool,

    /// Strategy order
    #[serde(default)]
    pub flow: Flow,

    /// Cloudflare API configuration
    #[serde(default)]
    pub cloudflare: CloudflareSettings,

    /// GitHub source configuration
    #[serde(default)]
    pub github: GithubSettings,

    /// Deploy CLI configuration
    #[serde(default)]
    pub cli: CliSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            flow: Flow::default(),
            cloudflare: CloudflareSettings::default(),
            github: GithubSettings::default(),
            cli: CliSettings::default(),
        }
    }
}

impl Settings {
    /// Read settings from a file, falling back to defaults when it is missing
    pub async fn load_or_default(file: &File) -> Result<Self, DeployError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        file.read_json().await
    }
}

/// Cloudflare API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareSettings {
    /// Base URL for the Cloudflare v4 API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Timeout for API calls in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_api_timeout() -> u64 {
    30
}

impl Default for CloudflareSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            timeout_secs: default_api_timeout(),
        }
    }
}

/// GitHub source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubSettings {
    /// Base URL for raw file content
    #[serde(default = "default_raw_base_url")]
    pub raw_base_url: String,

    /// Timeout for each raw file probe in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Branches tried by the raw file probe, in order
    #[serde(default = "default_branches")]
    pub branches: Vec<String>,

    /// Entry file candidates, in priority order
    #[serde(default = "default_candidates")]
    pub entry_candidates: Vec<String>,

    /// Git executable
    #[serde(default = "default_git_program")]
    pub git_program: String,
}

fn default_raw_base_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_branches() -> Vec<String> {
    vec!["main".to_string(), "master".to_string()]
}

fn default_candidates() -> Vec<String> {
    DEFAULT_ENTRY_CANDIDATES.iter().map(|c| c.to_string()).collect()
}

fn default_git_program() -> String {
    "git".to_string()
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            raw_base_url: default_raw_base_url(),
            probe_timeout_secs: default_probe_timeout(),
            branches: default_branches(),
            entry_candidates: default_candidates(),
            git_program: default_git_program(),
        }
    }
}

/// Deploy CLI settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliSettings {
    /// Executable to run
    #[serde(default = "default_cli_program")]
    pub program: String,

    /// Arguments passed to the executable
    #[serde(default = "default_cli_args")]
    pub args: Vec<String>,

    /// Wall-clock limit for clone and deploy commands in seconds
    #[serde(default = "default_cli_timeout")]
    pub timeout_secs: u64,

    /// Maximum captured bytes per output stream
    #[serde(default = "default_output_limit")]
    pub output_limit_bytes: usize,

    /// Phrases in stdout that confirm a deployment
    #[serde(default = "default_success_phrases")]
    pub success_phrases: Vec<String>,
}

fn default_cli_program() -> String {
    "npx".to_string()
}

fn default_cli_args() -> Vec<String> {
    vec!["--yes".to_string(), "wrangler".to_string(), "deploy".to_string()]
}

fn default_cli_timeout() -> u64 {
    120
}

fn default_output_limit() -> usize {
    10 * 1024 * 1024
}

fn default_success_phrases() -> Vec<String> {
    DEFAULT_SUCCESS_PHRASES.iter().map(|p| p.to_string()).collect()
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            program: default_cli_program(),
            args: default_cli_args(),
            timeout_secs: default_cli_timeout(),
            output_limit_bytes: default_output_limit(),
            success_phrases: default_success_phrases(),
        }
    }
}
