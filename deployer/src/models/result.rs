//! Strategy results and aggregated deployment outcomes

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::utils::sanitize_error;

/// Static advice appended when every strategy failed
pub const REMEDIATION_HINTS: &[&str] = &[
    "Check that the GitHub repository is public and the URL is correct",
    "Check that the API token has the Workers Scripts: Edit permission",
    "Check that the repository has an entry file (index.js, worker.js, main.js, app.js or _worker.js)",
];

/// CI provider for artifact-only deployments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiFlavor {
    GitHubActions,
    GitLabCi,
}

impl CiFlavor {
    pub fn label(&self) -> &'static str {
        match self {
            CiFlavor::GitHubActions => "GitHub Actions",
            CiFlavor::GitLabCi => "GitLab CI/CD",
        }
    }
}

/// Deployment strategy identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Cli,
    Api,
    Ci(CiFlavor),
}

impl StrategyKind {
    /// User-facing method label. CI strategies are marked as deferred since
    /// they only produce a pipeline file.
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::Cli => "Wrangler CLI",
            StrategyKind::Api => "Direct API",
            StrategyKind::Ci(CiFlavor::GitHubActions) => "GitHub Actions (CI-deferred)",
            StrategyKind::Ci(CiFlavor::GitLabCi) => "GitLab CI/CD (CI-deferred)",
        }
    }

    /// True for strategies whose success does not mean a live deployment
    pub fn is_deferred(&self) -> bool {
        matches!(self, StrategyKind::Ci(_))
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal result of one strategy attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyResult {
    /// Strategy that produced this result
    pub strategy: StrategyKind,

    /// Whether the strategy reached its goal
    pub success: bool,

    /// User-facing message on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Sanitized error text on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Non-fatal notices for the user
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,

    /// Generated file, for artifact-only strategies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl StrategyResult {
    pub fn succeeded(strategy: StrategyKind, message: impl Into<String>) -> Self {
        Self {
            strategy,
            success: true,
            message: Some(message.into()),
            error: None,
            warnings: Vec::new(),
            artifact: None,
        }
    }

    /// Failure from a typed error; the text is sanitized for chat output
    pub fn failed(strategy: StrategyKind, error: &DeployError) -> Self {
        Self::failed_with(strategy, error.to_string())
    }

    /// Failure from free-form detail; the text is sanitized for chat output
    pub fn failed_with(strategy: StrategyKind, detail: impl AsRef<str>) -> Self {
        Self {
            strategy,
            success: false,
            message: None,
            error: Some(sanitize_error(detail.as_ref())),
            warnings: Vec::new(),
            artifact: None,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_artifact(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    pub fn label(&self) -> &'static str {
        self.strategy.label()
    }

    /// Succeeded, but only by generating an artifact
    pub fn is_deferred(&self) -> bool {
        self.success && self.strategy.is_deferred()
    }
}

/// Result of a whole orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentOutcome {
    /// Result of the last strategy that ran
    pub result: StrategyResult,

    /// Every attempted strategy, in attempt order
    pub attempts: Vec<StrategyResult>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeploymentOutcome {
    pub fn success(&self) -> bool {
        self.result.success
    }

    /// Strategies that ran, in order
    pub fn attempted(&self) -> Vec<StrategyKind> {
        self.attempts.iter().map(|a| a.strategy).collect()
    }

    /// Human-readable summary for the chat user
    pub fn summary(&self) -> String {
        if self.result.success {
            let mut text = self.result.message.clone().unwrap_or_default();
            for warning in &self.result.warnings {
                text.push_str(&format!("\n⚠️ {}", warning));
            }
            text.push_str(&format!("\n\nMethod: {}", self.result.label()));
            return text;
        }

        let mut text = String::from("❌ All deployment methods failed:\n");
        for (i, attempt) in self.attempts.iter().enumerate() {
            let error = attempt.error.as_deref().unwrap_or("unknown error");
            text.push_str(&format!("{}. {}: {}\n", i + 1, attempt.label(), error));
        }
        text.push_str("\nWhat to check:\n");
        for hint in REMEDIATION_HINTS {
            text.push_str(&format!("- {}\n", hint));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_is_sanitized() {
        let err = DeployError::DeployNotConfirmed(format!("<b>{}</b>", "e".repeat(400)));
        let result = StrategyResult::failed(StrategyKind::Cli, &err);

        let text = result.error.unwrap();
        assert!(text.chars().count() <= crate::utils::MAX_CHAT_TEXT);
        assert!(!text.contains('<'));
        assert!(!result.success);
    }

    #[test]
    fn test_ci_results_are_deferred() {
        let ok = StrategyResult::succeeded(StrategyKind::Ci(CiFlavor::GitLabCi), "generated");
        assert!(ok.is_deferred());
        assert!(ok.label().contains("CI-deferred"));

        let live = StrategyResult::succeeded(StrategyKind::Cli, "deployed");
        assert!(!live.is_deferred());
        assert_eq!(live.label(), "Wrangler CLI");
    }

    #[test]
    fn test_failure_summary_lists_attempts_and_hints() {
        let attempts = vec![
            StrategyResult::failed_with(StrategyKind::Cli, "permission denied"),
            StrategyResult::failed_with(StrategyKind::Api, "HTTP 403: Forbidden"),
        ];
        let outcome = DeploymentOutcome {
            result: attempts[1].clone(),
            attempts,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        let summary = outcome.summary();
        assert!(summary.contains("1. Wrangler CLI: permission denied"));
        assert!(summary.contains("2. Direct API: HTTP 403: Forbidden"));
        for hint in REMEDIATION_HINTS {
            assert!(summary.contains(hint));
        }
        assert_eq!(outcome.attempted(), vec![StrategyKind::Cli, StrategyKind::Api]);
    }
}
