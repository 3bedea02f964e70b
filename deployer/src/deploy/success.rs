//! Deploy confirmation
//!
//! The deploy CLI does not report success through its exit status reliably,
//! so a run only counts when its output says so.

/// Phrases printed by the deploy CLI after a completed upload
pub const DEFAULT_SUCCESS_PHRASES: &[&str] = &[
    "Successfully deployed",
    "Successfully published",
    "Deployed to",
    "Published ",
    "Current Version ID",
];

/// Decides whether captured CLI output confirms a deployment
pub trait SuccessDetector: Send + Sync {
    fn is_success(&self, stdout: &str, stderr: &str) -> bool;
}

impl<F> SuccessDetector for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn is_success(&self, stdout: &str, stderr: &str) -> bool {
        self(stdout, stderr)
    }
}

/// Looks for any of a list of phrases in stdout
#[derive(Debug, Clone)]
pub struct PhraseDetector {
    phrases: Vec<String>,
}

impl PhraseDetector {
    pub fn new(phrases: Vec<String>) -> Self {
        Self { phrases }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

impl Default for PhraseDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SUCCESS_PHRASES.iter().map(|p| p.to_string()).collect())
    }
}

impl SuccessDetector for PhraseDetector {
    fn is_success(&self, stdout: &str, _stderr: &str) -> bool {
        self.phrases.iter().any(|phrase| stdout.contains(phrase.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_phrases() {
        let detector = PhraseDetector::default();
        assert!(detector.is_success("Uploaded demo\nDeployed to https://demo.x.workers.dev", ""));
        assert!(detector.is_success("Current Version ID: 1234", ""));
        assert!(!detector.is_success("Compiled worker", ""));
    }

    #[test]
    fn test_phrase_in_stderr_does_not_count() {
        let detector = PhraseDetector::default();
        assert!(!detector.is_success("", "Successfully deployed"));
    }

    #[test]
    fn test_closure_detector() {
        let detector = |stdout: &str, _: &str| stdout.starts_with("OK");
        assert!(detector.is_success("OK done", ""));
        assert!(!detector.is_success("failed", ""));
    }
}
