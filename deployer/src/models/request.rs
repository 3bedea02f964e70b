//! Deployment request and credentials

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use crate::errors::DeployError;
use crate::models::repo::RepoUrl;

/// Minimum accepted API token length
pub const MIN_TOKEN_LEN: usize = 20;

static WORKER_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,50}$").expect("worker name regex"));

static HEX_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]{32}$").expect("hex id regex"));

/// Check a worker name against the allowed charset and length
pub fn is_valid_worker_name(name: &str) -> bool {
    WORKER_NAME_RE.is_match(name)
}

/// Check a Cloudflare account or zone identifier
pub fn is_valid_hex_id(id: &str) -> bool {
    HEX_ID_RE.is_match(id)
}

/// Cloudflare credentials passed through to the deploy strategies
#[derive(Clone)]
pub struct Credentials {
    api_token: SecretString,
    account_id: String,
    zone_id: Option<String>,
}

impl Credentials {
    /// Build credentials, validating token length and id formats.
    ///
    /// An empty zone id is treated as absent.
    pub fn new(
        api_token: impl Into<String>,
        account_id: impl Into<String>,
        zone_id: Option<String>,
    ) -> Result<Self, DeployError> {
        let api_token = api_token.into().trim().to_string();
        let account_id = account_id.into().trim().to_string();
        let zone_id = zone_id
            .map(|z| z.trim().to_string())
            .filter(|z| !z.is_empty());

        if api_token.len() < MIN_TOKEN_LEN {
            return Err(DeployError::Validation(format!(
                "API token must be at least {} characters",
                MIN_TOKEN_LEN
            )));
        }
        if !is_valid_hex_id(&account_id) {
            return Err(DeployError::Validation(
                "Account ID must be 32 lowercase hex characters".to_string(),
            ));
        }
        if let Some(zone) = &zone_id {
            if !is_valid_hex_id(zone) {
                return Err(DeployError::Validation(
                    "Zone ID must be 32 lowercase hex characters".to_string(),
                ));
            }
        }

        Ok(Self {
            api_token: SecretString::from(api_token),
            account_id,
            zone_id,
        })
    }

    pub fn api_token(&self) -> &str {
        self.api_token.expose_secret()
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn zone_id(&self) -> Option<&str> {
        self.zone_id.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_token", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .field("zone_id", &self.zone_id)
            .finish()
    }
}

/// One deployment attempt: who deploys what, from where
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    credentials: Credentials,
    worker_name: String,
    source: RepoUrl,
}

impl DeploymentRequest {
    /// Build a request from validated parts
    pub fn new(
        credentials: Credentials,
        worker_name: impl Into<String>,
        source: RepoUrl,
    ) -> Result<Self, DeployError> {
        let worker_name = worker_name.into();
        if !is_valid_worker_name(&worker_name) {
            return Err(DeployError::Validation(format!(
                "Worker name '{}' must be 3-50 characters of letters, digits, '-' or '_'",
                worker_name
            )));
        }

        Ok(Self {
            credentials,
            worker_name,
            source,
        })
    }

    /// Build a request from raw caller input, re-validating the repository URL
    pub fn from_input(
        credentials: Credentials,
        worker_name: impl Into<String>,
        repo_url: &str,
    ) -> Result<Self, DeployError> {
        let source = RepoUrl::parse(repo_url)?;
        Self::new(credentials, worker_name, source)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    pub fn source(&self) -> &RepoUrl {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "abcdefghijklmnopqrstuvwxyz012345";
    const ACCOUNT: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_credentials_validation() {
        assert!(Credentials::new(TOKEN, ACCOUNT, None).is_ok());
        assert!(Credentials::new("short", ACCOUNT, None).is_err());
        assert!(Credentials::new(TOKEN, "0123456789ABCDEF0123456789ABCDEF", None).is_err());
        assert!(Credentials::new(TOKEN, ACCOUNT, Some("zone".to_string())).is_err());

        let creds = Credentials::new(TOKEN, ACCOUNT, Some("  ".to_string())).unwrap();
        assert_eq!(creds.zone_id(), None);
    }

    #[test]
    fn test_credentials_debug_redacts_token() {
        let creds = Credentials::new(TOKEN, ACCOUNT, None).unwrap();
        let debug = format!("{:?}", creds);
        assert!(!debug.contains(TOKEN));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_worker_name_rules() {
        assert!(is_valid_worker_name("demo-worker"));
        assert!(is_valid_worker_name("a_b"));
        assert!(!is_valid_worker_name("ab"));
        assert!(!is_valid_worker_name("has space"));
        assert!(!is_valid_worker_name(&"x".repeat(51)));
    }

    #[test]
    fn test_request_rejects_bad_parts() {
        let creds = Credentials::new(TOKEN, ACCOUNT, None).unwrap();
        assert!(matches!(
            DeploymentRequest::from_input(creds.clone(), "demo-worker", "https://example.com/a/b"),
            Err(DeployError::InvalidSourceUrl(_))
        ));
        assert!(matches!(
            DeploymentRequest::from_input(creds, "no", "https://github.com/acme/demo"),
            Err(DeployError::Validation(_))
        ));
    }
}
