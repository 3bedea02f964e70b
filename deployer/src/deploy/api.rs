//! Deploying a single script through the Cloudflare API

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::errors::DeployError;
use crate::http::cloudflare::CloudflareClient;
use crate::models::artifact::ScriptArtifact;
use crate::models::request::Credentials;
use crate::models::result::{StrategyKind, StrategyResult};

/// Scripts above this size are rejected before upload
pub const MAX_SCRIPT_BYTES: u64 = 1024 * 1024;

/// Scripts above this size are uploaded with a warning
pub const WARN_SCRIPT_BYTES: u64 = 500 * 1024;

/// Check the script size, returning a warning for large scripts
pub fn check_size(artifact: &ScriptArtifact) -> Result<Option<String>, DeployError> {
    let size = artifact.size();
    let kib = size.div_ceil(1024);
    if size > MAX_SCRIPT_BYTES {
        return Err(DeployError::ScriptTooLarge(kib));
    }
    if size > WARN_SCRIPT_BYTES {
        return Ok(Some(format!(
            "Script is {} KiB, close to the 1024 KiB limit",
            kib
        )));
    }
    Ok(None)
}

/// Uploads scripts with the Cloudflare client
#[derive(Clone)]
pub struct ApiDeployer {
    client: Arc<CloudflareClient>,
}

impl ApiDeployer {
    pub fn new(client: Arc<CloudflareClient>) -> Self {
        Self { client }
    }

    pub async fn deploy(
        &self,
        credentials: &Credentials,
        worker_name: &str,
        artifact: &ScriptArtifact,
    ) -> StrategyResult {
        let warning = match check_size(artifact) {
            Ok(warning) => warning,
            Err(e) => {
                error!("Not uploading {}: {}", worker_name, e);
                return StrategyResult::failed(StrategyKind::Api, &e);
            }
        };
        if let Some(warning) = &warning {
            warn!("{}: {}", worker_name, warning);
        }

        let upload = self
            .client
            .upload_script(
                credentials.api_token(),
                credentials.account_id(),
                worker_name,
                artifact,
            )
            .await;

        match upload {
            Ok(status) => {
                info!("Worker {} uploaded via API (HTTP {})", worker_name, status);
                let message = format!(
                    "✅ Worker deployed via Cloudflare API!\n\n📝 Name: {}\n📄 Entry: {} ({})",
                    worker_name,
                    artifact.entry_file(),
                    artifact.kind().label()
                );
                StrategyResult::succeeded(StrategyKind::Api, message)
                    .with_warnings(warning.into_iter().collect())
            }
            Err(e) => {
                error!("API deploy of {} failed: {}", worker_name, e);
                StrategyResult::failed(StrategyKind::Api, &e)
                    .with_warnings(warning.into_iter().collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_thresholds() {
        let small = ScriptArtifact::new("index.js", "x".repeat(1024));
        assert_eq!(check_size(&small).unwrap(), None);

        let at_warning = ScriptArtifact::new("index.js", "x".repeat(500 * 1024));
        assert_eq!(check_size(&at_warning).unwrap(), None);

        let large = ScriptArtifact::new("index.js", "x".repeat(600 * 1024));
        assert!(check_size(&large).unwrap().unwrap().contains("600 KiB"));

        let at_limit = ScriptArtifact::new("index.js", "x".repeat(1024 * 1024));
        assert!(check_size(&at_limit).unwrap().is_some());

        let too_large = ScriptArtifact::new("index.js", "x".repeat(1024 * 1024 + 1));
        assert!(matches!(
            check_size(&too_large),
            Err(DeployError::ScriptTooLarge(1025))
        ));
    }
}
