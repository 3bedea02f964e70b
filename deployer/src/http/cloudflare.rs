//! Cloudflare Workers REST client

use std::time::Duration;

use reqwest::{header, multipart, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::deploy::descriptor::{COMPATIBILITY_DATE, NODE_COMPAT_FLAG};
use crate::errors::DeployError;
use crate::models::artifact::{ScriptArtifact, ScriptKind};

/// One message in a Cloudflare API envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
}

/// Standard Cloudflare v4 response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
}

/// A worker script as listed by the API
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerScript {
    pub id: String,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub modified_on: Option<String>,
}

/// Client for the account-scoped scripts collection
pub struct CloudflareClient {
    client: Client,
    base_url: String,
}

impl CloudflareClient {
    /// Create a new client; `timeout` bounds every request
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DeployError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn script_url(&self, account_id: &str, name: &str) -> String {
        format!(
            "{}/accounts/{}/workers/scripts/{}",
            self.base_url, account_id, name
        )
    }

    /// Upsert a worker script. Returns the HTTP status on 200/201.
    ///
    /// ES modules go up as multipart with a metadata part naming the main
    /// module; every other kind is sent as a raw JavaScript body.
    pub async fn upload_script(
        &self,
        token: &str,
        account_id: &str,
        name: &str,
        artifact: &ScriptArtifact,
    ) -> Result<u16, DeployError> {
        let url = self.script_url(account_id, name);
        debug!("PUT {} ({} bytes, {})", url, artifact.size(), artifact.kind().label());

        let request = self.client.put(&url).bearer_auth(token);
        let request = match artifact.kind() {
            ScriptKind::EsModule => {
                let metadata = json!({
                    "main_module": artifact.entry_file(),
                    "compatibility_date": COMPATIBILITY_DATE,
                    "compatibility_flags": [NODE_COMPAT_FLAG],
                });
                let metadata_part = multipart::Part::text(metadata.to_string())
                    .mime_str("application/json")?;
                let module_part = multipart::Part::text(artifact.content().to_string())
                    .file_name(artifact.entry_file().to_string())
                    .mime_str("application/javascript+module")?;
                let form = multipart::Form::new()
                    .part("metadata", metadata_part)
                    .part(artifact.entry_file().to_string(), module_part);
                request.multipart(form)
            }
            _ => request
                .header(header::CONTENT_TYPE, "application/javascript")
                .body(artifact.content().to_string()),
        };

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            return Ok(status.as_u16());
        }
        Err(api_error(response, "Upload script").await)
    }

    /// List worker scripts in the account
    pub async fn list_scripts(
        &self,
        token: &str,
        account_id: &str,
    ) -> Result<Vec<WorkerScript>, DeployError> {
        let url = format!("{}/accounts/{}/workers/scripts", self.base_url, account_id);
        debug!("GET {}", url);

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response, "List scripts").await);
        }

        let envelope: ApiEnvelope<Vec<WorkerScript>> = response.json().await?;
        Ok(envelope.result.unwrap_or_default())
    }

    /// Delete a worker script
    pub async fn delete_script(
        &self,
        token: &str,
        account_id: &str,
        name: &str,
    ) -> Result<(), DeployError> {
        let url = self.script_url(account_id, name);
        debug!("DELETE {}", url);

        let response = self.client.delete(&url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response, "Delete script").await);
        }
        Ok(())
    }

    /// Check that the token can read the account
    pub async fn verify_account(&self, token: &str, account_id: &str) -> Result<(), DeployError> {
        let url = format!("{}/accounts/{}", self.base_url, account_id);
        self.verify(&url, token, "Verify account").await
    }

    /// Check that the token can read the zone
    pub async fn verify_zone(&self, token: &str, zone_id: &str) -> Result<(), DeployError> {
        let url = format!("{}/zones/{}", self.base_url, zone_id);
        self.verify(&url, token, "Verify zone").await
    }

    async fn verify(&self, url: &str, token: &str, context: &str) -> Result<(), DeployError> {
        debug!("GET {}", url);
        let response = self.client.get(url).bearer_auth(token).send().await?;
        if response.status() != StatusCode::OK {
            return Err(api_error(response, context).await);
        }
        Ok(())
    }
}

/// Build an `ApiError` from a failed response, preferring the first
/// structured error message in the body over the status text.
async fn api_error(response: Response, context: &str) -> DeployError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!("{} failed: {} - {}", context, status, body);

    let detail = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body)
        .ok()
        .and_then(|envelope| envelope.errors.into_iter().next())
        .map(|first| match first.code {
            Some(code) => format!("{} ({})", first.message, code),
            None => first.message,
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    DeployError::ApiError {
        status: status.as_u16(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "abcdefghijklmnopqrstuvwxyz012345";
    const ACCOUNT: &str = "0123456789abcdef0123456789abcdef";

    async fn client(server: &MockServer) -> CloudflareClient {
        CloudflareClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_upload_service_worker_as_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(format!("/accounts/{ACCOUNT}/workers/scripts/demo")))
            .and(header("content-type", "application/javascript"))
            .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let artifact = ScriptArtifact::new("worker.js", "addEventListener('fetch', e => {})");
        let status = client(&server)
            .await
            .upload_script(TOKEN, ACCOUNT, "demo", &artifact)
            .await
            .unwrap();
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn test_upload_error_uses_first_api_message() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "success": false,
                "errors": [
                    {"code": 10000, "message": "Authentication error"},
                    {"code": 10001, "message": "second"}
                ]
            })))
            .mount(&server)
            .await;

        let artifact = ScriptArtifact::new("index.js", "export default {}");
        let err = client(&server)
            .await
            .upload_script(TOKEN, ACCOUNT, "demo", &artifact)
            .await
            .unwrap_err();

        match err {
            DeployError::ApiError { status, detail } => {
                assert_eq!(status, 403);
                assert_eq!(detail, "Authentication error (10000)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_error_without_envelope_uses_status_text() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let artifact = ScriptArtifact::new("index.js", "console.log(1)");
        let err = client(&server)
            .await
            .upload_script(TOKEN, ACCOUNT, "demo", &artifact)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(502));
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[tokio::test]
    async fn test_accepted_status_is_not_success() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let artifact = ScriptArtifact::new("index.js", "console.log(1)");
        let err = client(&server)
            .await
            .upload_script(TOKEN, ACCOUNT, "demo", &artifact)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(202));
    }

    #[tokio::test]
    async fn test_list_and_delete_scripts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/accounts/{ACCOUNT}/workers/scripts")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "errors": [],
                "result": [
                    {"id": "alpha", "created_on": "2024-01-01T00:00:00Z"},
                    {"id": "beta"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("/accounts/{ACCOUNT}/workers/scripts/alpha")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server).await;
        let scripts = client.list_scripts(TOKEN, ACCOUNT).await.unwrap();
        let ids: Vec<_> = scripts.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);

        client.delete_script(TOKEN, ACCOUNT, "alpha").await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_zone_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones/ffffffffffffffffffffffffffffffff"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "errors": [{"message": "Could not route to /zones"}]
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .verify_zone(TOKEN, "ffffffffffffffffffffffffffffffff")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}
