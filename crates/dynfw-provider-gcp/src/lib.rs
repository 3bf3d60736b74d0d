// # Google Compute Engine Firewall Provider
//
// This crate provides the Compute Engine firewall implementation of
// `FirewallProvider` for dynfw.
//
// ## Behaviour
//
// - One read-modify-write per `update_rule()` call: GET the rule, replace
//   `sourceRanges`, PUT the whole document back
// - Every other field of the fetched rule (including `fingerprint`) is
//   resubmitted untouched, so a concurrent edit surfaces as a rejected update
// - HTTP timeout configured on every request
// - Errors mapped to the dynfw taxonomy; no retry, no backoff
//
// ## Credentials
//
// Access tokens come from an [`AccessTokenSource`]. The production source,
// [`ServiceAccountCredentials`], loads a service-account key from the path in
// `CredentialConfig` and exchanges it for OAuth2 tokens via `gcp_auth`.
// Nothing is read from or written to the process environment.
//
// ## Security Requirements
//
// - Access tokens NEVER appear in logs or Debug output
//
// ## API Reference
//
// - Get: GET `/projects/:project/global/firewalls/:firewall`
// - Update: PUT `/projects/:project/global/firewalls/:firewall`

use async_trait::async_trait;
use dynfw_core::config::{CredentialConfig, FirewallConfig, validate_rule_name};
use dynfw_core::traits::{FirewallProvider, FirewallRuleDefinition, apply_source_range, host_cidr};
use dynfw_core::{Error, Result};
use gcp_auth::TokenProvider;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// OAuth2 scope for the Compute Engine API
const COMPUTE_SCOPE: &str = "https://www.googleapis.com/auth/compute";

/// Source of bearer tokens and the project they belong to
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// A currently valid access token
    ///
    /// Failures are reported as [`Error::PermissionDenied`].
    async fn access_token(&self) -> Result<String>;

    /// Project named by the credential
    async fn project_id(&self) -> Result<String>;
}

/// Service-account key file credentials
pub struct ServiceAccountCredentials {
    path: PathBuf,
    account: gcp_auth::CustomServiceAccount,
}

impl std::fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("path", &self.path)
            .field("account", &"<REDACTED>")
            .finish()
    }
}

impl ServiceAccountCredentials {
    /// Load a service-account key from `path`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let account = gcp_auth::CustomServiceAccount::from_file(&path).map_err(|e| {
            Error::credentials(format!(
                "Failed to load service account key {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %path.display(), "Loaded service account key");
        Ok(Self { path, account })
    }

    /// Load the key named in the configuration
    pub fn from_config(config: &CredentialConfig) -> Result<Self> {
        Self::from_file(&config.path)
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountCredentials {
    async fn access_token(&self) -> Result<String> {
        let token = TokenProvider::token(&self.account, &[COMPUTE_SCOPE])
            .await
            .map_err(|e| Error::permission_denied(format!("Token exchange failed: {}", e)))?;
        Ok(token.as_str().to_string())
    }

    async fn project_id(&self) -> Result<String> {
        TokenProvider::project_id(&self.account)
            .await
            .map(|project| project.to_string())
            .map_err(|e| {
                Error::credentials(format!(
                    "Service account key {} names no project: {}",
                    self.path.display(),
                    e
                ))
            })
    }
}

/// Which half of the read-modify-write a response belongs to
#[derive(Debug, Clone, Copy)]
enum Stage {
    Fetch,
    Submit,
}

/// Compute Engine firewall provider
///
/// Isolated, stateless and single-shot: all scheduling is owned by
/// `SyncEngine`.
pub struct GcpFirewallProvider {
    /// Bearer token source
    /// ⚠️ NEVER log tokens obtained from it
    credentials: Arc<dyn AccessTokenSource>,

    /// Project owning the rules
    project_id: String,

    /// REST base, e.g. https://compute.googleapis.com/compute/v1
    api_base: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the credentials
impl std::fmt::Debug for GcpFirewallProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpFirewallProvider")
            .field("credentials", &"<REDACTED>")
            .field("project_id", &self.project_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GcpFirewallProvider {
    /// Create a new provider
    ///
    /// # Parameters
    ///
    /// - `credentials`: Bearer token source
    /// - `project_id`: Project owning the rules
    /// - `api_base`: Compute REST base URL
    /// - `timeout`: Per-request timeout
    pub fn new(
        credentials: Arc<dyn AccessTokenSource>,
        project_id: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let project_id = project_id.into();
        if project_id.trim().is_empty() {
            return Err(Error::config("GCP project ID cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            project_id,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Create from configuration
    ///
    /// The project comes from `config.project_id` when set, otherwise from
    /// the credential.
    pub async fn from_config(
        config: &FirewallConfig,
        credentials: Arc<dyn AccessTokenSource>,
    ) -> Result<Self> {
        config.validate()?;

        let project_id = match &config.project_id {
            Some(project) => project.clone(),
            None => credentials.project_id().await?,
        };

        Self::new(
            credentials,
            project_id,
            config.api_base.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Project owning the rules
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn rule_url(&self, rule_name: &str) -> String {
        format!(
            "{}/projects/{}/global/firewalls/{}",
            self.api_base, self.project_id, rule_name
        )
    }

    /// Fetch the current rule definition
    ///
    /// ```http
    /// GET /projects/:project/global/firewalls/:firewall
    /// Authorization: Bearer <token>
    /// ```
    async fn get_rule(&self, rule_name: &str, token: &str) -> Result<FirewallRuleDefinition> {
        tracing::debug!(firewall_rule_name = %rule_name, "Fetching firewall rule");

        let response = self
            .client
            .get(self.rule_url(rule_name))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::update_rejected(format!("HTTP request failed: {}", e)))?;

        let response = Self::check_status(Stage::Fetch, rule_name, response).await?;

        response
            .json()
            .await
            .map_err(|e| Error::update_rejected(format!("Failed to parse firewall rule: {}", e)))
    }

    /// Submit a full rule definition
    ///
    /// ```http
    /// PUT /projects/:project/global/firewalls/:firewall
    /// Authorization: Bearer <token>
    /// { ...rule... }
    /// ```
    async fn put_rule(
        &self,
        rule_name: &str,
        definition: &FirewallRuleDefinition,
        token: &str,
    ) -> Result<serde_json::Value> {
        let response = self
            .client
            .put(self.rule_url(rule_name))
            .bearer_auth(token)
            .json(definition)
            .send()
            .await
            .map_err(|e| Error::update_rejected(format!("HTTP request failed: {}", e)))?;

        let response = Self::check_status(Stage::Submit, rule_name, response).await?;

        response
            .json()
            .await
            .map_err(|e| Error::update_rejected(format!("Failed to parse update response: {}", e)))
    }

    /// Map a non-success status to the error taxonomy
    async fn check_status(
        stage: Stage,
        rule_name: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        Err(match (stage, status.as_u16()) {
            (_, 401 | 403) => Error::permission_denied(format!(
                "Invalid credentials or insufficient permissions for rule {}. Status: {}",
                rule_name, status
            )),
            (_, 404) => Error::rule_not_found(rule_name),
            (Stage::Fetch, _) => Error::update_rejected(format!(
                "Failed to fetch rule {}: {} - {}",
                rule_name, status, error_text
            )),
            (Stage::Submit, 409 | 412) => Error::update_rejected(format!(
                "Conflict: rule {} was modified concurrently. Status: {}",
                rule_name, status
            )),
            (Stage::Submit, 429) => Error::update_rejected(format!(
                "Rate limit or quota exceeded. Status: {}",
                status
            )),
            (Stage::Submit, _) => Error::update_rejected(format!(
                "Failed to update rule {}: {} - {}",
                rule_name, status, error_text
            )),
        })
    }
}

#[async_trait]
impl FirewallProvider for GcpFirewallProvider {
    async fn update_rule(
        &self,
        rule_name: &str,
        new_ip: IpAddr,
    ) -> Result<FirewallRuleDefinition> {
        validate_rule_name(rule_name)?;

        tracing::info!(
            firewall_rule_name = %rule_name,
            project = %self.project_id,
            source_range = %host_cidr(new_ip),
            "Updating firewall rule"
        );

        let token = self.credentials.access_token().await?;

        let fetched = self.get_rule(rule_name, &token).await?;
        let updated = apply_source_range(fetched, new_ip)?;

        self.put_rule(rule_name, &updated, &token).await
    }

    fn provider_name(&self) -> &'static str {
        "gcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RULE_PATH: &str = "/compute/v1/projects/demo-project/global/firewalls/allow-home";

    struct StaticToken;

    #[async_trait]
    impl AccessTokenSource for StaticToken {
        async fn access_token(&self) -> Result<String> {
            Ok("secret-access-token".to_string())
        }

        async fn project_id(&self) -> Result<String> {
            Ok("demo-project".to_string())
        }
    }

    struct RevokedToken;

    #[async_trait]
    impl AccessTokenSource for RevokedToken {
        async fn access_token(&self) -> Result<String> {
            Err(Error::permission_denied("invalid_grant"))
        }

        async fn project_id(&self) -> Result<String> {
            Ok("demo-project".to_string())
        }
    }

    fn provider_for(server: &MockServer) -> GcpFirewallProvider {
        GcpFirewallProvider::new(
            Arc::new(StaticToken),
            "demo-project",
            format!("{}/compute/v1", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn fetched_rule() -> serde_json::Value {
        json!({
            "kind": "compute#firewall",
            "id": "4215526352960153416",
            "name": "allow-home",
            "network": "https://www.googleapis.com/compute/v1/projects/demo-project/global/networks/default",
            "priority": 1000,
            "direction": "INGRESS",
            "allowed": [{"IPProtocol": "tcp", "ports": ["22"]}],
            "sourceRanges": ["198.51.100.1/32"],
            "targetTags": ["home-access"],
            "fingerprint": "kXq2a9fQ1c0="
        })
    }

    fn operation() -> serde_json::Value {
        json!({
            "kind": "compute#operation",
            "name": "operation-1700000000000-abc",
            "operationType": "update",
            "status": "RUNNING",
            "targetLink": "https://www.googleapis.com/compute/v1/projects/demo-project/global/firewalls/allow-home"
        })
    }

    #[tokio::test]
    async fn update_replaces_only_source_ranges() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(RULE_PATH))
            .and(header("authorization", "Bearer secret-access-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fetched_rule()))
            .expect(1)
            .mount(&server)
            .await;

        let mut expected = fetched_rule();
        expected["sourceRanges"] = json!(["5.5.5.5/32"]);

        Mock::given(method("PUT"))
            .and(path(RULE_PATH))
            .and(header("authorization", "Bearer secret-access-token"))
            .and(body_json(&expected))
            .respond_with(ResponseTemplate::new(200).set_body_json(operation()))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider_for(&server)
            .update_rule("allow-home", IpAddr::from([5, 5, 5, 5]))
            .await
            .unwrap();

        assert_eq!(response, operation());
    }

    #[tokio::test]
    async fn missing_rule_is_rule_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(RULE_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "The resource 'allow-home' was not found"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .update_rule("allow-home", IpAddr::from([5, 5, 5, 5]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RuleNotFound(ref name) if name == "allow-home"), "{:?}", err);
    }

    #[tokio::test]
    async fn forbidden_is_permission_denied() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .update_rule("allow-home", IpAddr::from([5, 5, 5, 5]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PermissionDenied(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn token_failure_is_permission_denied_without_api_calls() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fetched_rule()))
            .expect(0)
            .mount(&server)
            .await;

        let provider = GcpFirewallProvider::new(
            Arc::new(RevokedToken),
            "demo-project",
            format!("{}/compute/v1", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = provider
            .update_rule("allow-home", IpAddr::from([5, 5, 5, 5]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PermissionDenied(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn conflicting_update_is_rejected() {
        for status in [409, 412, 429, 503] {
            let server = MockServer::start().await;

            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_json(fetched_rule()))
                .mount(&server)
                .await;
            Mock::given(method("PUT"))
                .respond_with(ResponseTemplate::new(status))
                .expect(1)
                .mount(&server)
                .await;

            let err = provider_for(&server)
                .update_rule("allow-home", IpAddr::from([5, 5, 5, 5]))
                .await
                .unwrap_err();

            assert!(
                matches!(err, Error::UpdateRejected(_)),
                "status {} gave {:?}",
                status,
                err
            );
        }
    }

    #[tokio::test]
    async fn invalid_rule_name_never_reaches_the_api() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .update_rule("../networks/default", IpAddr::from([5, 5, 5, 5]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Config(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn project_defaults_to_credential() {
        let config = FirewallConfig::default();
        let provider = GcpFirewallProvider::from_config(&config, Arc::new(StaticToken))
            .await
            .unwrap();
        assert_eq!(provider.project_id(), "demo-project");

        let config = FirewallConfig {
            project_id: Some("override-project".to_string()),
            ..FirewallConfig::default()
        };
        let provider = GcpFirewallProvider::from_config(&config, Arc::new(StaticToken))
            .await
            .unwrap();
        assert_eq!(provider.project_id(), "override-project");
    }

    #[test]
    fn rule_url_layout() {
        let provider = GcpFirewallProvider::new(
            Arc::new(StaticToken),
            "demo-project",
            "https://compute.googleapis.com/compute/v1/",
            Duration::from_secs(30),
        )
        .unwrap();

        assert_eq!(
            provider.rule_url("allow-home"),
            "https://compute.googleapis.com/compute/v1/projects/demo-project/global/firewalls/allow-home"
        );
    }

    #[test]
    fn empty_project_is_rejected() {
        let result = GcpFirewallProvider::new(
            Arc::new(StaticToken),
            "  ",
            "https://compute.googleapis.com/compute/v1",
            Duration::from_secs(30),
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_key_file_is_a_credentials_error() {
        let err = ServiceAccountCredentials::from_config(&CredentialConfig {
            path: PathBuf::from("/nonexistent/dynfw/gcp-credentials.json"),
        })
        .unwrap_err();

        assert!(matches!(err, Error::Credentials(_)), "{:?}", err);
    }

    #[test]
    fn debug_does_not_expose_credentials() {
        let provider = GcpFirewallProvider::new(
            Arc::new(StaticToken),
            "demo-project",
            "https://compute.googleapis.com/compute/v1",
            Duration::from_secs(30),
        )
        .unwrap();

        let debug_str = format!("{:?}", provider);
        assert!(debug_str.contains("GcpFirewallProvider"));
        assert!(debug_str.contains("<REDACTED>"));
        assert!(!debug_str.contains("secret-access-token"));
    }
}
