//! KKP API client
//!
//! Implements the REST client for the KKP API. Cluster, addon, application
//! and machine deployment endpoints live under `/api/v2/projects/{project}`;
//! SSH keys are still served from `/api/v1`.

use crate::common::HttpClient;
use crate::error::KkpError;
use crate::kkp_trait::KkpClientTrait;
use crate::models::*;
use reqwest::Client;
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Endpoints probed, in order, by [`KkpClientTrait::server_version`]
const VERSION_PATHS: [&str; 3] = ["/api/v2/version", "/api/v1/version", "/version"];

/// JSON keys that may carry the version string
const VERSION_KEYS: [&str; 4] = ["gitVersion", "version", "git_version", "git-version"];

/// Connection settings for [`KkpClient`]
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL without the `/api` suffix, e.g. `https://kkp.example.com`
    pub base_url: String,
    /// Bearer token
    pub token: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub insecure_skip_verify: bool,
    /// PEM bundle added to the trusted roots
    pub ca_pem: Option<Vec<u8>>,
    pub extra_headers: Vec<(String, String)>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("terraform-provider-kkp/{}", env!("CARGO_PKG_VERSION")),
            insecure_skip_verify: false,
            ca_pem: None,
            extra_headers: Vec::new(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("ca_pem", &self.ca_pem.as_ref().map(Vec::len))
            .field("extra_headers", &self.extra_headers.len())
            .finish()
    }
}

/// KKP API client
#[derive(Debug, Clone)]
pub struct KkpClient {
    http: HttpClient,
}

impl KkpClient {
    /// Create a new KKP client with default settings
    ///
    /// # Arguments
    /// * `base_url` - KKP base URL (e.g., "https://kkp.example.com")
    /// * `token` - API token for authentication
    pub fn new(base_url: String, token: String) -> Result<Self, KkpError> {
        Self::from_config(ClientConfig::new(base_url, token))
    }

    /// Create a client from explicit connection settings
    pub fn from_config(config: ClientConfig) -> Result<Self, KkpError> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .min_tls_version(reqwest::tls::Version::TLS_1_2);

        if config.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(pem) = &config.ca_pem {
            let certs = reqwest::Certificate::from_pem_bundle(pem)
                .map_err(|e| KkpError::InvalidConfig(format!("invalid CA bundle: {}", e)))?;
            if certs.is_empty() {
                return Err(KkpError::InvalidConfig(
                    "CA bundle contains no certificates".to_string(),
                ));
            }
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder
            .build()
            .map_err(|e| KkpError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http: HttpClient::new(client, config.base_url, config.token)
                .with_extra_headers(config.extra_headers),
        })
    }
}

fn enc(segment: &str) -> Cow<'_, str> {
    urlencoding::encode(segment)
}

fn project_path(project_id: &str) -> String {
    format!("/api/v2/projects/{}", enc(project_id))
}

fn cluster_path(project_id: &str, cluster_id: &str) -> String {
    format!("{}/clusters/{}", project_path(project_id), enc(cluster_id))
}

fn machine_deployment_path(project_id: &str, cluster_id: &str, machine_deployment_id: &str) -> String {
    format!(
        "{}/machinedeployments/{}",
        cluster_path(project_id, cluster_id),
        enc(machine_deployment_id)
    )
}

fn application_path(project_id: &str, cluster_id: &str, namespace: &str, name: &str) -> String {
    format!(
        "{}/applicationinstallations/{}/{}",
        cluster_path(project_id, cluster_id),
        enc(namespace),
        enc(name)
    )
}

fn ssh_keys_path(project_id: &str) -> String {
    format!("/api/v1/projects/{}/sshkeys", enc(project_id))
}

/// Extract a version string from a version endpoint's body.
///
/// Accepts a JSON object carrying one of the known version keys, or a plain
/// text body.
pub(crate) fn parse_version_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return VERSION_KEYS
            .iter()
            .filter_map(|key| map.get(*key).and_then(serde_json::Value::as_str))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string);
    }
    if trimmed.starts_with('{') || trimmed.starts_with('<') {
        return None;
    }
    Some(trimmed.trim_matches('"').to_string())
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, KkpError> {
    serde_json::to_value(value).map_err(KkpError::Serialization)
}

#[async_trait::async_trait]
impl KkpClientTrait for KkpClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn ping(&self) -> Result<(), KkpError> {
        let response = self.http.get_raw("/").await?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(KkpError::Api {
                status: status.as_u16(),
                message: format!("ping {} failed: {}", self.http.base_url(), status),
            });
        }
        debug!("KKP endpoint {} answered {}", self.http.base_url(), status);
        Ok(())
    }

    async fn server_version(&self) -> Result<String, KkpError> {
        let mut last_error = None;
        for path in VERSION_PATHS {
            match self.http.get_text(path).await {
                Ok(body) => {
                    if let Some(version) = parse_version_body(&body) {
                        debug!("KKP version {} from {}", version, path);
                        return Ok(version);
                    }
                    last_error = Some(KkpError::Decode(format!("{}: no version in response", path)));
                }
                Err(e) => {
                    debug!("Version endpoint {} failed: {}", path, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| KkpError::NotFound("version endpoint".to_string())))
    }

    async fn list_clusters(&self, project_id: &str) -> Result<Vec<Cluster>, KkpError> {
        self.http.get(&format!("{}/clusters", project_path(project_id))).await
    }

    async fn get_cluster(&self, project_id: &str, cluster_id: &str) -> Result<Cluster, KkpError> {
        self.http.get(&cluster_path(project_id, cluster_id)).await
    }

    async fn create_cluster(&self, project_id: &str, request: &CreateClusterRequest) -> Result<Cluster, KkpError> {
        let body = to_body(request)?;
        self.http.post(&format!("{}/clusters", project_path(project_id)), &body).await
    }

    async fn patch_cluster(&self, project_id: &str, cluster_id: &str, patch: &serde_json::Value) -> Result<Cluster, KkpError> {
        self.http.patch(&cluster_path(project_id, cluster_id), patch).await
    }

    async fn delete_cluster(&self, project_id: &str, cluster_id: &str) -> Result<(), KkpError> {
        self.http.delete(&cluster_path(project_id, cluster_id)).await
    }

    async fn get_cluster_health(&self, project_id: &str, cluster_id: &str) -> Result<ClusterHealth, KkpError> {
        self.http.get(&format!("{}/health", cluster_path(project_id, cluster_id))).await
    }

    async fn get_kubeconfig(&self, project_id: &str, cluster_id: &str) -> Result<String, KkpError> {
        self.http.get_text(&format!("{}/kubeconfig", cluster_path(project_id, cluster_id))).await
    }

    async fn list_cluster_templates(&self, project_id: &str) -> Result<Vec<ClusterTemplate>, KkpError> {
        self.http.get(&format!("{}/clustertemplates", project_path(project_id))).await
    }

    async fn create_cluster_template_instance(&self, project_id: &str, template_id: &str, replicas: u32) -> Result<ClusterTemplateInstance, KkpError> {
        let path = format!(
            "{}/clustertemplates/{}/instances",
            project_path(project_id),
            enc(template_id)
        );
        self.http.post(&path, &serde_json::json!({ "replicas": replicas })).await
    }

    async fn list_machine_deployments(&self, project_id: &str, cluster_id: &str) -> Result<Vec<NodeDeployment>, KkpError> {
        self.http
            .get(&format!("{}/machinedeployments", cluster_path(project_id, cluster_id)))
            .await
    }

    async fn get_machine_deployment(&self, project_id: &str, cluster_id: &str, machine_deployment_id: &str) -> Result<NodeDeployment, KkpError> {
        self.http
            .get(&machine_deployment_path(project_id, cluster_id, machine_deployment_id))
            .await
    }

    async fn create_machine_deployment(&self, project_id: &str, cluster_id: &str, deployment: &NodeDeployment) -> Result<NodeDeployment, KkpError> {
        let body = to_body(deployment)?;
        self.http
            .post(&format!("{}/machinedeployments", cluster_path(project_id, cluster_id)), &body)
            .await
    }

    async fn patch_machine_deployment(&self, project_id: &str, cluster_id: &str, machine_deployment_id: &str, patch: &serde_json::Value) -> Result<NodeDeployment, KkpError> {
        self.http
            .patch(&machine_deployment_path(project_id, cluster_id, machine_deployment_id), patch)
            .await
    }

    async fn delete_machine_deployment(&self, project_id: &str, cluster_id: &str, machine_deployment_id: &str) -> Result<(), KkpError> {
        self.http
            .delete(&machine_deployment_path(project_id, cluster_id, machine_deployment_id))
            .await
    }

    async fn list_addons(&self, project_id: &str, cluster_id: &str) -> Result<Vec<Addon>, KkpError> {
        self.http.get(&format!("{}/addons", cluster_path(project_id, cluster_id))).await
    }

    async fn list_installable_addons(&self, project_id: &str, cluster_id: &str) -> Result<Vec<String>, KkpError> {
        self.http
            .get(&format!("{}/installableaddons", cluster_path(project_id, cluster_id)))
            .await
    }

    async fn get_addon(&self, project_id: &str, cluster_id: &str, addon_id: &str) -> Result<Addon, KkpError> {
        self.http
            .get(&format!("{}/addons/{}", cluster_path(project_id, cluster_id), enc(addon_id)))
            .await
    }

    async fn create_addon(&self, project_id: &str, cluster_id: &str, addon: &Addon) -> Result<Addon, KkpError> {
        let body = to_body(addon)?;
        self.http
            .post(&format!("{}/addons", cluster_path(project_id, cluster_id)), &body)
            .await
    }

    async fn patch_addon(&self, project_id: &str, cluster_id: &str, addon_id: &str, addon: &Addon) -> Result<Addon, KkpError> {
        let body = to_body(addon)?;
        self.http
            .patch(&format!("{}/addons/{}", cluster_path(project_id, cluster_id), enc(addon_id)), &body)
            .await
    }

    async fn delete_addon(&self, project_id: &str, cluster_id: &str, addon_id: &str) -> Result<(), KkpError> {
        self.http
            .delete(&format!("{}/addons/{}", cluster_path(project_id, cluster_id), enc(addon_id)))
            .await
    }

    async fn list_applications(&self, project_id: &str, cluster_id: &str) -> Result<Vec<ApplicationInstallation>, KkpError> {
        self.http
            .get(&format!("{}/applicationinstallations", cluster_path(project_id, cluster_id)))
            .await
    }

    async fn get_application(&self, project_id: &str, cluster_id: &str, namespace: &str, name: &str) -> Result<ApplicationInstallation, KkpError> {
        self.http
            .get(&application_path(project_id, cluster_id, namespace, name))
            .await
    }

    async fn create_application(&self, project_id: &str, cluster_id: &str, application: &ApplicationInstallation) -> Result<ApplicationInstallation, KkpError> {
        let body = to_body(application)?;
        self.http
            .post(&format!("{}/applicationinstallations", cluster_path(project_id, cluster_id)), &body)
            .await
    }

    async fn update_application(&self, project_id: &str, cluster_id: &str, namespace: &str, name: &str, application: &ApplicationInstallation) -> Result<ApplicationInstallation, KkpError> {
        let body = to_body(application)?;
        self.http
            .put(&application_path(project_id, cluster_id, namespace, name), &body)
            .await
    }

    async fn delete_application(&self, project_id: &str, cluster_id: &str, namespace: &str, name: &str) -> Result<(), KkpError> {
        self.http
            .delete(&application_path(project_id, cluster_id, namespace, name))
            .await
    }

    async fn list_ssh_keys(&self, project_id: &str) -> Result<Vec<SshKey>, KkpError> {
        self.http.get(&ssh_keys_path(project_id)).await
    }

    async fn create_ssh_key(&self, project_id: &str, key: &SshKey) -> Result<SshKey, KkpError> {
        let body = to_body(key)?;
        self.http.post(&ssh_keys_path(project_id), &body).await
    }

    async fn delete_ssh_key(&self, project_id: &str, key_id: &str) -> Result<(), KkpError> {
        self.http
            .delete(&format!("{}/{}", ssh_keys_path(project_id), enc(key_id)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_json_keys() {
        assert_eq!(parse_version_body(r#"{"gitVersion":"v2.28.1"}"#).as_deref(), Some("v2.28.1"));
        assert_eq!(parse_version_body(r#"{"version":" 2.27.0 "}"#).as_deref(), Some("2.27.0"));
        assert_eq!(parse_version_body(r#"{"git-version":"v2.26.3"}"#).as_deref(), Some("v2.26.3"));
        assert_eq!(parse_version_body(r#"{"other":"x"}"#), None);
    }

    #[test]
    fn test_parse_version_plain_text() {
        assert_eq!(parse_version_body("v2.28.0\n").as_deref(), Some("v2.28.0"));
        assert_eq!(parse_version_body("\"v2.28.0\"").as_deref(), Some("v2.28.0"));
        assert_eq!(parse_version_body("<html>nope</html>"), None);
        assert_eq!(parse_version_body("   "), None);
    }

    #[test]
    fn test_paths_are_escaped() {
        assert_eq!(
            cluster_path("proj 1", "abc/def"),
            "/api/v2/projects/proj%201/clusters/abc%2Fdef"
        );
        assert_eq!(
            application_path("p", "c", "kube-system", "nginx"),
            "/api/v2/projects/p/clusters/c/applicationinstallations/kube-system/nginx"
        );
        assert_eq!(ssh_keys_path("p"), "/api/v1/projects/p/sshkeys");
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = ClientConfig::new("https://kkp.example.com", "secret-token");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_client_debug_redacts_token() {
        let client = KkpClient::new("https://kkp.example.com".to_string(), "secret-token".to_string()).unwrap();
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("secret-token"), "{}", rendered);
        assert!(rendered.contains("token: \"<redacted>\""), "{}", rendered);
        assert!(rendered.contains("https://kkp.example.com"), "{}", rendered);
    }
}
