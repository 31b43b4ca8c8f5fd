//! KkpClient trait for mocking
//!
//! This trait abstracts the KKP client so that resource handlers and wait
//! loops can be exercised against `MockKkpClient` in unit tests.

use crate::error::KkpError;
use crate::models::*;

/// Trait for KKP API client operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Implementations are shared read-only across concurrent wait loops.
#[async_trait::async_trait]
pub trait KkpClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Check that the API endpoint answers
    async fn ping(&self) -> Result<(), KkpError>;

    /// Fetch the platform version string (e.g. `v2.28.2`)
    async fn server_version(&self) -> Result<String, KkpError>;

    // Clusters
    async fn list_clusters(&self, project_id: &str) -> Result<Vec<Cluster>, KkpError>;
    async fn get_cluster(&self, project_id: &str, cluster_id: &str) -> Result<Cluster, KkpError>;
    async fn create_cluster(&self, project_id: &str, request: &CreateClusterRequest) -> Result<Cluster, KkpError>;
    async fn patch_cluster(&self, project_id: &str, cluster_id: &str, patch: &serde_json::Value) -> Result<Cluster, KkpError>;
    async fn delete_cluster(&self, project_id: &str, cluster_id: &str) -> Result<(), KkpError>;
    async fn get_cluster_health(&self, project_id: &str, cluster_id: &str) -> Result<ClusterHealth, KkpError>;
    async fn get_kubeconfig(&self, project_id: &str, cluster_id: &str) -> Result<String, KkpError>;

    // Cluster templates
    async fn list_cluster_templates(&self, project_id: &str) -> Result<Vec<ClusterTemplate>, KkpError>;
    async fn create_cluster_template_instance(&self, project_id: &str, template_id: &str, replicas: u32) -> Result<ClusterTemplateInstance, KkpError>;

    // Machine deployments
    async fn list_machine_deployments(&self, project_id: &str, cluster_id: &str) -> Result<Vec<NodeDeployment>, KkpError>;
    async fn get_machine_deployment(&self, project_id: &str, cluster_id: &str, machine_deployment_id: &str) -> Result<NodeDeployment, KkpError>;
    async fn create_machine_deployment(&self, project_id: &str, cluster_id: &str, deployment: &NodeDeployment) -> Result<NodeDeployment, KkpError>;
    async fn patch_machine_deployment(&self, project_id: &str, cluster_id: &str, machine_deployment_id: &str, patch: &serde_json::Value) -> Result<NodeDeployment, KkpError>;
    async fn delete_machine_deployment(&self, project_id: &str, cluster_id: &str, machine_deployment_id: &str) -> Result<(), KkpError>;

    // Addons
    async fn list_addons(&self, project_id: &str, cluster_id: &str) -> Result<Vec<Addon>, KkpError>;
    async fn list_installable_addons(&self, project_id: &str, cluster_id: &str) -> Result<Vec<String>, KkpError>;
    async fn get_addon(&self, project_id: &str, cluster_id: &str, addon_id: &str) -> Result<Addon, KkpError>;
    async fn create_addon(&self, project_id: &str, cluster_id: &str, addon: &Addon) -> Result<Addon, KkpError>;
    async fn patch_addon(&self, project_id: &str, cluster_id: &str, addon_id: &str, addon: &Addon) -> Result<Addon, KkpError>;
    async fn delete_addon(&self, project_id: &str, cluster_id: &str, addon_id: &str) -> Result<(), KkpError>;

    // Application installations
    async fn list_applications(&self, project_id: &str, cluster_id: &str) -> Result<Vec<ApplicationInstallation>, KkpError>;
    async fn get_application(&self, project_id: &str, cluster_id: &str, namespace: &str, name: &str) -> Result<ApplicationInstallation, KkpError>;
    async fn create_application(&self, project_id: &str, cluster_id: &str, application: &ApplicationInstallation) -> Result<ApplicationInstallation, KkpError>;
    async fn update_application(&self, project_id: &str, cluster_id: &str, namespace: &str, name: &str, application: &ApplicationInstallation) -> Result<ApplicationInstallation, KkpError>;
    async fn delete_application(&self, project_id: &str, cluster_id: &str, namespace: &str, name: &str) -> Result<(), KkpError>;

    // SSH keys
    async fn list_ssh_keys(&self, project_id: &str) -> Result<Vec<SshKey>, KkpError>;
    async fn create_ssh_key(&self, project_id: &str, key: &SshKey) -> Result<SshKey, KkpError>;
    async fn delete_ssh_key(&self, project_id: &str, key_id: &str) -> Result<(), KkpError>;
}
