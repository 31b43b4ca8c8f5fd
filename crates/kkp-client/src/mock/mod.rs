//! Mock KkpClient for unit testing
//!
//! This module provides an in-memory implementation of `KkpClientTrait` that
//! can be used in unit tests without a running KKP installation.
//!
//! Besides plain stores, per-object *scripts* make a fetch return a fixed
//! sequence of results (the last one repeats), which is how tests drive the
//! convergence loops through "still provisioning", "API server bouncing" and
//! "gone" states.
//!
//! The mock is organized into domain-specific modules:
//! - `clusters.rs` - clusters, health, kubeconfigs and cluster templates
//! - `machine_deployments.rs` - machine deployments
//! - `addons.rs` - addons and application installations
//! - `helpers.rs` - scripts, locking and merge patch

mod addons;
mod clusters;
mod helpers;
mod machine_deployments;

pub use clusters::health_all_up;
pub use helpers::MockFailure;

use crate::error::KkpError;
use crate::kkp_trait::KkpClientTrait;
use crate::models::*;
use helpers::{lock, Script};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Key of an application installation: (cluster, namespace, name)
pub(crate) type AppKey = (String, String, String);

/// Mock KkpClient for testing
///
/// Clones share state, so a test can keep a handle while the code under test
/// owns another one.
#[derive(Clone, Default)]
pub struct MockKkpClient {
    pub(crate) base_url: String,
    pub(crate) version: Arc<Mutex<Option<String>>>,
    // In-memory storage for resources
    pub(crate) clusters: Arc<Mutex<HashMap<String, Cluster>>>,
    pub(crate) health: Arc<Mutex<HashMap<String, ClusterHealth>>>,
    pub(crate) kubeconfigs: Arc<Mutex<HashMap<String, String>>>,
    pub(crate) templates: Arc<Mutex<HashMap<String, ClusterTemplate>>>,
    pub(crate) machine_deployments: Arc<Mutex<HashMap<(String, String), NodeDeployment>>>,
    pub(crate) addons: Arc<Mutex<HashMap<(String, String), Addon>>>,
    pub(crate) installable_addons: Arc<Mutex<HashMap<String, Vec<String>>>>,
    pub(crate) applications: Arc<Mutex<HashMap<AppKey, ApplicationInstallation>>>,
    pub(crate) ssh_keys: Arc<Mutex<HashMap<String, SshKey>>>,
    // Scripted responses, consulted before the stores
    pub(crate) cluster_scripts: Arc<Mutex<HashMap<String, Script<Cluster>>>>,
    pub(crate) health_scripts: Arc<Mutex<HashMap<String, Script<ClusterHealth>>>>,
    pub(crate) machine_deployment_list_scripts: Arc<Mutex<HashMap<String, Script<Vec<NodeDeployment>>>>>,
    pub(crate) addon_scripts: Arc<Mutex<HashMap<(String, String), Script<Addon>>>>,
    pub(crate) application_scripts: Arc<Mutex<HashMap<AppKey, Script<ApplicationInstallation>>>>,
    // Operations that always fail, keyed by trait method name
    pub(crate) failures: Arc<Mutex<HashMap<&'static str, MockFailure>>>,
    pub(crate) calls: Arc<Mutex<HashMap<&'static str, usize>>>,
    // Counter for generating IDs
    pub(crate) next_id: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockKkpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockKkpClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl MockKkpClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            next_id: Arc::new(Mutex::new(1)),
            ..Self::default()
        }
    }

    /// Set the version reported by `server_version`
    pub fn set_version(&self, version: impl Into<String>) {
        *lock(&self.version) = Some(version.into());
    }

    /// Add a cluster to the mock store (for test setup)
    pub fn add_cluster(&self, cluster: Cluster) {
        lock(&self.clusters).insert(cluster.id.clone(), cluster);
    }

    /// Set the health returned for a cluster when no script is active
    pub fn set_health(&self, cluster_id: &str, health: ClusterHealth) {
        lock(&self.health).insert(cluster_id.to_string(), health);
    }

    /// Set the kubeconfig returned for a cluster
    pub fn set_kubeconfig(&self, cluster_id: &str, kubeconfig: impl Into<String>) {
        lock(&self.kubeconfigs).insert(cluster_id.to_string(), kubeconfig.into());
    }

    /// Add a cluster template (for test setup)
    pub fn add_template(&self, template: ClusterTemplate) {
        lock(&self.templates).insert(template.id.clone(), template);
    }

    /// Add a machine deployment to a cluster (for test setup)
    pub fn add_machine_deployment(&self, cluster_id: &str, deployment: NodeDeployment) {
        lock(&self.machine_deployments).insert((cluster_id.to_string(), deployment.id.clone()), deployment);
    }

    /// Add an addon to a cluster (for test setup)
    pub fn add_addon(&self, cluster_id: &str, addon: Addon) {
        lock(&self.addons).insert((cluster_id.to_string(), addon.id.clone()), addon);
    }

    /// Set the installable addon names for a cluster
    pub fn set_installable_addons(&self, cluster_id: &str, names: Vec<String>) {
        lock(&self.installable_addons).insert(cluster_id.to_string(), names);
    }

    /// Add an application installation to a cluster (for test setup)
    pub fn add_application(&self, cluster_id: &str, application: ApplicationInstallation) {
        let key = (cluster_id.to_string(), application.namespace.clone(), application.name.clone());
        lock(&self.applications).insert(key, application);
    }

    /// Add an SSH key (for test setup)
    pub fn add_ssh_key(&self, key: SshKey) {
        lock(&self.ssh_keys).insert(key.id.clone(), key);
    }

    /// Script the results of `get_cluster` for one cluster
    pub fn script_cluster(&self, cluster_id: &str, steps: Vec<Result<Cluster, MockFailure>>) {
        lock(&self.cluster_scripts).insert(cluster_id.to_string(), Script::new(steps));
    }

    /// Script the results of `get_cluster_health` for one cluster
    pub fn script_health(&self, cluster_id: &str, steps: Vec<Result<ClusterHealth, MockFailure>>) {
        lock(&self.health_scripts).insert(cluster_id.to_string(), Script::new(steps));
    }

    /// Script the results of `list_machine_deployments` for one cluster
    pub fn script_machine_deployment_list(&self, cluster_id: &str, steps: Vec<Result<Vec<NodeDeployment>, MockFailure>>) {
        lock(&self.machine_deployment_list_scripts).insert(cluster_id.to_string(), Script::new(steps));
    }

    /// Script the results of `get_addon`
    pub fn script_addon(&self, cluster_id: &str, addon_id: &str, steps: Vec<Result<Addon, MockFailure>>) {
        lock(&self.addon_scripts).insert((cluster_id.to_string(), addon_id.to_string()), Script::new(steps));
    }

    /// Script the results of `get_application`
    pub fn script_application(&self, cluster_id: &str, namespace: &str, name: &str, steps: Vec<Result<ApplicationInstallation, MockFailure>>) {
        let key = (cluster_id.to_string(), namespace.to_string(), name.to_string());
        lock(&self.application_scripts).insert(key, Script::new(steps));
    }

    /// Make every call of `operation` (a trait method name) fail
    pub fn fail_operation(&self, operation: &'static str, failure: MockFailure) {
        lock(&self.failures).insert(operation, failure);
    }

    /// Number of times `operation` (a trait method name) was called
    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.calls).get(operation).copied().unwrap_or(0)
    }

    /// Record a call and return the injected failure, if any
    pub(crate) fn enter(&self, operation: &'static str) -> Result<(), KkpError> {
        *lock(&self.calls).entry(operation).or_insert(0) += 1;
        match lock(&self.failures).get(operation).cloned() {
            Some(failure) => Err(failure.into_error(operation)),
            None => Ok(()),
        }
    }

    /// Generate next ID
    pub(crate) fn next_id(&self) -> u64 {
        let mut id = lock(&self.next_id);
        let current = *id;
        *id += 1;
        current
    }
}

#[async_trait::async_trait]
impl KkpClientTrait for MockKkpClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn ping(&self) -> Result<(), KkpError> {
        self.enter("ping")
    }

    async fn server_version(&self) -> Result<String, KkpError> {
        self.enter("server_version")?;
        lock(&self.version)
            .clone()
            .ok_or_else(|| KkpError::NotFound("version endpoint".to_string()))
    }

    async fn list_clusters(&self, project_id: &str) -> Result<Vec<Cluster>, KkpError> {
        clusters::list_clusters(self, project_id).await
    }

    async fn get_cluster(&self, project_id: &str, cluster_id: &str) -> Result<Cluster, KkpError> {
        clusters::get_cluster(self, project_id, cluster_id).await
    }

    async fn create_cluster(&self, project_id: &str, request: &CreateClusterRequest) -> Result<Cluster, KkpError> {
        clusters::create_cluster(self, project_id, request).await
    }

    async fn patch_cluster(&self, project_id: &str, cluster_id: &str, patch: &serde_json::Value) -> Result<Cluster, KkpError> {
        clusters::patch_cluster(self, project_id, cluster_id, patch).await
    }

    async fn delete_cluster(&self, project_id: &str, cluster_id: &str) -> Result<(), KkpError> {
        clusters::delete_cluster(self, project_id, cluster_id).await
    }

    async fn get_cluster_health(&self, project_id: &str, cluster_id: &str) -> Result<ClusterHealth, KkpError> {
        clusters::get_cluster_health(self, project_id, cluster_id).await
    }

    async fn get_kubeconfig(&self, project_id: &str, cluster_id: &str) -> Result<String, KkpError> {
        clusters::get_kubeconfig(self, project_id, cluster_id).await
    }

    async fn list_cluster_templates(&self, project_id: &str) -> Result<Vec<ClusterTemplate>, KkpError> {
        clusters::list_cluster_templates(self, project_id).await
    }

    async fn create_cluster_template_instance(&self, project_id: &str, template_id: &str, replicas: u32) -> Result<ClusterTemplateInstance, KkpError> {
        clusters::create_cluster_template_instance(self, project_id, template_id, replicas).await
    }

    async fn list_machine_deployments(&self, project_id: &str, cluster_id: &str) -> Result<Vec<NodeDeployment>, KkpError> {
        machine_deployments::list_machine_deployments(self, project_id, cluster_id).await
    }

    async fn get_machine_deployment(&self, project_id: &str, cluster_id: &str, machine_deployment_id: &str) -> Result<NodeDeployment, KkpError> {
        machine_deployments::get_machine_deployment(self, project_id, cluster_id, machine_deployment_id).await
    }

    async fn create_machine_deployment(&self, project_id: &str, cluster_id: &str, deployment: &NodeDeployment) -> Result<NodeDeployment, KkpError> {
        machine_deployments::create_machine_deployment(self, project_id, cluster_id, deployment).await
    }

    async fn patch_machine_deployment(&self, project_id: &str, cluster_id: &str, machine_deployment_id: &str, patch: &serde_json::Value) -> Result<NodeDeployment, KkpError> {
        machine_deployments::patch_machine_deployment(self, project_id, cluster_id, machine_deployment_id, patch).await
    }

    async fn delete_machine_deployment(&self, project_id: &str, cluster_id: &str, machine_deployment_id: &str) -> Result<(), KkpError> {
        machine_deployments::delete_machine_deployment(self, project_id, cluster_id, machine_deployment_id).await
    }

    async fn list_addons(&self, project_id: &str, cluster_id: &str) -> Result<Vec<Addon>, KkpError> {
        addons::list_addons(self, project_id, cluster_id).await
    }

    async fn list_installable_addons(&self, project_id: &str, cluster_id: &str) -> Result<Vec<String>, KkpError> {
        addons::list_installable_addons(self, project_id, cluster_id).await
    }

    async fn get_addon(&self, project_id: &str, cluster_id: &str, addon_id: &str) -> Result<Addon, KkpError> {
        addons::get_addon(self, project_id, cluster_id, addon_id).await
    }

    async fn create_addon(&self, project_id: &str, cluster_id: &str, addon: &Addon) -> Result<Addon, KkpError> {
        addons::create_addon(self, project_id, cluster_id, addon).await
    }

    async fn patch_addon(&self, project_id: &str, cluster_id: &str, addon_id: &str, addon: &Addon) -> Result<Addon, KkpError> {
        addons::patch_addon(self, project_id, cluster_id, addon_id, addon).await
    }

    async fn delete_addon(&self, project_id: &str, cluster_id: &str, addon_id: &str) -> Result<(), KkpError> {
        addons::delete_addon(self, project_id, cluster_id, addon_id).await
    }

    async fn list_applications(&self, project_id: &str, cluster_id: &str) -> Result<Vec<ApplicationInstallation>, KkpError> {
        addons::list_applications(self, project_id, cluster_id).await
    }

    async fn get_application(&self, project_id: &str, cluster_id: &str, namespace: &str, name: &str) -> Result<ApplicationInstallation, KkpError> {
        addons::get_application(self, project_id, cluster_id, namespace, name).await
    }

    async fn create_application(&self, project_id: &str, cluster_id: &str, application: &ApplicationInstallation) -> Result<ApplicationInstallation, KkpError> {
        addons::create_application(self, project_id, cluster_id, application).await
    }

    async fn update_application(&self, project_id: &str, cluster_id: &str, namespace: &str, name: &str, application: &ApplicationInstallation) -> Result<ApplicationInstallation, KkpError> {
        addons::update_application(self, project_id, cluster_id, namespace, name, application).await
    }

    async fn delete_application(&self, project_id: &str, cluster_id: &str, namespace: &str, name: &str) -> Result<(), KkpError> {
        addons::delete_application(self, project_id, cluster_id, namespace, name).await
    }

    async fn list_ssh_keys(&self, _project_id: &str) -> Result<Vec<SshKey>, KkpError> {
        self.enter("list_ssh_keys")?;
        let mut keys: Vec<SshKey> = lock(&self.ssh_keys).values().cloned().collect();
        keys.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(keys)
    }

    async fn create_ssh_key(&self, _project_id: &str, key: &SshKey) -> Result<SshKey, KkpError> {
        self.enter("create_ssh_key")?;
        if key.name.is_empty() || key.spec.public_key.is_empty() {
            return Err(KkpError::InvalidRequest("name and public key are required".to_string()));
        }
        let mut created = key.clone();
        created.id = format!("key-{}", self.next_id());
        created.creation_timestamp = Some(chrono::Utc::now());
        lock(&self.ssh_keys).insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn delete_ssh_key(&self, _project_id: &str, key_id: &str) -> Result<(), KkpError> {
        self.enter("delete_ssh_key")?;
        lock(&self.ssh_keys)
            .remove(key_id)
            .map(|_| ())
            .ok_or_else(|| KkpError::NotFound(format!("SSH key {} not found", key_id)))
    }
}
