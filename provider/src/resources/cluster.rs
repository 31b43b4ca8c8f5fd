//! Cluster resource
//!
//! Creates a user cluster either directly from a spec or by instantiating a
//! cluster template, then blocks until the control plane is healthy. Updates
//! patch the Kubernetes version and/or CNI plugin and wait for the rollout.

use super::{found, non_empty, require_id};
use crate::cloud::CloudProvider;
use crate::defaults::{DEFAULT_CNI_TYPE, DEFAULT_CNI_VERSION, DEFAULT_K8S_VERSION, DEFAULT_TEMPLATE_REPLICAS};
use crate::error::{ProviderError, Warning};
use crate::provider::KkpProvider;
use crate::validation;
use kkp_client::{
    CloudSpec, Cluster, ClusterSpec, CniPlugin, CreateClusterRequest, NewCluster, OpenstackCloudSpec,
};
use kkp_convergence::{poll_with_timeout, ClusterConvergence, ClusterUpdateSpec, Progress, WaitContext};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

/// OpenStack block of a cluster.
///
/// Authenticate either with the provider-level preset (optionally
/// `use_token`) or with application credentials, never both.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOpenstack {
    pub use_token: Option<bool>,
    pub application_credential_id: Option<String>,
    pub application_credential_secret: Option<String>,
    pub domain: Option<String>,
    pub network: Option<String>,
    pub security_groups: Option<String>,
    pub subnet_id: Option<String>,
    pub floating_ip_pool: Option<String>,
}

impl fmt::Debug for ClusterOpenstack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterOpenstack")
            .field("use_token", &self.use_token)
            .field("application_credential_id", &self.application_credential_id)
            .field(
                "application_credential_secret",
                &self.application_credential_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("domain", &self.domain)
            .field("network", &self.network)
            .field("security_groups", &self.security_groups)
            .field("subnet_id", &self.subnet_id)
            .field("floating_ip_pool", &self.floating_ip_pool)
            .finish()
    }
}

fn trimmed(value: Option<&String>) -> Option<String> {
    non_empty(value.map(String::as_str)).map(str::to_string)
}

impl ClusterOpenstack {
    fn to_cloud_spec(&self) -> OpenstackCloudSpec {
        OpenstackCloudSpec {
            use_token: self.use_token.filter(|t| *t),
            application_credential_id: trimmed(self.application_credential_id.as_ref()),
            application_credential_secret: trimmed(self.application_credential_secret.as_ref()),
            domain: trimmed(self.domain.as_ref()),
            network: trimmed(self.network.as_ref()),
            security_groups: trimmed(self.security_groups.as_ref()),
            subnet_id: trimmed(self.subnet_id.as_ref()),
            floating_ip_pool: trimmed(self.floating_ip_pool.as_ref()),
            ..OpenstackCloudSpec::default()
        }
    }
}

/// Plan and state of a cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterState {
    /// Computed
    pub id: Option<String>,
    pub name: String,
    pub k8s_version: Option<String>,
    pub datacenter: Option<String>,
    /// Credential preset; empty means application credentials
    pub preset: Option<String>,
    pub cloud: Option<String>,
    pub cni_type: Option<String>,
    pub cni_version: Option<String>,

    pub openstack: Option<ClusterOpenstack>,
    pub aws: Option<serde_json::Value>,
    pub vsphere: Option<serde_json::Value>,
    pub azure: Option<serde_json::Value>,

    /// Create by instantiating a cluster template
    pub use_template: bool,
    /// Takes precedence over `template_name`
    pub template_id: Option<String>,
    pub template_name: Option<String>,
    pub template_replicas: Option<u32>,
}

impl ClusterState {
    fn preset(&self) -> Option<&str> {
        non_empty(self.preset.as_deref())
    }

    /// Fill unset version, CNI and OpenStack token settings
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        if non_empty(self.k8s_version.as_deref()).is_none() {
            self.k8s_version = Some(DEFAULT_K8S_VERSION.to_string());
        }
        if non_empty(self.cni_type.as_deref()).is_none() {
            self.cni_type = Some(DEFAULT_CNI_TYPE.to_string());
        }
        if non_empty(self.cni_version.as_deref()).is_none() {
            self.cni_version = Some(DEFAULT_CNI_VERSION.to_string());
        }
        let using_preset = self.preset().is_some();
        if using_preset && self.cloud.as_deref() == Some(CloudProvider::OpenStack.as_str()) {
            if let Some(os) = self.openstack.as_mut() {
                os.use_token.get_or_insert(true);
            }
        }
        self
    }

    /// Validate a direct (non-template) create
    pub fn validate(&self) -> Result<CloudProvider, ProviderError> {
        validation::resource_name(&self.name)?;
        validation::k8s_version(self.k8s_version.as_deref().unwrap_or_default())?;
        validation::required(self.datacenter.as_deref().unwrap_or_default(), "datacenter")?;
        let cloud = validation::cloud_provider(self.cloud.as_deref().unwrap_or_default())?;

        let using_preset = self.preset().is_some();
        let block_set = match cloud {
            CloudProvider::OpenStack => self.openstack.is_some(),
            CloudProvider::Aws => self.aws.is_some(),
            CloudProvider::VSphere => self.vsphere.is_some(),
            CloudProvider::Azure => self.azure.is_some(),
        };
        if !block_set && !using_preset {
            return Err(ProviderError::validation(format!(
                "{} block must be set when not using preset",
                cloud
            )));
        }
        if let Some(os) = self.openstack.as_ref().filter(|_| cloud == CloudProvider::OpenStack) {
            validate_openstack(os, using_preset)?;
        }
        Ok(cloud)
    }

    /// Request body of a direct create. The datacenter is sent under every
    /// spelling the API has accepted across releases.
    pub fn to_create_request(&self) -> Result<CreateClusterRequest, ProviderError> {
        let cloud = self.validate()?;
        let datacenter = self.datacenter.as_deref().unwrap_or_default().trim();

        let mut cloud_spec = CloudSpec::for_datacenter(datacenter);
        match cloud {
            CloudProvider::OpenStack => {
                let mut os = self.openstack.clone().unwrap_or_default();
                if self.preset().is_some() && os.use_token.is_none() {
                    os.use_token = Some(true);
                }
                cloud_spec.openstack = Some(os.to_cloud_spec());
            }
            CloudProvider::Aws => cloud_spec.aws = Some(block_or_empty(self.aws.as_ref())),
            CloudProvider::VSphere => cloud_spec.vsphere = Some(block_or_empty(self.vsphere.as_ref())),
            CloudProvider::Azure => cloud_spec.azure = Some(block_or_empty(self.azure.as_ref())),
        }

        Ok(CreateClusterRequest {
            cluster: NewCluster {
                name: self.name.trim().to_string(),
                credential: self.preset().map(str::to_string),
                spec: ClusterSpec {
                    version: self.k8s_version.as_deref().map(str::trim).map(str::to_string),
                    cni_plugin: Some(CniPlugin {
                        plugin_type: self.cni_type.clone().unwrap_or_default(),
                        version: self.cni_version.clone().unwrap_or_default(),
                    }),
                    cloud: Some(cloud_spec),
                },
            },
        })
    }

    /// Refresh computed and server-side fields from a fetched cluster
    fn refresh_from(&mut self, cluster: &Cluster) {
        self.id = Some(cluster.id.clone());
        self.name = cluster.name.clone();
        if let Some(dc) = cluster.datacenter_name() {
            self.datacenter = Some(dc.to_string());
        }
        let Some(spec) = cluster.spec.as_ref() else {
            return;
        };
        if let Some(version) = non_empty(spec.version.as_deref()) {
            self.k8s_version = Some(version.to_string());
        }
        if let Some(cni) = spec.cni_plugin.as_ref() {
            if !cni.plugin_type.is_empty() {
                self.cni_type = Some(cni.plugin_type.clone());
            }
            if !cni.version.is_empty() {
                self.cni_version = Some(cni.version.clone());
            }
        }
        if self.cloud.is_none() {
            self.cloud = spec.cloud.as_ref().and_then(CloudSpec::provider_name).map(str::to_string);
        }
    }
}

fn block_or_empty(block: Option<&serde_json::Value>) -> serde_json::Value {
    block.cloned().unwrap_or_else(|| serde_json::json!({}))
}

fn validate_openstack(os: &ClusterOpenstack, using_preset: bool) -> Result<(), ProviderError> {
    let app_id = non_empty(os.application_credential_id.as_deref());
    let app_secret = non_empty(os.application_credential_secret.as_deref());

    if using_preset {
        if app_id.is_some() || app_secret.is_some() {
            return Err(ProviderError::validation(
                "either set preset OR application_credential_id/_secret, not both",
            ));
        }
        return Ok(());
    }

    if app_id.is_none() || app_secret.is_none() {
        return Err(ProviderError::validation(
            "application_credential_id and application_credential_secret are required when no preset is set",
        ));
    }
    let required = [
        (os.network.as_deref(), "openstack.network is required when no preset is set"),
        (os.subnet_id.as_deref(), "openstack.subnet_id is required when no preset is set"),
        (os.floating_ip_pool.as_deref(), "openstack.floating_ip_pool is required when no preset is set"),
        (
            os.security_groups.as_deref(),
            "openstack.security_groups must contain at least one security group when no preset is set",
        ),
    ];
    for (value, message) in required {
        if non_empty(value).is_none() {
            return Err(ProviderError::validation(message));
        }
    }
    Ok(())
}

/// Minimal merge patch between the prior state and the plan
fn update_patch(plan: &ClusterState, prior: &ClusterState) -> Option<(serde_json::Value, ClusterUpdateSpec)> {
    let want_version = non_empty(plan.k8s_version.as_deref());
    let need_version = want_version.is_some() && want_version != non_empty(prior.k8s_version.as_deref());

    let want_cni_type = non_empty(plan.cni_type.as_deref());
    let want_cni_version = non_empty(plan.cni_version.as_deref());
    let need_cni = (want_cni_type.is_some() && want_cni_type != non_empty(prior.cni_type.as_deref()))
        || (want_cni_version.is_some() && want_cni_version != non_empty(prior.cni_version.as_deref()));

    if !need_version && !need_cni {
        return None;
    }

    let mut spec = serde_json::Map::new();
    let mut expected = ClusterUpdateSpec::default();
    if need_version {
        spec.insert("version".to_string(), serde_json::json!(want_version));
        expected.version = want_version.map(str::to_string);
    }
    if need_cni {
        let cni_type = want_cni_type.or(non_empty(prior.cni_type.as_deref()));
        let cni_version = want_cni_version.or(non_empty(prior.cni_version.as_deref()));
        spec.insert(
            "cniPlugin".to_string(),
            serde_json::json!({
                "type": cni_type.unwrap_or_default(),
                "version": cni_version.unwrap_or_default(),
            }),
        );
        expected.cni_type = cni_type.map(str::to_string);
        expected.cni_version = cni_version.map(str::to_string);
    }
    Some((serde_json::json!({ "spec": spec }), expected))
}

/// Handler for the cluster resource
#[derive(Debug, Clone, Copy)]
pub struct ClusterResource<'a> {
    provider: &'a KkpProvider,
}

impl<'a> ClusterResource<'a> {
    pub fn new(provider: &'a KkpProvider) -> Self {
        Self { provider }
    }

    /// Create the cluster and wait until its control plane is healthy
    pub async fn create(&self, ctx: &WaitContext, plan: &ClusterState) -> Result<ClusterState, ProviderError> {
        if plan.use_template {
            return self.create_from_template(ctx, plan).await;
        }

        let state = plan.clone().with_defaults();
        let request = state.to_create_request()?;
        let created = self
            .provider
            .client()
            .create_cluster(self.provider.project_id(), &request)
            .await
            .map_err(ProviderError::api("Create cluster failed"))?;
        info!(cluster_id = %created.id, cluster_name = %created.name, "Cluster created, waiting for control plane");

        self.wait_ready(ctx, &created.id).await?;

        let mut state = state;
        state.id = Some(created.id);
        Ok(state)
    }

    async fn create_from_template(&self, ctx: &WaitContext, plan: &ClusterState) -> Result<ClusterState, ProviderError> {
        let client = self.provider.client();
        let project_id = self.provider.project_id();

        let cluster_name = non_empty(Some(plan.name.as_str())).ok_or_else(|| {
            ProviderError::validation(
                "when use_template = true, 'name' must match the cluster name of the template to resolve the created cluster",
            )
        })?;
        let replicas = plan.template_replicas.unwrap_or(DEFAULT_TEMPLATE_REPLICAS);
        if replicas == 0 {
            return Err(ProviderError::validation("template_replicas must be at least 1"));
        }
        let template_id = self.resolve_template(plan).await?;

        // Clusters that already carry the name must not satisfy the lookup below
        let existing: HashSet<String> = match client.list_clusters(project_id).await {
            Ok(clusters) => clusters.into_iter().map(|c| c.id).collect(),
            Err(e) => {
                debug!(error = %e, "Could not list clusters before template instantiation");
                HashSet::new()
            }
        };

        client
            .create_cluster_template_instance(project_id, &template_id, replicas)
            .await
            .map_err(ProviderError::api("Create cluster from template failed"))?;
        info!(template_id = %template_id, replicas, cluster_name, "Cluster template instantiated");

        let existing = &existing;
        let cluster_id = poll_with_timeout(
            ctx,
            "cluster to appear",
            self.provider.timings().cluster_appear,
            move || async move {
                match client.list_clusters(project_id).await {
                    Ok(clusters) => Ok(clusters
                        .into_iter()
                        .find(|c| c.name.trim() == cluster_name && !existing.contains(&c.id))
                        .map_or(Progress::Pending, |c| Progress::Done(c.id))),
                    Err(e) => {
                        debug!(error = %e, "Cluster list failed, retrying");
                        Ok(Progress::Pending)
                    }
                }
            },
        )
        .await
        .map_err(ProviderError::wait("Created cluster not found"))?;

        self.wait_ready(ctx, &cluster_id).await?;

        let mut state = plan.clone();
        state.id = Some(cluster_id.clone());
        if let Ok(cluster) = client.get_cluster(project_id, &cluster_id).await {
            state.name = cluster.name;
        }
        Ok(state)
    }

    /// Template ID from `template_id`, or by unique `template_name`
    async fn resolve_template(&self, plan: &ClusterState) -> Result<String, ProviderError> {
        if let Some(id) = non_empty(plan.template_id.as_deref()) {
            return Ok(id.to_string());
        }
        let Some(name) = non_empty(plan.template_name.as_deref()) else {
            return Err(ProviderError::validation(
                "provide either template_id or template_name when use_template = true",
            ));
        };

        let templates = self
            .provider
            .client()
            .list_cluster_templates(self.provider.project_id())
            .await
            .map_err(ProviderError::api("Failed to resolve template by name"))?;
        let matches: Vec<String> = templates
            .into_iter()
            .filter(|t| t.name.trim() == name)
            .map(|t| t.id)
            .collect();

        match matches.as_slice() {
            [id] => Ok(id.clone()),
            [] => Err(ProviderError::Template(format!(
                "no cluster template named {:?} in the project; check the name or use template_id",
                name
            ))),
            _ => Err(ProviderError::Template(format!(
                "template name {:?} is ambiguous ({} matches); specify template_id instead",
                name,
                matches.len()
            ))),
        }
    }

    async fn wait_ready(&self, ctx: &WaitContext, cluster_id: &str) -> Result<(), ProviderError> {
        ClusterConvergence::new(self.provider.client(), self.provider.project_id(), cluster_id)
            .wait_ready_with(ctx, self.provider.timings().cluster_ready)
            .await
            .map_err(ProviderError::wait(format!("Cluster {} provisioning", cluster_id)))
    }

    /// Refresh state; `None` when the cluster no longer exists
    pub async fn read(&self, state: &ClusterState) -> Result<Option<ClusterState>, ProviderError> {
        let id = require_id(state.id.as_deref(), "cluster id")?;
        let cluster = found(
            self.provider.client().get_cluster(self.provider.project_id(), id).await,
            "Read cluster failed",
        )?;
        Ok(cluster.map(|cluster| {
            let mut refreshed = state.clone();
            refreshed.refresh_from(&cluster);
            refreshed
        }))
    }

    /// Patch version and/or CNI, then wait for the rollout
    pub async fn update(
        &self,
        ctx: &WaitContext,
        plan: &ClusterState,
        prior: &ClusterState,
    ) -> Result<ClusterState, ProviderError> {
        let id = require_id(prior.id.as_deref(), "cluster id")?;
        let mut next = plan.clone();
        next.id = Some(id.to_string());

        let Some((patch, expected)) = update_patch(plan, prior) else {
            debug!(cluster_id = %id, "No cluster changes to apply");
            return Ok(next);
        };
        if let Some(version) = expected.version.as_deref() {
            validation::k8s_version(version)?;
        }

        self.provider
            .client()
            .patch_cluster(self.provider.project_id(), id, &patch)
            .await
            .map_err(ProviderError::api("Patch cluster failed"))?;
        info!(
            cluster_id = %id,
            version = ?expected.version,
            cni_type = ?expected.cni_type,
            cni_version = ?expected.cni_version,
            "Cluster patch sent"
        );

        ClusterConvergence::new(self.provider.client(), self.provider.project_id(), id)
            .wait_updated_with(ctx, &expected, self.provider.timings().cluster_updated)
            .await
            .map_err(ProviderError::wait(format!("Cluster {} update", id)))?;
        Ok(next)
    }

    /// Delete and wait until the cluster is gone.
    ///
    /// A failing DELETE call is reported as a warning; the wait still decides.
    pub async fn delete(&self, ctx: &WaitContext, state: &ClusterState) -> Result<Vec<Warning>, ProviderError> {
        let id = require_id(state.id.as_deref(), "cluster id")?;
        let mut warnings = Vec::new();

        if let Err(e) = self.provider.client().delete_cluster(self.provider.project_id(), id).await {
            warn!(cluster_id = %id, error = %e, "Delete cluster call failed, waiting for deletion anyway");
            warnings.push(Warning::new("Delete cluster warning", e.to_string()));
        }

        ClusterConvergence::new(self.provider.client(), self.provider.project_id(), id)
            .wait_deleted_with(ctx, self.provider.timings().cluster_deleted)
            .await
            .map_err(ProviderError::wait(format!("Cluster {} deletion", id)))?;
        Ok(warnings)
    }

    /// Import by cluster ID
    pub fn import(&self, id: &str) -> Result<ClusterState, ProviderError> {
        let id = non_empty(Some(id)).ok_or_else(|| ProviderError::InvalidImportId {
            id: id.to_string(),
            expected: "cluster_id",
        })?;
        Ok(ClusterState {
            id: Some(id.to_string()),
            ..ClusterState::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::WaitTimings;
    use kkp_client::{ClusterHealth, ClusterTemplate, HealthStatus, KkpClientTrait, MockFailure, MockKkpClient};
    use std::sync::Arc;

    fn provider(mock: &MockKkpClient) -> KkpProvider {
        KkpProvider::new(Arc::new(mock.clone()), "proj-1").with_timings(WaitTimings::default())
    }

    fn openstack_plan() -> ClusterState {
        ClusterState {
            name: "demo".to_string(),
            datacenter: Some("ewc-eumetsat".to_string()),
            cloud: Some("openstack".to_string()),
            openstack: Some(ClusterOpenstack {
                application_credential_id: Some("app-id".to_string()),
                application_credential_secret: Some("app-secret".to_string()),
                domain: Some("default".to_string()),
                network: Some("private".to_string()),
                security_groups: Some("default".to_string()),
                subnet_id: Some("subnet-1".to_string()),
                floating_ip_pool: Some("public".to_string()),
                ..ClusterOpenstack::default()
            }),
            ..ClusterState::default()
        }
    }

    #[test]
    fn test_defaults_fill_versions_and_token() {
        let mut plan = openstack_plan();
        plan.preset = Some("team-preset".to_string());
        plan.openstack = Some(ClusterOpenstack::default());

        let plan = plan.with_defaults();
        assert_eq!(plan.k8s_version.as_deref(), Some(DEFAULT_K8S_VERSION));
        assert_eq!(plan.cni_type.as_deref(), Some("cilium"));
        assert_eq!(plan.cni_version.as_deref(), Some("1.16.9"));
        assert_eq!(plan.openstack.unwrap().use_token, Some(true));
    }

    #[test]
    fn test_validate_rejects_preset_with_app_credentials() {
        let mut plan = openstack_plan().with_defaults();
        plan.preset = Some("team-preset".to_string());
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn test_validate_requires_networking_without_preset() {
        let mut plan = openstack_plan().with_defaults();
        if let Some(os) = plan.openstack.as_mut() {
            os.subnet_id = None;
        }
        assert!(plan.validate().unwrap_err().to_string().contains("openstack.subnet_id"));

        let mut plan = openstack_plan().with_defaults();
        plan.openstack = None;
        assert!(plan.validate().unwrap_err().to_string().contains("openstack block must be set"));
    }

    #[test]
    fn test_validate_other_fields() {
        let mut plan = openstack_plan().with_defaults();
        plan.k8s_version = Some("v1.30".to_string());
        assert!(plan.validate().is_err());

        let mut plan = openstack_plan().with_defaults();
        plan.cloud = Some("gcp".to_string());
        assert!(plan.validate().unwrap_err().to_string().contains("unsupported cloud provider"));

        let mut plan = openstack_plan().with_defaults();
        plan.preset = Some("p".to_string());
        plan.openstack = None;
        plan.cloud = Some("aws".to_string());
        assert_eq!(plan.validate().unwrap(), CloudProvider::Aws);
    }

    #[test]
    fn test_create_request_emits_every_datacenter_spelling() {
        let request = openstack_plan().with_defaults().to_create_request().unwrap();
        let body = serde_json::to_value(&request).unwrap();
        let cloud = &body["cluster"]["spec"]["cloud"];
        assert_eq!(cloud["datacenterName"], "ewc-eumetsat");
        assert_eq!(cloud["datacenter"], "ewc-eumetsat");
        assert_eq!(cloud["dc"], "ewc-eumetsat");
        assert_eq!(cloud["openstack"]["applicationCredentialID"], "app-id");
        assert_eq!(cloud["openstack"]["floatingIPPool"], "public");
        assert_eq!(body["cluster"]["spec"]["cniPlugin"]["type"], "cilium");
        assert!(body["cluster"].get("credential").is_none());
    }

    #[test]
    fn test_update_patch_is_minimal() {
        let prior = openstack_plan().with_defaults();
        assert!(update_patch(&prior, &prior).is_none());

        let mut plan = prior.clone();
        plan.k8s_version = Some("1.33.1".to_string());
        let (patch, expected) = update_patch(&plan, &prior).unwrap();
        assert_eq!(patch, serde_json::json!({"spec": {"version": "1.33.1"}}));
        assert_eq!(expected.version.as_deref(), Some("1.33.1"));
        assert!(expected.cni_type.is_none());

        let mut plan = prior.clone();
        plan.cni_version = Some("1.17.0".to_string());
        let (patch, expected) = update_patch(&plan, &prior).unwrap();
        assert_eq!(
            patch,
            serde_json::json!({"spec": {"cniPlugin": {"type": "cilium", "version": "1.17.0"}}})
        );
        assert!(expected.version.is_none());
        assert_eq!(expected.cni_version.as_deref(), Some("1.17.0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_for_ready() {
        let mock = MockKkpClient::new("https://kkp.test");
        let provider = provider(&mock);

        let state = provider
            .clusters()
            .create(&WaitContext::new(), &openstack_plan())
            .await
            .unwrap();

        let id = state.id.clone().unwrap();
        assert!(id.starts_with("cluster-"));
        assert_eq!(state.k8s_version.as_deref(), Some(DEFAULT_K8S_VERSION));
        assert_eq!(mock.call_count("create_cluster"), 1);
        assert!(mock.call_count("get_cluster_health") >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_validation_failure_makes_no_call() {
        let mock = MockKkpClient::new("https://kkp.test");
        let mut plan = openstack_plan();
        plan.datacenter = None;

        let err = provider(&mock).clusters().create(&WaitContext::new(), &plan).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert_eq!(mock.call_count("create_cluster"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_from_template_by_name() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.add_template(ClusterTemplate {
            id: "tpl-1".to_string(),
            name: "small".to_string(),
            ..ClusterTemplate::default()
        });
        // A pre-existing cluster with the same name must be ignored
        mock.add_cluster(Cluster {
            id: "old".to_string(),
            name: "small".to_string(),
            ..Cluster::default()
        });

        let plan = ClusterState {
            name: "small".to_string(),
            use_template: true,
            template_name: Some("small".to_string()),
            ..ClusterState::default()
        };
        let state = provider(&mock).clusters().create(&WaitContext::new(), &plan).await.unwrap();

        let id = state.id.unwrap();
        assert_ne!(id, "old");
        assert!(id.starts_with("cluster-"));
        assert_eq!(mock.call_count("create_cluster_template_instance"), 1);
    }

    #[tokio::test]
    async fn test_template_name_must_be_unique() {
        let mock = MockKkpClient::new("https://kkp.test");
        for id in ["tpl-1", "tpl-2"] {
            mock.add_template(ClusterTemplate {
                id: id.to_string(),
                name: "small".to_string(),
                ..ClusterTemplate::default()
            });
        }
        let plan = ClusterState {
            name: "small".to_string(),
            use_template: true,
            template_name: Some("small".to_string()),
            ..ClusterState::default()
        };
        let provider = provider(&mock);

        let err = provider.clusters().create(&WaitContext::new(), &plan).await.unwrap_err();
        assert!(err.to_string().contains("ambiguous"));

        let mut missing = plan.clone();
        missing.template_name = Some("large".to_string());
        let err = provider.clusters().create(&WaitContext::new(), &missing).await.unwrap_err();
        assert!(matches!(err, ProviderError::Template(_)));
        assert_eq!(mock.call_count("create_cluster_template_instance"), 0);
    }

    #[tokio::test]
    async fn test_read_refreshes_and_drops_missing() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.add_cluster(Cluster {
            id: "abc".to_string(),
            name: "renamed".to_string(),
            spec: Some(ClusterSpec {
                version: Some("1.31.4".to_string()),
                cni_plugin: Some(CniPlugin {
                    plugin_type: "canal".to_string(),
                    version: "v3.28".to_string(),
                }),
                cloud: Some(CloudSpec {
                    openstack: Some(OpenstackCloudSpec::default()),
                    ..CloudSpec::for_datacenter("dc-1")
                }),
            }),
            ..Cluster::default()
        });
        let provider = provider(&mock);

        let imported = provider.clusters().import("abc").unwrap();
        let state = provider.clusters().read(&imported).await.unwrap().unwrap();
        assert_eq!(state.name, "renamed");
        assert_eq!(state.k8s_version.as_deref(), Some("1.31.4"));
        assert_eq!(state.cni_type.as_deref(), Some("canal"));
        assert_eq!(state.datacenter.as_deref(), Some("dc-1"));
        assert_eq!(state.cloud.as_deref(), Some("openstack"));

        let gone = ClusterState {
            id: Some("nope".to_string()),
            ..ClusterState::default()
        };
        assert_eq!(provider.clusters().read(&gone).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_patches_and_waits_for_restart() {
        let mock = MockKkpClient::new("https://kkp.test");
        let provider = provider(&mock);
        let ctx = WaitContext::new();
        let prior = provider.clusters().create(&ctx, &openstack_plan()).await.unwrap();
        let id = prior.id.clone().unwrap();

        let restarting = ClusterHealth {
            apiserver: HealthStatus::from("HealthStatusDown"),
            ..kkp_client::mock::health_all_up()
        };
        mock.script_health(&id, vec![Ok(restarting), Ok(kkp_client::mock::health_all_up())]);

        let mut plan = prior.clone();
        plan.id = None;
        plan.k8s_version = Some("1.33.0".to_string());
        let state = provider.clusters().update(&ctx, &plan, &prior).await.unwrap();

        assert_eq!(state.id.as_deref(), Some(id.as_str()));
        assert_eq!(mock.call_count("patch_cluster"), 1);
        let cluster = mock.get_cluster("proj-1", &id).await.unwrap();
        assert_eq!(cluster.spec.unwrap().version.as_deref(), Some("1.33.0"));
    }

    #[tokio::test]
    async fn test_update_without_changes_is_noop() {
        let mock = MockKkpClient::new("https://kkp.test");
        let mut prior = openstack_plan().with_defaults();
        prior.id = Some("abc".to_string());

        let state = provider(&mock)
            .clusters()
            .update(&WaitContext::new(), &prior, &prior)
            .await
            .unwrap();
        assert_eq!(state, prior);
        assert_eq!(mock.call_count("patch_cluster"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_tolerates_failed_call() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.fail_operation("delete_cluster", MockFailure::Status(500, "etcd busy".to_string()));
        let state = ClusterState {
            id: Some("already-gone".to_string()),
            ..ClusterState::default()
        };

        let warnings = provider(&mock).clusters().delete(&WaitContext::new(), &state).await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].summary, "Delete cluster warning");
        assert_eq!(mock.call_count("get_cluster"), 1);
    }

    #[test]
    fn test_import_requires_id() {
        let mock = MockKkpClient::new("https://kkp.test");
        let provider = provider(&mock);
        assert!(provider.clusters().import("  ").is_err());
        assert_eq!(provider.clusters().import("abc").unwrap().id.as_deref(), Some("abc"));
    }
}
