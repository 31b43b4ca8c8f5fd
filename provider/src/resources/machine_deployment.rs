//! Machine deployment resource

use super::{found, non_empty, require_id, split_import_id};
use crate::cloud::CloudProvider;
use crate::defaults::{DEFAULT_DISK_SIZE, DEFAULT_REPLICAS};
use crate::error::ProviderError;
use crate::provider::KkpProvider;
use crate::validation;
use kkp_client::{
    NodeCloudSpec, NodeDeployment, NodeDeploymentSpec, NodeSpec, NodeVersionInfo, OpenstackNodeSpec,
    OperatingSystemSpec, UbuntuSpec,
};
use kkp_convergence::{MachineDeploymentConvergence, WaitContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// OpenStack machine settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineDeploymentOpenstack {
    pub flavor: String,
    pub image: String,
    pub use_floating_ip: Option<bool>,
    /// GB
    pub disk_size: Option<i64>,
    pub availability_zone: Option<String>,
}

/// Plan and state of a machine deployment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineDeploymentState {
    /// Computed
    pub id: Option<String>,
    pub cluster_id: String,
    pub name: String,
    pub replicas: Option<i64>,
    /// Kubelet version; the cluster version when unset
    pub k8s_version: Option<String>,
    pub min_ready_seconds: Option<i64>,
    pub paused: Option<bool>,
    pub min_replicas: Option<i64>,
    pub max_replicas: Option<i64>,
    pub cloud: Option<String>,
    pub openstack: Option<MachineDeploymentOpenstack>,
    pub aws: Option<serde_json::Value>,
    pub vsphere: Option<serde_json::Value>,
    pub azure: Option<serde_json::Value>,
}

fn to_u32(value: i64, field: &str) -> Result<u32, ProviderError> {
    u32::try_from(value).map_err(|_| ProviderError::validation(format!("{} value {} is out of range", field, value)))
}

impl MachineDeploymentState {
    /// Zero or unset replicas and disk size fall back to the defaults
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        if self.replicas.is_none_or(|r| r == 0) {
            self.replicas = Some(DEFAULT_REPLICAS);
        }
        if let Some(os) = self.openstack.as_mut() {
            if os.disk_size.is_none_or(|d| d == 0) {
                os.disk_size = Some(DEFAULT_DISK_SIZE);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<CloudProvider, ProviderError> {
        validation::resource_name(&self.name)?;
        validation::required(&self.cluster_id, "cluster_id")?;
        validation::replicas(self.replicas.unwrap_or(DEFAULT_REPLICAS))?;
        validation::autoscaling(self.min_replicas, self.max_replicas)?;
        if let Some(version) = non_empty(self.k8s_version.as_deref()) {
            validation::k8s_version(version)?;
        }
        let cloud = validation::cloud_provider(self.cloud.as_deref().unwrap_or_default())?;

        match cloud {
            CloudProvider::OpenStack => {
                let os = self.openstack.as_ref().ok_or_else(|| {
                    ProviderError::validation("`cloud = openstack` but no `openstack { ... }` block is set")
                })?;
                validation::required(&os.flavor, "openstack.flavor")?;
                validation::required(&os.image, "openstack.image")?;
                validation::disk_size(os.disk_size.unwrap_or(DEFAULT_DISK_SIZE))?;
            }
            CloudProvider::Aws if self.aws.is_none() => {
                return Err(ProviderError::validation("`cloud = aws` but no `aws` block is set"));
            }
            CloudProvider::VSphere if self.vsphere.is_none() => {
                return Err(ProviderError::validation("`cloud = vsphere` but no `vsphere` block is set"));
            }
            CloudProvider::Azure if self.azure.is_none() => {
                return Err(ProviderError::validation("`cloud = azure` but no `azure` block is set"));
            }
            _ => {}
        }
        Ok(cloud)
    }

    /// Request body of a create. Nodes run Ubuntu without a dist-upgrade on
    /// first boot and carry cluster and project labels.
    pub fn to_node_deployment(&self, project_id: &str) -> Result<NodeDeployment, ProviderError> {
        let cloud = self.validate()?;
        let replicas = validation::to_i32(self.replicas.unwrap_or(DEFAULT_REPLICAS), "replicas")?;

        let mut cloud_spec = NodeCloudSpec::default();
        match cloud {
            CloudProvider::OpenStack => {
                let os = self.openstack.clone().unwrap_or_default();
                cloud_spec.openstack = Some(OpenstackNodeSpec {
                    flavor: os.flavor.trim().to_string(),
                    image: os.image.trim().to_string(),
                    disk_size: os.disk_size,
                    availability_zone: non_empty(os.availability_zone.as_deref()).map(str::to_string),
                    use_floating_ip: os.use_floating_ip,
                });
            }
            CloudProvider::Aws => cloud_spec.aws.clone_from(&self.aws),
            CloudProvider::VSphere => cloud_spec.vsphere.clone_from(&self.vsphere),
            CloudProvider::Azure => cloud_spec.azure.clone_from(&self.azure),
        }

        let labels = BTreeMap::from([
            ("system/cluster".to_string(), self.cluster_id.trim().to_string()),
            ("system/project".to_string(), project_id.to_string()),
        ]);

        Ok(NodeDeployment {
            name: self.name.trim().to_string(),
            spec: Some(NodeDeploymentSpec {
                replicas,
                min_replicas: self.min_replicas.map(|v| to_u32(v, "min_replicas")).transpose()?,
                max_replicas: self.max_replicas.map(|v| to_u32(v, "max_replicas")).transpose()?,
                min_ready_seconds: self
                    .min_ready_seconds
                    .map(|v| validation::to_i32(v, "min_ready_seconds"))
                    .transpose()?,
                paused: self.paused,
                template: NodeSpec {
                    cloud: cloud_spec,
                    operating_system: OperatingSystemSpec {
                        ubuntu: Some(UbuntuSpec {
                            dist_upgrade_on_boot: false,
                        }),
                    },
                    versions: NodeVersionInfo {
                        kubelet: non_empty(self.k8s_version.as_deref()).map(str::to_string),
                    },
                    labels,
                },
            }),
            ..NodeDeployment::default()
        })
    }

    fn refresh_from(&mut self, deployment: &NodeDeployment) {
        self.id = Some(deployment.id.clone());
        if !deployment.name.is_empty() {
            self.name = deployment.name.clone();
        }
        let Some(spec) = deployment.spec.as_ref() else {
            return;
        };
        self.replicas = Some(i64::from(spec.replicas));
        if let Some(kubelet) = non_empty(spec.template.versions.kubelet.as_deref()) {
            self.k8s_version = Some(kubelet.to_string());
        }
        self.paused = Some(spec.paused.unwrap_or(false));
        self.min_ready_seconds = Some(spec.min_ready_seconds.map_or(0, i64::from));
        if let Some(min) = spec.min_replicas {
            self.min_replicas = Some(i64::from(min));
        }
        if let Some(max) = spec.max_replicas {
            self.max_replicas = Some(i64::from(max));
        }
        if self.cloud.is_none() && spec.template.cloud.openstack.is_some() {
            self.cloud = Some(CloudProvider::OpenStack.to_string());
        }
    }
}

/// Fields an update changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct UpdateChanges {
    replicas: Option<i64>,
    version: Option<String>,
    min_replicas: Option<i64>,
    max_replicas: Option<i64>,
}

impl UpdateChanges {
    fn detect(plan: &MachineDeploymentState, prior: &MachineDeploymentState) -> Self {
        let differs = |want: Option<i64>, have: Option<i64>| want.filter(|w| Some(*w) != have);
        let want_version = non_empty(plan.k8s_version.as_deref());
        Self {
            replicas: differs(plan.replicas, prior.replicas),
            version: want_version
                .filter(|v| Some(*v) != non_empty(prior.k8s_version.as_deref()))
                .map(str::to_string),
            min_replicas: differs(plan.min_replicas, prior.min_replicas).filter(|v| *v > 0),
            max_replicas: differs(plan.max_replicas, prior.max_replicas).filter(|v| *v > 0),
        }
    }

    fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    fn to_patch(&self) -> Result<serde_json::Value, ProviderError> {
        let mut spec = serde_json::Map::new();
        if let Some(replicas) = self.replicas {
            spec.insert("replicas".to_string(), validation::to_i32(replicas, "replicas")?.into());
        }
        if let Some(version) = &self.version {
            spec.insert(
                "template".to_string(),
                serde_json::json!({ "versions": { "kubelet": version } }),
            );
        }
        if let Some(min) = self.min_replicas {
            spec.insert("minReplicas".to_string(), to_u32(min, "min_replicas")?.into());
        }
        if let Some(max) = self.max_replicas {
            spec.insert("maxReplicas".to_string(), to_u32(max, "max_replicas")?.into());
        }
        Ok(serde_json::json!({ "spec": spec }))
    }
}

/// Handler for the machine deployment resource
#[derive(Debug, Clone, Copy)]
pub struct MachineDeploymentResource<'a> {
    provider: &'a KkpProvider,
}

impl<'a> MachineDeploymentResource<'a> {
    pub fn new(provider: &'a KkpProvider) -> Self {
        Self { provider }
    }

    fn convergence<'s>(&'s self, cluster_id: &'s str, id: &'s str) -> MachineDeploymentConvergence<'s> {
        MachineDeploymentConvergence::new(self.provider.client(), self.provider.project_id(), cluster_id, id)
    }

    /// Create and wait until the reported replicas are available
    pub async fn create(
        &self,
        ctx: &WaitContext,
        plan: &MachineDeploymentState,
    ) -> Result<MachineDeploymentState, ProviderError> {
        let mut state = plan.clone().with_defaults();
        let request = state.to_node_deployment(self.provider.project_id())?;
        let cluster_id = state.cluster_id.trim().to_string();

        let created = self
            .provider
            .client()
            .create_machine_deployment(self.provider.project_id(), &cluster_id, &request)
            .await
            .map_err(ProviderError::api("Create machine deployment failed"))?;
        info!(
            cluster_id = %cluster_id,
            machine_deployment_id = %created.id,
            replicas = request.spec.as_ref().map_or(0, |s| s.replicas),
            "Machine deployment created, waiting for replicas"
        );

        self.convergence(&cluster_id, &created.id)
            .wait_ready_with(ctx, None, self.provider.timings().machine_deployment_ready)
            .await
            .map_err(ProviderError::wait(format!("Machine deployment {} provisioning", created.id)))?;

        state.id = Some(created.id);
        state.cluster_id = cluster_id;
        Ok(state)
    }

    /// Refresh state; `None` when the deployment no longer exists
    pub async fn read(&self, state: &MachineDeploymentState) -> Result<Option<MachineDeploymentState>, ProviderError> {
        let id = require_id(state.id.as_deref(), "machine deployment id")?;
        let cluster_id = require_id(Some(state.cluster_id.as_str()), "cluster_id")?;

        let deployment = found(
            self.provider
                .client()
                .get_machine_deployment(self.provider.project_id(), cluster_id, id)
                .await,
            "Read machine deployment failed",
        )?;
        Ok(deployment.map(|deployment| {
            let mut refreshed = state.clone();
            refreshed.refresh_from(&deployment);
            refreshed
        }))
    }

    /// Patch replicas, kubelet version and autoscaling bounds, then wait for
    /// the wanted replica count
    pub async fn update(
        &self,
        ctx: &WaitContext,
        plan: &MachineDeploymentState,
        prior: &MachineDeploymentState,
    ) -> Result<MachineDeploymentState, ProviderError> {
        let id = require_id(prior.id.as_deref(), "machine deployment id")?;
        let cluster_id = require_id(Some(prior.cluster_id.as_str()), "cluster_id")?;
        let plan = plan.clone().with_defaults();
        validation::replicas(plan.replicas.unwrap_or(DEFAULT_REPLICAS))?;
        validation::autoscaling(plan.min_replicas, plan.max_replicas)?;

        let mut next = plan.clone();
        next.id = Some(id.to_string());
        next.cluster_id = cluster_id.to_string();

        let changes = UpdateChanges::detect(&plan, prior);
        if changes.is_empty() {
            debug!(machine_deployment_id = %id, "No machine deployment changes to apply");
            return Ok(next);
        }
        if let Some(version) = changes.version.as_deref() {
            validation::k8s_version(version)?;
        }
        let patch = changes.to_patch()?;

        self.provider
            .client()
            .patch_machine_deployment(self.provider.project_id(), cluster_id, id, &patch)
            .await
            .map_err(ProviderError::api("Patch machine deployment failed"))?;
        info!(
            cluster_id = %cluster_id,
            machine_deployment_id = %id,
            replicas = ?changes.replicas,
            version = ?changes.version,
            "Machine deployment patch sent"
        );

        let wanted = plan.replicas.or(prior.replicas);
        self.convergence(cluster_id, id)
            .wait_ready_with(ctx, wanted, self.provider.timings().machine_deployment_ready)
            .await
            .map_err(ProviderError::wait(format!("Machine deployment {} update", id)))?;
        Ok(next)
    }

    /// Delete and wait until the deployment is no longer listed. An already
    /// missing deployment counts as deleted.
    pub async fn delete(&self, ctx: &WaitContext, state: &MachineDeploymentState) -> Result<(), ProviderError> {
        let id = require_id(state.id.as_deref(), "machine deployment id")?;
        let cluster_id = require_id(Some(state.cluster_id.as_str()), "cluster_id")?;

        match self
            .provider
            .client()
            .delete_machine_deployment(self.provider.project_id(), cluster_id, id)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(machine_deployment_id = %id, "Machine deployment already gone");
            }
            Err(e) => return Err(ProviderError::api("Delete machine deployment failed")(e)),
        }

        self.convergence(cluster_id, id)
            .wait_deleted_with(ctx, self.provider.timings().machine_deployment_deleted)
            .await
            .map_err(ProviderError::wait("Machine deployment deletion timed out"))
    }

    /// Import from `cluster_id:machine_deployment_id`
    pub fn import(&self, id: &str) -> Result<MachineDeploymentState, ProviderError> {
        let parts = split_import_id(id, 2, "cluster_id:machine_deployment_id")?;
        Ok(MachineDeploymentState {
            cluster_id: parts[0].clone(),
            id: Some(parts[1].clone()),
            ..MachineDeploymentState::default()
        })
    }
}
