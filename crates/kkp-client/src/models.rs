//! KKP API models
//!
//! Request and response bodies for the subset of the KKP REST API used by the
//! provider. Field names follow the API's camelCase JSON.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Returns true when a deletion timestamp is set to a real instant.
///
/// The API serializes an unset timestamp as `0001-01-01T00:00:00Z` in some
/// versions, so only years after 1 count.
#[must_use]
pub fn timestamp_is_set(ts: Option<&DateTime<Utc>>) -> bool {
    ts.is_some_and(|t| t.year() > 1)
}

// ---------------------------------------------------------------------------
// Clusters
// ---------------------------------------------------------------------------

/// A user cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ClusterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ClusterStatus>,
}

impl Cluster {
    /// Whether the cluster has been marked for deletion
    #[must_use]
    pub fn marked_for_deletion(&self) -> bool {
        timestamp_is_set(self.deletion_timestamp.as_ref())
    }

    /// Datacenter name from the cloud spec, if any
    #[must_use]
    pub fn datacenter_name(&self) -> Option<&str> {
        self.spec.as_ref()?.cloud.as_ref()?.datacenter()
    }
}

/// Cluster spec as returned by and sent to the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cni_plugin: Option<CniPlugin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudSpec>,
}

/// CNI plugin selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CniPlugin {
    #[serde(rename = "type", default)]
    pub plugin_type: String,
    #[serde(default)]
    pub version: String,
}

/// Cloud section of a cluster spec.
///
/// Different API versions read the datacenter from different keys, so it is
/// carried under all three.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openstack: Option<OpenstackCloudSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vsphere: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<serde_json::Value>,
}

impl CloudSpec {
    /// Cloud spec for `datacenter`, with every datacenter key populated
    #[must_use]
    pub fn for_datacenter(datacenter: &str) -> Self {
        Self {
            datacenter_name: Some(datacenter.to_string()),
            datacenter: Some(datacenter.to_string()),
            dc: Some(datacenter.to_string()),
            ..Self::default()
        }
    }

    /// First populated datacenter key
    #[must_use]
    pub fn datacenter(&self) -> Option<&str> {
        self.dc
            .as_deref()
            .or(self.datacenter_name.as_deref())
            .or(self.datacenter.as_deref())
    }

    /// Name of the cloud provider section that is set
    #[must_use]
    pub fn provider_name(&self) -> Option<&'static str> {
        if self.openstack.is_some() {
            Some("openstack")
        } else if self.aws.is_some() {
            Some("aws")
        } else if self.vsphere.is_some() {
            Some("vsphere")
        } else if self.azure.is_some() {
            Some("azure")
        } else {
            None
        }
    }
}

/// OpenStack cluster cloud settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenstackCloudSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(rename = "projectID", default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(rename = "applicationCredentialID", default, skip_serializing_if = "Option::is_none")]
    pub application_credential_id: Option<String>,
    #[serde(rename = "applicationCredentialSecret", default, skip_serializing_if = "Option::is_none")]
    pub application_credential_secret: Option<String>,
    #[serde(rename = "useToken", default, skip_serializing_if = "Option::is_none")]
    pub use_token: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(rename = "subnetID", default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(rename = "floatingIPPool", default, skip_serializing_if = "Option::is_none")]
    pub floating_ip_pool: Option<String>,
    #[serde(rename = "securityGroups", default, skip_serializing_if = "Option::is_none")]
    pub security_groups: Option<String>,
}

/// Observed cluster status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Body of `POST /clusters`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClusterRequest {
    pub cluster: NewCluster,
}

/// Cluster part of a create request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCluster {
    pub name: String,
    /// Preset name used for cloud credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    pub spec: ClusterSpec,
}

/// Component health of a cluster's control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterHealth {
    #[serde(default)]
    pub apiserver: HealthStatus,
    #[serde(default)]
    pub controller: HealthStatus,
    #[serde(default)]
    pub scheduler: HealthStatus,
    #[serde(default)]
    pub etcd: HealthStatus,
    #[serde(default)]
    pub machine_controller: HealthStatus,
    #[serde(default)]
    pub user_cluster_controller_manager: HealthStatus,
    #[serde(default)]
    pub cloud_provider_infrastructure: HealthStatus,
}

/// A single health value.
///
/// KKP reports health either as an enum string (`"HealthStatusUp"`) or as an
/// integer (`1` for up); both are kept as their textual form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawHealthStatus", into = "String")]
pub struct HealthStatus(String);

impl HealthStatus {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<HealthStatus> for String {
    fn from(value: HealthStatus) -> Self {
        value.0
    }
}

impl From<&str> for HealthStatus {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawHealthStatus {
    Text(String),
    Number(i64),
    Flag(bool),
    Null,
}

impl From<RawHealthStatus> for HealthStatus {
    fn from(raw: RawHealthStatus) -> Self {
        match raw {
            RawHealthStatus::Text(s) => Self(s),
            RawHealthStatus::Number(n) => Self(n.to_string()),
            RawHealthStatus::Flag(b) => Self(b.to_string()),
            RawHealthStatus::Null => Self::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cluster templates
// ---------------------------------------------------------------------------

/// A cluster template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTemplate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(rename = "projectID", default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Result of instantiating a cluster template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTemplateInstance {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub replicas: u32,
}

// ---------------------------------------------------------------------------
// Machine deployments
// ---------------------------------------------------------------------------

/// A machine deployment (worker node pool)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDeployment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<NodeDeploymentSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MachineDeploymentStatus>,
}

/// Desired state of a machine deployment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDeploymentSpec {
    #[serde(default)]
    pub replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ready_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(default)]
    pub template: NodeSpec,
}

/// Template for the machines of a deployment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    #[serde(default)]
    pub cloud: NodeCloudSpec,
    #[serde(default)]
    pub operating_system: OperatingSystemSpec,
    #[serde(default)]
    pub versions: NodeVersionInfo,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Per-cloud machine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeCloudSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openstack: Option<OpenstackNodeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vsphere: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<serde_json::Value>,
}

/// OpenStack machine settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenstackNodeSpec {
    #[serde(default)]
    pub flavor: String,
    #[serde(default)]
    pub image: String,
    #[serde(rename = "diskSize", default, skip_serializing_if = "Option::is_none")]
    pub disk_size: Option<i64>,
    #[serde(rename = "availabilityZone", default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(rename = "useFloatingIP", default, skip_serializing_if = "Option::is_none")]
    pub use_floating_ip: Option<bool>,
}

/// Operating system of the machines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingSystemSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ubuntu: Option<UbuntuSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UbuntuSpec {
    #[serde(default)]
    pub dist_upgrade_on_boot: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeVersionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet: Option<String>,
}

/// Replica counters reported by the machine controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDeploymentStatus {
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub updated_replicas: i32,
    #[serde(default)]
    pub ready_replicas: i32,
    #[serde(default)]
    pub available_replicas: i32,
    #[serde(default)]
    pub unavailable_replicas: i32,
}

// ---------------------------------------------------------------------------
// Addons
// ---------------------------------------------------------------------------

/// A cluster addon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Addon {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<AddonSpec>,
}

impl Addon {
    /// Whether the addon has been marked for deletion
    #[must_use]
    pub fn marked_for_deletion(&self) -> bool {
        timestamp_is_set(self.deletion_timestamp.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
    #[serde(default)]
    pub continuously_reconcile: bool,
    #[serde(default)]
    pub is_default: bool,
}

// ---------------------------------------------------------------------------
// Application installations
// ---------------------------------------------------------------------------

/// An application installed into a user cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInstallation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ApplicationInstallationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ApplicationInstallationStatus>,
}

impl ApplicationInstallation {
    /// Whether the installation has been marked for deletion
    #[must_use]
    pub fn marked_for_deletion(&self) -> bool {
        timestamp_is_set(self.deletion_timestamp.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInstallationSpec {
    #[serde(default)]
    pub namespace: NamespaceSpec,
    #[serde(default)]
    pub application_ref: ApplicationRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<serde_json::Value>,
}

/// Namespace the application is deployed into
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub create: bool,
}

/// Reference to an application definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInstallationStatus {
    #[serde(default)]
    pub conditions: Vec<ApplicationCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// A status condition such as `Ready` or `ManifestsApplied`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationCondition {
    #[serde(rename = "type", default)]
    pub condition_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// SSH keys
// ---------------------------------------------------------------------------

/// A project SSH key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKey {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub spec: SshKeySpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKeySpec {
    #[serde(default)]
    pub public_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fingerprint: String,
}
