//! Read-only data sources
//!
//! Every listing is sorted by name so repeated reads produce identical state.

use crate::error::ProviderError;
use crate::provider::KkpProvider;
use crate::resources::application::application_id;
use crate::validation;
use base64::{engine::general_purpose::STANDARD, Engine};
use kkp_client::{Cluster, NodeDeployment};
use kkp_convergence::install_status::evaluate_application;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterSummary {
    pub id: String,
    pub name: String,
    pub creation_time: Option<String>,
    #[serde(rename = "type")]
    pub cluster_type: Option<String>,
    pub cloud: Option<String>,
    pub datacenter_name: Option<String>,
    pub version: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl From<&Cluster> for ClusterSummary {
    fn from(cluster: &Cluster) -> Self {
        let spec = cluster.spec.as_ref();
        let cloud = spec.and_then(|s| s.cloud.as_ref());
        Self {
            id: cluster.id.clone(),
            name: cluster.name.clone(),
            creation_time: cluster.creation_timestamp.map(|t| t.to_rfc3339()),
            cluster_type: cluster.cluster_type.clone().filter(|t| !t.is_empty()),
            cloud: cloud.and_then(|c| c.provider_name()).map(str::to_string),
            datacenter_name: cluster.datacenter_name().map(str::to_string),
            version: spec.and_then(|s| s.version.clone()).filter(|v| !v.is_empty()),
            labels: cluster.labels.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClustersData {
    pub id: String,
    pub clusters: Vec<ClusterSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KubeconfigData {
    pub id: String,
    pub cluster_id: String,
    pub content: String,
    pub content_base64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineDeploymentSummary {
    pub id: String,
    pub name: String,
    pub cluster_id: String,
    pub creation_time: Option<String>,
    pub replicas: i64,
    pub ready_replicas: i64,
    pub labels: BTreeMap<String, String>,
}

impl MachineDeploymentSummary {
    fn new(cluster_id: &str, md: &NodeDeployment) -> Self {
        Self {
            id: md.id.clone(),
            name: md.name.clone(),
            cluster_id: cluster_id.to_string(),
            creation_time: md.creation_timestamp.map(|t| t.to_rfc3339()),
            replicas: md.spec.as_ref().map_or(0, |s| i64::from(s.replicas)),
            ready_replicas: md.status.map_or(0, |s| i64::from(s.ready_replicas)),
            labels: md.spec.as_ref().map(|s| s.template.labels.clone()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineDeploymentsData {
    pub id: String,
    pub cluster_id: String,
    pub machine_deployments: Vec<MachineDeploymentSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddonSummary {
    pub id: String,
    pub name: String,
    pub continuously_reconcile: bool,
    pub is_default: bool,
    /// JSON, `{}` when unset
    pub variables: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableAddon {
    pub name: String,
    /// The API does not describe installable addons; always empty
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddonsData {
    pub id: String,
    pub cluster_id: String,
    pub addons: Vec<AddonSummary>,
    pub available: Vec<AvailableAddon>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationSummary {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub cluster_id: String,
    pub application_name: String,
    pub application_version: String,
    pub creation_time: Option<String>,
    /// installing, ready, failed or deleting
    pub status: String,
    /// JSON, `{}` when unset
    pub values: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationsData {
    pub id: String,
    pub cluster_id: String,
    pub applications: Vec<ApplicationSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshKeySummary {
    pub id: String,
    pub name: String,
    pub fingerprint: String,
    pub public_key: String,
    pub creation_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshKeysData {
    pub id: String,
    pub ssh_keys: Vec<SshKeySummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterTemplateSummary {
    pub id: String,
    pub name: String,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterTemplatesData {
    pub id: String,
    pub templates: Vec<ClusterTemplateSummary>,
}

fn json_or_empty(value: Option<&serde_json::Value>) -> String {
    value
        .filter(|v| !v.is_null())
        .map_or_else(|| "{}".to_string(), serde_json::Value::to_string)
}

fn cluster_id_arg(cluster_id: &str) -> Result<&str, ProviderError> {
    validation::required(cluster_id, "cluster_id")?;
    Ok(cluster_id.trim())
}

/// Data source handlers bound to a configured provider
#[derive(Debug, Clone, Copy)]
pub struct DataSources<'a> {
    provider: &'a KkpProvider,
}

impl<'a> DataSources<'a> {
    pub fn new(provider: &'a KkpProvider) -> Self {
        Self { provider }
    }

    pub async fn clusters(&self) -> Result<ClustersData, ProviderError> {
        let project_id = self.provider.project_id();
        let clusters = self
            .provider
            .client()
            .list_clusters(project_id)
            .await
            .map_err(ProviderError::api("Failed to list clusters"))?;

        let mut summaries: Vec<ClusterSummary> = clusters.iter().map(ClusterSummary::from).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        info!(project_id = %project_id, cluster_count = summaries.len(), "Listed clusters");

        Ok(ClustersData {
            id: format!("clusters-{}", project_id),
            clusters: summaries,
        })
    }

    pub async fn cluster_kubeconfig(&self, cluster_id: &str) -> Result<KubeconfigData, ProviderError> {
        let cluster_id = cluster_id_arg(cluster_id)?;
        let content = self
            .provider
            .client()
            .get_kubeconfig(self.provider.project_id(), cluster_id)
            .await
            .map_err(ProviderError::api("Failed to fetch kubeconfig"))?;

        Ok(KubeconfigData {
            id: format!("kubeconfig-{}", cluster_id),
            cluster_id: cluster_id.to_string(),
            content_base64: STANDARD.encode(content.as_bytes()),
            content,
        })
    }

    pub async fn machine_deployments(&self, cluster_id: &str) -> Result<MachineDeploymentsData, ProviderError> {
        let cluster_id = cluster_id_arg(cluster_id)?;
        let deployments = self
            .provider
            .client()
            .list_machine_deployments(self.provider.project_id(), cluster_id)
            .await
            .map_err(ProviderError::api("Failed to list machine deployments"))?;

        let mut summaries: Vec<MachineDeploymentSummary> = deployments
            .iter()
            .map(|md| MachineDeploymentSummary::new(cluster_id, md))
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        info!(cluster_id = %cluster_id, machine_deployment_count = summaries.len(), "Listed machine deployments");

        Ok(MachineDeploymentsData {
            id: format!("machine-deployments-{}", cluster_id),
            cluster_id: cluster_id.to_string(),
            machine_deployments: summaries,
        })
    }

    /// Installed addons plus the names that can still be installed
    pub async fn addons(&self, cluster_id: &str) -> Result<AddonsData, ProviderError> {
        let cluster_id = cluster_id_arg(cluster_id)?;
        let client = self.provider.client();
        let project_id = self.provider.project_id();

        let installed = client
            .list_addons(project_id, cluster_id)
            .await
            .map_err(ProviderError::api("Failed to list installed addons"))?;
        let mut installable = client
            .list_installable_addons(project_id, cluster_id)
            .await
            .map_err(ProviderError::api("Failed to list available addons"))?;
        installable.sort();

        let mut addons: Vec<AddonSummary> = installed
            .iter()
            .map(|addon| {
                let spec = addon.spec.as_ref();
                AddonSummary {
                    id: addon.id.clone(),
                    name: addon.name.clone(),
                    continuously_reconcile: spec.is_some_and(|s| s.continuously_reconcile),
                    is_default: spec.is_some_and(|s| s.is_default),
                    variables: json_or_empty(spec.and_then(|s| s.variables.as_ref())),
                }
            })
            .collect();
        addons.sort_by(|a, b| a.name.cmp(&b.name));

        let available: Vec<AvailableAddon> = installable
            .into_iter()
            .map(|name| AvailableAddon {
                name,
                description: String::new(),
            })
            .collect();
        info!(
            cluster_id = %cluster_id,
            installed_count = addons.len(),
            available_count = available.len(),
            "Retrieved addon information"
        );

        Ok(AddonsData {
            id: format!("addons-{}", cluster_id),
            cluster_id: cluster_id.to_string(),
            addons,
            available,
        })
    }

    pub async fn applications(&self, cluster_id: &str) -> Result<ApplicationsData, ProviderError> {
        let cluster_id = cluster_id_arg(cluster_id)?;
        let installations = self
            .provider
            .client()
            .list_applications(self.provider.project_id(), cluster_id)
            .await
            .map_err(ProviderError::api("Failed to list applications"))?;

        let mut applications: Vec<ApplicationSummary> = installations
            .iter()
            .map(|app| {
                let spec = app.spec.as_ref();
                ApplicationSummary {
                    id: application_id(cluster_id, &app.namespace, &app.name),
                    name: app.name.clone(),
                    namespace: app.namespace.clone(),
                    cluster_id: cluster_id.to_string(),
                    application_name: spec.map(|s| s.application_ref.name.clone()).unwrap_or_default(),
                    application_version: spec.map(|s| s.application_ref.version.clone()).unwrap_or_default(),
                    creation_time: app.creation_timestamp.map(|t| t.to_rfc3339()),
                    status: evaluate_application(app).status.as_str().to_string(),
                    values: json_or_empty(spec.and_then(|s| s.values.as_ref())),
                }
            })
            .collect();
        applications.sort_by(|a, b| (&a.name, &a.namespace).cmp(&(&b.name, &b.namespace)));
        info!(cluster_id = %cluster_id, application_count = applications.len(), "Listed applications");

        Ok(ApplicationsData {
            id: format!("applications-{}", cluster_id),
            cluster_id: cluster_id.to_string(),
            applications,
        })
    }

    pub async fn ssh_keys(&self) -> Result<SshKeysData, ProviderError> {
        let project_id = self.provider.project_id();
        let keys = self
            .provider
            .client()
            .list_ssh_keys(project_id)
            .await
            .map_err(ProviderError::api("Failed to list SSH keys"))?;

        let mut ssh_keys: Vec<SshKeySummary> = keys
            .iter()
            .map(|key| SshKeySummary {
                id: key.id.clone(),
                name: key.name.clone(),
                fingerprint: key.spec.fingerprint.clone(),
                public_key: key.spec.public_key.clone(),
                creation_time: key.creation_timestamp.map(|t| t.to_rfc3339()),
            })
            .collect();
        ssh_keys.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(SshKeysData {
            id: format!("ssh-keys-{}", project_id),
            ssh_keys,
        })
    }

    pub async fn cluster_templates(&self) -> Result<ClusterTemplatesData, ProviderError> {
        let project_id = self.provider.project_id();
        let templates = self
            .provider
            .client()
            .list_cluster_templates(project_id)
            .await
            .map_err(ProviderError::api("Failed to list cluster templates"))?;

        let mut templates: Vec<ClusterTemplateSummary> = templates
            .into_iter()
            .map(|t| ClusterTemplateSummary {
                id: t.id,
                name: t.name,
                scope: t.scope,
            })
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ClusterTemplatesData {
            id: format!("cluster-templates-{}", project_id),
            templates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kkp_client::{
        Addon, AddonSpec, ApplicationCondition, ApplicationInstallation, ApplicationInstallationStatus, CloudSpec,
        ClusterSpec, ClusterTemplate, MockFailure, MockKkpClient, NodeDeploymentSpec, OpenstackCloudSpec, SshKey,
        SshKeySpec,
    };
    use std::sync::Arc;

    fn provider(mock: &MockKkpClient) -> KkpProvider {
        KkpProvider::new(Arc::new(mock.clone()), "proj-1")
    }

    fn cluster(id: &str, name: &str) -> Cluster {
        Cluster {
            id: id.to_string(),
            name: name.to_string(),
            spec: Some(ClusterSpec {
                version: Some("1.29.4".to_string()),
                cloud: Some(CloudSpec {
                    openstack: Some(OpenstackCloudSpec::default()),
                    ..CloudSpec::for_datacenter("dc-1")
                }),
                ..ClusterSpec::default()
            }),
            ..Cluster::default()
        }
    }

    #[tokio::test]
    async fn test_clusters_sorted_by_name() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.add_cluster(cluster("a1", "zeta"));
        mock.add_cluster(cluster("b2", "alpha"));

        let data = provider(&mock).data().clusters().await.unwrap();
        assert_eq!(data.id, "clusters-proj-1");
        let names: Vec<&str> = data.clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(data.clusters[0].cloud.as_deref(), Some("openstack"));
        assert_eq!(data.clusters[0].datacenter_name.as_deref(), Some("dc-1"));
        assert_eq!(data.clusters[0].version.as_deref(), Some("1.29.4"));
    }

    #[tokio::test]
    async fn test_kubeconfig_content_and_base64() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.set_kubeconfig("c1", "apiVersion: v1\n");

        let data = provider(&mock).data().cluster_kubeconfig("c1").await.unwrap();
        assert_eq!(data.id, "kubeconfig-c1");
        assert_eq!(data.content, "apiVersion: v1\n");
        assert_eq!(data.content_base64, "YXBpVmVyc2lvbjogdjEK");

        assert!(matches!(
            provider(&mock).data().cluster_kubeconfig("  ").await,
            Err(ProviderError::Validation(_))
        ));
        assert!(provider(&mock).data().cluster_kubeconfig("c2").await.is_err());
    }

    #[tokio::test]
    async fn test_machine_deployments_listing() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.add_cluster(cluster("c1", "one"));
        mock.add_machine_deployment(
            "c1",
            NodeDeployment {
                id: "workers-1".to_string(),
                name: "workers".to_string(),
                spec: Some(NodeDeploymentSpec {
                    replicas: 3,
                    ..NodeDeploymentSpec::default()
                }),
                ..NodeDeployment::default()
            },
        );

        let data = provider(&mock).data().machine_deployments("c1").await.unwrap();
        assert_eq!(data.id, "machine-deployments-c1");
        assert_eq!(data.machine_deployments.len(), 1);
        assert_eq!(data.machine_deployments[0].replicas, 3);
        assert_eq!(data.machine_deployments[0].ready_replicas, 0);
        assert_eq!(data.machine_deployments[0].cluster_id, "c1");
    }

    #[tokio::test]
    async fn test_addons_installed_and_available() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.add_addon(
            "c1",
            Addon {
                id: "metallb".to_string(),
                name: "metallb".to_string(),
                spec: Some(AddonSpec {
                    variables: Some(serde_json::json!({"pool": "10.0.0.0/24"})),
                    continuously_reconcile: true,
                    ..AddonSpec::default()
                }),
                ..Addon::default()
            },
        );
        mock.add_addon(
            "c1",
            Addon {
                id: "dashboard".to_string(),
                name: "dashboard".to_string(),
                ..Addon::default()
            },
        );
        mock.set_installable_addons("c1", vec!["node-exporter".to_string(), "kured".to_string()]);

        let data = provider(&mock).data().addons("c1").await.unwrap();
        assert_eq!(data.id, "addons-c1");
        let installed: Vec<&str> = data.addons.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(installed, vec!["dashboard", "metallb"]);
        assert_eq!(data.addons[0].variables, "{}");
        assert_eq!(data.addons[1].variables, r#"{"pool":"10.0.0.0/24"}"#);
        assert!(data.addons[1].continuously_reconcile);
        let available: Vec<&str> = data.available.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(available, vec!["kured", "node-exporter"]);
    }

    #[tokio::test]
    async fn test_addons_installable_failure() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.fail_operation("list_installable_addons", MockFailure::Status(500, "boom".to_string()));
        let err = provider(&mock).data().addons("c1").await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to list available addons"));
    }

    #[tokio::test]
    async fn test_applications_carry_status() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.add_application(
            "c1",
            ApplicationInstallation {
                name: "nginx".to_string(),
                namespace: "web".to_string(),
                status: Some(ApplicationInstallationStatus {
                    conditions: vec![ApplicationCondition {
                        condition_type: "Ready".to_string(),
                        status: "True".to_string(),
                        ..ApplicationCondition::default()
                    }],
                    method: None,
                }),
                ..ApplicationInstallation::default()
            },
        );
        mock.add_application(
            "c1",
            ApplicationInstallation {
                name: "cert-manager".to_string(),
                namespace: "cert-manager".to_string(),
                ..ApplicationInstallation::default()
            },
        );

        let data = provider(&mock).data().applications("c1").await.unwrap();
        assert_eq!(data.id, "applications-c1");
        assert_eq!(data.applications[0].name, "cert-manager");
        assert_eq!(data.applications[0].status, "installing");
        assert_eq!(data.applications[1].id, "c1/web/nginx");
        assert_eq!(data.applications[1].status, "ready");
        assert_eq!(data.applications[1].values, "{}");
    }

    #[tokio::test]
    async fn test_ssh_keys_and_templates() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.add_ssh_key(SshKey {
            id: "k2".to_string(),
            name: "ops".to_string(),
            spec: SshKeySpec {
                public_key: "ssh-ed25519 AAAA".to_string(),
                fingerprint: "aa:bb".to_string(),
            },
            ..SshKey::default()
        });
        mock.add_ssh_key(SshKey {
            id: "k1".to_string(),
            name: "ci".to_string(),
            ..SshKey::default()
        });
        mock.add_template(ClusterTemplate {
            id: "t1".to_string(),
            name: "small".to_string(),
            scope: Some("project".to_string()),
            ..ClusterTemplate::default()
        });

        let provider = provider(&mock);
        let keys = provider.data().ssh_keys().await.unwrap();
        assert_eq!(keys.id, "ssh-keys-proj-1");
        let names: Vec<&str> = keys.ssh_keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["ci", "ops"]);
        assert_eq!(keys.ssh_keys[1].fingerprint, "aa:bb");

        let templates = provider.data().cluster_templates().await.unwrap();
        assert_eq!(templates.id, "cluster-templates-proj-1");
        assert_eq!(templates.templates[0].scope.as_deref(), Some("project"));
    }
}
