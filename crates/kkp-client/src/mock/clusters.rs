//! Cluster operations for MockKkpClient
//!
//! Handles clusters, health, kubeconfigs and cluster templates

use super::helpers::{apply_patch, lock};
use super::MockKkpClient;
use crate::error::KkpError;
use crate::models::*;

/// Health with every component reporting up
pub fn health_all_up() -> ClusterHealth {
    let up = HealthStatus::from("HealthStatusUp");
    ClusterHealth {
        apiserver: up.clone(),
        controller: up.clone(),
        scheduler: up.clone(),
        etcd: up.clone(),
        machine_controller: up.clone(),
        user_cluster_controller_manager: up.clone(),
        cloud_provider_infrastructure: up,
    }
}

fn not_found(cluster_id: &str) -> KkpError {
    KkpError::NotFound(format!("cluster {} not found", cluster_id))
}

fn insert_new_cluster(client: &MockKkpClient, name: &str, spec: ClusterSpec) -> Cluster {
    let id = format!("cluster-{}", client.next_id());
    let cluster = Cluster {
        id: id.clone(),
        name: name.to_string(),
        creation_timestamp: Some(chrono::Utc::now()),
        cluster_type: Some("kubernetes".to_string()),
        status: Some(ClusterStatus {
            version: spec.version.clone(),
            url: Some(format!("https://{}.kkp.test:6443", id)),
        }),
        spec: Some(spec),
        ..Cluster::default()
    };
    lock(&client.clusters).insert(id.clone(), cluster.clone());
    lock(&client.health).entry(id).or_insert_with(health_all_up);
    cluster
}

pub async fn list_clusters(client: &MockKkpClient, _project_id: &str) -> Result<Vec<Cluster>, KkpError> {
    client.enter("list_clusters")?;
    let mut clusters: Vec<Cluster> = lock(&client.clusters).values().cloned().collect();
    clusters.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(clusters)
}

pub async fn get_cluster(client: &MockKkpClient, _project_id: &str, cluster_id: &str) -> Result<Cluster, KkpError> {
    client.enter("get_cluster")?;
    let scripted = lock(&client.cluster_scripts).get_mut(cluster_id).and_then(|s| s.next());
    if let Some(step) = scripted {
        return step.map_err(|f| f.into_error(&format!("cluster {}", cluster_id)));
    }
    lock(&client.clusters)
        .get(cluster_id)
        .cloned()
        .ok_or_else(|| not_found(cluster_id))
}

pub async fn create_cluster(client: &MockKkpClient, _project_id: &str, request: &CreateClusterRequest) -> Result<Cluster, KkpError> {
    client.enter("create_cluster")?;
    if request.cluster.name.is_empty() {
        return Err(KkpError::Api {
            status: 400,
            message: "cluster name is required".to_string(),
        });
    }
    Ok(insert_new_cluster(client, &request.cluster.name, request.cluster.spec.clone()))
}

pub async fn patch_cluster(client: &MockKkpClient, _project_id: &str, cluster_id: &str, patch: &serde_json::Value) -> Result<Cluster, KkpError> {
    client.enter("patch_cluster")?;
    let mut clusters = lock(&client.clusters);
    let current = clusters.get(cluster_id).ok_or_else(|| not_found(cluster_id))?;
    let mut patched = apply_patch(current, patch)?;

    let version = patched.spec.as_ref().and_then(|s| s.version.clone());
    if let Some(status) = patched.status.as_mut() {
        status.version = version;
    }
    clusters.insert(cluster_id.to_string(), patched.clone());
    Ok(patched)
}

pub async fn delete_cluster(client: &MockKkpClient, _project_id: &str, cluster_id: &str) -> Result<(), KkpError> {
    client.enter("delete_cluster")?;
    lock(&client.clusters).remove(cluster_id).ok_or_else(|| not_found(cluster_id))?;
    lock(&client.health).remove(cluster_id);
    lock(&client.machine_deployments).retain(|(cluster, _), _| cluster != cluster_id);
    Ok(())
}

pub async fn get_cluster_health(client: &MockKkpClient, _project_id: &str, cluster_id: &str) -> Result<ClusterHealth, KkpError> {
    client.enter("get_cluster_health")?;
    let scripted = lock(&client.health_scripts).get_mut(cluster_id).and_then(|s| s.next());
    if let Some(step) = scripted {
        return step.map_err(|f| f.into_error(&format!("health of cluster {}", cluster_id)));
    }
    if let Some(health) = lock(&client.health).get(cluster_id) {
        return Ok(health.clone());
    }
    if lock(&client.clusters).contains_key(cluster_id) {
        Ok(ClusterHealth::default())
    } else {
        Err(not_found(cluster_id))
    }
}

pub async fn get_kubeconfig(client: &MockKkpClient, _project_id: &str, cluster_id: &str) -> Result<String, KkpError> {
    client.enter("get_kubeconfig")?;
    lock(&client.kubeconfigs)
        .get(cluster_id)
        .cloned()
        .ok_or_else(|| not_found(cluster_id))
}

pub async fn list_cluster_templates(client: &MockKkpClient, _project_id: &str) -> Result<Vec<ClusterTemplate>, KkpError> {
    client.enter("list_cluster_templates")?;
    let mut templates: Vec<ClusterTemplate> = lock(&client.templates).values().cloned().collect();
    templates.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(templates)
}

pub async fn create_cluster_template_instance(client: &MockKkpClient, _project_id: &str, template_id: &str, replicas: u32) -> Result<ClusterTemplateInstance, KkpError> {
    client.enter("create_cluster_template_instance")?;
    let template = lock(&client.templates)
        .get(template_id)
        .cloned()
        .ok_or_else(|| KkpError::NotFound(format!("cluster template {} not found", template_id)))?;

    for _ in 0..replicas {
        insert_new_cluster(client, &template.name, ClusterSpec::default());
    }
    Ok(ClusterTemplateInstance {
        name: template.name,
        replicas,
    })
}
