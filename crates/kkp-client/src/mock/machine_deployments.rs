//! Machine deployment operations for MockKkpClient

use super::helpers::{apply_patch, lock};
use super::MockKkpClient;
use crate::error::KkpError;
use crate::models::*;

fn not_found(machine_deployment_id: &str) -> KkpError {
    KkpError::NotFound(format!("machine deployment {} not found", machine_deployment_id))
}

/// Pretend the machine controller converged immediately
fn settle(deployment: &mut NodeDeployment) {
    let replicas = deployment.spec.as_ref().map_or(0, |s| s.replicas);
    deployment.status = Some(MachineDeploymentStatus {
        replicas,
        updated_replicas: replicas,
        ready_replicas: replicas,
        available_replicas: replicas,
        unavailable_replicas: 0,
    });
}

pub async fn list_machine_deployments(client: &MockKkpClient, _project_id: &str, cluster_id: &str) -> Result<Vec<NodeDeployment>, KkpError> {
    client.enter("list_machine_deployments")?;
    let scripted = lock(&client.machine_deployment_list_scripts)
        .get_mut(cluster_id)
        .and_then(|s| s.next());
    if let Some(step) = scripted {
        return step.map_err(|f| f.into_error(&format!("machine deployments of cluster {}", cluster_id)));
    }
    if !lock(&client.clusters).contains_key(cluster_id) {
        return Err(KkpError::NotFound(format!("cluster {} not found", cluster_id)));
    }

    let mut deployments: Vec<NodeDeployment> = lock(&client.machine_deployments)
        .iter()
        .filter(|((cluster, _), _)| cluster == cluster_id)
        .map(|(_, md)| md.clone())
        .collect();
    deployments.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(deployments)
}

pub async fn get_machine_deployment(client: &MockKkpClient, _project_id: &str, cluster_id: &str, machine_deployment_id: &str) -> Result<NodeDeployment, KkpError> {
    client.enter("get_machine_deployment")?;
    lock(&client.machine_deployments)
        .get(&(cluster_id.to_string(), machine_deployment_id.to_string()))
        .cloned()
        .ok_or_else(|| not_found(machine_deployment_id))
}

pub async fn create_machine_deployment(client: &MockKkpClient, _project_id: &str, cluster_id: &str, deployment: &NodeDeployment) -> Result<NodeDeployment, KkpError> {
    client.enter("create_machine_deployment")?;
    if !lock(&client.clusters).contains_key(cluster_id) {
        return Err(KkpError::NotFound(format!("cluster {} not found", cluster_id)));
    }

    let mut created = deployment.clone();
    created.id = format!("{}-{}", deployment.name, client.next_id());
    created.creation_timestamp = Some(chrono::Utc::now());
    settle(&mut created);
    lock(&client.machine_deployments).insert((cluster_id.to_string(), created.id.clone()), created.clone());
    Ok(created)
}

pub async fn patch_machine_deployment(client: &MockKkpClient, _project_id: &str, cluster_id: &str, machine_deployment_id: &str, patch: &serde_json::Value) -> Result<NodeDeployment, KkpError> {
    client.enter("patch_machine_deployment")?;
    let key = (cluster_id.to_string(), machine_deployment_id.to_string());
    let mut deployments = lock(&client.machine_deployments);
    let current = deployments.get(&key).ok_or_else(|| not_found(machine_deployment_id))?;

    let mut patched = apply_patch(current, patch)?;
    settle(&mut patched);
    deployments.insert(key, patched.clone());
    Ok(patched)
}

pub async fn delete_machine_deployment(client: &MockKkpClient, _project_id: &str, cluster_id: &str, machine_deployment_id: &str) -> Result<(), KkpError> {
    client.enter("delete_machine_deployment")?;
    lock(&client.machine_deployments)
        .remove(&(cluster_id.to_string(), machine_deployment_id.to_string()))
        .map(|_| ())
        .ok_or_else(|| not_found(machine_deployment_id))
}
