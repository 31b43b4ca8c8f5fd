//! Addon and application installation operations for MockKkpClient

use super::helpers::{apply_patch, lock};
use super::{AppKey, MockKkpClient};
use crate::error::KkpError;
use crate::models::*;

fn app_key(cluster_id: &str, namespace: &str, name: &str) -> AppKey {
    (cluster_id.to_string(), namespace.to_string(), name.to_string())
}

fn addon_not_found(addon_id: &str) -> KkpError {
    KkpError::NotFound(format!("addon {} not found", addon_id))
}

fn application_not_found(namespace: &str, name: &str) -> KkpError {
    KkpError::NotFound(format!("application installation {}/{} not found", namespace, name))
}

pub async fn list_addons(client: &MockKkpClient, _project_id: &str, cluster_id: &str) -> Result<Vec<Addon>, KkpError> {
    client.enter("list_addons")?;
    let mut addons: Vec<Addon> = lock(&client.addons)
        .iter()
        .filter(|((cluster, _), _)| cluster == cluster_id)
        .map(|(_, addon)| addon.clone())
        .collect();
    addons.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(addons)
}

pub async fn list_installable_addons(client: &MockKkpClient, _project_id: &str, cluster_id: &str) -> Result<Vec<String>, KkpError> {
    client.enter("list_installable_addons")?;
    Ok(lock(&client.installable_addons)
        .get(cluster_id)
        .cloned()
        .unwrap_or_default())
}

pub async fn get_addon(client: &MockKkpClient, _project_id: &str, cluster_id: &str, addon_id: &str) -> Result<Addon, KkpError> {
    client.enter("get_addon")?;
    let key = (cluster_id.to_string(), addon_id.to_string());
    let scripted = lock(&client.addon_scripts).get_mut(&key).and_then(|s| s.next());
    if let Some(step) = scripted {
        return step.map_err(|f| f.into_error(&format!("addon {}", addon_id)));
    }
    lock(&client.addons)
        .get(&key)
        .cloned()
        .ok_or_else(|| addon_not_found(addon_id))
}

pub async fn create_addon(client: &MockKkpClient, _project_id: &str, cluster_id: &str, addon: &Addon) -> Result<Addon, KkpError> {
    client.enter("create_addon")?;
    if addon.name.is_empty() {
        return Err(KkpError::Api {
            status: 400,
            message: "addon name is required".to_string(),
        });
    }
    let key = (cluster_id.to_string(), addon.name.clone());
    let mut addons = lock(&client.addons);
    if addons.contains_key(&key) {
        return Err(KkpError::Api {
            status: 409,
            message: format!("addon {} already exists", addon.name),
        });
    }

    let mut created = addon.clone();
    created.id = addon.name.clone();
    created.creation_timestamp = Some(chrono::Utc::now());
    addons.insert(key, created.clone());
    Ok(created)
}

pub async fn patch_addon(client: &MockKkpClient, _project_id: &str, cluster_id: &str, addon_id: &str, addon: &Addon) -> Result<Addon, KkpError> {
    client.enter("patch_addon")?;
    let key = (cluster_id.to_string(), addon_id.to_string());
    let mut addons = lock(&client.addons);
    let current = addons.get(&key).ok_or_else(|| addon_not_found(addon_id))?;

    let mut patched = apply_patch(current, &serde_json::to_value(addon)?)?;
    patched.id = addon_id.to_string();
    addons.insert(key, patched.clone());
    Ok(patched)
}

pub async fn delete_addon(client: &MockKkpClient, _project_id: &str, cluster_id: &str, addon_id: &str) -> Result<(), KkpError> {
    client.enter("delete_addon")?;
    lock(&client.addons)
        .remove(&(cluster_id.to_string(), addon_id.to_string()))
        .map(|_| ())
        .ok_or_else(|| addon_not_found(addon_id))
}

pub async fn list_applications(client: &MockKkpClient, _project_id: &str, cluster_id: &str) -> Result<Vec<ApplicationInstallation>, KkpError> {
    client.enter("list_applications")?;
    let mut applications: Vec<ApplicationInstallation> = lock(&client.applications)
        .iter()
        .filter(|((cluster, _, _), _)| cluster == cluster_id)
        .map(|(_, app)| app.clone())
        .collect();
    applications.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
    Ok(applications)
}

pub async fn get_application(client: &MockKkpClient, _project_id: &str, cluster_id: &str, namespace: &str, name: &str) -> Result<ApplicationInstallation, KkpError> {
    client.enter("get_application")?;
    let key = app_key(cluster_id, namespace, name);
    let scripted = lock(&client.application_scripts).get_mut(&key).and_then(|s| s.next());
    if let Some(step) = scripted {
        return step.map_err(|f| f.into_error(&format!("application installation {}/{}", namespace, name)));
    }
    lock(&client.applications)
        .get(&key)
        .cloned()
        .ok_or_else(|| application_not_found(namespace, name))
}

pub async fn create_application(client: &MockKkpClient, _project_id: &str, cluster_id: &str, application: &ApplicationInstallation) -> Result<ApplicationInstallation, KkpError> {
    client.enter("create_application")?;
    let key = app_key(cluster_id, &application.namespace, &application.name);
    let mut applications = lock(&client.applications);
    if applications.contains_key(&key) {
        return Err(KkpError::Api {
            status: 409,
            message: format!("application installation {}/{} already exists", application.namespace, application.name),
        });
    }

    let mut created = application.clone();
    created.creation_timestamp = Some(chrono::Utc::now());
    applications.insert(key, created.clone());
    Ok(created)
}

pub async fn update_application(client: &MockKkpClient, _project_id: &str, cluster_id: &str, namespace: &str, name: &str, application: &ApplicationInstallation) -> Result<ApplicationInstallation, KkpError> {
    client.enter("update_application")?;
    let key = app_key(cluster_id, namespace, name);
    let mut applications = lock(&client.applications);
    let current = applications
        .get(&key)
        .ok_or_else(|| application_not_found(namespace, name))?;

    let mut updated = application.clone();
    updated.creation_timestamp = current.creation_timestamp;
    updated.status = current.status.clone();
    applications.insert(key, updated.clone());
    Ok(updated)
}

pub async fn delete_application(client: &MockKkpClient, _project_id: &str, cluster_id: &str, namespace: &str, name: &str) -> Result<(), KkpError> {
    client.enter("delete_application")?;
    lock(&client.applications)
        .remove(&app_key(cluster_id, namespace, name))
        .map(|_| ())
        .ok_or_else(|| application_not_found(namespace, name))
}

