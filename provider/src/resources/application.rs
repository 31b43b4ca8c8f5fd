//! Application installation resource

use super::{
    found, json_string, non_empty, now_rfc3339, parse_json_object, report_from_wait, require_id, split_import_id,
    timeout_from_minutes, InstallState,
};
use crate::defaults::{DEFAULT_APPLICATION_NAMESPACE, DEFAULT_APPLICATION_TIMEOUT_MINUTES};
use crate::error::{ProviderError, Warning};
use crate::provider::KkpProvider;
use crate::validation;
use kkp_client::{ApplicationInstallation, ApplicationInstallationSpec, ApplicationRef, NamespaceSpec};
use kkp_convergence::install_status::{check_application, evaluate_application, wait_for_application};
use kkp_convergence::{InstallKind, WaitContext};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Plan and state of an application installation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationState {
    /// Computed: `cluster_id/namespace/name`
    pub id: Option<String>,
    pub cluster_id: String,
    pub name: String,
    /// Defaults to `default`; cannot change after create
    pub namespace: Option<String>,
    pub application_name: String,
    pub application_version: String,
    /// Helm values as a JSON object
    pub values: Option<String>,
    pub wait_for_ready: Option<bool>,
    pub timeout_minutes: Option<u64>,
    #[serde(flatten)]
    pub install: InstallState,
}

pub(crate) fn application_id(cluster_id: &str, namespace: &str, name: &str) -> String {
    format!("{}/{}/{}", cluster_id.trim(), namespace.trim(), name.trim())
}

impl ApplicationState {
    fn namespace(&self) -> &str {
        non_empty(self.namespace.as_deref()).unwrap_or(DEFAULT_APPLICATION_NAMESPACE)
    }

    fn validate(&self) -> Result<(), ProviderError> {
        validation::resource_name(&self.name)?;
        validation::required(&self.cluster_id, "cluster_id")?;
        validation::timeout_minutes(self.timeout_minutes)?;
        validation::required(&self.application_name, "application_name")?;
        validation::required(&self.application_version, "application_version")
    }

    fn to_installation(&self, namespace: &str) -> Result<ApplicationInstallation, ProviderError> {
        Ok(ApplicationInstallation {
            name: self.name.trim().to_string(),
            namespace: namespace.to_string(),
            spec: Some(ApplicationInstallationSpec {
                namespace: NamespaceSpec {
                    name: namespace.to_string(),
                    create: false,
                },
                application_ref: ApplicationRef {
                    name: self.application_name.trim().to_string(),
                    version: self.application_version.trim().to_string(),
                },
                values: parse_json_object("values", self.values.as_deref())?,
            }),
            ..ApplicationInstallation::default()
        })
    }

    /// Empty or null values from the server keep the values in state
    fn refresh_from(&mut self, application: &ApplicationInstallation) {
        if !application.name.is_empty() {
            self.name = application.name.clone();
        }
        if !application.namespace.is_empty() {
            self.namespace = Some(application.namespace.clone());
        }
        self.id = Some(application_id(&self.cluster_id, self.namespace(), &self.name));
        if let Some(created) = application.creation_timestamp {
            self.install.created_at = Some(created.to_rfc3339());
        }
        let Some(spec) = application.spec.as_ref() else {
            return;
        };
        if !spec.application_ref.name.is_empty() {
            self.application_name = spec.application_ref.name.clone();
        }
        if !spec.application_ref.version.is_empty() {
            self.application_version = spec.application_ref.version.clone();
        }

        let server = spec
            .values
            .as_ref()
            .filter(|v| !v.is_null() && v.as_object().is_none_or(|m| !m.is_empty()));
        if let Some(server) = server {
            let ours = parse_json_object("values", self.values.as_deref()).ok().flatten();
            if ours.as_ref() != Some(server) {
                self.values = json_string(Some(server));
            }
        }
    }
}

/// Handler for the application resource
#[derive(Debug, Clone, Copy)]
pub struct ApplicationResource<'a> {
    provider: &'a KkpProvider,
}

impl<'a> ApplicationResource<'a> {
    pub fn new(provider: &'a KkpProvider) -> Self {
        Self { provider }
    }

    /// Install the application and record its status. Like addons, a wait
    /// that does not end in `ready` is stored rather than returned.
    pub async fn create(&self, ctx: &WaitContext, plan: &ApplicationState) -> Result<ApplicationState, ProviderError> {
        plan.validate()?;
        let cluster_id = plan.cluster_id.trim();
        let namespace = plan.namespace().to_string();
        let body = plan.to_installation(&namespace)?;

        let client = self.provider.client();
        let project_id = self.provider.project_id();
        let created = client
            .create_application(project_id, cluster_id, &body)
            .await
            .map_err(ProviderError::api("Create application failed"))?;
        let name = if created.name.is_empty() { body.name.clone() } else { created.name.clone() };
        info!(cluster_id, namespace = %namespace, application = %name, "Application created");

        let mut state = plan.clone();
        state.cluster_id = cluster_id.to_string();
        state.name = name.clone();
        state.namespace = Some(namespace.clone());
        state.id = Some(application_id(cluster_id, &namespace, &name));
        state.install.created_at = Some(created.creation_timestamp.map_or_else(now_rfc3339, |t| t.to_rfc3339()));

        let report = if plan.wait_for_ready.unwrap_or(true) {
            let timeout = timeout_from_minutes(plan.timeout_minutes, DEFAULT_APPLICATION_TIMEOUT_MINUTES);
            let timing = self.provider.timings().application_ready.with_timeout(timeout);
            let outcome = wait_for_application(client, ctx, project_id, cluster_id, &namespace, &name, timing).await;
            if let Err(e) = &outcome {
                warn!(cluster_id, namespace = %namespace, application = %name, error = %e, "Application did not become ready");
            }
            report_from_wait(InstallKind::Application, outcome, timeout)
        } else {
            check_application(client, project_id, cluster_id, &namespace, &name).await
        };
        state.install.record(&report);
        Ok(state)
    }

    /// Refresh state and status; `None` when the installation no longer exists
    pub async fn read(&self, state: &ApplicationState) -> Result<Option<ApplicationState>, ProviderError> {
        let cluster_id = require_id(Some(state.cluster_id.as_str()), "cluster_id")?;
        let name = require_id(Some(state.name.as_str()), "application name")?;

        let application = found(
            self.provider
                .client()
                .get_application(self.provider.project_id(), cluster_id, state.namespace(), name)
                .await,
            "Read application failed",
        )?;
        Ok(application.map(|application| {
            let mut refreshed = state.clone();
            refreshed.refresh_from(&application);
            refreshed.install.record(&evaluate_application(&application));
            refreshed
        }))
    }

    /// Replace the installation (PUT) and refresh status. The namespace
    /// stays the one from state.
    pub async fn update(&self, plan: &ApplicationState, prior: &ApplicationState) -> Result<ApplicationState, ProviderError> {
        let cluster_id = require_id(Some(prior.cluster_id.as_str()), "cluster_id")?;
        let name = require_id(Some(prior.name.as_str()), "application name")?;
        let namespace = prior.namespace().to_string();
        plan.validate()?;
        let body = plan.to_installation(&namespace)?;

        let client = self.provider.client();
        let project_id = self.provider.project_id();
        client
            .update_application(project_id, cluster_id, &namespace, name, &body)
            .await
            .map_err(ProviderError::api("Update application failed"))?;
        info!(cluster_id, namespace = %namespace, application = name, "Application updated");

        let application = client
            .get_application(project_id, cluster_id, &namespace, name)
            .await
            .map_err(ProviderError::api("Read application after update failed"))?;

        let mut next = plan.clone();
        next.cluster_id = cluster_id.to_string();
        next.namespace = Some(namespace);
        next.install = prior.install.clone();
        next.refresh_from(&application);
        next.install.record(&evaluate_application(&application));
        Ok(next)
    }

    /// Delete the installation. API failures are returned as warnings.
    pub async fn delete(&self, state: &ApplicationState) -> Result<Vec<Warning>, ProviderError> {
        let cluster_id = require_id(Some(state.cluster_id.as_str()), "cluster_id")?;
        let name = require_id(Some(state.name.as_str()), "application name")?;

        match self
            .provider
            .client()
            .delete_application(self.provider.project_id(), cluster_id, state.namespace(), name)
            .await
        {
            Ok(()) => Ok(Vec::new()),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => {
                warn!(cluster_id, application = name, error = %e, "Delete application failed");
                Ok(vec![Warning::new("Delete application warning", e.to_string())])
            }
        }
    }

    /// Import from `cluster_id:namespace:name`
    pub fn import(&self, id: &str) -> Result<ApplicationState, ProviderError> {
        let parts = split_import_id(id, 3, "cluster_id:namespace:name")?;
        Ok(ApplicationState {
            id: Some(application_id(&parts[0], &parts[1], &parts[2])),
            cluster_id: parts[0].clone(),
            namespace: Some(parts[1].clone()),
            name: parts[2].clone(),
            ..ApplicationState::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::WaitTimings;
    use kkp_client::{ApplicationCondition, ApplicationInstallationStatus, MockFailure, MockKkpClient};
    use std::sync::Arc;

    const CLUSTER: &str = "c1";

    fn provider(mock: &MockKkpClient) -> KkpProvider {
        KkpProvider::new(Arc::new(mock.clone()), "proj-1").with_timings(WaitTimings::default())
    }

    fn plan() -> ApplicationState {
        ApplicationState {
            cluster_id: CLUSTER.to_string(),
            name: "ingress".to_string(),
            application_name: "nginx".to_string(),
            application_version: "1.11.2".to_string(),
            values: Some(r#"{"replicaCount": 2}"#.to_string()),
            ..ApplicationState::default()
        }
    }

    fn with_ready(status: &str, message: &str) -> ApplicationInstallation {
        ApplicationInstallation {
            name: "ingress".to_string(),
            namespace: "default".to_string(),
            status: Some(ApplicationInstallationStatus {
                conditions: vec![ApplicationCondition {
                    condition_type: "Ready".to_string(),
                    status: status.to_string(),
                    message: Some(message.to_string()),
                    ..ApplicationCondition::default()
                }],
                method: None,
            }),
            ..ApplicationInstallation::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_until_ready_condition() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.script_application(
            CLUSTER,
            "default",
            "ingress",
            vec![Ok(ApplicationInstallation::default()), Ok(with_ready("True", ""))],
        );

        let state = provider(&mock).applications().create(&WaitContext::new(), &plan()).await.unwrap();
        assert_eq!(state.id.as_deref(), Some("c1/default/ingress"));
        assert_eq!(state.namespace.as_deref(), Some("default"));
        assert_eq!(state.install.status.as_deref(), Some("ready"));
        assert_eq!(state.install.status_message.as_deref(), Some("Application is ready"));
        assert_eq!(mock.call_count("get_application"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_records_failure() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.script_application(CLUSTER, "default", "ingress", vec![Ok(with_ready("False", "chart not found"))]);

        let state = provider(&mock).applications().create(&WaitContext::new(), &plan()).await.unwrap();
        assert_eq!(state.install.status.as_deref(), Some("failed"));
        assert_eq!(state.install.status_message.as_deref(), Some("Application failed: chart not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_timeout_and_cancel() {
        let mock = MockKkpClient::new("https://kkp.test");
        let provider = provider(&mock);
        let state = provider.applications().create(&WaitContext::new(), &plan()).await.unwrap();
        assert_eq!(state.install.status.as_deref(), Some("installing"));
        assert_eq!(
            state.install.status_message.as_deref(),
            Some("Installation timeout after 5m0s - application may still be installing")
        );

        let ctx = WaitContext::new();
        ctx.cancel();
        let mut other = plan();
        other.name = "ingress-2".to_string();
        let state = provider.applications().create(&ctx, &other).await.unwrap();
        assert_eq!(state.install.status.as_deref(), Some("failed"));
        assert_eq!(state.install.status_message.as_deref(), Some("Installation canceled"));
    }

    #[tokio::test]
    async fn test_create_validates_before_calling() {
        let mock = MockKkpClient::new("https://kkp.test");
        let mut p = plan();
        p.application_version = " ".to_string();

        let err = provider(&mock).applications().create(&WaitContext::new(), &p).await.unwrap_err();
        assert!(err.to_string().contains("application_version is required"));
        assert_eq!(mock.call_count("create_application"), 0);
    }

    #[tokio::test]
    async fn test_import_then_read() {
        let mock = MockKkpClient::new("https://kkp.test");
        let provider = provider(&mock);
        let mut p = plan();
        p.wait_for_ready = Some(false);
        p.namespace = Some("web".to_string());
        provider.applications().create(&WaitContext::new(), &p).await.unwrap();

        let imported = provider.applications().import("c1:web:ingress").unwrap();
        let state = provider.applications().read(&imported).await.unwrap().unwrap();
        assert_eq!(state.id.as_deref(), Some("c1/web/ingress"));
        assert_eq!(state.application_name, "nginx");
        assert_eq!(state.application_version, "1.11.2");
        assert_eq!(state.values.as_deref(), Some(r#"{"replicaCount":2}"#));
        assert_eq!(state.install.status.as_deref(), Some("installing"));

        assert!(provider.applications().import("c1:ingress").is_err());
    }

    #[tokio::test]
    async fn test_update_uses_put_and_keeps_namespace() {
        let mock = MockKkpClient::new("https://kkp.test");
        let provider = provider(&mock);
        let mut p = plan();
        p.wait_for_ready = Some(false);
        let prior = provider.applications().create(&WaitContext::new(), &p).await.unwrap();

        let mut wanted = prior.clone();
        wanted.application_version = "1.12.0".to_string();
        wanted.namespace = Some("elsewhere".to_string());
        let state = provider.applications().update(&wanted, &prior).await.unwrap();

        assert_eq!(state.application_version, "1.12.0");
        assert_eq!(state.namespace.as_deref(), Some("default"));
        assert_eq!(mock.call_count("update_application"), 1);
    }

    #[tokio::test]
    async fn test_delete_warns_on_failure() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.fail_operation("delete_application", MockFailure::Unauthorized);
        let warnings = provider(&mock).applications().delete(&plan()).await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].summary, "Delete application warning");
    }
}
