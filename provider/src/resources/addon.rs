//! Addon resource
//!
//! Addons carry no readiness signal of their own: an addon that exists and
//! is not being deleted counts as ready. Create optionally waits for that,
//! and every read records the evaluated status.

use super::{
    found, json_string, now_rfc3339, parse_json_object, report_from_wait, require_id, split_import_id,
    timeout_from_minutes, InstallState,
};
use crate::defaults::DEFAULT_ADDON_TIMEOUT_MINUTES;
use crate::error::{ProviderError, Warning};
use crate::provider::KkpProvider;
use crate::validation;
use kkp_client::{Addon, AddonSpec};
use kkp_convergence::install_status::{check_addon, evaluate_addon, wait_for_addon};
use kkp_convergence::{InstallKind, WaitContext};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Plan and state of an addon
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddonState {
    /// Computed; the addon name on most platforms
    pub id: Option<String>,
    pub cluster_id: String,
    pub name: String,
    pub continuously_reconcile: Option<bool>,
    pub is_default: Option<bool>,
    /// JSON object
    pub variables: Option<String>,
    /// Unset means wait
    pub wait_for_ready: Option<bool>,
    pub timeout_minutes: Option<u64>,
    #[serde(flatten)]
    pub install: InstallState,
}

impl AddonState {
    fn to_addon(&self) -> Result<Addon, ProviderError> {
        Ok(Addon {
            name: self.name.trim().to_string(),
            spec: Some(AddonSpec {
                variables: parse_json_object("variables", self.variables.as_deref())?,
                continuously_reconcile: self.continuously_reconcile.unwrap_or(false),
                is_default: self.is_default.unwrap_or(false),
            }),
            ..Addon::default()
        })
    }

    /// Copy server-side values into state. Variables are only rewritten
    /// when they differ semantically, so formatting does not cause drift.
    fn refresh_from(&mut self, addon: &Addon) {
        if !addon.id.is_empty() {
            self.id = Some(addon.id.clone());
        }
        if !addon.name.is_empty() {
            self.name = addon.name.clone();
        }
        if let Some(created) = addon.creation_timestamp {
            self.install.created_at = Some(created.to_rfc3339());
        }
        let Some(spec) = addon.spec.as_ref() else {
            return;
        };
        self.continuously_reconcile = Some(spec.continuously_reconcile);
        self.is_default = Some(spec.is_default);

        let server = spec
            .variables
            .as_ref()
            .filter(|v| v.as_object().is_none_or(|m| !m.is_empty()));
        let ours = parse_json_object("variables", self.variables.as_deref()).ok().flatten();
        if server != ours.as_ref() {
            self.variables = json_string(server);
        }
    }
}

fn variables_changed(plan: &AddonState, prior: &AddonState) -> Result<bool, ProviderError> {
    let want = parse_json_object("variables", plan.variables.as_deref())?;
    let have = parse_json_object("variables", prior.variables.as_deref()).ok().flatten();
    Ok(want != have)
}

/// Handler for the addon resource
#[derive(Debug, Clone, Copy)]
pub struct AddonResource<'a> {
    provider: &'a KkpProvider,
}

impl<'a> AddonResource<'a> {
    pub fn new(provider: &'a KkpProvider) -> Self {
        Self { provider }
    }

    /// Install the addon and record its status.
    ///
    /// A wait that fails or runs out of time does not fail the create; the
    /// outcome is stored in `status`/`status_message`.
    pub async fn create(&self, ctx: &WaitContext, plan: &AddonState) -> Result<AddonState, ProviderError> {
        validation::resource_name(&plan.name)?;
        validation::timeout_minutes(plan.timeout_minutes)?;
        let cluster_id = require_id(Some(plan.cluster_id.as_str()), "cluster_id")?;
        let body = plan.to_addon()?;

        let client = self.provider.client();
        let project_id = self.provider.project_id();
        let created = client
            .create_addon(project_id, cluster_id, &body)
            .await
            .map_err(ProviderError::api("Create addon failed"))?;
        let addon_id = if created.id.is_empty() { body.name.clone() } else { created.id.clone() };
        info!(cluster_id, addon_id = %addon_id, "Addon created");

        let mut state = plan.clone();
        state.id = Some(addon_id.clone());
        state.cluster_id = cluster_id.to_string();
        state.install.created_at = Some(created.creation_timestamp.map_or_else(now_rfc3339, |t| t.to_rfc3339()));

        let report = if plan.wait_for_ready.unwrap_or(true) {
            let timeout = timeout_from_minutes(plan.timeout_minutes, DEFAULT_ADDON_TIMEOUT_MINUTES);
            let timing = self.provider.timings().addon_ready.with_timeout(timeout);
            let outcome = wait_for_addon(client, ctx, project_id, cluster_id, &addon_id, timing).await;
            if let Err(e) = &outcome {
                warn!(cluster_id, addon_id = %addon_id, error = %e, "Addon did not become ready");
            }
            report_from_wait(InstallKind::Addon, outcome, timeout)
        } else {
            check_addon(client, project_id, cluster_id, &addon_id).await
        };
        state.install.record(&report);
        Ok(state)
    }

    /// Refresh state and status; `None` when the addon no longer exists
    pub async fn read(&self, state: &AddonState) -> Result<Option<AddonState>, ProviderError> {
        let id = require_id(state.id.as_deref(), "addon id")?;
        let cluster_id = require_id(Some(state.cluster_id.as_str()), "cluster_id")?;

        let addon = found(
            self.provider
                .client()
                .get_addon(self.provider.project_id(), cluster_id, id)
                .await,
            "Read addon failed",
        )?;
        Ok(addon.map(|addon| {
            let mut refreshed = state.clone();
            refreshed.refresh_from(&addon);
            refreshed.install.record(&evaluate_addon(&addon));
            refreshed
        }))
    }

    /// Patch reconcile flags and variables, then refresh status
    pub async fn update(&self, plan: &AddonState, prior: &AddonState) -> Result<AddonState, ProviderError> {
        let id = require_id(prior.id.as_deref(), "addon id")?;
        let cluster_id = require_id(Some(prior.cluster_id.as_str()), "cluster_id")?;

        let mut next = plan.clone();
        next.id = Some(id.to_string());
        next.cluster_id = cluster_id.to_string();
        next.install = prior.install.clone();

        let flags_changed = plan.continuously_reconcile.unwrap_or(false)
            != prior.continuously_reconcile.unwrap_or(false)
            || plan.is_default.unwrap_or(false) != prior.is_default.unwrap_or(false);
        if !flags_changed && !variables_changed(plan, prior)? {
            debug!(cluster_id, addon_id = %id, "No addon changes to apply");
            return Ok(next);
        }

        let client = self.provider.client();
        let project_id = self.provider.project_id();
        client
            .patch_addon(project_id, cluster_id, id, &plan.to_addon()?)
            .await
            .map_err(ProviderError::api("Patch addon failed"))?;
        info!(cluster_id, addon_id = %id, "Addon patch sent");

        let addon = client
            .get_addon(project_id, cluster_id, id)
            .await
            .map_err(ProviderError::api("Read addon after update failed"))?;
        next.refresh_from(&addon);
        next.install.record(&evaluate_addon(&addon));
        Ok(next)
    }

    /// Delete the addon. API failures are returned as warnings.
    pub async fn delete(&self, state: &AddonState) -> Result<Vec<Warning>, ProviderError> {
        let id = require_id(state.id.as_deref(), "addon id")?;
        let cluster_id = require_id(Some(state.cluster_id.as_str()), "cluster_id")?;

        match self
            .provider
            .client()
            .delete_addon(self.provider.project_id(), cluster_id, id)
            .await
        {
            Ok(()) => Ok(Vec::new()),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => {
                warn!(cluster_id, addon_id = %id, error = %e, "Delete addon failed");
                Ok(vec![Warning::new("Delete addon warning", e.to_string())])
            }
        }
    }

    /// Import from `cluster_id:addon_id`
    pub fn import(&self, id: &str) -> Result<AddonState, ProviderError> {
        let parts = split_import_id(id, 2, "cluster_id:addon_id")?;
        Ok(AddonState {
            cluster_id: parts[0].clone(),
            id: Some(parts[1].clone()),
            ..AddonState::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::WaitTimings;
    use kkp_client::{MockFailure, MockKkpClient};
    use std::sync::Arc;

    const CLUSTER: &str = "c1";

    fn provider(mock: &MockKkpClient) -> KkpProvider {
        KkpProvider::new(Arc::new(mock.clone()), "proj-1").with_timings(WaitTimings::default())
    }

    fn plan() -> AddonState {
        AddonState {
            cluster_id: CLUSTER.to_string(),
            name: "node-exporter".to_string(),
            variables: Some(r#"{"scrapeInterval": "30s"}"#.to_string()),
            ..AddonState::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_and_records_ready() {
        let mock = MockKkpClient::new("https://kkp.test");
        let state = provider(&mock).addons().create(&WaitContext::new(), &plan()).await.unwrap();

        assert_eq!(state.id.as_deref(), Some("node-exporter"));
        assert_eq!(state.install.status.as_deref(), Some("ready"));
        assert_eq!(state.install.status_message.as_deref(), Some("Addon is installed and ready"));
        assert!(state.install.last_checked.is_some());
        assert!(state.install.created_at.is_some());
        assert_eq!(mock.call_count("get_addon"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_timeout_keeps_installing_state() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.script_addon(CLUSTER, "node-exporter", vec![Err(MockFailure::Status(503, "busy".to_string()))]);

        let mut p = plan();
        p.timeout_minutes = Some(1);
        let state = provider(&mock).addons().create(&WaitContext::new(), &p).await.unwrap();

        assert_eq!(state.install.status.as_deref(), Some("installing"));
        assert_eq!(
            state.install.status_message.as_deref(),
            Some("Installation timeout after 1m0s - addon may still be installing")
        );
    }

    #[tokio::test]
    async fn test_create_rejects_oversized_timeout() {
        let mock = MockKkpClient::new("https://kkp.test");
        let mut p = plan();
        p.timeout_minutes = Some(u64::MAX);

        let err = provider(&mock).addons().create(&WaitContext::new(), &p).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(err.to_string().contains("timeout_minutes cannot exceed 1440"));
        assert_eq!(mock.call_count("create_addon"), 0);
    }

    #[tokio::test]
    async fn test_create_without_wait_checks_once() {
        let mock = MockKkpClient::new("https://kkp.test");
        let mut p = plan();
        p.wait_for_ready = Some(false);

        let state = provider(&mock).addons().create(&WaitContext::new(), &p).await.unwrap();
        assert_eq!(state.install.status.as_deref(), Some("ready"));
        assert_eq!(mock.call_count("get_addon"), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_variables() {
        let mock = MockKkpClient::new("https://kkp.test");
        let mut p = plan();
        p.variables = Some("[1]".to_string());

        let err = provider(&mock).addons().create(&WaitContext::new(), &p).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidJson { field: "variables", .. }));
        assert_eq!(mock.call_count("create_addon"), 0);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_api_error() {
        let mock = MockKkpClient::new("https://kkp.test");
        let provider = provider(&mock);
        let mut p = plan();
        p.wait_for_ready = Some(false);
        provider.addons().create(&WaitContext::new(), &p).await.unwrap();

        let err = provider.addons().create(&WaitContext::new(), &p).await.unwrap_err();
        assert!(err.to_string().starts_with("Create addon failed"));
    }

    #[tokio::test]
    async fn test_read_keeps_equivalent_variables() {
        let mock = MockKkpClient::new("https://kkp.test");
        let provider = provider(&mock);
        let mut p = plan();
        p.wait_for_ready = Some(false);
        let state = provider.addons().create(&WaitContext::new(), &p).await.unwrap();

        let refreshed = provider.addons().read(&state).await.unwrap().unwrap();
        assert_eq!(refreshed.variables, state.variables);
        assert_eq!(refreshed.continuously_reconcile, Some(false));
        assert_eq!(refreshed.install.status.as_deref(), Some("ready"));

        provider.addons().delete(&state).await.unwrap();
        assert_eq!(provider.addons().read(&state).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_patches_flags() {
        let mock = MockKkpClient::new("https://kkp.test");
        let provider = provider(&mock);
        let mut p = plan();
        p.wait_for_ready = Some(false);
        let prior = provider.addons().create(&WaitContext::new(), &p).await.unwrap();

        let unchanged = provider.addons().update(&prior, &prior).await.unwrap();
        assert_eq!(unchanged.id, prior.id);
        assert_eq!(mock.call_count("patch_addon"), 0);

        let mut wanted = prior.clone();
        wanted.continuously_reconcile = Some(true);
        let state = provider.addons().update(&wanted, &prior).await.unwrap();
        assert_eq!(state.continuously_reconcile, Some(true));
        assert_eq!(state.install.status.as_deref(), Some("ready"));
        assert_eq!(mock.call_count("patch_addon"), 1);
    }

    #[tokio::test]
    async fn test_delete_failure_is_warning() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.fail_operation("delete_addon", MockFailure::Status(500, "boom".to_string()));
        let mut state = plan();
        state.id = Some("node-exporter".to_string());

        let warnings = provider(&mock).addons().delete(&state).await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].summary, "Delete addon warning");

        let missing = provider(&MockKkpClient::new("https://kkp.test")).addons().delete(&state).await.unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_import() {
        let mock = MockKkpClient::new("https://kkp.test");
        let provider = provider(&mock);
        let state = provider.addons().import("c1:node-exporter").unwrap();
        assert_eq!(state.cluster_id, "c1");
        assert_eq!(state.id.as_deref(), Some("node-exporter"));
        assert!(provider.addons().import("c1").is_err());
    }
}
