//! Configured provider shared by every resource and data source

use crate::config::ProviderConfig;
use crate::data_sources::DataSources;
use crate::error::{ProviderError, Warning};
use crate::resources::{
    AddonResource, ApplicationResource, ClusterResource, MachineDeploymentResource, SshKeyResource,
};
use crate::version;
use kkp_client::{KkpClient, KkpClientTrait};
use kkp_convergence::WaitTiming;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Interval and timeout of every convergence wait the handlers run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimings {
    pub cluster_ready: WaitTiming,
    pub cluster_updated: WaitTiming,
    pub cluster_deleted: WaitTiming,
    /// Template instances are resolved by polling the cluster list
    pub cluster_appear: WaitTiming,
    pub machine_deployment_ready: WaitTiming,
    pub machine_deployment_deleted: WaitTiming,
    pub addon_ready: WaitTiming,
    pub application_ready: WaitTiming,
}

impl Default for WaitTimings {
    fn default() -> Self {
        Self {
            cluster_ready: WaitTiming::CLUSTER_READY,
            cluster_updated: WaitTiming::CLUSTER_UPDATED,
            cluster_deleted: WaitTiming::CLUSTER_DELETED,
            cluster_appear: WaitTiming::CLUSTER_APPEAR,
            machine_deployment_ready: WaitTiming::MACHINE_DEPLOYMENT_READY,
            machine_deployment_deleted: WaitTiming::MACHINE_DEPLOYMENT_DELETED,
            addon_ready: WaitTiming::ADDON_READY,
            application_ready: WaitTiming::APPLICATION_READY,
        }
    }
}

/// KKP client bound to one project
#[derive(Clone)]
pub struct KkpProvider {
    client: Arc<dyn KkpClientTrait>,
    project_id: String,
    timings: WaitTimings,
}

impl fmt::Debug for KkpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KkpProvider")
            .field("base_url", &self.client.base_url())
            .field("project_id", &self.project_id)
            .field("timings", &self.timings)
            .finish()
    }
}

impl KkpProvider {
    pub fn new(client: Arc<dyn KkpClientTrait>, project_id: impl Into<String>) -> Self {
        Self {
            client,
            project_id: project_id.into(),
            timings: WaitTimings::default(),
        }
    }

    /// Build the HTTP client from provider configuration
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = KkpClient::from_config(config.client_config()?)
            .map_err(ProviderError::api("KKP client initialization failed"))?;
        info!(endpoint = %config.endpoint, project_id = %config.project_id, "KKP client configured");
        Ok(Self::new(Arc::new(client), config.project_id.clone()))
    }

    #[must_use]
    pub fn with_timings(mut self, timings: WaitTimings) -> Self {
        self.timings = timings;
        self
    }

    #[must_use]
    pub fn client(&self) -> &dyn KkpClientTrait {
        self.client.as_ref()
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[must_use]
    pub fn timings(&self) -> &WaitTimings {
        &self.timings
    }

    /// Reachability and version checks run after configuration.
    ///
    /// Both are advisory; failures come back as warnings.
    pub async fn preflight(&self) -> Vec<Warning> {
        let mut warnings = Vec::new();
        if let Err(e) = self.client.ping().await {
            warn!(error = %e, endpoint = %self.client.base_url(), "KKP API ping failed (continuing)");
            warnings.push(Warning::new("KKP API unreachable", e.to_string()));
        }
        if let Some(warning) = version::check_compatibility(self.client()).await {
            warnings.push(warning);
        }
        warnings
    }

    #[must_use]
    pub fn clusters(&self) -> ClusterResource<'_> {
        ClusterResource::new(self)
    }

    #[must_use]
    pub fn machine_deployments(&self) -> MachineDeploymentResource<'_> {
        MachineDeploymentResource::new(self)
    }

    #[must_use]
    pub fn addons(&self) -> AddonResource<'_> {
        AddonResource::new(self)
    }

    #[must_use]
    pub fn applications(&self) -> ApplicationResource<'_> {
        ApplicationResource::new(self)
    }

    #[must_use]
    pub fn ssh_keys(&self) -> SshKeyResource<'_> {
        SshKeyResource::new(self)
    }

    #[must_use]
    pub fn data(&self) -> DataSources<'_> {
        DataSources::new(self)
    }
}
