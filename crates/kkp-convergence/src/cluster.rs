//! Cluster convergence
//!
//! Three waits, each bound to one cluster:
//!
//! - **ready**: all core control plane components report up.
//! - **updated**: the cluster spec shows the requested version/CNI *and* the control
//!   plane is healthy again. For version changes at least one unhealthy or
//!   unreadable health probe must have been seen first, otherwise a cluster
//!   that was healthy before the rollout started would pass immediately.
//! - **deleted**: the cluster lookup reports not found.

use crate::error::WaitError;
use crate::health::{apiserver_up, health_ready, summarize};
use crate::poll::{format_duration, poll_with_timeout, Progress, Ticker, WaitContext, WaitTiming};
use kkp_client::{ClusterHealth, ClusterSpec, ErrorClass, KkpClientTrait};
use tracing::{debug, info, warn};

/// Fields an update is expected to converge on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterUpdateSpec {
    pub version: Option<String>,
    pub cni_type: Option<String>,
    pub cni_version: Option<String>,
}

fn normalize_version(version: &str) -> &str {
    version.trim().trim_start_matches('v')
}

impl ClusterUpdateSpec {
    /// A Kubernetes version change was requested
    #[must_use]
    pub fn expects_version_change(&self) -> bool {
        self.version.is_some()
    }

    /// First requested field that `spec` does not show yet.
    ///
    /// CNI fields are only compared when the cluster reports a CNI plugin.
    #[must_use]
    pub fn mismatch(&self, spec: &ClusterSpec) -> Option<String> {
        if let Some(want) = &self.version {
            let got = spec.version.as_deref().unwrap_or_default();
            if normalize_version(want) != normalize_version(got) {
                return Some(format!("k8s version: want={} got={}", want, got));
            }
        }

        let cni = spec.cni_plugin.as_ref()?;
        if let Some(want) = &self.cni_type {
            if !cni.plugin_type.eq_ignore_ascii_case(want) {
                return Some(format!("cni type: want={} got={}", want, cni.plugin_type));
            }
        }
        if let Some(want) = &self.cni_version {
            if normalize_version(want) != normalize_version(&cni.version) {
                return Some(format!("cni version: want={} got={}", want, cni.version));
            }
        }
        None
    }
}

/// What one update probe saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateObservation {
    /// The cluster could not be read or has no spec yet
    ClusterUnavailable(String),
    /// The cluster spec does not show the requested values yet
    SpecPending(String),
    /// Spec converged but the health endpoint failed
    HealthUnavailable { error: String, api_url: Option<String> },
    /// Spec converged and health was fetched
    Health(ClusterHealth),
}

/// Loop-local accumulator of an update wait
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateProgress {
    last_note: Option<String>,
    seen_transition: bool,
}

impl UpdateProgress {
    /// Fold one observation into the progress and report whether the update
    /// is complete.
    pub fn observe(&mut self, observation: UpdateObservation, expected: &ClusterUpdateSpec) -> bool {
        match observation {
            UpdateObservation::ClusterUnavailable(reason) => {
                self.note(format!("cluster not readable: {}", reason));
                false
            }
            UpdateObservation::SpecPending(note) => {
                self.note(note);
                false
            }
            UpdateObservation::HealthUnavailable { error, api_url } => {
                self.seen_transition = true;
                let mut note = format!("spec updated but health check failed: {}", error);
                if let Some(url) = api_url {
                    note.push_str(&format!(" (api={})", url));
                }
                self.note(note);
                false
            }
            UpdateObservation::Health(health) => {
                if !apiserver_up(&health) {
                    self.seen_transition = true;
                    self.note(format!("API server transitioning: {}", health.apiserver));
                    return false;
                }
                if !health_ready(&health) {
                    self.note(format!("spec updated but health: {}", summarize(&health)));
                    return false;
                }
                if expected.expects_version_change() && !self.seen_transition {
                    self.note("healthy but no API server restart observed yet".to_string());
                    return false;
                }
                true
            }
        }
    }

    #[must_use]
    pub fn last_note(&self) -> Option<&str> {
        self.last_note.as_deref()
    }

    #[must_use]
    pub fn seen_transition(&self) -> bool {
        self.seen_transition
    }

    fn note(&mut self, note: String) {
        self.last_note = Some(note);
    }
}

/// Convergence checks for one cluster
#[derive(Clone, Copy)]
pub struct ClusterConvergence<'a> {
    client: &'a dyn KkpClientTrait,
    project_id: &'a str,
    cluster_id: &'a str,
}

impl std::fmt::Debug for ClusterConvergence<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConvergence")
            .field("project_id", &self.project_id)
            .field("cluster_id", &self.cluster_id)
            .finish_non_exhaustive()
    }
}

impl<'a> ClusterConvergence<'a> {
    pub fn new(client: &'a dyn KkpClientTrait, project_id: &'a str, cluster_id: &'a str) -> Self {
        Self {
            client,
            project_id,
            cluster_id,
        }
    }

    /// Wait with [`WaitTiming::CLUSTER_READY`]
    pub async fn wait_ready(&self, ctx: &WaitContext) -> Result<(), WaitError> {
        self.wait_ready_with(ctx, WaitTiming::CLUSTER_READY).await
    }

    /// Wait until apiserver, controller, scheduler and etcd are all up.
    ///
    /// Health fetch failures are retried until the timeout.
    pub async fn wait_ready_with(&self, ctx: &WaitContext, timing: WaitTiming) -> Result<(), WaitError> {
        let this = *self;
        info!(cluster_id = %self.cluster_id, timeout = %format_duration(&timing.timeout), "Waiting for cluster to become ready");

        poll_with_timeout(ctx, "cluster ready", timing, move || async move {
            match this.client.get_cluster_health(this.project_id, this.cluster_id).await {
                Ok(health) if health_ready(&health) => {
                    info!(cluster_id = %this.cluster_id, "Cluster is ready");
                    Ok(Progress::Done(()))
                }
                Ok(health) => {
                    debug!(cluster_id = %this.cluster_id, health = %summarize(&health), "Cluster not ready yet");
                    this.log_endpoint().await;
                    Ok(Progress::Pending)
                }
                Err(e) => {
                    debug!(cluster_id = %this.cluster_id, error = %e, "Health probe failed, retrying");
                    Ok(Progress::Pending)
                }
            }
        })
        .await
    }

    /// Wait with [`WaitTiming::CLUSTER_UPDATED`]
    pub async fn wait_updated(&self, ctx: &WaitContext, expected: &ClusterUpdateSpec) -> Result<(), WaitError> {
        self.wait_updated_with(ctx, expected, WaitTiming::CLUSTER_UPDATED).await
    }

    /// Wait until the cluster spec shows `expected` and the control plane is healthy
    /// again (after a restart, for version changes).
    pub async fn wait_updated_with(
        &self,
        ctx: &WaitContext,
        expected: &ClusterUpdateSpec,
        timing: WaitTiming,
    ) -> Result<(), WaitError> {
        info!(
            cluster_id = %self.cluster_id,
            version = ?expected.version,
            cni_type = ?expected.cni_type,
            cni_version = ?expected.cni_version,
            "Waiting for cluster update to complete"
        );

        let mut ticker = Ticker::new(ctx, "cluster update", timing);
        let mut progress = UpdateProgress::default();
        loop {
            let attempt = ticker.tick().await?;
            let observation = self.observe_update(expected).await;
            let previous = progress.last_note().map(str::to_owned);

            if progress.observe(observation, expected) {
                info!(
                    cluster_id = %self.cluster_id,
                    attempt,
                    elapsed = %format_duration(&ticker.elapsed()),
                    "Cluster update complete"
                );
                return Ok(());
            }
            if progress.last_note() != previous.as_deref() {
                info!(
                    cluster_id = %self.cluster_id,
                    attempt,
                    note = progress.last_note().unwrap_or_default(),
                    "Cluster update in progress"
                );
            }
        }
    }

    async fn observe_update(&self, expected: &ClusterUpdateSpec) -> UpdateObservation {
        let cluster = match self.client.get_cluster(self.project_id, self.cluster_id).await {
            Ok(cluster) => cluster,
            Err(e) => return UpdateObservation::ClusterUnavailable(e.to_string()),
        };
        let Some(spec) = cluster.spec.as_ref() else {
            return UpdateObservation::ClusterUnavailable("cluster has no spec yet".to_string());
        };
        if let Some(note) = expected.mismatch(spec) {
            return UpdateObservation::SpecPending(note);
        }

        match self.client.get_cluster_health(self.project_id, self.cluster_id).await {
            Ok(health) => UpdateObservation::Health(health),
            Err(e) => UpdateObservation::HealthUnavailable {
                error: e.to_string(),
                api_url: cluster.status.and_then(|s| s.url),
            },
        }
    }

    /// Wait with [`WaitTiming::CLUSTER_DELETED`]
    pub async fn wait_deleted(&self, ctx: &WaitContext) -> Result<(), WaitError> {
        self.wait_deleted_with(ctx, WaitTiming::CLUSTER_DELETED).await
    }

    /// Wait until the cluster lookup reports not found.
    ///
    /// Other lookup errors are retried. While the cluster still exists its
    /// health is logged but never decides the outcome.
    pub async fn wait_deleted_with(&self, ctx: &WaitContext, timing: WaitTiming) -> Result<(), WaitError> {
        let this = *self;
        info!(cluster_id = %self.cluster_id, "Waiting for cluster deletion");

        poll_with_timeout(ctx, "cluster deletion", timing, move || async move {
            match this.client.get_cluster(this.project_id, this.cluster_id).await {
                Err(e) if e.class() == ErrorClass::NotFound => {
                    info!(cluster_id = %this.cluster_id, "Cluster deleted");
                    Ok(Progress::Done(()))
                }
                Err(e) => {
                    warn!(cluster_id = %this.cluster_id, error = %e, "Failed to check cluster deletion, retrying");
                    Ok(Progress::Pending)
                }
                Ok(cluster) => {
                    match this.client.get_cluster_health(this.project_id, this.cluster_id).await {
                        Ok(health) => debug!(
                            cluster_id = %this.cluster_id,
                            marked_for_deletion = cluster.marked_for_deletion(),
                            health = %summarize(&health),
                            "Cluster still present"
                        ),
                        Err(e) => debug!(cluster_id = %this.cluster_id, error = %e, "Cluster still present"),
                    }
                    Ok(Progress::Pending)
                }
            }
        })
        .await
    }

    async fn log_endpoint(&self) {
        if let Ok(cluster) = self.client.get_cluster(self.project_id, self.cluster_id).await {
            if let Some(url) = cluster.status.and_then(|s| s.url) {
                debug!(cluster_id = %self.cluster_id, api_url = %url, "Cluster API endpoint");
            }
        }
    }
}
