//! Machine deployment convergence
//!
//! Both waits list the cluster's machine deployments and scan for the target
//! instead of fetching it by id; the single-object endpoint has a history of
//! returning bodies the client cannot decode.

use crate::error::WaitError;
use crate::poll::{format_duration, poll_with_timeout, Progress, WaitContext, WaitTiming};
use kkp_client::{ErrorClass, KkpClientTrait, KkpError, MachineDeploymentStatus, NodeDeployment};
use tracing::{debug, info, warn};

/// Replica counters read from a deployment's status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicaCounts {
    pub desired: i32,
    pub available: i32,
    pub ready: i32,
    pub updated: i32,
}

impl From<&MachineDeploymentStatus> for ReplicaCounts {
    fn from(status: &MachineDeploymentStatus) -> Self {
        Self {
            desired: status.replicas,
            available: status.available_replicas,
            ready: status.ready_replicas,
            updated: status.updated_replicas,
        }
    }
}

/// Replica count the wait has to see available.
///
/// A positive override wins over the reported desired count; overrides
/// that do not fit the API's 32-bit counters can never be met.
pub fn expected_replicas(override_replicas: Option<i64>, counts: &ReplicaCounts) -> Result<i32, WaitError> {
    match override_replicas {
        Some(wanted) if wanted > 0 => i32::try_from(wanted).map_err(|_| {
            WaitError::InvalidExpectation(format!("expected replicas {} exceeds {}", wanted, i32::MAX))
        }),
        _ => Ok(counts.desired),
    }
}

/// Enough replicas are available. Zero expected replicas never counts as
/// ready, so an unpopulated status cannot pass.
#[must_use]
pub fn replicas_ready(counts: &ReplicaCounts, expected: i32) -> bool {
    expected > 0 && counts.available >= expected
}

fn log_list_error(machine_deployment_id: &str, e: &KkpError) {
    if matches!(e, KkpError::Decode(_)) {
        warn!(machine_deployment_id, error = %e, "Machine deployment list could not be parsed, retrying");
    } else {
        warn!(machine_deployment_id, error = %e, class = ?e.class(), "Failed to list machine deployments, retrying");
    }
}

/// Convergence checks for one machine deployment
#[derive(Clone, Copy)]
pub struct MachineDeploymentConvergence<'a> {
    client: &'a dyn KkpClientTrait,
    project_id: &'a str,
    cluster_id: &'a str,
    machine_deployment_id: &'a str,
}

impl std::fmt::Debug for MachineDeploymentConvergence<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineDeploymentConvergence")
            .field("project_id", &self.project_id)
            .field("cluster_id", &self.cluster_id)
            .field("machine_deployment_id", &self.machine_deployment_id)
            .finish_non_exhaustive()
    }
}

impl<'a> MachineDeploymentConvergence<'a> {
    pub fn new(
        client: &'a dyn KkpClientTrait,
        project_id: &'a str,
        cluster_id: &'a str,
        machine_deployment_id: &'a str,
    ) -> Self {
        Self {
            client,
            project_id,
            cluster_id,
            machine_deployment_id,
        }
    }

    fn find<'d>(&self, deployments: &'d [NodeDeployment]) -> Option<&'d NodeDeployment> {
        deployments.iter().find(|md| md.id == self.machine_deployment_id)
    }

    /// Wait with [`WaitTiming::MACHINE_DEPLOYMENT_READY`]
    pub async fn wait_ready(&self, ctx: &WaitContext, expected_override: Option<i64>) -> Result<(), WaitError> {
        self.wait_ready_with(ctx, expected_override, WaitTiming::MACHINE_DEPLOYMENT_READY).await
    }

    /// Wait until the deployment has at least the expected number of
    /// available replicas.
    ///
    /// List failures of any kind are retried until the timeout.
    pub async fn wait_ready_with(
        &self,
        ctx: &WaitContext,
        expected_override: Option<i64>,
        timing: WaitTiming,
    ) -> Result<(), WaitError> {
        let this = *self;
        info!(
            cluster_id = %self.cluster_id,
            machine_deployment_id = %self.machine_deployment_id,
            expected_override = ?expected_override,
            timeout = %format_duration(&timing.timeout),
            "Waiting for machine deployment to become ready"
        );

        poll_with_timeout(ctx, "machine deployment ready", timing, move || async move {
            let deployments = match this.client.list_machine_deployments(this.project_id, this.cluster_id).await {
                Ok(deployments) => deployments,
                Err(e) => {
                    log_list_error(this.machine_deployment_id, &e);
                    return Ok(Progress::Pending);
                }
            };

            let Some(deployment) = this.find(&deployments) else {
                debug!(machine_deployment_id = %this.machine_deployment_id, "Machine deployment not listed yet");
                return Ok(Progress::Pending);
            };
            let Some(status) = deployment.status.as_ref() else {
                debug!(machine_deployment_id = %this.machine_deployment_id, "Machine deployment has no status yet");
                return Ok(Progress::Pending);
            };

            let counts = ReplicaCounts::from(status);
            let expected = expected_replicas(expected_override, &counts)?;
            if replicas_ready(&counts, expected) {
                info!(
                    machine_deployment_id = %this.machine_deployment_id,
                    available = counts.available,
                    expected,
                    "Machine deployment is ready"
                );
                return Ok(Progress::Done(()));
            }

            debug!(
                machine_deployment_id = %this.machine_deployment_id,
                available = counts.available,
                ready = counts.ready,
                updated = counts.updated,
                expected,
                "Machine deployment not ready yet"
            );
            Ok(Progress::Pending)
        })
        .await
    }

    /// Wait with [`WaitTiming::MACHINE_DEPLOYMENT_DELETED`]
    pub async fn wait_deleted(&self, ctx: &WaitContext) -> Result<(), WaitError> {
        self.wait_deleted_with(ctx, WaitTiming::MACHINE_DEPLOYMENT_DELETED).await
    }

    /// Wait until the deployment no longer appears in the list. A not-found
    /// answer for the list itself means the cluster is gone, which also
    /// confirms the deletion.
    pub async fn wait_deleted_with(&self, ctx: &WaitContext, timing: WaitTiming) -> Result<(), WaitError> {
        let this = *self;
        info!(machine_deployment_id = %self.machine_deployment_id, "Waiting for machine deployment deletion");

        poll_with_timeout(ctx, "machine deployment deletion", timing, move || async move {
            match this.client.list_machine_deployments(this.project_id, this.cluster_id).await {
                Err(e) if e.class() == ErrorClass::NotFound => {
                    info!(machine_deployment_id = %this.machine_deployment_id, "Cluster gone, machine deployment deleted");
                    Ok(Progress::Done(()))
                }
                Err(e) => {
                    log_list_error(this.machine_deployment_id, &e);
                    Ok(Progress::Pending)
                }
                Ok(deployments) if this.find(&deployments).is_some() => {
                    debug!(machine_deployment_id = %this.machine_deployment_id, "Machine deployment still present");
                    Ok(Progress::Pending)
                }
                Ok(_) => {
                    info!(machine_deployment_id = %this.machine_deployment_id, "Machine deployment deleted");
                    Ok(Progress::Done(()))
                }
            }
        })
        .await
    }
}
