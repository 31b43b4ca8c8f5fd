//! Convergence waits for KKP resources
//!
//! Mutating KKP calls return before the platform has acted on them. The
//! functions in this crate block until a cluster, machine deployment, addon
//! or application installation reaches a terminal state, bounded by a
//! [`WaitContext`] (cancellation plus optional deadline).
//!
//! - [`poll`] / [`poll_with_timeout`] / [`Ticker`]: the interval loop
//! - [`ClusterConvergence`]: ready after create, update complete, deleted
//! - [`MachineDeploymentConvergence`]: replicas available, deleted
//! - [`install_status`]: addon and application status evaluation
//!
//! Every probe performs a fresh fetch; nothing remote is cached between
//! attempts.

pub mod cluster;
pub mod error;
pub mod health;
pub mod install_status;
pub mod machine_deployment;
pub mod poll;

pub use cluster::{ClusterConvergence, ClusterUpdateSpec, UpdateObservation, UpdateProgress};
pub use error::WaitError;
pub use health::{health_ready, status_up};
pub use install_status::{InstallKind, InstallStatus, StatusReport};
pub use machine_deployment::{expected_replicas, replicas_ready, MachineDeploymentConvergence, ReplicaCounts};
pub use poll::{format_duration, poll, poll_with_timeout, Progress, Ticker, WaitContext, WaitTiming};
