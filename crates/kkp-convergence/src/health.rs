//! Control plane health classification

use kkp_client::{ClusterHealth, HealthStatus};

/// Whether a single health value means "up".
///
/// KKP has reported health as `"HealthStatusUp"`, `"Up"`, `1` and `true`
/// depending on version, so the check is case-insensitive and accepts any
/// value ending in `up`.
#[must_use]
pub fn status_up(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value.ends_with("up") || value == "1" || value == "true"
}

fn up(status: &HealthStatus) -> bool {
    status_up(status.as_str())
}

/// All four core control plane components are up
#[must_use]
pub fn health_ready(health: &ClusterHealth) -> bool {
    up(&health.apiserver) && up(&health.controller) && up(&health.scheduler) && up(&health.etcd)
}

#[must_use]
pub fn apiserver_up(health: &ClusterHealth) -> bool {
    up(&health.apiserver)
}

/// One-line rendering of the core components for diagnostics
#[must_use]
pub fn summarize(health: &ClusterHealth) -> String {
    format!(
        "apiserver={} controller={} scheduler={} etcd={}",
        health.apiserver, health.controller, health.scheduler, health.etcd
    )
}
