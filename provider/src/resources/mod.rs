//! Resource handlers
//!
//! Every handler exposes `create`, `read`, `update`, `delete` and `import`.
//! `read` returns `Ok(None)` when the object is gone so the host can drop it
//! from state. `import` only parses the import ID; the host follows it with
//! a `read`.

pub mod addon;
pub mod application;
pub mod cluster;
pub mod machine_deployment;
pub mod ssh_key;

pub use addon::{AddonResource, AddonState};
pub use application::{ApplicationResource, ApplicationState};
pub use cluster::{ClusterOpenstack, ClusterResource, ClusterState};
pub use machine_deployment::{MachineDeploymentOpenstack, MachineDeploymentResource, MachineDeploymentState};
pub use ssh_key::{SshKeyResource, SshKeyState};

use crate::error::ProviderError;
use kkp_client::KkpError;
use kkp_convergence::{format_duration, InstallKind, InstallStatus, StatusReport, WaitError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Status attributes stored by addons and applications
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallState {
    /// installing, ready, failed or deleting
    pub status: Option<String>,
    pub status_message: Option<String>,
    /// RFC3339
    pub last_checked: Option<String>,
    /// RFC3339
    pub created_at: Option<String>,
}

impl InstallState {
    pub(crate) fn record(&mut self, report: &StatusReport) {
        self.status = Some(report.status.as_str().to_string());
        self.status_message = Some(report.message.clone());
        self.last_checked = Some(now_rfc3339());
    }
}

/// Turn the outcome of a create/update wait into the status to persist.
///
/// A wait that ran out of time leaves the object `installing`; the state is
/// still written so a later refresh can pick it up.
pub(crate) fn report_from_wait(
    kind: InstallKind,
    outcome: Result<StatusReport, WaitError>,
    timeout: Duration,
) -> StatusReport {
    match outcome {
        Ok(report) => report,
        Err(WaitError::Failed { message, .. }) => StatusReport::new(InstallStatus::Failed, message),
        Err(WaitError::Timeout { .. }) => StatusReport::new(
            InstallStatus::Installing,
            format!(
                "Installation timeout after {} - {} may still be installing",
                format_duration(&timeout),
                kind.label().to_lowercase()
            ),
        ),
        Err(WaitError::Cancelled { .. }) => StatusReport::new(InstallStatus::Failed, "Installation canceled"),
        Err(e) => StatusReport::new(InstallStatus::Failed, format!("Error checking status: {}", e)),
    }
}

/// Wait timeout from a `timeout_minutes` attribute
pub(crate) fn timeout_from_minutes(minutes: Option<u64>, default_minutes: u64) -> Duration {
    let minutes = minutes.filter(|m| *m > 0).unwrap_or(default_minutes);
    Duration::from_secs(minutes.saturating_mul(60))
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Map a NotFound read to `None`
pub(crate) fn found<T>(result: Result<T, KkpError>, summary: &str) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(ProviderError::api(summary)(e)),
    }
}

/// Split `a:b[:c]` import IDs, rejecting empty parts
pub(crate) fn split_import_id(
    id: &str,
    parts: usize,
    expected: &'static str,
) -> Result<Vec<String>, ProviderError> {
    let split: Vec<String> = id.split(':').map(|p| p.trim().to_string()).collect();
    if split.len() != parts || split.iter().any(String::is_empty) {
        return Err(ProviderError::InvalidImportId {
            id: id.to_string(),
            expected,
        });
    }
    Ok(split)
}

/// Require a non-empty identifier from state
pub(crate) fn require_id<'s>(value: Option<&'s str>, what: &str) -> Result<&'s str, ProviderError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProviderError::MissingIdentifier(format!("state has no {}", what)))
}

/// Parse a JSON attribute that must hold an object. Empty input and `{}`
/// mean "unset".
pub(crate) fn parse_json_object(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<serde_json::Value>, ProviderError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| ProviderError::InvalidJson {
        field,
        message: e.to_string(),
    })?;
    match value {
        serde_json::Value::Object(map) if map.is_empty() => Ok(None),
        serde_json::Value::Object(_) => Ok(Some(value)),
        _ => Err(ProviderError::InvalidJson {
            field,
            message: "expected object at top level".to_string(),
        }),
    }
}

/// Compact JSON rendering of a stored object
pub(crate) fn json_string(value: Option<&serde_json::Value>) -> Option<String> {
    value.filter(|v| !v.is_null()).map(serde_json::Value::to_string)
}

/// Trimmed, non-empty string attribute
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_from_wait_mapping() {
        let ready = StatusReport::new(InstallStatus::Ready, "Addon is installed and ready");
        assert_eq!(
            report_from_wait(InstallKind::Addon, Ok(ready.clone()), Duration::from_secs(120)),
            ready
        );

        let failed = report_from_wait(
            InstallKind::Application,
            Err(WaitError::Failed {
                operation: "application installation".to_string(),
                message: "Application failed: chart not found".to_string(),
            }),
            Duration::from_secs(300),
        );
        assert_eq!(failed.status, InstallStatus::Failed);
        assert_eq!(failed.message, "Application failed: chart not found");

        let timeout = report_from_wait(
            InstallKind::Addon,
            Err(WaitError::Timeout {
                operation: "addon installation".to_string(),
                elapsed: Duration::from_secs(120),
                timeout: Duration::from_secs(120),
            }),
            Duration::from_secs(120),
        );
        assert_eq!(timeout.status, InstallStatus::Installing);
        assert_eq!(
            timeout.message,
            "Installation timeout after 2m0s - addon may still be installing"
        );

        let cancelled = report_from_wait(
            InstallKind::Application,
            Err(WaitError::Cancelled {
                operation: "application installation".to_string(),
                elapsed: Duration::from_secs(3),
            }),
            Duration::from_secs(300),
        );
        assert_eq!(cancelled, StatusReport::new(InstallStatus::Failed, "Installation canceled"));
    }

    #[test]
    fn test_split_import_id() {
        assert_eq!(
            split_import_id("c1:md-1", 2, "cluster_id:machine_deployment_id").unwrap(),
            vec!["c1", "md-1"]
        );
        assert!(split_import_id("c1", 2, "cluster_id:addon_id").is_err());
        assert!(split_import_id("c1: ", 2, "cluster_id:addon_id").is_err());
        assert!(split_import_id("c1:ns:app:extra", 3, "cluster_id:namespace:name").is_err());
    }

    #[test]
    fn test_parse_json_object() {
        assert_eq!(parse_json_object("variables", None).unwrap(), None);
        assert_eq!(parse_json_object("variables", Some(" {} ")).unwrap(), None);
        assert_eq!(
            parse_json_object("values", Some(r#"{"replicas":2}"#)).unwrap(),
            Some(serde_json::json!({"replicas": 2}))
        );
        assert!(matches!(
            parse_json_object("values", Some("[1,2]")),
            Err(ProviderError::InvalidJson { field: "values", .. })
        ));
        assert!(parse_json_object("values", Some("{oops")).is_err());
    }

    #[test]
    fn test_timeout_from_minutes() {
        assert_eq!(timeout_from_minutes(None, 2), Duration::from_secs(120));
        assert_eq!(timeout_from_minutes(Some(0), 5), Duration::from_secs(300));
        assert_eq!(timeout_from_minutes(Some(10), 5), Duration::from_secs(600));
    }
}
