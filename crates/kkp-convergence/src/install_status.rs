//! Addon and application installation status
//!
//! The evaluators classify a fetched object as installing, ready, failed or
//! deleting. They are used one-shot when refreshing state and inside the
//! create/update waits, where deleting counts as a failure and a transient
//! fetch error just means "ask again".

use crate::error::WaitError;
use crate::poll::{format_duration, Ticker, WaitContext, WaitTiming};
use kkp_client::{Addon, ApplicationInstallation, ErrorClass, KkpClientTrait, KkpError};
use std::fmt;
use std::future::Future;
use tracing::{debug, info};

/// Installation state of an addon or application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallStatus {
    Installing,
    Ready,
    Failed,
    Deleting,
}

impl InstallStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
        }
    }

    /// Ends a create/update wait
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Installing)
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status plus the human-readable message stored alongside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: InstallStatus,
    pub message: String,
}

impl StatusReport {
    pub fn new(status: InstallStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Which kind of object is being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallKind {
    Addon,
    Application,
}

impl InstallKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Addon => "Addon",
            Self::Application => "Application",
        }
    }

    /// Progress is logged on the first attempt and every Nth one
    fn log_every(self) -> u32 {
        match self {
            Self::Addon => 3,
            Self::Application => 4,
        }
    }

    fn operation(self) -> &'static str {
        match self {
            Self::Addon => "addon installation",
            Self::Application => "application installation",
        }
    }
}

/// Classify a failed fetch
#[must_use]
pub fn status_from_error(kind: InstallKind, err: &KkpError) -> StatusReport {
    if err.class() == ErrorClass::NotFound {
        StatusReport::new(
            InstallStatus::Failed,
            format!("{} not found - installation may have failed", kind.label()),
        )
    } else {
        StatusReport::new(InstallStatus::Failed, format!("Error checking status: {}", err))
    }
}

/// Addons expose no readiness signal beyond existing and not being deleted.
#[must_use]
pub fn evaluate_addon(addon: &Addon) -> StatusReport {
    if addon.marked_for_deletion() {
        StatusReport::new(InstallStatus::Deleting, "Addon is being deleted")
    } else {
        StatusReport::new(InstallStatus::Ready, "Addon is installed and ready")
    }
}

#[must_use]
pub fn evaluate_application(application: &ApplicationInstallation) -> StatusReport {
    if application.marked_for_deletion() {
        return StatusReport::new(InstallStatus::Deleting, "Application is being deleted");
    }

    let Some(status) = application.status.as_ref().filter(|s| !s.conditions.is_empty()) else {
        return StatusReport::new(InstallStatus::Installing, "Application installation in progress");
    };

    let ready = status
        .conditions
        .iter()
        .find(|c| c.condition_type.eq_ignore_ascii_case("Ready"));
    match ready {
        Some(c) if c.status.eq_ignore_ascii_case("True") => {
            StatusReport::new(InstallStatus::Ready, "Application is ready")
        }
        Some(c) if c.status.eq_ignore_ascii_case("False") => StatusReport::new(
            InstallStatus::Failed,
            format!("Application failed: {}", c.message.as_deref().unwrap_or_default()),
        ),
        _ => StatusReport::new(InstallStatus::Installing, "Application is still installing"),
    }
}

/// One-shot addon status
pub async fn check_addon(client: &dyn KkpClientTrait, project_id: &str, cluster_id: &str, addon_id: &str) -> StatusReport {
    match client.get_addon(project_id, cluster_id, addon_id).await {
        Ok(addon) => evaluate_addon(&addon),
        Err(e) => status_from_error(InstallKind::Addon, &e),
    }
}

/// One-shot application status
pub async fn check_application(
    client: &dyn KkpClientTrait,
    project_id: &str,
    cluster_id: &str,
    namespace: &str,
    name: &str,
) -> StatusReport {
    match client.get_application(project_id, cluster_id, namespace, name).await {
        Ok(application) => evaluate_application(&application),
        Err(e) => status_from_error(InstallKind::Application, &e),
    }
}

/// Wait until an addon is ready.
///
/// Resolves to the ready report; failure and deletion end the wait with
/// [`WaitError::Failed`].
pub async fn wait_for_addon(
    client: &dyn KkpClientTrait,
    ctx: &WaitContext,
    project_id: &str,
    cluster_id: &str,
    addon_id: &str,
    timing: WaitTiming,
) -> Result<StatusReport, WaitError> {
    wait_for_install(ctx, InstallKind::Addon, addon_id, timing, move || async move {
        client
            .get_addon(project_id, cluster_id, addon_id)
            .await
            .map(|addon| evaluate_addon(&addon))
    })
    .await
}

/// Wait until an application installation is ready.
pub async fn wait_for_application(
    client: &dyn KkpClientTrait,
    ctx: &WaitContext,
    project_id: &str,
    cluster_id: &str,
    namespace: &str,
    name: &str,
    timing: WaitTiming,
) -> Result<StatusReport, WaitError> {
    let resource = format!("{}/{}", namespace, name);
    wait_for_install(ctx, InstallKind::Application, &resource, timing, move || async move {
        client
            .get_application(project_id, cluster_id, namespace, name)
            .await
            .map(|application| evaluate_application(&application))
    })
    .await
}

async fn wait_for_install<F, Fut>(
    ctx: &WaitContext,
    kind: InstallKind,
    resource: &str,
    timing: WaitTiming,
    mut check: F,
) -> Result<StatusReport, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<StatusReport, KkpError>>,
{
    info!(
        kind = kind.label(),
        resource,
        timeout = %format_duration(&timing.timeout),
        "Waiting for installation to become ready"
    );

    let mut ticker = Ticker::new(ctx, kind.operation(), timing);
    loop {
        let attempt = ticker.tick().await?;
        let report = match check().await {
            Ok(report) => report,
            Err(e) if e.class() == ErrorClass::Transient => {
                debug!(kind = kind.label(), resource, attempt, error = %e, "Status check failed, retrying");
                continue;
            }
            Err(e) => status_from_error(kind, &e),
        };

        if attempt == 1 || attempt % kind.log_every() == 0 || report.status.is_terminal() {
            info!(
                kind = kind.label(),
                resource,
                attempt,
                elapsed = %format_duration(&ticker.elapsed()),
                status = %report.status,
                message = %report.message,
                "Installation progress"
            );
        }

        match report.status {
            InstallStatus::Ready => return Ok(report),
            InstallStatus::Failed => {
                return Err(WaitError::Failed {
                    operation: kind.operation().to_string(),
                    message: report.message,
                });
            }
            InstallStatus::Deleting => {
                return Err(WaitError::Failed {
                    operation: kind.operation().to_string(),
                    message: format!("{} was marked for deletion during installation", kind.label()),
                });
            }
            InstallStatus::Installing => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kkp_client::{ApplicationCondition, ApplicationInstallationStatus, MockFailure, MockKkpClient};
    use std::time::Duration;
    use tokio::time::Instant;

    const PROJECT: &str = "proj";
    const CLUSTER: &str = "c1";

    fn addon(deleting: bool) -> Addon {
        Addon {
            id: "metallb".into(),
            name: "metallb".into(),
            deletion_timestamp: deleting.then(|| Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap()),
            ..Addon::default()
        }
    }

    fn application(conditions: Option<Vec<(&str, &str, &str)>>) -> ApplicationInstallation {
        ApplicationInstallation {
            name: "nginx".into(),
            namespace: "web".into(),
            status: conditions.map(|conds| ApplicationInstallationStatus {
                conditions: conds
                    .into_iter()
                    .map(|(t, s, m)| ApplicationCondition {
                        condition_type: t.into(),
                        status: s.into(),
                        message: Some(m.into()),
                        ..ApplicationCondition::default()
                    })
                    .collect(),
                method: None,
            }),
            ..ApplicationInstallation::default()
        }
    }

    #[test]
    fn test_evaluate_addon() {
        assert_eq!(evaluate_addon(&addon(false)).status, InstallStatus::Ready);
        let deleting = evaluate_addon(&addon(true));
        assert_eq!(deleting.status, InstallStatus::Deleting);
        assert_eq!(deleting.message, "Addon is being deleted");
    }

    #[test]
    fn test_zero_deletion_timestamp_is_not_deleting() {
        let mut a = addon(false);
        a.deletion_timestamp = Some(Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(evaluate_addon(&a).status, InstallStatus::Ready);
    }

    #[test]
    fn test_evaluate_application() {
        let no_status = evaluate_application(&application(None));
        assert_eq!(no_status, StatusReport::new(InstallStatus::Installing, "Application installation in progress"));

        let undecided = evaluate_application(&application(Some(vec![("ManifestsApplied", "True", "")])));
        assert_eq!(undecided, StatusReport::new(InstallStatus::Installing, "Application is still installing"));

        let unknown = evaluate_application(&application(Some(vec![("Ready", "Unknown", "")])));
        assert_eq!(unknown.status, InstallStatus::Installing);

        let ready = evaluate_application(&application(Some(vec![("ManifestsApplied", "True", ""), ("Ready", "True", "")])));
        assert_eq!(ready, StatusReport::new(InstallStatus::Ready, "Application is ready"));

        let failed = evaluate_application(&application(Some(vec![("Ready", "False", "helm: chart \"nginx\" not found")])));
        assert_eq!(failed.status, InstallStatus::Failed);
        assert_eq!(failed.message, "Application failed: helm: chart \"nginx\" not found");
    }

    #[test]
    fn test_application_deletion_wins_over_conditions() {
        let mut app = application(Some(vec![("Ready", "True", "")]));
        app.deletion_timestamp = Some(Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap());
        assert_eq!(evaluate_application(&app).status, InstallStatus::Deleting);
    }

    #[test]
    fn test_status_from_error() {
        let not_found = status_from_error(InstallKind::Addon, &KkpError::NotFound("addon metallb".into()));
        assert_eq!(not_found, StatusReport::new(InstallStatus::Failed, "Addon not found - installation may have failed"));

        let other = status_from_error(InstallKind::Application, &KkpError::Authentication("token expired".into()));
        assert_eq!(other.status, InstallStatus::Failed);
        assert!(other.message.starts_with("Error checking status: "), "{}", other.message);
    }

    #[tokio::test]
    async fn test_check_application_not_found() {
        let mock = MockKkpClient::new("https://kkp.test");
        let report = check_application(&mock, PROJECT, CLUSTER, "web", "nginx").await;
        assert_eq!(report.message, "Application not found - installation may have failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_addon_retries_transient_errors() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.script_addon(CLUSTER, "metallb", vec![
            Err(MockFailure::Status(503, "unavailable".into())),
            Err(MockFailure::Decode("unexpected EOF".into())),
            Ok(addon(false)),
        ]);

        let report = wait_for_addon(&mock, &WaitContext::new(), PROJECT, CLUSTER, "metallb", WaitTiming::ADDON_READY)
            .await
            .unwrap();

        assert_eq!(report.status, InstallStatus::Ready);
        assert_eq!(mock.call_count("get_addon"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_addon_not_found_fails() {
        let mock = MockKkpClient::new("https://kkp.test");

        let err = wait_for_addon(&mock, &WaitContext::new(), PROJECT, CLUSTER, "metallb", WaitTiming::ADDON_READY)
            .await
            .unwrap_err();

        match err {
            WaitError::Failed { message, .. } => {
                assert_eq!(message, "Addon not found - installation may have failed");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(mock.call_count("get_addon"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_addon_deleting_is_failure() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.add_addon(CLUSTER, addon(true));

        let err = wait_for_addon(&mock, &WaitContext::new(), PROJECT, CLUSTER, "metallb", WaitTiming::ADDON_READY)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Addon was marked for deletion during installation"), "{}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_application_becomes_ready() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.script_application(CLUSTER, "web", "nginx", vec![
            Ok(application(None)),
            Ok(application(Some(vec![("Ready", "Unknown", "installing chart")]))),
            Ok(application(Some(vec![("Ready", "True", "")]))),
        ]);
        let started = Instant::now();

        let report = wait_for_application(&mock, &WaitContext::new(), PROJECT, CLUSTER, "web", "nginx", WaitTiming::APPLICATION_READY)
            .await
            .unwrap();

        assert_eq!(report.message, "Application is ready");
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_application_failed_condition() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.add_application(CLUSTER, application(Some(vec![("Ready", "False", "image pull backoff")])));

        let err = wait_for_application(&mock, &WaitContext::new(), PROJECT, CLUSTER, "web", "nginx", WaitTiming::APPLICATION_READY)
            .await
            .unwrap_err();

        match err {
            WaitError::Failed { message, .. } => assert_eq!(message, "Application failed: image pull backoff"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_application_times_out() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.add_application(CLUSTER, application(None));

        let err = wait_for_application(&mock, &WaitContext::new(), PROJECT, CLUSTER, "web", "nginx", WaitTiming::APPLICATION_READY)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("5m0s"), "{}", err);
    }
}
