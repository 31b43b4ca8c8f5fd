//! Platform version compatibility

use crate::defaults::SUPPORTED_KKP_MINOR;
use crate::error::Warning;
use kkp_client::KkpClientTrait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

static MAJOR_MINOR_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)v?(\d+)\.(\d+)").ok());

/// `major.minor` of a version string: `v2.28.2` gives `2.28`
#[must_use]
pub fn extract_minor(version: &str) -> Option<String> {
    let version = version.trim();
    if version.is_empty() {
        return None;
    }
    let caps = MAJOR_MINOR_PATTERN.as_ref()?.captures(version)?;
    Some(format!("{}.{}", caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Compare the server's minor series against the supported one.
///
/// Never fails: an unreadable or mismatching version only produces a warning.
pub async fn check_compatibility(client: &dyn KkpClientTrait) -> Option<Warning> {
    let version = match client.server_version().await {
        Ok(version) => version,
        Err(e) => {
            warn!(error = %e, "Unable to determine KKP server version");
            return Some(Warning::new(
                "KKP version unknown",
                format!("Could not read the server version: {}", e),
            ));
        }
    };

    match extract_minor(&version) {
        Some(minor) if minor == SUPPORTED_KKP_MINOR => {
            info!(version = %version, "KKP server version is supported");
            None
        }
        Some(minor) => {
            warn!(version = %version, supported = SUPPORTED_KKP_MINOR, "KKP server version differs from the supported series");
            Some(Warning::new(
                "Untested KKP version",
                format!(
                    "Server reports {} (series {}); this provider is tested against {}.x",
                    version, minor, SUPPORTED_KKP_MINOR
                ),
            ))
        }
        None => {
            warn!(version = %version, "Unparseable KKP server version");
            Some(Warning::new(
                "KKP version unknown",
                format!("Server version {:?} has no major.minor component", version),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kkp_client::{MockFailure, MockKkpClient};

    #[test]
    fn test_extract_minor() {
        assert_eq!(extract_minor("v2.28.2").as_deref(), Some("2.28"));
        assert_eq!(extract_minor("2.27").as_deref(), Some("2.27"));
        assert_eq!(extract_minor("V3.0.0-rc.1").as_deref(), Some("3.0"));
        assert_eq!(extract_minor("  "), None);
        assert_eq!(extract_minor("latest"), None);
    }

    #[tokio::test]
    async fn test_supported_version_has_no_warning() {
        let client = MockKkpClient::new("https://kkp.test");
        client.set_version("v2.28.4");
        assert_eq!(check_compatibility(&client).await, None);
    }

    #[tokio::test]
    async fn test_other_minor_warns() {
        let client = MockKkpClient::new("https://kkp.test");
        client.set_version("v2.26.1");
        let warning = check_compatibility(&client).await.unwrap();
        assert_eq!(warning.summary, "Untested KKP version");
        assert!(warning.detail.contains("2.28.x"));
    }

    #[tokio::test]
    async fn test_unreachable_version_endpoint_warns() {
        let client = MockKkpClient::new("https://kkp.test");
        client.fail_operation("server_version", MockFailure::NotFound);
        let warning = check_compatibility(&client).await.unwrap();
        assert_eq!(warning.summary, "KKP version unknown");
    }
}
