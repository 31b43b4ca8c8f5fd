//! Plan validation rules shared by the resources

use crate::cloud::CloudProvider;
use crate::defaults::{MAX_AUTOSCALING_REPLICAS, MAX_DISK_SIZE, MAX_REPLICAS, MAX_TIMEOUT_MINUTES};
use crate::error::ProviderError;
use regex::Regex;
use std::sync::LazyLock;

static K8S_VERSION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+(\.\d+)?$").ok());

/// Field must be non-empty after trimming
pub fn required(value: &str, field: &str) -> Result<(), ProviderError> {
    if value.trim().is_empty() {
        return Err(ProviderError::validation(format!("{} is required", field)));
    }
    Ok(())
}

pub fn resource_name(name: &str) -> Result<(), ProviderError> {
    required(name, "name")
}

/// Accepts `1.28` and `1.28.5`, rejects `v1.28` and `1.28.5-rc1`
pub fn k8s_version(version: &str) -> Result<(), ProviderError> {
    if version.trim().is_empty() {
        return Err(ProviderError::validation("k8s_version is required"));
    }
    let matches = K8S_VERSION_PATTERN.as_ref().is_some_and(|pattern| pattern.is_match(version));
    if !matches {
        return Err(ProviderError::validation(format!(
            "k8s_version should look like 1.28 or 1.28.5, got {:?}",
            version
        )));
    }
    Ok(())
}

pub fn cloud_provider(cloud: &str) -> Result<CloudProvider, ProviderError> {
    cloud.parse()
}

pub fn replicas(replicas: i64) -> Result<(), ProviderError> {
    if replicas < 0 {
        return Err(ProviderError::validation("replicas cannot be negative"));
    }
    if replicas > MAX_REPLICAS {
        return Err(ProviderError::validation(format!("replicas cannot exceed {}", MAX_REPLICAS)));
    }
    Ok(())
}

/// Autoscaling bounds are all-or-nothing
pub fn autoscaling(min_replicas: Option<i64>, max_replicas: Option<i64>) -> Result<(), ProviderError> {
    let (min, max) = match (min_replicas, max_replicas) {
        (None, None) => return Ok(()),
        (Some(min), Some(max)) => (min, max),
        _ => {
            return Err(ProviderError::validation(
                "both min_replicas and max_replicas must be set when using autoscaling",
            ));
        }
    };

    if min < 1 {
        return Err(ProviderError::validation("min_replicas must be at least 1"));
    }
    if max > MAX_AUTOSCALING_REPLICAS {
        return Err(ProviderError::validation(format!(
            "max_replicas cannot exceed {}",
            MAX_AUTOSCALING_REPLICAS
        )));
    }
    if min > max {
        return Err(ProviderError::validation("min_replicas cannot be greater than max_replicas"));
    }
    Ok(())
}

/// Disk size in GB
pub fn disk_size(size: i64) -> Result<(), ProviderError> {
    if size < 1 {
        return Err(ProviderError::validation("disk_size must be at least 1GB"));
    }
    if size > MAX_DISK_SIZE {
        return Err(ProviderError::validation(format!("disk_size cannot exceed {}GB", MAX_DISK_SIZE)));
    }
    Ok(())
}

/// Wait timeout in minutes; unset and 0 fall back to the resource default
pub fn timeout_minutes(minutes: Option<u64>) -> Result<(), ProviderError> {
    match minutes {
        Some(m) if m > MAX_TIMEOUT_MINUTES => Err(ProviderError::validation(format!(
            "timeout_minutes cannot exceed {}",
            MAX_TIMEOUT_MINUTES
        ))),
        _ => Ok(()),
    }
}

/// Narrow an i64 attribute to the API's i32
pub fn to_i32(value: i64, field: &str) -> Result<i32, ProviderError> {
    i32::try_from(value)
        .map_err(|_| ProviderError::validation(format!("{} value {} is out of range", field, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(result: Result<(), ProviderError>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn test_k8s_version_pattern() {
        assert!(k8s_version("1.28").is_ok());
        assert!(k8s_version("1.32.7").is_ok());
        assert!(k8s_version("v1.28").is_err());
        assert!(k8s_version("1.28.5-rc1").is_err());
        assert!(message(k8s_version(" ")).contains("k8s_version is required"));
    }

    #[test]
    fn test_replicas_bounds() {
        assert!(replicas(0).is_ok());
        assert!(replicas(100).is_ok());
        assert!(message(replicas(-1)).contains("cannot be negative"));
        assert!(message(replicas(101)).contains("cannot exceed 100"));
    }

    #[test]
    fn test_autoscaling_rules() {
        assert!(autoscaling(None, None).is_ok());
        assert!(autoscaling(Some(1), Some(1000)).is_ok());
        assert!(message(autoscaling(Some(1), None)).contains("both min_replicas and max_replicas"));
        assert!(message(autoscaling(None, Some(3))).contains("both min_replicas and max_replicas"));
        assert!(message(autoscaling(Some(0), Some(3))).contains("at least 1"));
        assert!(message(autoscaling(Some(1), Some(1001))).contains("cannot exceed 1000"));
        assert!(message(autoscaling(Some(5), Some(3))).contains("greater than max_replicas"));
    }

    #[test]
    fn test_disk_size_bounds() {
        assert!(disk_size(25).is_ok());
        assert!(message(disk_size(0)).contains("at least 1GB"));
        assert!(message(disk_size(1001)).contains("cannot exceed 1000GB"));
    }

    #[test]
    fn test_timeout_minutes_bounds() {
        assert!(timeout_minutes(None).is_ok());
        assert!(timeout_minutes(Some(0)).is_ok());
        assert!(timeout_minutes(Some(1440)).is_ok());
        assert!(message(timeout_minutes(Some(1441))).contains("cannot exceed 1440"));
        assert!(timeout_minutes(Some(u64::MAX)).is_err());
    }

    #[test]
    fn test_required_and_narrowing() {
        assert!(message(required("  ", "datacenter")).contains("datacenter is required"));
        assert_eq!(to_i32(7, "replicas").unwrap(), 7);
        assert!(to_i32(i64::from(i32::MAX) + 1, "replicas").is_err());
    }
}
