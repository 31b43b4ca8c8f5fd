//! Default values and limits shared by the resources

pub const DEFAULT_CNI_TYPE: &str = "cilium";
pub const DEFAULT_CNI_VERSION: &str = "1.16.9";

pub const DEFAULT_K8S_VERSION: &str = "1.32.7";

pub const DEFAULT_REPLICAS: i64 = 1;
pub const MAX_REPLICAS: i64 = 100;
pub const MAX_AUTOSCALING_REPLICAS: i64 = 1000;

/// Root disk size in GB
pub const DEFAULT_DISK_SIZE: i64 = 25;
pub const MAX_DISK_SIZE: i64 = 1000;

pub const DEFAULT_APPLICATION_NAMESPACE: &str = "default";

/// Platform minor series this provider is tested against
pub const SUPPORTED_KKP_MINOR: &str = "2.28";

/// Template instances created when `template_replicas` is unset
pub const DEFAULT_TEMPLATE_REPLICAS: u32 = 1;

pub const DEFAULT_ADDON_TIMEOUT_MINUTES: u64 = 2;
pub const DEFAULT_APPLICATION_TIMEOUT_MINUTES: u64 = 5;
/// Upper bound for `timeout_minutes` (one day)
pub const MAX_TIMEOUT_MINUTES: u64 = 24 * 60;
