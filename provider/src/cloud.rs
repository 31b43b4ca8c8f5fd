//! Supported cloud providers

use crate::error::ProviderError;
use std::fmt;
use std::str::FromStr;

/// Cloud a cluster or machine deployment runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudProvider {
    OpenStack,
    Aws,
    VSphere,
    Azure,
}

impl CloudProvider {
    pub const ALL: [Self; 4] = [Self::OpenStack, Self::Aws, Self::VSphere, Self::Azure];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenStack => "openstack",
            Self::Aws => "aws",
            Self::VSphere => "vsphere",
            Self::Azure => "azure",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            return Err(ProviderError::validation("cloud provider is required"));
        }
        Self::ALL.into_iter().find(|c| c.as_str() == name).ok_or_else(|| {
            let supported: Vec<&str> = Self::ALL.iter().map(|c| c.as_str()).collect();
            ProviderError::validation(format!(
                "unsupported cloud provider {:?}, must be one of: {}",
                name,
                supported.join(", ")
            ))
        })
    }
}
