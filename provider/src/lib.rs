//! KKP Terraform provider handlers
//!
//! Each resource handler follows the same path: plan -> defaults and
//! validation -> request model -> KKP API call -> convergence wait -> state.
//! The Terraform plugin protocol itself is out of scope; a host adapter calls
//! these handlers with decoded plans and persists the returned state.
//!
//! - [`KkpProvider`]: configured client, project and wait timings
//! - [`resources`]: cluster, machine deployment, addon, application, SSH key
//! - [`data_sources`]: read-only listings
//! - [`version::check_compatibility`]: server version warning

pub mod cloud;
pub mod config;
pub mod data_sources;
pub mod defaults;
pub mod error;
pub mod provider;
pub mod resources;
pub mod validation;
pub mod version;

pub use cloud::CloudProvider;
pub use config::{ConfigError, ProviderConfig};
pub use error::{ProviderError, Warning};
pub use provider::{KkpProvider, WaitTimings};
