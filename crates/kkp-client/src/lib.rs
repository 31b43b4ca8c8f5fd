//! Kubermatic Kubernetes Platform (KKP) REST API Client
//!
//! A Rust client library for the KKP v1/v2 REST API as used by the Terraform
//! provider: clusters, cluster templates, machine deployments, addons,
//! application installations and SSH keys.
//!
//! # Example
//!
//! ```no_run
//! use kkp_client::{KkpClient, KkpClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KkpClient::new(
//!     "https://kkp.example.com".to_string(),
//!     "your-api-token".to_string(),
//! )?;
//!
//! // List clusters in a project
//! let clusters = client.list_clusters("my-project").await?;
//!
//! // Fetch the health of the first one
//! if let Some(cluster) = clusters.first() {
//!     let health = client.get_cluster_health("my-project", &cluster.id).await?;
//!     println!("apiserver: {}", health.apiserver);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error classification
//!
//! Every [`KkpError`] maps onto an [`ErrorClass`] (`NotFound`, `Transient`,
//! `Fatal`). Callers that need to decide between "gone", "retry" and "give
//! up" should match on [`KkpError::class`] instead of inspecting messages.

pub mod client;
pub mod common;
pub mod error;
#[path = "trait.rs"]
pub mod kkp_trait;
pub mod models;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{ClientConfig, KkpClient};
pub use common::HttpClient;
pub use error::{ErrorClass, KkpError};
pub use kkp_trait::KkpClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{MockFailure, MockKkpClient};
pub use models::*;
