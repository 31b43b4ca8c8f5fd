//! Project SSH key resource
//!
//! Keys are immutable on the platform side; a changed name or public key
//! means a new key.

use super::{non_empty, require_id};
use crate::error::ProviderError;
use crate::provider::KkpProvider;
use crate::validation;
use kkp_client::{SshKey, SshKeySpec};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Plan and state of an SSH key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshKeyState {
    /// Computed
    pub id: Option<String>,
    pub name: String,
    pub public_key: String,
    /// Computed
    pub fingerprint: Option<String>,
    /// Computed, RFC3339
    pub created_at: Option<String>,
}

impl SshKeyState {
    /// The public key is kept as configured unless state has none (import)
    fn refresh_from(&mut self, key: &SshKey) {
        self.id = Some(key.id.clone());
        self.name = key.name.clone();
        if self.public_key.trim().is_empty() {
            self.public_key = key.spec.public_key.clone();
        }
        self.fingerprint = non_empty(Some(key.spec.fingerprint.as_str())).map(str::to_string);
        if let Some(created) = key.creation_timestamp {
            self.created_at = Some(created.to_rfc3339());
        }
    }
}

/// Handler for the SSH key resource
#[derive(Debug, Clone, Copy)]
pub struct SshKeyResource<'a> {
    provider: &'a KkpProvider,
}

impl<'a> SshKeyResource<'a> {
    pub fn new(provider: &'a KkpProvider) -> Self {
        Self { provider }
    }

    pub async fn create(&self, plan: &SshKeyState) -> Result<SshKeyState, ProviderError> {
        validation::resource_name(&plan.name)?;
        validation::required(&plan.public_key, "public_key")?;

        let body = SshKey {
            name: plan.name.trim().to_string(),
            spec: SshKeySpec {
                public_key: plan.public_key.trim().to_string(),
                ..SshKeySpec::default()
            },
            ..SshKey::default()
        };
        let created = self
            .provider
            .client()
            .create_ssh_key(self.provider.project_id(), &body)
            .await
            .map_err(ProviderError::api("Create SSH key failed"))?;
        info!(key_id = %created.id, key_name = %created.name, "SSH key created");

        let mut state = plan.clone();
        state.refresh_from(&created);
        Ok(state)
    }

    /// Look the key up in the project listing; `None` when it is absent
    pub async fn read(&self, state: &SshKeyState) -> Result<Option<SshKeyState>, ProviderError> {
        let id = require_id(state.id.as_deref(), "SSH key id")?;
        let keys = self
            .provider
            .client()
            .list_ssh_keys(self.provider.project_id())
            .await
            .map_err(ProviderError::api("Read project SSH keys failed"))?;

        Ok(keys.iter().find(|k| k.id == id).map(|key| {
            let mut refreshed = state.clone();
            refreshed.refresh_from(key);
            refreshed
        }))
    }

    /// Nothing is updatable in place
    pub fn update(&self, plan: &SshKeyState, prior: &SshKeyState) -> Result<SshKeyState, ProviderError> {
        if plan.name.trim() != prior.name.trim() || plan.public_key.trim() != prior.public_key.trim() {
            return Err(ProviderError::validation(
                "changing name or public_key requires replacing the SSH key",
            ));
        }
        let mut next = plan.clone();
        next.id.clone_from(&prior.id);
        next.fingerprint.clone_from(&prior.fingerprint);
        next.created_at.clone_from(&prior.created_at);
        Ok(next)
    }

    /// Delete the key; an already missing key is fine
    pub async fn delete(&self, state: &SshKeyState) -> Result<(), ProviderError> {
        let Some(id) = non_empty(state.id.as_deref()) else {
            return Ok(());
        };
        match self.provider.client().delete_ssh_key(self.provider.project_id(), id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(key_id = %id, "SSH key already gone");
                Ok(())
            }
            Err(e) => Err(ProviderError::api("Delete SSH key failed")(e)),
        }
    }

    /// Import by key ID
    pub fn import(&self, id: &str) -> Result<SshKeyState, ProviderError> {
        let id = non_empty(Some(id)).ok_or_else(|| ProviderError::InvalidImportId {
            id: id.to_string(),
            expected: "ssh_key_id",
        })?;
        Ok(SshKeyState {
            id: Some(id.to_string()),
            ..SshKeyState::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kkp_client::{MockFailure, MockKkpClient};
    use std::sync::Arc;

    const PUBLIC_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl ops@example";

    fn provider(mock: &MockKkpClient) -> KkpProvider {
        KkpProvider::new(Arc::new(mock.clone()), "proj-1")
    }

    fn plan() -> SshKeyState {
        SshKeyState {
            name: "ops".to_string(),
            public_key: PUBLIC_KEY.to_string(),
            ..SshKeyState::default()
        }
    }

    #[tokio::test]
    async fn test_create_read_delete() {
        let mock = MockKkpClient::new("https://kkp.test");
        let provider = provider(&mock);

        let state = provider.ssh_keys().create(&plan()).await.unwrap();
        assert!(state.id.as_deref().is_some_and(|id| id.starts_with("key-")));
        assert!(state.created_at.is_some());

        let read = provider.ssh_keys().read(&state).await.unwrap().unwrap();
        assert_eq!(read, state);

        provider.ssh_keys().delete(&state).await.unwrap();
        assert_eq!(provider.ssh_keys().read(&state).await.unwrap(), None);
        // 404 on a second delete is tolerated
        provider.ssh_keys().delete(&state).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_requires_public_key() {
        let mock = MockKkpClient::new("https://kkp.test");
        let mut p = plan();
        p.public_key = String::new();
        assert!(provider(&mock).ssh_keys().create(&p).await.is_err());
        assert_eq!(mock.call_count("create_ssh_key"), 0);
    }

    #[tokio::test]
    async fn test_import_fills_public_key() {
        let mock = MockKkpClient::new("https://kkp.test");
        let provider = provider(&mock);
        let created = provider.ssh_keys().create(&plan()).await.unwrap();

        let imported = provider.ssh_keys().import(created.id.as_deref().unwrap()).unwrap();
        let state = provider.ssh_keys().read(&imported).await.unwrap().unwrap();
        assert_eq!(state.name, "ops");
        assert_eq!(state.public_key, PUBLIC_KEY);
        assert!(provider.ssh_keys().import(" ").is_err());
    }

    #[tokio::test]
    async fn test_list_failure_is_error() {
        let mock = MockKkpClient::new("https://kkp.test");
        mock.fail_operation("list_ssh_keys", MockFailure::Status(502, "bad gateway".to_string()));
        let state = SshKeyState {
            id: Some("key-1".to_string()),
            ..plan()
        };
        assert!(provider(&mock).ssh_keys().read(&state).await.is_err());
    }

    #[test]
    fn test_update_rejects_changes() {
        let mock = MockKkpClient::new("https://kkp.test");
        let provider = provider(&mock);
        let prior = SshKeyState {
            id: Some("key-1".to_string()),
            ..plan()
        };
        let same = provider.ssh_keys().update(&plan(), &prior).unwrap();
        assert_eq!(same.id.as_deref(), Some("key-1"));

        let mut renamed = plan();
        renamed.name = "ops-2".to_string();
        assert!(provider.ssh_keys().update(&renamed, &prior).is_err());
    }
}
