//! Access grant issuer.
//!
//! Turns a storage key into a time-bounded, read-only [`AccessGrant`] that an
//! external service can use to fetch the resource without holding storage
//! credentials. Signing is delegated to the [`ObjectStore`].

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::models::{AccessGrant, Permission};
use crate::storage::{ObjectStore, StorageError};

#[derive(Debug, Error)]
pub enum GrantError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("{0:?} permission cannot be granted; grants are read-only")]
    PermissionNotAllowed(Permission),
    #[error("grant duration must be positive and representable, got {0} seconds")]
    InvalidDuration(i64),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct GrantIssuer {
    store: Arc<dyn ObjectStore>,
}

impl GrantIssuer {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Issue a grant on `key` that expires `duration` from now.
    pub async fn issue(
        &self,
        key: &str,
        permission: Permission,
        duration: Duration,
    ) -> Result<AccessGrant, GrantError> {
        self.issue_at(key, permission, duration, Utc::now()).await
    }

    pub(crate) async fn issue_at(
        &self,
        key: &str,
        permission: Permission,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<AccessGrant, GrantError> {
        if permission != Permission::Read {
            return Err(GrantError::PermissionNotAllowed(permission));
        }
        if duration <= Duration::zero() {
            return Err(GrantError::InvalidDuration(duration.num_seconds()));
        }
        if !self.store.exists(key).await? {
            return Err(GrantError::NotFound(key.to_string()));
        }

        let expires_at = now
            .checked_add_signed(duration)
            .ok_or(GrantError::InvalidDuration(duration.num_seconds()))?;
        let url = self.store.sign_read_url(key, expires_at)?;
        tracing::debug!(storage_key = key, %expires_at, "issued read grant");
        Ok(AccessGrant::new(key.to_string(), url, now, expires_at))
    }
}
