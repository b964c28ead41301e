//! RBAC decision for one (identity, service, method, path) tuple.
//!
//! `evaluate` is the decision itself: a pure existential predicate over an
//! [`AccessSnapshot`]. `PolicyEngine` only gathers that snapshot from the
//! store, with every lookup bounded by `lookup_timeout`.
//!
//! ALLOW iff some role is in `user.roles ∩ service.roles` and carries a
//! permission whose action and resource pattern match. The outcome does not
//! depend on iteration order.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::repos::error::{RepoError, RepoResult};
use crate::repos::model::{AccessPermission, Role, Service};
use crate::repos::store::PolicyStore;
use crate::services::policy::pattern::permission_matches;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// `role` is the role that granted access (for the decision log).
    Allow { role: String },
    Deny,
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unknown identity")]
    UnknownIdentity,
    #[error("policy store error: {0}")]
    Store(#[from] RepoError),
}

/// Read-only view of the relations relevant to one decision.
#[derive(Debug, Clone, Default)]
pub struct AccessSnapshot {
    pub user_roles: Vec<Role>,
    pub service_roles: BTreeSet<Uuid>,
    pub permissions: HashMap<Uuid, Vec<AccessPermission>>,
}

impl AccessSnapshot {
    /// Roles held by the user that are also permitted on the service.
    pub fn candidate_roles(&self) -> impl Iterator<Item = &Role> {
        self.user_roles
            .iter()
            .filter(|role| self.service_roles.contains(&role.id))
    }
}

pub fn evaluate(snapshot: &AccessSnapshot, method: &str, path: &str) -> Decision {
    snapshot
        .candidate_roles()
        .find(|role| {
            snapshot
                .permissions
                .get(&role.id)
                .is_some_and(|perms| perms.iter().any(|p| permission_matches(p, method, path)))
        })
        .map_or(Decision::Deny, |role| Decision::Allow {
            role: role.name.clone(),
        })
}

#[derive(Clone)]
pub struct PolicyEngine {
    store: Arc<dyn PolicyStore>,
    lookup_timeout: Duration,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("store", &self.store.backend_name())
            .field("lookup_timeout", &self.lookup_timeout)
            .finish()
    }
}

impl PolicyEngine {
    pub fn new(store: Arc<dyn PolicyStore>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            lookup_timeout,
        }
    }

    pub async fn resolve_service(&self, name: &str) -> Result<Option<Service>, PolicyError> {
        Ok(self.bounded(self.store.find_service_by_name(name)).await?)
    }

    pub async fn authorize(
        &self,
        email: &str,
        service: &Service,
        method: &str,
        path: &str,
    ) -> Result<Decision, PolicyError> {
        let snapshot = self.snapshot(email, service).await?;
        Ok(evaluate(&snapshot, method, path))
    }

    /// Gather the relations for `email` on `service`.
    ///
    /// Permissions are only loaded for roles in the intersection.
    pub async fn snapshot(
        &self,
        email: &str,
        service: &Service,
    ) -> Result<AccessSnapshot, PolicyError> {
        let user = self
            .bounded(self.store.find_user_by_email(email))
            .await?
            .ok_or(PolicyError::UnknownIdentity)?;

        let (user_roles, service_roles) = tokio::try_join!(
            self.bounded(self.store.user_roles(user.id)),
            self.bounded(self.store.service_roles(service.id)),
        )?;

        let mut snapshot = AccessSnapshot {
            user_roles,
            service_roles: service_roles.into_iter().map(|r| r.id).collect(),
            permissions: HashMap::new(),
        };

        let candidates: Vec<Uuid> = snapshot.candidate_roles().map(|r| r.id).collect();
        for role_id in candidates {
            let perms = self.bounded(self.store.role_permissions(role_id)).await?;
            snapshot.permissions.insert(role_id, perms);
        }

        Ok(snapshot)
    }

    async fn bounded<T>(&self, lookup: impl Future<Output = RepoResult<T>>) -> RepoResult<T> {
        tokio::time::timeout(self.lookup_timeout, lookup)
            .await
            .map_err(|_| RepoError::Timeout)?
    }
}
