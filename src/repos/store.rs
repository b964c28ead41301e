//! Query interface over the identity & policy relations.
use async_trait::async_trait;
use uuid::Uuid;

use crate::repos::error::RepoResult;
use crate::repos::model::{AccessPermission, Role, Service, User};

/// Read-only lookups the policy engine and router depend on.
///
/// Implementations must support concurrent readers; the gateway never writes.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    // Store backend name (for logging).
    fn backend_name(&self) -> &'static str;

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    async fn find_service_by_name(&self, name: &str) -> RepoResult<Option<Service>>;

    async fn user_roles(&self, user_id: Uuid) -> RepoResult<Vec<Role>>;

    async fn service_roles(&self, service_id: Uuid) -> RepoResult<Vec<Role>>;

    async fn role_permissions(&self, role_id: Uuid) -> RepoResult<Vec<AccessPermission>>;
}
