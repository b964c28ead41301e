//! In-memory implementation of `PolicyStore`.
//!
//! Relations live in `HashMap`s guarded by a `tokio::sync::RwLock`, so lookups
//! run concurrently. State is loaded from a [`PolicySeed`] and is not durable.
//! The unlink helpers exist for tests and local tooling; the gateway itself
//! only reads.
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repos::error::RepoResult;
use crate::repos::model::{AccessPermission, Role, Service, User};
use crate::repos::seed::PolicySeed;
use crate::repos::store::PolicyStore;

#[derive(Debug, Default)]
struct Relations {
    users: HashMap<String, User>,
    services: HashMap<String, Service>,
    roles: HashMap<Uuid, Role>,
    user_roles: HashMap<Uuid, BTreeSet<Uuid>>,
    service_roles: HashMap<Uuid, BTreeSet<Uuid>>,
    role_permissions: HashMap<Uuid, Vec<AccessPermission>>,
}

impl Relations {
    fn role_id(&self, name: &str) -> Option<Uuid> {
        self.roles
            .values()
            .find(|r| r.name == name)
            .map(|r| r.id)
    }

    fn roles_of(&self, ids: Option<&BTreeSet<Uuid>>) -> Vec<Role> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.roles.get(id).cloned())
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryPolicyStore {
    inner: Arc<RwLock<Relations>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: &PolicySeed) -> RepoResult<Self> {
        seed.validate()?;

        let mut rel = Relations::default();

        for role_seed in &seed.roles {
            let role = Role {
                id: Uuid::new_v4(),
                name: role_seed.name.clone(),
            };
            let permissions = role_seed
                .permissions
                .iter()
                .map(|p| AccessPermission {
                    id: Uuid::new_v4(),
                    action: p.action.clone(),
                    resource_pattern: p.resource.clone(),
                })
                .collect();
            rel.role_permissions.insert(role.id, permissions);
            rel.roles.insert(role.id, role);
        }

        for service_seed in &seed.services {
            let service = Service {
                id: Uuid::new_v4(),
                name: service_seed.name.clone(),
                base_url: service_seed.base_url.clone(),
            };
            // validate() guarantees every referenced role exists
            let role_ids = service_seed
                .roles
                .iter()
                .filter_map(|name| rel.role_id(name))
                .collect();
            rel.service_roles.insert(service.id, role_ids);
            rel.services.insert(service.name.clone(), service);
        }

        for user_seed in &seed.users {
            let user = User {
                id: Uuid::new_v4(),
                email: user_seed.email.clone(),
            };
            let role_ids = user_seed
                .roles
                .iter()
                .filter_map(|name| rel.role_id(name))
                .collect();
            rel.user_roles.insert(user.id, role_ids);
            rel.users.insert(user.email.clone(), user);
        }

        Ok(Self {
            inner: Arc::new(RwLock::new(rel)),
        })
    }

    /// Remove the User→Role association. Returns whether it existed.
    pub async fn unlink_user_role(&self, email: &str, role: &str) -> bool {
        let mut rel = self.inner.write().await;
        let (Some(user_id), Some(role_id)) =
            (rel.users.get(email).map(|u| u.id), rel.role_id(role))
        else {
            return false;
        };
        rel.user_roles
            .get_mut(&user_id)
            .is_some_and(|ids| ids.remove(&role_id))
    }

    /// Remove the Service→Role association. Returns whether it existed.
    pub async fn unlink_service_role(&self, service: &str, role: &str) -> bool {
        let mut rel = self.inner.write().await;
        let (Some(service_id), Some(role_id)) =
            (rel.services.get(service).map(|s| s.id), rel.role_id(role))
        else {
            return false;
        };
        rel.service_roles
            .get_mut(&service_id)
            .is_some_and(|ids| ids.remove(&role_id))
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self.inner.read().await.users.get(email).cloned())
    }

    async fn find_service_by_name(&self, name: &str) -> RepoResult<Option<Service>> {
        Ok(self.inner.read().await.services.get(name).cloned())
    }

    async fn user_roles(&self, user_id: Uuid) -> RepoResult<Vec<Role>> {
        let rel = self.inner.read().await;
        Ok(rel.roles_of(rel.user_roles.get(&user_id)))
    }

    async fn service_roles(&self, service_id: Uuid) -> RepoResult<Vec<Role>> {
        let rel = self.inner.read().await;
        Ok(rel.roles_of(rel.service_roles.get(&service_id)))
    }

    async fn role_permissions(&self, role_id: Uuid) -> RepoResult<Vec<AccessPermission>> {
        Ok(self
            .inner
            .read()
            .await
            .role_permissions
            .get(&role_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> PolicySeed {
        PolicySeed::from_json(
            r#"{
                "roles": [
                    { "name": "USER", "permissions": [{ "action": "GET", "resource": "*" }] },
                    { "name": "ADMIN", "permissions": [{ "action": "*", "resource": "*" }] }
                ],
                "services": [{ "name": "TEST", "base_url": "http://localhost:10000/date", "roles": ["USER"] }],
                "users": [{ "email": "user@c-s.fr", "roles": ["USER", "ADMIN"] }]
            }"#,
        )
        .expect("seed")
    }

    #[tokio::test]
    async fn traverses_relations() {
        let store = MemoryPolicyStore::from_seed(&seed()).expect("store");

        let user = store
            .find_user_by_email("user@c-s.fr")
            .await
            .expect("lookup")
            .expect("user");
        let mut user_roles: Vec<_> = store
            .user_roles(user.id)
            .await
            .expect("roles")
            .into_iter()
            .map(|r| r.name)
            .collect();
        user_roles.sort();
        assert_eq!(user_roles, vec!["ADMIN", "USER"]);

        let service = store
            .find_service_by_name("TEST")
            .await
            .expect("lookup")
            .expect("service");
        let service_roles = store.service_roles(service.id).await.expect("roles");
        assert_eq!(service_roles.len(), 1);

        let permissions = store
            .role_permissions(service_roles[0].id)
            .await
            .expect("permissions");
        assert_eq!(permissions[0].action, "GET");
        assert_eq!(permissions[0].resource_pattern, "*");
    }

    #[tokio::test]
    async fn unknown_keys_are_absent_not_errors() {
        let store = MemoryPolicyStore::from_seed(&seed()).expect("store");
        assert!(store.find_user_by_email("nobody@c-s.fr").await.unwrap().is_none());
        assert!(store.find_service_by_name("UNKNOWN").await.unwrap().is_none());
        assert!(store.user_roles(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unlink_removes_association_once() {
        let store = MemoryPolicyStore::from_seed(&seed()).expect("store");
        assert!(store.unlink_service_role("TEST", "USER").await);
        assert!(!store.unlink_service_role("TEST", "USER").await);
        assert!(!store.unlink_user_role("nobody@c-s.fr", "USER").await);

        let service = store.find_service_by_name("TEST").await.unwrap().unwrap();
        assert!(store.service_roles(service.id).await.unwrap().is_empty());
    }
}
