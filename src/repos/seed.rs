//! JSON seed document for the in-memory store.
//!
//! ```json
//! {
//!   "roles":    [{ "name": "USER", "permissions": [{ "action": "GET", "resource": "*" }] }],
//!   "services": [{ "name": "TEST", "base_url": "http://localhost:10000/date", "roles": ["USER"] }],
//!   "users":    [{ "email": "user@c-s.fr", "roles": ["USER"] }]
//! }
//! ```
use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::repos::error::{RepoError, RepoResult};
use crate::repos::model::is_valid_service_name;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicySeed {
    #[serde(default)]
    pub roles: Vec<RoleSeed>,
    #[serde(default)]
    pub services: Vec<ServiceSeed>,
    #[serde(default)]
    pub users: Vec<UserSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleSeed {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<PermissionSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionSeed {
    pub action: String,
    pub resource: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSeed {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserSeed {
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl PolicySeed {
    pub fn from_json(raw: &str) -> RepoResult<Self> {
        let seed: Self =
            serde_json::from_str(raw).map_err(|e| RepoError::InvalidSeed(e.to_string()))?;
        seed.validate()?;
        Ok(seed)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RepoError::InvalidSeed(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    /// Reject documents that would break store invariants.
    pub fn validate(&self) -> RepoResult<()> {
        let mut role_names = HashSet::new();
        for role in &self.roles {
            if role.name.trim().is_empty() {
                return Err(RepoError::InvalidSeed("empty role name".into()));
            }
            if !role_names.insert(role.name.as_str()) {
                return Err(RepoError::InvalidSeed(format!(
                    "duplicate role '{}'",
                    role.name
                )));
            }
            for permission in &role.permissions {
                if permission.action.trim().is_empty() || permission.resource.trim().is_empty() {
                    return Err(RepoError::InvalidSeed(format!(
                        "role '{}' has an empty permission",
                        role.name
                    )));
                }
            }
        }

        let mut service_names = HashSet::new();
        for service in &self.services {
            if !is_valid_service_name(&service.name) {
                return Err(RepoError::InvalidSeed(format!(
                    "invalid service name '{}'",
                    service.name
                )));
            }
            if !service_names.insert(service.name.as_str()) {
                return Err(RepoError::InvalidSeed(format!(
                    "duplicate service '{}'",
                    service.name
                )));
            }
            match url::Url::parse(&service.base_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                _ => {
                    return Err(RepoError::InvalidSeed(format!(
                        "service '{}' has an invalid base_url",
                        service.name
                    )));
                }
            }
            check_role_refs(&role_names, &service.roles, &service.name)?;
        }

        let mut emails = HashSet::new();
        for user in &self.users {
            if user.email.trim().is_empty() {
                return Err(RepoError::InvalidSeed("empty user email".into()));
            }
            if !emails.insert(user.email.as_str()) {
                return Err(RepoError::InvalidSeed(format!(
                    "duplicate user '{}'",
                    user.email
                )));
            }
            check_role_refs(&role_names, &user.roles, &user.email)?;
        }

        Ok(())
    }
}

fn check_role_refs(known: &HashSet<&str>, refs: &[String], owner: &str) -> RepoResult<()> {
    match refs.iter().find(|r| !known.contains(r.as_str())) {
        Some(missing) => Err(RepoError::InvalidSeed(format!(
            "'{}' references unknown role '{}'",
            owner, missing
        ))),
        None => Ok(()),
    }
}
