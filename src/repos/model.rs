/*
 * Responsibility
 * - Entities read by the gateway (User / Role / AccessPermission / Service)
 * - Relations are not embedded; they are traversed through `PolicyStore`
 */
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
}

/// `(action, resource_pattern)` pair.
///
/// - `action`: HTTP method token, or `*` for any method
/// - `resource_pattern`: `*`, a literal path, or a `/prefix/*` glob
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AccessPermission {
    pub id: Uuid,
    pub action: String,
    pub resource_pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
}

/// Service names double as the first path segment of a gateway request.
pub fn is_valid_service_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_names_are_single_path_segments() {
        assert!(is_valid_service_name("TEST"));
        assert!(is_valid_service_name("billing-v2"));
        assert!(!is_valid_service_name(""));
        assert!(!is_valid_service_name("a/b"));
    }
}
