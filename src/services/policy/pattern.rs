//! Matching rules for `AccessPermission` entries.
//!
//! Resource patterns:
//! - `*` matches every path, including `/`
//! - `/prefix/*` matches any path that starts with `/prefix/`
//! - anything else must match the path exactly
//!
//! No other glob syntax is recognised.

use crate::repos::model::AccessPermission;

pub const ANY: &str = "*";

/// HTTP methods compare ASCII case-insensitively; `*` matches any method.
pub fn action_matches(action: &str, method: &str) -> bool {
    action == ANY || action.eq_ignore_ascii_case(method)
}

pub fn path_matches(pattern: &str, path: &str) -> bool {
    if pattern == ANY {
        return true;
    }
    match pattern.strip_suffix(ANY) {
        // "/foo/*" keeps the trailing slash so "/foobar" does not match
        Some(prefix) if prefix.ends_with('/') => path.starts_with(prefix),
        _ => pattern == path,
    }
}

pub fn permission_matches(permission: &AccessPermission, method: &str, path: &str) -> bool {
    action_matches(&permission.action, method) && path_matches(&permission.resource_pattern, path)
}
