//! `Namespace` (spec.md §3): a named, ordered bundle of backends with
//! per-backend-tool visibility overrides.

use super::backend::{ToolOverride, ToolOverrideStatus};
use super::ids::{BackendId, NamespaceId, OrgId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    pub id: NamespaceId,
    pub org: OrgId,
    pub name: String,
    /// Ordered set of member backend ids: declaration order is the
    /// fan-out merge order for list operations (spec.md §4.3 "Fan-out
    /// ordering").
    pub members: Vec<BackendId>,
    #[serde(default)]
    pub tool_overrides: Vec<ToolOverride>,
    /// Backend targeted by `completion/complete`, required per the
    /// decision recorded in DESIGN.md (no heuristic guessing).
    #[serde(default)]
    pub sampling_backend: Option<BackendId>,
    /// Tolerates a partial failure of the eager per-member `initialize`
    /// handshake at session creation (spec.md §4.2 step 3): a member that
    /// fails to initialize is marked unhealthy and excluded rather than
    /// failing the whole session. `false` (the default) requires every
    /// member to initialize successfully.
    #[serde(default)]
    pub soft_init: bool,
}

/// Namespace name charset permitted per spec.md §3/§8: `[A-Za-z0-9_-]`,
/// length 3-50.
#[must_use]
pub fn is_valid_namespace_name(name: &str) -> bool {
    (3..=50).contains(&name.chars().count())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl Namespace {
    /// `true` iff `backend_id` is a member and not overridden to
    /// `INACTIVE` for `tool_name` (spec.md §3 "A tool is visible via the
    /// namespace iff...").
    #[must_use]
    pub fn tool_is_visible(&self, backend_id: BackendId, tool_name: &str) -> bool {
        if !self.members.contains(&backend_id) {
            return false;
        }
        !self.tool_overrides.iter().any(|o| {
            o.backend_id == backend_id
                && o.tool_name == tool_name
                && o.status == ToolOverrideStatus::Inactive
        })
    }

    /// Adds a member id if not already present (membership is a set, no
    /// duplicates, per spec.md §3).
    pub fn add_member(&mut self, backend_id: BackendId) {
        if !self.members.contains(&backend_id) {
            self.members.push(backend_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(members: Vec<BackendId>) -> Namespace {
        Namespace {
            id: NamespaceId::new(),
            org: OrgId::new(),
            name: "ns1".into(),
            members,
            tool_overrides: Vec::new(),
            sampling_backend: None,
            soft_init: false,
        }
    }

    #[test]
    fn non_member_backend_tool_is_not_visible() {
        let backend = BackendId::new();
        let namespace = ns(vec![]);
        assert!(!namespace.tool_is_visible(backend, "t1"));
    }

    #[test]
    fn member_backend_tool_is_visible_by_default() {
        let backend = BackendId::new();
        let namespace = ns(vec![backend]);
        assert!(namespace.tool_is_visible(backend, "t1"));
    }

    #[test]
    fn inactive_override_hides_the_tool() {
        let backend = BackendId::new();
        let mut namespace = ns(vec![backend]);
        namespace.tool_overrides.push(ToolOverride {
            backend_id: backend,
            tool_name: "t1".into(),
            status: ToolOverrideStatus::Inactive,
        });
        assert!(!namespace.tool_is_visible(backend, "t1"));
        assert!(namespace.tool_is_visible(backend, "t2"));
    }

    #[test]
    fn adding_the_same_member_twice_is_a_no_op() {
        let backend = BackendId::new();
        let mut namespace = ns(vec![]);
        namespace.add_member(backend);
        namespace.add_member(backend);
        assert_eq!(namespace.members.len(), 1);
    }

    #[test]
    fn namespace_name_charset_and_length() {
        assert!(is_valid_namespace_name("ns1"));
        assert!(is_valid_namespace_name("my-namespace_1"));
        assert!(!is_valid_namespace_name("ab"));
        assert!(!is_valid_namespace_name("has space"));
        assert!(!is_valid_namespace_name(&"a".repeat(51)));
    }
}
