//! Admin allow-list gate.

use std::collections::BTreeSet;
use std::sync::Arc;

use pterobot_types::{AdminPrincipal, PlatformUserId};

/// Decides whether a caller may run privileged actions.
///
/// A pure membership test against an allow-list fixed at construction.
/// Clones share the same list.
#[derive(Debug, Clone)]
pub struct PermissionGate {
    allow_list: Arc<BTreeSet<PlatformUserId>>,
}

impl PermissionGate {
    /// Build a gate over the given allow-list.
    pub fn new(allow_list: BTreeSet<PlatformUserId>) -> Self {
        Self {
            allow_list: Arc::new(allow_list),
        }
    }

    /// Whether `principal` is on the allow-list.
    pub fn authorize(&self, principal: AdminPrincipal) -> bool {
        self.allow_list.contains(&principal.id())
    }

    /// Number of allowed callers.
    pub fn len(&self) -> usize {
        self.allow_list.len()
    }

    /// Whether nobody is allowed.
    pub fn is_empty(&self) -> bool {
        self.allow_list.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_decides() {
        let gate = PermissionGate::new([PlatformUserId(1), PlatformUserId(2)].into());
        assert!(gate.authorize(AdminPrincipal(PlatformUserId(1))));
        assert!(!gate.authorize(AdminPrincipal(PlatformUserId(3))));
        assert_eq!(gate.len(), 2);
    }

    #[test]
    fn empty_gate_denies_everyone() {
        let gate = PermissionGate::new(BTreeSet::new());
        assert!(gate.is_empty());
        assert!(!gate.authorize(AdminPrincipal(PlatformUserId(0))));
    }
}
