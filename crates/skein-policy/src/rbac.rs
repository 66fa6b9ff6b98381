use std::collections::BTreeMap;

use skein_storage::{repo, MeshRead};
use skein_types::{Group, Resource, Role, RoleBinding, SkeinError, SubjectType, Verb};

use crate::groups::{group_contains, names};

/// A request to perform `verb` on the `resource` named `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub resource: Resource,
    pub verb: Verb,
    pub target: String,
}

impl Action {
    pub fn new(resource: Resource, verb: Verb, target: impl Into<String>) -> Self {
        Action { resource, verb, target: target.into() }
    }
}

/// Role-based access decisions over one consistent load of roles, bindings
/// and groups.
#[derive(Debug, Clone)]
pub struct RbacEvaluator {
    enabled: bool,
    roles: BTreeMap<String, Role>,
    bindings: Vec<RoleBinding>,
    groups: BTreeMap<String, Group>,
}

impl RbacEvaluator {
    pub fn new(enabled: bool, roles: Vec<Role>, bindings: Vec<RoleBinding>, groups: Vec<Group>) -> Self {
        RbacEvaluator {
            enabled,
            roles: roles.into_iter().map(|r| (r.name.clone(), r)).collect(),
            bindings,
            groups: groups.into_iter().map(|g| (g.name.clone(), g)).collect(),
        }
    }

    pub async fn load<S: MeshRead>(store: &S) -> Result<Self, SkeinError> {
        let enabled = repo::rbac_enabled(store).await?;
        let roles = repo::list::<Role, S>(store).await?;
        let bindings = repo::list::<RoleBinding, S>(store).await?;
        let groups = repo::list::<Group, S>(store).await?;
        Ok(RbacEvaluator::new(enabled, roles, bindings, groups))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether `caller` may perform `action`. Denied unless some role bound
    /// to the caller has a rule granting it; always allowed while RBAC is
    /// disabled.
    pub fn evaluate(&self, caller: &str, action: &Action) -> bool {
        if !self.enabled {
            return true;
        }
        let granted = self.roles_for(caller).iter().any(|role| {
            role.rules.iter().any(|rule| rule.allows(action.resource, action.verb, &action.target))
        });
        tracing::debug!(
            caller,
            resource = ?action.resource,
            verb = ?action.verb,
            target = %action.target,
            granted,
            "rbac evaluation"
        );
        granted
    }

    /// Roles bound to `caller` directly, by wildcard, or through a group.
    /// Bindings to roles that do not exist are ignored.
    pub fn roles_for(&self, caller: &str) -> Vec<&Role> {
        let mut out: Vec<&Role> = Vec::new();
        for binding in self.bindings.iter().filter(|b| self.binds(b, caller)) {
            match self.roles.get(&binding.role) {
                Some(role) if !out.iter().any(|r| r.name == role.name) => out.push(role),
                Some(_) => {}
                None => {
                    tracing::debug!(binding = %binding.name, role = %binding.role, "binding names missing role");
                }
            }
        }
        out
    }

    fn binds(&self, binding: &RoleBinding, caller: &str) -> bool {
        binding.subjects.iter().any(|s| match s.kind {
            SubjectType::Node | SubjectType::User | SubjectType::All => names(s, caller),
            SubjectType::Group => {
                s.name == skein_types::rbac::ALL_SUBJECTS
                    || group_contains(&self.groups, &s.name, &|m| names(m, caller))
            }
        })
    }
}
