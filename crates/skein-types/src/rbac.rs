use crate::validate::check_id;
use crate::SkeinError;

pub const MESH_ADMIN_ROLE: &str = "mesh-admin";
pub const MESH_ADMIN_ROLE_BINDING: &str = "mesh-admin";
pub const VOTERS_ROLE: &str = "voters";
pub const VOTERS_GROUP: &str = "voters";
pub const BOOTSTRAP_VOTERS_ROLE_BINDING: &str = "bootstrap-voters";

/// Subject name matching every caller.
pub const ALL_SUBJECTS: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Resource {
    Votes,
    Roles,
    RoleBindings,
    Groups,
    NetworkAcls,
    Routes,
    DataChannels,
    Edges,
    Observers,
    Nodes,
    MeshDns,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Verb {
    Put,
    Get,
    Delete,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rule {
    pub resources: Vec<Resource>,
    pub verbs: Vec<Verb>,
    /// Empty means every name.
    pub resource_names: Vec<String>,
}

impl Rule {
    pub fn new(resources: Vec<Resource>, verbs: Vec<Verb>) -> Self {
        Rule { resources, verbs, resource_names: Vec::new() }
    }

    pub fn allows(&self, resource: Resource, verb: Verb, target: &str) -> bool {
        let resource_ok = self.resources.iter().any(|r| *r == Resource::All || *r == resource);
        let verb_ok = self.verbs.iter().any(|v| *v == Verb::All || *v == verb);
        let name_ok = self.resource_names.is_empty()
            || self.resource_names.iter().any(|n| n == target || n == ALL_SUBJECTS);
        resource_ok && verb_ok && name_ok
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Role {
    pub name: String,
    pub rules: Vec<Rule>,
}

impl Role {
    pub fn validate(&self) -> Result<(), SkeinError> {
        check_id("role", &self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum SubjectType {
    Node,
    User,
    Group,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Subject {
    pub kind: SubjectType,
    pub name: String,
}

impl Subject {
    pub fn new(kind: SubjectType, name: impl Into<String>) -> Self {
        Subject { kind, name: name.into() }
    }

    pub fn node(name: impl Into<String>) -> Self {
        Subject::new(SubjectType::Node, name)
    }

    pub fn user(name: impl Into<String>) -> Self {
        Subject::new(SubjectType::User, name)
    }

    pub fn group(name: impl Into<String>) -> Self {
        Subject::new(SubjectType::Group, name)
    }

    fn validate(&self) -> Result<(), SkeinError> {
        if self.name == ALL_SUBJECTS {
            return Ok(());
        }
        check_id("subject", &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RoleBinding {
    pub name: String,
    pub role: String,
    pub subjects: Vec<Subject>,
}

impl RoleBinding {
    pub fn validate(&self) -> Result<(), SkeinError> {
        check_id("role binding", &self.name)?;
        check_id("role", &self.role)?;
        self.subjects.iter().try_for_each(Subject::validate)
    }

    /// Flattens every `All` subject into a Node, a User and a Group subject
    /// of the same name. This is the stored form of a binding.
    pub fn expand_all_subjects(mut self) -> Self {
        let mut out = Vec::with_capacity(self.subjects.len());
        for s in self.subjects.drain(..) {
            match s.kind {
                SubjectType::All => {
                    out.push(Subject::node(s.name.clone()));
                    out.push(Subject::user(s.name.clone()));
                    out.push(Subject::group(s.name));
                }
                _ => out.push(s),
            }
        }
        self.subjects = out;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Group {
    pub name: String,
    pub subjects: Vec<Subject>,
}

impl Group {
    pub fn validate(&self) -> Result<(), SkeinError> {
        check_id("group", &self.name)?;
        self.subjects.iter().try_for_each(Subject::validate)
    }
}
