use std::collections::{BTreeMap, BTreeSet};

use skein_types::rbac::ALL_SUBJECTS;
use skein_types::{Group, Subject, SubjectType};

/// Whether `group` holds a member accepted by `matches`, following nested
/// group subjects. Each group is expanded at most once, so membership cycles
/// terminate. Unknown groups have no members.
pub(crate) fn group_contains(
    groups: &BTreeMap<String, Group>,
    group: &str,
    matches: &dyn Fn(&Subject) -> bool,
) -> bool {
    let mut visited = BTreeSet::new();
    let mut stack = vec![group];
    while let Some(name) = stack.pop() {
        if !visited.insert(name) {
            continue;
        }
        let Some(g) = groups.get(name) else {
            continue;
        };
        for subject in &g.subjects {
            if subject.kind == SubjectType::Group {
                if subject.name == ALL_SUBJECTS {
                    // A wildcard group reference pulls in every group.
                    stack.extend(groups.keys().map(String::as_str));
                } else {
                    stack.push(&subject.name);
                }
            } else if matches(subject) {
                return true;
            }
        }
    }
    false
}

/// Subject name equals `name` or is the `*` wildcard.
pub(crate) fn names(subject: &Subject, name: &str) -> bool {
    subject.name == name || subject.name == ALL_SUBJECTS
}
