//! Apply engine: walks every path of a data value against the policy and
//! returns a redacted copy.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::access::Operation;
use crate::error::Result;
use crate::evaluate::Evaluation;
use crate::policy::Policy;
use crate::resolve::RuleMatch;
use crate::user::RoleFilter;
use crate::value::{ensure_container, flatten, parent_path, prune_empty_containers, redact};
use crate::wildcard::is_wildcard;

/// Per-path explanation of an [`Applied`] result.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ApplyTrace {
    /// Roles that decided each evaluated path.
    pub roles: BTreeMap<String, Option<Vec<String>>>,
    /// Rule key(s) that governed each evaluated path.
    pub rules: BTreeMap<String, Option<RuleMatch>>,
}

/// Result of applying a policy to a data value.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Applied {
    /// Redacted copy of the input.
    pub data: Value,
    /// Removed paths in the order they were found. Descendants of a removed
    /// path are never listed.
    pub removals: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<ApplyTrace>,
}

impl<U> Policy<U> {
    /// Removes from a copy of `data` every path `user` may not access for `op`.
    ///
    /// Policy keys are checked first, then every path of the data. Once a path
    /// is removed, its descendants are skipped. Wildcard keys only ever serve
    /// as rules and are never removed themselves. `data` is left untouched.
    ///
    /// # Errors
    /// Returns `AclError::InvalidInput` if `data` is not an object or array,
    /// and `AclError::VariableUndefined` if a governing entry refers to an
    /// undefined variable.
    pub fn apply(
        &self,
        data: &Value,
        user: &U,
        op: Operation,
        filter: Option<RoleFilter<'_>>,
        with_trace: bool,
    ) -> Result<Applied> {
        ensure_container(data)?;
        let working = prune_empty_containers(data)?;
        let paths = flatten(&working)?;
        let roles = self.effective_roles(user, filter);

        let mut removals = Vec::new();
        let mut removed = HashSet::new();
        let mut trace = with_trace.then(ApplyTrace::default);
        let mut evaluated = 0_usize;

        for path in self.entries.keys().chain(paths.keys()) {
            if let Some(ancestor) = removed_ancestor(path, &removed) {
                tracing::trace!(path = %path, removed = %ancestor, "skipping path below a removed one");
                continue;
            }

            evaluated += 1;
            let descriptor = self.get(path)?;
            let evaluation = self.evaluate_with_roles(descriptor.as_deref(), op, &roles);

            if !evaluation.permits(op) && !is_wildcard(path) {
                tracing::debug!(
                    path = %path,
                    access = %evaluation.access,
                    roles = ?evaluation.roles,
                    op = %op,
                    "removing path"
                );
                removed.insert(path.as_str());
                removals.push(path.clone());
            }

            if let Some(trace) = trace.as_mut() {
                trace.rules.insert(path.clone(), self.resolve_keys(path)?);
                trace.roles.insert(path.clone(), evaluation.roles);
            }
        }

        let data = redact(&working, &|path| removed_ancestor(path, &removed).is_some());
        tracing::debug!(
            op = %op,
            evaluated,
            removed = removals.len(),
            "access policy applied"
        );

        Ok(Applied {
            data,
            removals,
            trace,
        })
    }

    /// # Errors
    /// Same as [`Policy::apply`].
    pub fn read(&self, data: &Value, user: &U, filter: Option<RoleFilter<'_>>) -> Result<Applied> {
        self.apply(data, user, Operation::Read, filter, false)
    }

    /// # Errors
    /// Same as [`Policy::apply`].
    pub fn write(&self, data: &Value, user: &U, filter: Option<RoleFilter<'_>>) -> Result<Applied> {
        self.apply(data, user, Operation::Write, filter, false)
    }

    /// # Errors
    /// Same as [`Policy::apply`].
    pub fn create(
        &self,
        data: &Value,
        user: &U,
        filter: Option<RoleFilter<'_>>,
    ) -> Result<Applied> {
        self.apply(data, user, Operation::Create, filter, false)
    }

    /// # Errors
    /// Same as [`Policy::apply`].
    pub fn update(
        &self,
        data: &Value,
        user: &U,
        filter: Option<RoleFilter<'_>>,
    ) -> Result<Applied> {
        self.apply(data, user, Operation::Update, filter, false)
    }

    /// # Errors
    /// Same as [`Policy::apply`].
    pub fn delete(
        &self,
        data: &Value,
        user: &U,
        filter: Option<RoleFilter<'_>>,
    ) -> Result<Applied> {
        self.apply(data, user, Operation::Delete, filter, false)
    }

    /// Resolves and evaluates a single path without any data.
    ///
    /// # Errors
    /// Returns `AclError::VariableUndefined` if the governing entry refers to an
    /// undefined variable.
    pub fn evaluate_path(
        &self,
        path: &str,
        user: &U,
        op: Operation,
        filter: Option<RoleFilter<'_>>,
    ) -> Result<Evaluation> {
        let descriptor = self.get(path)?;
        Ok(self.evaluate(descriptor.as_deref(), user, op, filter))
    }

    /// Whether `path` would survive [`Policy::apply`] for `op`.
    ///
    /// # Errors
    /// Same as [`Policy::evaluate_path`].
    pub fn project(
        &self,
        path: &str,
        user: &U,
        op: Operation,
        filter: Option<RoleFilter<'_>>,
    ) -> Result<bool> {
        Ok(self.evaluate_path(path, user, op, filter)?.permits(op))
    }
}

fn removed_ancestor<'p>(path: &'p str, removed: &HashSet<&str>) -> Option<&'p str> {
    let mut current = Some(path);
    while let Some(candidate) = current {
        if removed.contains(candidate) {
            return Some(candidate);
        }
        current = parent_path(candidate);
    }
    None
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::user::User;
    use serde_json::json;
    use tracing_test::traced_test;

    #[test]
    fn test_removed_ancestor_respects_segments() {
        let removed: HashSet<&str> = ["obj", "list.0"].into_iter().collect();
        assert_eq!(removed_ancestor("obj", &removed), Some("obj"));
        assert_eq!(removed_ancestor("obj.a.b", &removed), Some("obj"));
        assert_eq!(removed_ancestor("objective", &removed), None);
        assert_eq!(removed_ancestor("list.0.x", &removed), Some("list.0"));
        assert_eq!(removed_ancestor("list.01", &removed), None);
    }

    #[test]
    fn test_trace_covers_kept_and_removed_paths() {
        let policy: Policy = Policy::new(&json!({
            "public": "r",
            "secret": { "d": "r", "roles": ["admin"] }
        }))
        .unwrap();
        let data = json!({ "public": 1, "secret": 2, "other": 3 });
        let out = policy
            .apply(&data, &User::new(["admin"]), Operation::Read, None, true)
            .unwrap();
        assert_eq!(out.data, json!({ "public": 1, "secret": 2 }));
        assert_eq!(out.removals, vec!["other".to_owned()]);

        let trace = out.trace.unwrap();
        assert_eq!(trace.roles["secret"], Some(vec!["admin".to_owned()]));
        assert_eq!(trace.roles["public"], None);
        assert_eq!(trace.rules["public"], Some(RuleMatch::Key("public".to_owned())));
        assert_eq!(trace.rules["other"], None);
    }

    #[test]
    fn test_trace_is_absent_unless_requested() {
        let policy: Policy = Policy::new(&json!({ "a": "r" })).unwrap();
        let out = policy.read(&json!({ "a": 1 }), &User::default(), None).unwrap();
        assert!(out.trace.is_none());
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json, json!({ "data": { "a": 1 }, "removals": [] }));
    }

    #[test]
    #[traced_test]
    fn test_removals_are_logged() {
        let policy: Policy = Policy::new(&json!({ "hidden": "n" })).unwrap();
        let out = policy
            .read(&json!({ "hidden": { "a": 1 } }), &User::default(), None)
            .unwrap();
        assert_eq!(out.removals, vec!["hidden".to_owned()]);
        assert!(logs_contain("removing path"));
        assert!(logs_contain("access policy applied"));
    }
}
