//! Policy table: explicit path entries plus the variable table.
//!
//! A policy is validated once when it is built and is read-only afterwards, so
//! one instance can serve any number of concurrent callers.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::access::Access;
use crate::descriptor::{Descriptor, VARIABLE_PREFIX};
use crate::error::{AclError, Result};
use crate::user::{HasRoles, RoleFn, User};
use crate::wildcard::{WildcardMatcher, is_wildcard};

/// Variables every policy starts with.
pub const BUILTIN_VARIABLES: [(&str, Access); 16] = [
    ("@n", Access::None),
    ("@none", Access::None),
    ("@null", Access::None),
    ("@never", Access::Never),
    ("@r", Access::Read),
    ("@read", Access::Read),
    ("@w", Access::Write),
    ("@write", Access::Write),
    ("@rw", Access::ReadWrite),
    ("@readWrite", Access::ReadWrite),
    ("@c", Access::Create),
    ("@create", Access::Create),
    ("@u", Access::Update),
    ("@update", Access::Update),
    ("@d", Access::Delete),
    ("@delete", Access::Delete),
];

/// Construction options.
pub struct PolicyOptions<U = User> {
    strict: bool,
    get_roles: RoleFn<U>,
    variables: Map<String, Value>,
}

impl<U: HasRoles + 'static> Default for PolicyOptions<U> {
    fn default() -> Self {
        Self::with_roles(|user: &U| user.roles())
    }
}

impl<U> PolicyOptions<U> {
    /// Strict options that read roles through `get_roles`.
    #[must_use]
    pub fn with_roles<F>(get_roles: F) -> Self
    where
        F: Fn(&U) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            strict: true,
            get_roles: Arc::new(get_roles),
            variables: Map::new(),
        }
    }

    /// `false` lets paths without any rule through instead of denying them.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Adds a variable; entries of the same name in the document win.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, descriptor: Value) -> Self {
        self.variables.insert(name.into(), descriptor);
        self
    }

    #[must_use]
    pub fn variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }
}

impl<U> Clone for PolicyOptions<U> {
    fn clone(&self) -> Self {
        Self {
            strict: self.strict,
            get_roles: Arc::clone(&self.get_roles),
            variables: self.variables.clone(),
        }
    }
}

impl<U> fmt::Debug for PolicyOptions<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyOptions")
            .field("strict", &self.strict)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

/// Settings a derived policy replaces or adds on top of its source.
pub struct PolicyOverrides<U = User> {
    strict: Option<bool>,
    get_roles: Option<RoleFn<U>>,
    variables: Map<String, Value>,
}

impl<U> Default for PolicyOverrides<U> {
    fn default() -> Self {
        Self {
            strict: None,
            get_roles: None,
            variables: Map::new(),
        }
    }
}

impl<U> PolicyOverrides<U> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    #[must_use]
    pub fn get_roles<F>(mut self, get_roles: F) -> Self
    where
        F: Fn(&U) -> Vec<String> + Send + Sync + 'static,
    {
        self.get_roles = Some(Arc::new(get_roles));
        self
    }

    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, descriptor: Value) -> Self {
        self.variables.insert(name.into(), descriptor);
        self
    }
}

/// A validated access policy.
pub struct Policy<U = User> {
    pub(crate) entries: BTreeMap<String, Descriptor>,
    pub(crate) variables: BTreeMap<String, Descriptor>,
    original: Map<String, Value>,
    pub(crate) strict: bool,
    pub(crate) get_roles: RoleFn<U>,
    pub(crate) wildcards: WildcardMatcher,
}

impl<U: HasRoles + 'static> Policy<U> {
    /// Builds a strict policy that reads roles through [`HasRoles`].
    ///
    /// # Errors
    /// See [`Policy::from_json`].
    pub fn new(document: &Value) -> Result<Self> {
        Self::from_json(document, PolicyOptions::default())
    }
}

impl<U> Policy<U> {
    /// Builds a policy from a JSON object.
    ///
    /// Keys starting with `@` define variables, every other key is a path
    /// rule, possibly with `*` segments.
    ///
    /// # Errors
    /// Returns `AclError::InvalidInput` if `document` is not an object, and any
    /// error of [`Policy::from_map`].
    pub fn from_json(document: &Value, options: PolicyOptions<U>) -> Result<Self> {
        let Value::Object(document) = document else {
            return Err(AclError::InvalidInput(format!(
                "policy document must be an object, got '{document}'"
            )));
        };
        Self::from_map(document.clone(), options)
    }

    /// Builds a policy from an already split-out JSON map.
    ///
    /// # Errors
    /// Returns `AclError::InvalidDescriptor` or `AclError::InvalidRolePattern`
    /// for a malformed descriptor and `AclError::CyclicVariable` when variables
    /// refer to each other in a loop.
    pub fn from_map(document: Map<String, Value>, options: PolicyOptions<U>) -> Result<Self> {
        let PolicyOptions {
            strict,
            get_roles,
            variables: extra,
        } = options;

        let mut variables = builtin_variables();
        for (name, raw) in &extra {
            insert_variable(&mut variables, name, raw)?;
        }

        let mut entries = BTreeMap::new();
        for (key, raw) in &document {
            if key.starts_with(VARIABLE_PREFIX) {
                insert_variable(&mut variables, key, raw)?;
            } else {
                let descriptor = Descriptor::parse(raw).map_err(|e| at_key(key, e))?;
                entries.insert(key.clone(), descriptor);
            }
        }
        check_cycles(&variables)?;

        let wildcards = WildcardMatcher::new();
        for key in entries.keys().filter(|key| is_wildcard(key)) {
            wildcards.compile(key)?;
        }

        tracing::debug!(
            entries = entries.len(),
            variables = variables.len(),
            wildcards = wildcards.len(),
            strict,
            "access policy built"
        );

        Ok(Self {
            entries,
            variables,
            original: document,
            strict,
            get_roles,
            wildcards,
        })
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// The document this policy was built from.
    #[must_use]
    pub fn original(&self) -> &Map<String, Value> {
        &self.original
    }

    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, Descriptor> {
        &self.entries
    }

    /// Every variable, built-ins included.
    #[must_use]
    pub fn variables(&self) -> &BTreeMap<String, Descriptor> {
        &self.variables
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Descriptor> {
        self.variables.get(name)
    }

    /// An independent copy with the same settings.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// An independent copy with `overrides` applied.
    ///
    /// Entries are reused as they are; only the added variables are parsed.
    /// Added variables replace option variables of the same name, while `@`
    /// keys of the source document keep their definition.
    ///
    /// # Errors
    /// Returns `AclError::InvalidDescriptor` or `AclError::InvalidRolePattern`
    /// for a malformed added variable and `AclError::CyclicVariable` if the
    /// merged variables form a loop.
    pub fn copy_with(&self, overrides: PolicyOverrides<U>) -> Result<Self> {
        let PolicyOverrides {
            strict,
            get_roles,
            variables: extra,
        } = overrides;

        let mut variables = self.variables.clone();
        for (name, raw) in &extra {
            if self.original.contains_key(name) {
                tracing::debug!(variable = %name, "document variable kept over override");
                continue;
            }
            insert_variable(&mut variables, name, raw)?;
        }
        check_cycles(&variables)?;

        Ok(Self {
            entries: self.entries.clone(),
            variables,
            original: self.original.clone(),
            strict: strict.unwrap_or(self.strict),
            get_roles: get_roles.unwrap_or_else(|| Arc::clone(&self.get_roles)),
            wildcards: self.wildcards.clone(),
        })
    }

    /// Wire form of the policy: user variables followed by path entries.
    ///
    /// Built-in variables are left out unless they were redefined.
    #[must_use]
    pub fn to_json(&self) -> Map<String, Value> {
        let builtins = builtin_variables();
        let mut out = Map::new();
        for (name, descriptor) in &self.variables {
            if builtins.get(name) == Some(descriptor) {
                continue;
            }
            out.insert(name.clone(), descriptor.to_json());
        }
        for (key, descriptor) in &self.entries {
            out.insert(key.clone(), descriptor.to_json());
        }
        out
    }

    /// Path entries with every variable reference replaced by its value.
    ///
    /// References to undefined variables are dropped, and so is an entry left
    /// with nothing.
    ///
    /// # Errors
    /// Returns `AclError::NotImplemented` when a referenced variable is itself
    /// just another variable reference.
    pub fn to_json_flushed(&self) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        for (key, descriptor) in &self.entries {
            if let Some(inlined) = self.inline(descriptor)? {
                out.insert(key.clone(), inlined.to_json());
            }
        }
        Ok(out)
    }

    fn inline(&self, descriptor: &Descriptor) -> Result<Option<Descriptor>> {
        match descriptor {
            Descriptor::Variable(name) => {
                let Some(value) = self.variables.get(name) else {
                    return Ok(None);
                };
                if let Descriptor::Variable(inner) = value {
                    return Err(AclError::NotImplemented(format!(
                        "flushing variable '{name}' that refers to variable '{inner}'"
                    )));
                }
                self.inline(value)
            }
            Descriptor::List(items) => {
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(inlined) = self.inline(item)? {
                        kept.push(inlined);
                    }
                }
                Ok((!kept.is_empty()).then_some(Descriptor::List(kept)))
            }
            other => Ok(Some(other.clone())),
        }
    }

    /// `key: value` lines, shortest keys first.
    ///
    /// # Errors
    /// Same as [`Policy::to_json_flushed`] when `flush` is set.
    pub fn render(&self, flush: bool) -> Result<String> {
        let json = if flush {
            self.to_json_flushed()?
        } else {
            self.to_json()
        };
        Ok(render_lines(json))
    }
}

impl<U> Clone for Policy<U> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            variables: self.variables.clone(),
            original: self.original.clone(),
            strict: self.strict,
            get_roles: Arc::clone(&self.get_roles),
            wildcards: self.wildcards.clone(),
        }
    }
}

impl<U> fmt::Debug for Policy<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("entries", &self.entries)
            .field("variables", &self.variables.len())
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

impl<U> fmt::Display for Policy<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_lines(self.to_json()))
    }
}

fn render_lines(json: Map<String, Value>) -> String {
    let mut lines: Vec<(String, String)> = json
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(text) => (key, text),
            other => (key, other.to_string()),
        })
        .collect();
    lines.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

    lines
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn builtin_variables() -> BTreeMap<String, Descriptor> {
    BUILTIN_VARIABLES
        .iter()
        .map(|(name, access)| ((*name).to_owned(), Descriptor::from_access(*access)))
        .collect()
}

fn insert_variable(
    variables: &mut BTreeMap<String, Descriptor>,
    name: &str,
    raw: &Value,
) -> Result<()> {
    if !name.starts_with(VARIABLE_PREFIX) || name.len() == 1 {
        return Err(AclError::InvalidDescriptor(format!(
            "variable name '{name}' must be '@' followed by a name"
        )));
    }
    let descriptor = Descriptor::parse(raw).map_err(|e| at_key(name, e))?;
    variables.insert(name.to_owned(), descriptor);
    Ok(())
}

fn at_key(key: &str, err: AclError) -> AclError {
    match err {
        AclError::InvalidDescriptor(msg) => AclError::InvalidDescriptor(format!("'{key}': {msg}")),
        other => other,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Rejects variables that reach themselves through references.
fn check_cycles(variables: &BTreeMap<String, Descriptor>) -> Result<()> {
    let mut visits = HashMap::new();
    for name in variables.keys() {
        visit(name, variables, &mut visits)?;
    }
    Ok(())
}

fn visit<'a>(
    name: &'a str,
    variables: &'a BTreeMap<String, Descriptor>,
    visits: &mut HashMap<&'a str, Visit>,
) -> Result<()> {
    match visits.get(name) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => return Err(AclError::CyclicVariable(name.to_owned())),
        None => {}
    }
    // Undefined references are reported when a path actually resolves them.
    let Some(descriptor) = variables.get(name) else {
        return Ok(());
    };

    visits.insert(name, Visit::InProgress);
    let mut refs = Vec::new();
    descriptor.variable_refs(&mut refs);
    for referenced in refs {
        visit(referenced, variables, visits)?;
    }
    visits.insert(name, Visit::Done);
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(document: &Value) -> Policy {
        Policy::new(document).unwrap()
    }

    #[test]
    fn test_document_is_split_into_entries_and_variables() {
        let policy = build(&json!({
            "@custom": "r",
            "a.b": "@custom",
            "a.*": "rw"
        }));
        assert_eq!(
            policy.entries().keys().collect::<Vec<_>>(),
            vec!["a.*", "a.b"]
        );
        assert_eq!(
            policy.variable("@custom"),
            Some(&Descriptor::Simple(Access::Read))
        );
        assert_eq!(policy.variable("@never"), Some(&Descriptor::Never));
        assert!(policy.is_strict());
    }

    #[test]
    fn test_document_variables_override_option_variables() {
        let options = PolicyOptions::<User>::default()
            .variable("@x", json!("r"))
            .variable("@y", json!("w"));
        let policy = Policy::from_json(&json!({ "@x": "d" }), options).unwrap();
        assert_eq!(policy.variable("@x"), Some(&Descriptor::Simple(Access::Delete)));
        assert_eq!(policy.variable("@y"), Some(&Descriptor::Simple(Access::Write)));
    }

    #[test]
    fn test_rejects_non_object_document() {
        let err = Policy::<User>::new(&json!(["r"])).unwrap_err();
        assert!(matches!(err, AclError::InvalidInput(_)));
    }

    #[test]
    fn test_invalid_descriptor_names_the_key() {
        let err = Policy::<User>::new(&json!({ "a.b": [] })).unwrap_err();
        assert!(err.to_string().contains("'a.b'"), "{err}");

        let err = Policy::<User>::new(&json!({ "@v": { "d": "r", "roles": "admin" } })).unwrap_err();
        assert!(err.to_string().contains("must be an array"), "{err}");
    }

    #[test]
    fn test_rejects_cyclic_variables() {
        let err = Policy::<User>::new(&json!({ "@a": "@b", "@b": ["r", "@a"] })).unwrap_err();
        assert!(matches!(err, AclError::CyclicVariable(_)));

        let err = Policy::<User>::new(&json!({ "@self": "@self" })).unwrap_err();
        assert!(matches!(err, AclError::CyclicVariable(_)));
    }

    #[test]
    fn test_variable_chains_are_allowed() {
        let policy = build(&json!({ "@a": "@b", "@b": ["@c", "w"], "@c": "r", "x": "@a" }));
        assert_eq!(policy.variable("@a"), Some(&Descriptor::Variable("@b".to_owned())));
    }

    #[test]
    fn test_wildcards_are_compiled_at_build_time() {
        let policy = build(&json!({ "a.*": "r", "b.*.c": "r", "plain": "r" }));
        assert_eq!(policy.wildcards.len(), 2);
    }

    #[test]
    fn test_original_returns_document() {
        let document = json!({ "@v": "r", "a": "@v" });
        let policy = build(&document);
        assert_eq!(Value::Object(policy.original().clone()), document);
    }

    #[test]
    fn test_copy_with_overrides() {
        let policy = build(&json!({ "a": "@extra" }));
        assert!(policy.variable("@extra").is_none());

        let derived = policy
            .copy_with(
                PolicyOverrides::new()
                    .strict(false)
                    .variable("@extra", json!("rw"))
                    .get_roles(|_: &User| vec!["fixed".to_owned()]),
            )
            .unwrap();
        assert!(!derived.is_strict());
        assert_eq!(
            derived.variable("@extra"),
            Some(&Descriptor::Simple(Access::ReadWrite))
        );
        assert_eq!((derived.get_roles)(&User::default()), vec!["fixed".to_owned()]);

        // The source is untouched.
        assert!(policy.is_strict());
        assert!(policy.variable("@extra").is_none());
    }

    #[test]
    fn test_copy_with_keeps_document_variables() {
        let options = PolicyOptions::<User>::default().variable("@opt", json!("r"));
        let policy = Policy::from_json(&json!({ "@doc": "w", "a": "@doc" }), options).unwrap();

        let derived = policy
            .copy_with(
                PolicyOverrides::new()
                    .variable("@doc", json!("never"))
                    .variable("@opt", json!("rw")),
            )
            .unwrap();
        assert_eq!(
            derived.variable("@doc"),
            Some(&Descriptor::Simple(Access::Write))
        );
        assert_eq!(
            derived.variable("@opt"),
            Some(&Descriptor::Simple(Access::ReadWrite))
        );
    }

    #[test]
    fn test_copy_with_rechecks_cycles() {
        let policy = build(&json!({ "@a": "@b" }));
        let err = policy
            .copy_with(PolicyOverrides::new().variable("@b", json!("@a")))
            .unwrap_err();
        assert!(matches!(err, AclError::CyclicVariable(_)));
    }

    #[test]
    fn test_to_json_leaves_out_unchanged_builtins() {
        let policy = build(&json!({
            "@custom": ["r", { "d": "w", "roles": ["regex#^tenant_.*$#"] }],
            "@r": "w",
            "example": "@custom"
        }));
        let json = Value::Object(policy.to_json());
        assert_eq!(
            json,
            json!({
                "@custom": ["r", { "d": "w", "roles": ["regex#^tenant_.*$#"] }],
                "@r": "w",
                "example": "@custom"
            })
        );
    }

    #[test]
    fn test_flush_inlines_variables() {
        let policy = build(&json!({
            "@aread": { "d": "r", "roles": ["a"] },
            "@awrite": { "d": "w", "roles": ["a"] },
            "@arw": ["@aread", "@awrite"],
            "x": "@arw",
            "y": ["@missing", "@r"],
            "z": "@missing"
        }));
        let flushed = Value::Object(policy.to_json_flushed().unwrap());
        assert_eq!(
            flushed,
            json!({
                "x": [{ "d": "r", "roles": ["a"] }, { "d": "w", "roles": ["a"] }],
                "y": ["r"]
            })
        );
    }

    #[test]
    fn test_flush_rejects_variable_of_variable() {
        let policy = build(&json!({ "@a": "@b", "@b": "r", "x": "@a" }));
        let err = policy.to_json_flushed().unwrap_err();
        assert!(matches!(err, AclError::NotImplemented(_)));
    }

    #[test]
    fn test_render_sorts_by_key_length() {
        let policy = build(&json!({ "@custom-variable": "rw", "example": "@custom-variable" }));
        assert_eq!(
            policy.to_string(),
            "example: @custom-variable\n@custom-variable: rw"
        );
        assert_eq!(policy.render(true).unwrap(), "example: rw");
    }

    #[test]
    fn test_render_prints_structures_as_json() {
        let policy = build(&json!({ "b": ["r", "w"], "a": "n" }));
        assert_eq!(policy.render(false).unwrap(), "a: n\nb: [\"r\",\"w\"]");
    }
}
