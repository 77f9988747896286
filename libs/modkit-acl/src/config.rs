//! Policy documents as configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::descriptor::VARIABLE_PREFIX;
use crate::error::{AclError, Result};
use crate::policy::{Policy, PolicyOptions};
use crate::user::HasRoles;

/// Access policy configuration.
///
/// ```yaml
/// strict: true
/// variables:
///   "@editor": { d: "w", roles: ["editor"] }
/// rules:
///   "title": ["r", "@editor"]
///   "drafts.*": "@editor"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Deny paths without any rule.
    #[serde(default = "default_strict")]
    pub strict: bool,

    /// Named descriptors, keys start with `@`.
    pub variables: Map<String, Value>,

    /// Path rules, keys may contain `*` segments.
    pub rules: Map<String, Value>,
}

fn default_strict() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            strict: default_strict(),
            variables: Map::new(),
            rules: Map::new(),
        }
    }
}

impl PolicyConfig {
    /// Parses and validates a YAML document.
    ///
    /// # Errors
    /// Returns `AclError::Config` for malformed YAML, unknown fields or keys in
    /// the wrong section.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_saphyr::from_str(yaml).map_err(|e| AclError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that variables and rules sit in their own sections.
    ///
    /// # Errors
    /// Returns `AclError::Config` naming the first misplaced key.
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = self
            .variables
            .keys()
            .find(|name| !name.starts_with(VARIABLE_PREFIX))
        {
            return Err(AclError::Config(format!(
                "variable '{name}' must start with '{VARIABLE_PREFIX}'"
            )));
        }
        if let Some(path) = self
            .rules
            .keys()
            .find(|path| path.starts_with(VARIABLE_PREFIX))
        {
            return Err(AclError::Config(format!(
                "rule '{path}' looks like a variable, move it to 'variables'"
            )));
        }
        Ok(())
    }

    /// The flat policy document: variables and rules in one map.
    #[must_use]
    pub fn document(&self) -> Map<String, Value> {
        let mut document = self.variables.clone();
        document.extend(self.rules.clone());
        document
    }

    /// Builds a policy that reads roles through [`HasRoles`].
    ///
    /// # Errors
    /// Returns `AclError::Config` if validation fails and any error of
    /// [`Policy::from_map`].
    pub fn build<U: HasRoles + 'static>(&self) -> Result<Policy<U>> {
        self.build_with(PolicyOptions::default())
    }

    /// Builds a policy that reads roles through `get_roles`.
    ///
    /// # Errors
    /// Same as [`PolicyConfig::build`].
    pub fn build_with_roles<U, F>(&self, get_roles: F) -> Result<Policy<U>>
    where
        F: Fn(&U) -> Vec<String> + Send + Sync + 'static,
    {
        self.build_with(PolicyOptions::with_roles(get_roles))
    }

    fn build_with<U>(&self, options: PolicyOptions<U>) -> Result<Policy<U>> {
        self.validate()?;
        Policy::from_map(self.document(), options.strict(self.strict))
    }
}
