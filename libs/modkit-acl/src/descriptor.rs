//! Policy descriptors: the closed sum type behind every policy slot.
//!
//! Raw documents allow a token string, a `@variable` reference, a
//! `{ d, roles }` object or a non-empty array of those at any slot. They are
//! validated once by [`Descriptor::parse`] and never re-inspected afterwards.

use serde_json::{Map, Value};

use crate::access::Access;
use crate::error::{AclError, Result};
use crate::role::RoleMatcher;

/// Prefix of variable names and variable references.
pub const VARIABLE_PREFIX: char = '@';

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Descriptor {
    /// Unconditional access.
    Simple(Access),
    /// Terminal veto.
    Never,
    /// Reference to a named descriptor in the variable table.
    Variable(String),
    /// Access granted only to callers holding a matching role.
    Special {
        access: Access,
        roles: Vec<RoleMatcher>,
    },
    /// Alternatives evaluated in order.
    List(Vec<Descriptor>),
}

impl Descriptor {
    /// Descriptor for a bare access kind; `Access::Never` maps to `Never`.
    #[must_use]
    pub fn from_access(access: Access) -> Self {
        match access {
            Access::Never => Descriptor::Never,
            other => Descriptor::Simple(other),
        }
    }

    /// Builds a special descriptor.
    ///
    /// # Errors
    /// Returns `AclError::InvalidDescriptor` if `roles` is empty.
    pub fn special(access: Access, roles: Vec<RoleMatcher>) -> Result<Self> {
        if roles.is_empty() {
            return Err(AclError::InvalidDescriptor(
                "special descriptor needs at least one role".to_owned(),
            ));
        }
        Ok(Descriptor::Special { access, roles })
    }

    /// Builds a list descriptor.
    ///
    /// # Errors
    /// Returns `AclError::InvalidDescriptor` if `items` is empty.
    pub fn list(items: Vec<Descriptor>) -> Result<Self> {
        if items.is_empty() {
            return Err(AclError::InvalidDescriptor(
                "list descriptor must not be empty".to_owned(),
            ));
        }
        Ok(Descriptor::List(items))
    }

    /// Validates and normalizes a raw descriptor value.
    ///
    /// # Errors
    /// Returns `AclError::InvalidDescriptor` for an unknown token, an empty
    /// list, a malformed special object, or a value of the wrong JSON type,
    /// and `AclError::InvalidRolePattern` for a bad encoded role regex.
    pub fn parse(raw: &Value) -> Result<Self> {
        match raw {
            Value::String(token) => parse_token(token),
            Value::Array(items) => {
                let parsed = items.iter().map(Descriptor::parse).collect::<Result<Vec<_>>>()?;
                Descriptor::list(parsed).map_err(|_| {
                    AclError::InvalidDescriptor(format!("empty list descriptor '{raw}'"))
                })
            }
            Value::Object(fields) => parse_special(fields, raw),
            other => Err(AclError::InvalidDescriptor(format!(
                "unexpected descriptor value '{other}'"
            ))),
        }
    }

    /// Wire form; role patterns are always emitted through the regex encoding.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Descriptor::Simple(access) => Value::String(access.token().to_owned()),
            Descriptor::Never => Value::String(Access::Never.token().to_owned()),
            Descriptor::Variable(name) => Value::String(name.clone()),
            Descriptor::Special { access, roles } => {
                let mut fields = Map::new();
                fields.insert("d".to_owned(), Value::String(access.token().to_owned()));
                fields.insert(
                    "roles".to_owned(),
                    Value::Array(roles.iter().map(|r| Value::String(r.to_wire())).collect()),
                );
                Value::Object(fields)
            }
            Descriptor::List(items) => Value::Array(items.iter().map(Descriptor::to_json).collect()),
        }
    }

    #[must_use]
    pub fn is_variable(&self) -> bool {
        matches!(self, Descriptor::Variable(_))
    }

    /// Names of variables referenced directly or through nested lists.
    pub(crate) fn variable_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Descriptor::Variable(name) => out.push(name),
            Descriptor::List(items) => {
                for item in items {
                    item.variable_refs(out);
                }
            }
            Descriptor::Simple(_) | Descriptor::Never | Descriptor::Special { .. } => {}
        }
    }
}

fn parse_token(token: &str) -> Result<Descriptor> {
    if token.starts_with(VARIABLE_PREFIX) {
        if token.len() == 1 {
            return Err(AclError::InvalidDescriptor(
                "variable reference needs a name after '@'".to_owned(),
            ));
        }
        return Ok(Descriptor::Variable(token.to_owned()));
    }
    Access::parse(token)
        .map(Descriptor::from_access)
        .ok_or_else(|| AclError::InvalidDescriptor(format!("unknown access token '{token}'")))
}

fn parse_special(fields: &Map<String, Value>, raw: &Value) -> Result<Descriptor> {
    if let Some(unknown) = fields.keys().find(|k| *k != "d" && *k != "roles") {
        return Err(AclError::InvalidDescriptor(format!(
            "unexpected key '{unknown}' in '{raw}'"
        )));
    }

    let access = match fields.get("d") {
        Some(Value::String(token)) => Access::parse(token).ok_or_else(|| {
            AclError::InvalidDescriptor(format!("unknown access token '{token}' in '{raw}'"))
        })?,
        Some(_) => {
            return Err(AclError::InvalidDescriptor(format!(
                "property d must be an access token in '{raw}'"
            )));
        }
        None => {
            return Err(AclError::InvalidDescriptor(format!(
                "missing property d in '{raw}'"
            )));
        }
    };

    let roles = match fields.get("roles") {
        Some(Value::Array(roles)) => roles,
        Some(_) => {
            return Err(AclError::InvalidDescriptor(
                "descriptor property roles must be an array".to_owned(),
            ));
        }
        None => {
            return Err(AclError::InvalidDescriptor(format!(
                "missing property roles in '{raw}'"
            )));
        }
    };

    let matchers = roles
        .iter()
        .map(|role| match role {
            Value::String(role) => RoleMatcher::parse(role),
            other => Err(AclError::InvalidDescriptor(format!(
                "role must be a string, got '{other}'"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    Descriptor::special(access, matchers)
        .map_err(|_| AclError::InvalidDescriptor(format!("empty role list in '{raw}'")))
}

impl serde::Serialize for Descriptor {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde::Serialize::serialize(&self.to_json(), serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Descriptor {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = <Value as serde::Deserialize>::deserialize(deserializer)?;
        Descriptor::parse(&raw).map_err(serde::de::Error::custom)
    }
}
