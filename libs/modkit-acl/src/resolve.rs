//! Path resolution: exact entry, then wildcard entries, then the parent path.

use std::borrow::Cow;

use crate::descriptor::Descriptor;
use crate::error::{AclError, Result};
use crate::policy::Policy;
use crate::value::parent_path;

/// Rule key(s) that governed a path.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum RuleMatch {
    /// An exact entry, or the variable an exact entry points to.
    Key(String),
    /// Every wildcard entry that matched, sorted.
    Keys(Vec<String>),
}

enum Located<'a> {
    Exact(&'a str, &'a Descriptor),
    Wildcards(Vec<&'a str>),
}

impl<U> Policy<U> {
    /// The descriptor governing `path`, or `None` if neither the path nor any
    /// of its parents has a rule.
    ///
    /// Wildcard matches are merged into one list in key order; a matched list
    /// is spliced in rather than nested.
    ///
    /// # Errors
    /// Returns `AclError::VariableUndefined` when the governing entry refers to
    /// a variable that does not exist.
    pub fn get(&self, path: &str) -> Result<Option<Cow<'_, Descriptor>>> {
        match self.locate(path)? {
            None => Ok(None),
            Some(Located::Exact(key, descriptor)) => {
                Ok(Some(Cow::Borrowed(self.dereference(key, descriptor)?)))
            }
            Some(Located::Wildcards(keys)) => {
                let mut merged = Vec::new();
                for key in keys {
                    let Some(descriptor) = self.entries.get(key) else {
                        continue;
                    };
                    match self.dereference(key, descriptor)? {
                        Descriptor::List(items) => merged.extend(items.iter().cloned()),
                        single => merged.push(single.clone()),
                    }
                }
                Descriptor::list(merged).map(|merged| Some(Cow::Owned(merged)))
            }
        }
    }

    /// Like [`Policy::get`] but reports which rule key(s) matched.
    ///
    /// # Errors
    /// Same as [`Policy::get`].
    pub fn resolve_keys(&self, path: &str) -> Result<Option<RuleMatch>> {
        match self.locate(path)? {
            None => Ok(None),
            Some(Located::Exact(key, descriptor)) => {
                if let Descriptor::Variable(name) = descriptor {
                    self.dereference(key, descriptor)?;
                    return Ok(Some(RuleMatch::Key(name.clone())));
                }
                Ok(Some(RuleMatch::Key(key.to_owned())))
            }
            Some(Located::Wildcards(keys)) => Ok(Some(RuleMatch::Keys(
                keys.into_iter().map(str::to_owned).collect(),
            ))),
        }
    }

    fn locate(&self, path: &str) -> Result<Option<Located<'_>>> {
        let mut current = path;
        loop {
            if let Some((key, descriptor)) = self.entries.get_key_value(current) {
                return Ok(Some(Located::Exact(key, descriptor)));
            }
            let keys = self.entries.keys().map(String::as_str);
            if let Some(matched) = self.wildcards.match_wildcards(current, keys)? {
                return Ok(Some(Located::Wildcards(matched)));
            }
            match parent_path(current) {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }

    fn dereference<'a>(&'a self, key: &str, descriptor: &'a Descriptor) -> Result<&'a Descriptor> {
        match descriptor {
            Descriptor::Variable(name) => {
                self.variables
                    .get(name)
                    .ok_or_else(|| AclError::VariableUndefined {
                        variable: name.clone(),
                        path: key.to_owned(),
                    })
            }
            other => Ok(other),
        }
    }
}
