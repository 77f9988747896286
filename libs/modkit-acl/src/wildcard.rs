//! Wildcard policy keys.
//!
//! A segment that is exactly `*` stands for one whole, non-empty segment:
//! `a.*.d` matches `a.s.d` but neither `a.d` nor `a.s.t.d`. A `*` inside a
//! longer segment matches any run of non-dot characters, so `b.test*` matches
//! `b.test` and `b.test-and-so-on`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;

use crate::error::{AclError, Result};
use crate::value::PATH_SEPARATOR;

/// Wildcard marker inside policy keys.
pub const WILDCARD: char = '*';

#[must_use]
pub fn is_wildcard(key: &str) -> bool {
    key.contains(WILDCARD)
}

/// Compiles wildcard keys into anchored matchers and memoizes them.
///
/// The memo belongs to one instance; policies never share it.
#[derive(Default)]
pub struct WildcardMatcher {
    compiled: RwLock<HashMap<String, Arc<Regex>>>,
}

impl WildcardMatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the compiled matcher for `key`, compiling it on first use.
    ///
    /// # Errors
    /// Returns `AclError::InvalidDescriptor` if the key does not compile.
    pub fn compile(&self, key: &str) -> Result<Arc<Regex>> {
        if let Some(regex) = self.compiled.read().get(key) {
            return Ok(Arc::clone(regex));
        }

        let regex = Regex::new(&to_pattern(key)).map_err(|e| {
            AclError::InvalidDescriptor(format!("wildcard key '{key}' does not compile: {e}"))
        })?;
        let mut compiled = self.compiled.write();
        let entry = compiled
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(regex));
        Ok(Arc::clone(entry))
    }

    /// Wildcard keys among `keys` that match `path`, sorted.
    ///
    /// Returns `None` when `path` is itself one of the keys (an exact entry
    /// always wins) or when no wildcard key matches.
    ///
    /// # Errors
    /// Returns `AclError::InvalidDescriptor` if a wildcard key does not compile.
    pub fn match_wildcards<'k, I>(&self, path: &str, keys: I) -> Result<Option<Vec<&'k str>>>
    where
        I: IntoIterator<Item = &'k str>,
    {
        let mut matches = Vec::new();
        for key in keys {
            if key == path {
                return Ok(None);
            }
            if is_wildcard(key) && self.compile(key)?.is_match(path) {
                matches.push(key);
            }
        }
        if matches.is_empty() {
            return Ok(None);
        }
        matches.sort_unstable();
        Ok(Some(matches))
    }

    /// Number of memoized matchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.compiled.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compiled.read().is_empty()
    }
}

impl Clone for WildcardMatcher {
    fn clone(&self) -> Self {
        Self {
            compiled: RwLock::new(self.compiled.read().clone()),
        }
    }
}

impl fmt::Debug for WildcardMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WildcardMatcher")
            .field("compiled", &self.compiled.read().len())
            .finish()
    }
}

fn to_pattern(key: &str) -> String {
    let segments: Vec<String> = key
        .split(PATH_SEPARATOR)
        .map(|segment| {
            if segment == "*" {
                "[^.]+".to_owned()
            } else {
                segment
                    .split(WILDCARD)
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join("[^.]*")
            }
        })
        .collect();
    format!("^{}$", segments.join("\\."))
}
