//! Role matchers and the reversible `regex#...#flags` wire encoding.

use regex::{Regex, RegexBuilder};

use crate::error::{AclError, Result};

/// Prefix marking a role string as an encoded regular expression.
pub const REGEX_PREFIX: &str = "regex#";

/// A compiled role pattern that remembers its source and flags so it can be
/// written back out bit-exactly.
#[derive(Clone, Debug)]
pub struct RolePattern {
    source: String,
    flags: String,
    regex: Regex,
}

impl RolePattern {
    /// Compile `source` with JS-style `flags`.
    ///
    /// `i`, `m` and `s` change matching; `g`, `y`, `d`, `u` and `v` are
    /// accepted and have no effect on a single test.
    ///
    /// # Errors
    /// Returns `AclError::InvalidRolePattern` for an unknown flag or a pattern
    /// the regex engine rejects.
    pub fn new(source: &str, flags: &str) -> Result<Self> {
        let mut builder = RegexBuilder::new(source);
        for flag in flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'g' | 'y' | 'd' | 'u' | 'v' => {}
                other => {
                    return Err(AclError::InvalidRolePattern {
                        pattern: source.to_owned(),
                        reason: format!("unsupported flag '{other}'"),
                    });
                }
            }
        }
        let regex = builder
            .build()
            .map_err(|e| AclError::InvalidRolePattern {
                pattern: source.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            source: source.to_owned(),
            flags: flags.to_owned(),
            regex,
        })
    }

    /// Decode `regex#<pattern>#<flags>`; `#` inside the pattern is written `\#`.
    ///
    /// Returns `Ok(None)` when `encoded` does not carry the regex prefix.
    ///
    /// # Errors
    /// Returns `AclError::InvalidRolePattern` when the prefix is present but
    /// the closing `#` is missing or the pattern does not compile.
    pub fn decode(encoded: &str) -> Result<Option<Self>> {
        let Some(body) = encoded.strip_prefix(REGEX_PREFIX) else {
            return Ok(None);
        };
        let (pattern, flags) = body
            .rsplit_once('#')
            .ok_or_else(|| AclError::InvalidRolePattern {
                pattern: encoded.to_owned(),
                reason: "missing closing '#' before flags".to_owned(),
            })?;
        Self::new(&pattern.replace("\\#", "#"), flags).map(Some)
    }

    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{REGEX_PREFIX}{}#{}",
            self.source.replace('#', "\\#"),
            self.flags
        )
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn flags(&self) -> &str {
        &self.flags
    }

    #[must_use]
    pub fn is_match(&self, role: &str) -> bool {
        self.regex.is_match(role)
    }
}

impl PartialEq for RolePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

impl Eq for RolePattern {}

/// One entry of a special descriptor's role list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoleMatcher {
    Exact(String),
    Pattern(RolePattern),
}

impl RoleMatcher {
    /// Parse a role from its wire form: an encoded regex or a literal role.
    ///
    /// # Errors
    /// Returns `AclError::InvalidRolePattern` for a malformed encoded regex.
    pub fn parse(raw: &str) -> Result<Self> {
        match RolePattern::decode(raw)? {
            Some(pattern) => Ok(RoleMatcher::Pattern(pattern)),
            None => Ok(RoleMatcher::Exact(raw.to_owned())),
        }
    }

    /// Wire form; patterns always go out through the regex encoding.
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            RoleMatcher::Exact(role) => role.clone(),
            RoleMatcher::Pattern(pattern) => pattern.encode(),
        }
    }

    fn collect_matches(&self, effective: &[String], out: &mut Vec<String>) {
        match self {
            RoleMatcher::Exact(role) => {
                if effective.iter().any(|r| r == role) {
                    out.push(role.clone());
                }
            }
            RoleMatcher::Pattern(pattern) => {
                out.extend(effective.iter().filter(|r| pattern.is_match(r)).cloned());
            }
        }
    }
}

/// Matches `matchers` against the caller's effective roles, in matcher order.
///
/// Duplicates are kept; an empty result means "not matched".
#[must_use]
pub fn match_roles(matchers: &[RoleMatcher], effective: &[String]) -> Vec<String> {
    let mut matched = Vec::new();
    for matcher in matchers {
        matcher.collect_matches(effective, &mut matched);
    }
    matched
}
