//! Access kinds and requested operations.

use std::fmt;

/// Access granted by a descriptor, or the outcome of evaluating one.
///
/// `Never` is the veto kind: it satisfies no operation and, inside a list,
/// overrides every other outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    None,
    Read,
    Write,
    ReadWrite,
    Create,
    Update,
    Delete,
    Never,
}

impl Access {
    /// Short wire token, the spelling used on export.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Access::None => "n",
            Access::Read => "r",
            Access::Write => "w",
            Access::ReadWrite => "rw",
            Access::Create => "c",
            Access::Update => "u",
            Access::Delete => "d",
            Access::Never => "never",
        }
    }

    /// Parse a short or long access token (`"rw"` or `"readWrite"`).
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let access = match token {
            "n" | "none" | "null" => Access::None,
            "r" | "read" => Access::Read,
            "w" | "write" => Access::Write,
            "rw" | "readWrite" => Access::ReadWrite,
            "c" | "create" => Access::Create,
            "u" | "update" => Access::Update,
            "d" | "delete" => Access::Delete,
            "never" => Access::Never,
            _ => return None,
        };
        Some(access)
    }

    /// Whether this access permits `op`.
    ///
    /// `ReadWrite` means "no restriction" and satisfies every operation.
    #[must_use]
    pub fn satisfies(self, op: Operation) -> bool {
        self == op.access() || self == Access::ReadWrite
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl serde::Serialize for Access {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.token())
    }
}

impl<'de> serde::Deserialize<'de> for Access {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let token = <String as serde::Deserialize>::deserialize(deserializer)?;
        Access::parse(&token)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown access token '{token}'")))
    }
}

/// Operation a caller requests on a data value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Read,
        Operation::Write,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    /// The access kind that grants exactly this operation.
    #[must_use]
    pub const fn access(self) -> Access {
        match self {
            Operation::Read => Access::Read,
            Operation::Write => Access::Write,
            Operation::Create => Access::Create,
            Operation::Update => Access::Update,
            Operation::Delete => Access::Delete,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_short_and_long_tokens() {
        assert_eq!(Access::parse("rw"), Some(Access::ReadWrite));
        assert_eq!(Access::parse("readWrite"), Some(Access::ReadWrite));
        assert_eq!(Access::parse("null"), Some(Access::None));
        assert_eq!(Access::parse("never"), Some(Access::Never));
        assert_eq!(Access::parse("readwrite"), None);
        assert_eq!(Access::parse(""), None);
    }

    #[test]
    fn test_read_write_satisfies_every_operation() {
        for op in Operation::ALL {
            assert!(Access::ReadWrite.satisfies(op), "{op}");
            assert!(!Access::Never.satisfies(op), "{op}");
            assert!(!Access::None.satisfies(op), "{op}");
        }
    }

    #[test]
    fn test_plain_access_only_satisfies_its_operation() {
        assert!(Access::Read.satisfies(Operation::Read));
        assert!(!Access::Read.satisfies(Operation::Write));
        assert!(Access::Delete.satisfies(Operation::Delete));
        assert!(!Access::Write.satisfies(Operation::Create));
    }

    #[test]
    fn test_access_serde_uses_short_token() {
        let json = serde_json::to_string(&Access::ReadWrite).unwrap();
        assert_eq!(json, r#""rw""#);
        let parsed: Access = serde_json::from_str(r#""update""#).unwrap();
        assert_eq!(parsed, Access::Update);
        assert!(serde_json::from_str::<Access>(r#""sometimes""#).is_err());
    }
}
