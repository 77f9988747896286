#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Field-level access control for nested JSON data.
//!
//! A [`Policy`] maps dot paths (optionally with `*` segments) to access
//! descriptors. Applying it to a value for a caller and an [`Operation`]
//! yields a redacted copy together with the list of removed paths.
//!
//! ```
//! use modkit_acl::{Operation, Policy, User};
//! use serde_json::json;
//!
//! let policy: Policy = Policy::new(&json!({
//!     "name": "r",
//!     "salary": { "d": "r", "roles": ["hr"] }
//! }))?;
//!
//! let out = policy.read(&json!({ "name": "Ada", "salary": 1 }), &User::new(["staff"]), None)?;
//! assert_eq!(out.data, json!({ "name": "Ada" }));
//! assert_eq!(out.removals, vec!["salary".to_owned()]);
//! assert!(!policy.project("salary", &User::new(["staff"]), Operation::Read, None)?);
//! # Ok::<(), modkit_acl::AclError>(())
//! ```
pub mod access;
pub mod apply;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod evaluate;
pub mod policy;
pub mod resolve;
pub mod role;
pub mod user;
pub mod value;
pub mod wildcard;

pub use access::{Access, Operation};
pub use apply::{Applied, ApplyTrace};
pub use config::PolicyConfig;
pub use descriptor::Descriptor;
pub use error::{AclError, Result};
pub use evaluate::Evaluation;
pub use policy::{Policy, PolicyOptions, PolicyOverrides};
pub use resolve::RuleMatch;
pub use role::{RoleMatcher, RolePattern, match_roles};
pub use user::{HasRoles, RoleFilter, RoleFn, SharedRoleFilter, User, UserPolicy};
pub use wildcard::WildcardMatcher;
