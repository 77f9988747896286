//! Callers, role extraction and the user-bound policy facade.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::access::Operation;
use crate::apply::Applied;
use crate::descriptor::Descriptor;
use crate::error::Result;
use crate::evaluate::Evaluation;
use crate::policy::Policy;

/// Hook that extracts the role list of a caller.
pub type RoleFn<U> = Arc<dyn Fn(&U) -> Vec<String> + Send + Sync>;

/// Per-call predicate narrowing the caller's roles.
pub type RoleFilter<'a> = &'a dyn Fn(&str) -> bool;

/// Role filter that can be stored alongside a caller.
pub type SharedRoleFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Anything that can report the roles it holds.
pub trait HasRoles {
    fn roles(&self) -> Vec<String>;
}

/// Minimal caller: a bag of role names.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub roles: Vec<String>,
}

impl User {
    #[must_use]
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

impl HasRoles for User {
    fn roles(&self) -> Vec<String> {
        self.roles.clone()
    }
}

/// A policy bound to one caller.
///
/// The default filter applies whenever a call passes no filter of its own.
pub struct UserPolicy<U = User> {
    user: U,
    policy: Arc<Policy<U>>,
    default_filter: Option<SharedRoleFilter>,
}

impl<U> UserPolicy<U> {
    #[must_use]
    pub fn new(user: U, policy: Arc<Policy<U>>) -> Self {
        Self {
            user,
            policy,
            default_filter: None,
        }
    }

    #[must_use]
    pub fn with_default_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.default_filter = Some(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn user(&self) -> &U {
        &self.user
    }

    #[must_use]
    pub fn policy(&self) -> &Arc<Policy<U>> {
        &self.policy
    }

    fn filter<'a>(&'a self, filter: Option<RoleFilter<'a>>) -> Option<RoleFilter<'a>> {
        filter.or_else(|| {
            let fallback: RoleFilter<'a> = self.default_filter.as_deref()?;
            Some(fallback)
        })
    }

    /// See [`Policy::apply`].
    ///
    /// # Errors
    /// Same as [`Policy::apply`].
    pub fn apply(
        &self,
        data: &Value,
        op: Operation,
        filter: Option<RoleFilter<'_>>,
        with_trace: bool,
    ) -> Result<Applied> {
        self.policy
            .apply(data, &self.user, op, self.filter(filter), with_trace)
    }

    /// # Errors
    /// Same as [`Policy::apply`].
    pub fn read(&self, data: &Value, filter: Option<RoleFilter<'_>>) -> Result<Applied> {
        self.apply(data, Operation::Read, filter, false)
    }

    /// # Errors
    /// Same as [`Policy::apply`].
    pub fn write(&self, data: &Value, filter: Option<RoleFilter<'_>>) -> Result<Applied> {
        self.apply(data, Operation::Write, filter, false)
    }

    /// # Errors
    /// Same as [`Policy::apply`].
    pub fn create(&self, data: &Value, filter: Option<RoleFilter<'_>>) -> Result<Applied> {
        self.apply(data, Operation::Create, filter, false)
    }

    /// # Errors
    /// Same as [`Policy::apply`].
    pub fn update(&self, data: &Value, filter: Option<RoleFilter<'_>>) -> Result<Applied> {
        self.apply(data, Operation::Update, filter, false)
    }

    /// # Errors
    /// Same as [`Policy::apply`].
    pub fn delete(&self, data: &Value, filter: Option<RoleFilter<'_>>) -> Result<Applied> {
        self.apply(data, Operation::Delete, filter, false)
    }

    /// See [`Policy::project`].
    ///
    /// # Errors
    /// Same as [`Policy::project`].
    pub fn project(
        &self,
        path: &str,
        op: Operation,
        filter: Option<RoleFilter<'_>>,
    ) -> Result<bool> {
        self.policy
            .project(path, &self.user, op, self.filter(filter))
    }

    /// See [`Policy::evaluate_path`].
    ///
    /// # Errors
    /// Same as [`Policy::evaluate_path`].
    pub fn evaluate_path(
        &self,
        path: &str,
        op: Operation,
        filter: Option<RoleFilter<'_>>,
    ) -> Result<Evaluation> {
        self.policy
            .evaluate_path(path, &self.user, op, self.filter(filter))
    }

    /// See [`Policy::get`].
    ///
    /// # Errors
    /// Same as [`Policy::get`].
    pub fn get(&self, path: &str) -> Result<Option<Cow<'_, Descriptor>>> {
        self.policy.get(path)
    }
}

impl<U: Clone> Clone for UserPolicy<U> {
    fn clone(&self) -> Self {
        Self {
            user: self.user.clone(),
            policy: Arc::clone(&self.policy),
            default_filter: self.default_filter.clone(),
        }
    }
}

impl<U: fmt::Debug> fmt::Debug for UserPolicy<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPolicy")
            .field("user", &self.user)
            .field("policy", &self.policy)
            .field("default_filter", &self.default_filter.is_some())
            .finish()
    }
}
