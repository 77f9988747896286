//! Descriptor evaluation: from a resolved descriptor and the caller's roles to
//! one access decision.

use crate::access::{Access, Operation};
use crate::descriptor::Descriptor;
use crate::policy::Policy;
use crate::role::match_roles;
use crate::user::RoleFilter;

/// Outcome of evaluating a descriptor for one caller.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Evaluation {
    pub access: Access,
    /// Roles that produced the decision, if any role was involved.
    pub roles: Option<Vec<String>>,
}

impl Evaluation {
    #[must_use]
    pub fn new(access: Access, roles: Option<Vec<String>>) -> Self {
        Self { access, roles }
    }

    #[must_use]
    pub fn permits(&self, op: Operation) -> bool {
        self.access.satisfies(op)
    }
}

impl<U> Policy<U> {
    /// The caller's roles, narrowed by `filter`.
    #[must_use]
    pub fn effective_roles(&self, user: &U, filter: Option<RoleFilter<'_>>) -> Vec<String> {
        let roles = (self.get_roles)(user);
        match filter {
            Some(keep) => roles.into_iter().filter(|role| keep(role)).collect(),
            None => roles,
        }
    }

    /// Evaluates `descriptor` for `user`; `None` means no rule applies.
    #[must_use]
    pub fn evaluate(
        &self,
        descriptor: Option<&Descriptor>,
        user: &U,
        op: Operation,
        filter: Option<RoleFilter<'_>>,
    ) -> Evaluation {
        let roles = self.effective_roles(user, filter);
        self.evaluate_with_roles(descriptor, op, &roles)
    }

    pub(crate) fn evaluate_with_roles(
        &self,
        descriptor: Option<&Descriptor>,
        op: Operation,
        roles: &[String],
    ) -> Evaluation {
        let Some(descriptor) = descriptor else {
            return self.fallback(None);
        };

        match descriptor {
            Descriptor::Simple(access) => Evaluation::new(*access, None),
            Descriptor::Never => Evaluation::new(Access::Never, None),
            // Unlike direct resolution, an undefined variable here only falls back.
            Descriptor::Variable(name) => {
                self.evaluate_with_roles(self.variables.get(name), op, roles)
            }
            Descriptor::Special {
                access,
                roles: wanted,
            } => {
                let matched = match_roles(wanted, roles);
                if matched.is_empty() {
                    self.fallback(None)
                } else {
                    Evaluation::new(*access, Some(matched))
                }
            }
            Descriptor::List(items) => self.evaluate_list(items, op, roles),
        }
    }

    fn evaluate_list(&self, items: &[Descriptor], op: Operation, roles: &[String]) -> Evaluation {
        let evaluated: Vec<Evaluation> = items
            .iter()
            .map(|item| self.evaluate_with_roles(Some(item), op, roles))
            .collect();

        if let Some(veto) = evaluated.iter().find(|e| e.access == Access::Never) {
            return veto.clone();
        }

        // Only the most recent item's roles are remembered, never accumulated.
        let mut last_roles: Option<Vec<String>> = None;
        for evaluation in evaluated {
            let permits = evaluation.permits(op);
            if evaluation.roles.is_none() && permits {
                return Evaluation::new(evaluation.access, None);
            }
            last_roles.clone_from(&evaluation.roles);

            let has_roles = evaluation.roles.as_ref().is_some_and(|r| !r.is_empty());
            if (has_roles && permits) || evaluation.access == Access::ReadWrite {
                return evaluation;
            }
        }
        self.fallback(last_roles)
    }

    fn fallback(&self, roles: Option<Vec<String>>) -> Evaluation {
        if self.strict {
            tracing::trace!(roles = ?roles, "no grant, denying by default");
            Evaluation::new(Access::None, roles)
        } else {
            Evaluation::new(Access::ReadWrite, None)
        }
    }
}
