use thiserror::Error;

/// Errors raised while building a policy or applying it to data.
///
/// Every variant describes a defect in the policy document or at the call
/// site; none of them is transient.
#[derive(Debug, Error)]
pub enum AclError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("variable '{variable}' used by '{path}' is not defined")]
    VariableUndefined { variable: String, path: String },

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("invalid role pattern '{pattern}': {reason}")]
    InvalidRolePattern { pattern: String, reason: String },

    #[error("cyclic variable reference: {0}")]
    CyclicVariable(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("invalid policy config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AclError>;
