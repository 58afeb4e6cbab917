//! Error types for the authorization engine

use std::fmt;

use thiserror::Error;

use crate::permission::PermissionType;
use crate::session::SessionId;

/// Broad category of an [`AuthzError`].
///
/// Embedding layers map these onto their own reporting (error pages, exit
/// codes, test failures). Every category is fatal for the call that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Engine wiring is wrong: missing or duplicate authorizers, double start.
    Configuration,
    /// The caller broke an API contract and can fix the call site.
    Usage,
    /// Something outside the engine changed engine-owned visibility state.
    Consistency,
    /// An authorizer or access evaluator failed while deciding.
    Policy,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Usage => "usage",
            Self::Consistency => "consistency",
            Self::Policy => "policy",
        };
        f.write_str(name)
    }
}

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// `start` was called on an already started gatekeeper
    #[error("start() cannot be called more than once")]
    AlreadyStarted,

    /// A permission was used without a policy for its type
    #[error("no authorizer registered for permission type `{0}`")]
    MissingAuthorizer(PermissionType),

    /// Two authorizers claim the same permission type
    #[error("more than one authorizer registered for permission type `{0}`")]
    DuplicateAuthorizer(PermissionType),

    /// The authorizer set handed to the engine was empty
    #[error("at least one authorizer is required")]
    EmptyAuthorizers,

    /// Access evaluators were declared twice for one destination
    #[error("access evaluators for destination `{0}` are already declared")]
    DuplicateDestination(String),

    /// An operation was called before the gatekeeper was started
    #[error("start() must be called before {0}()")]
    NotStarted(&'static str),

    /// No engine exists for the given session
    #[error("no authorization engine for session {0}")]
    UnknownSession(SessionId),

    /// A second restriction was opened while another one is still uncommitted
    #[error("a restriction is already open, commit or drop it before opening another")]
    RestrictionOpen,

    /// A call required at least one element, view, target or permission
    #[error("at least one {0} is required")]
    Empty(&'static str),

    /// A reverter was used twice
    #[error("undo() can only be called once")]
    ReverterUsed,

    /// Navigation was requested on a session without a navigator
    #[error("no navigator is attached to this session")]
    NoNavigator,

    /// Engine-owned visibility was changed from outside the engine
    #[error(
        "visibility of {element} was changed outside the authorization engine \
         (last assigned {recorded}, observed {observed}); hide authorized elements \
         through styling instead of toggling their visibility"
    )]
    ConsistencyViolation {
        /// Debug rendering of the offending element
        element: String,
        /// Value the engine assigned last
        recorded: bool,
        /// Value observed on the element now
        observed: bool,
    },

    /// Authorizer or access evaluator failure
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl AuthzError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyStarted
            | Self::MissingAuthorizer(_)
            | Self::DuplicateAuthorizer(_)
            | Self::EmptyAuthorizers
            | Self::DuplicateDestination(_) => ErrorKind::Configuration,
            Self::NotStarted(_)
            | Self::UnknownSession(_)
            | Self::RestrictionOpen
            | Self::Empty(_)
            | Self::ReverterUsed
            | Self::NoNavigator => ErrorKind::Usage,
            Self::ConsistencyViolation { .. } => ErrorKind::Consistency,
            Self::Policy(_) => ErrorKind::Policy,
        }
    }
}

/// Failure raised by application policy code.
///
/// Authorizers and access evaluators return this instead of answering
/// "denied" when they cannot decide. The engine never masks it.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PolicyError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl PolicyError {
    /// Create a policy error with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a policy error wrapping the underlying cause
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Human readable message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_kinds() {
        assert_eq!(AuthzError::AlreadyStarted.kind(), ErrorKind::Configuration);
        assert_eq!(AuthzError::EmptyAuthorizers.kind(), ErrorKind::Configuration);
        assert_eq!(AuthzError::RestrictionOpen.kind(), ErrorKind::Usage);
        assert_eq!(AuthzError::ReverterUsed.kind(), ErrorKind::Usage);
        assert_eq!(AuthzError::Empty("permission").kind(), ErrorKind::Usage);

        let violation = AuthzError::ConsistencyViolation {
            element: "Button(\"save\")".to_string(),
            recorded: true,
            observed: false,
        };
        assert_eq!(violation.kind(), ErrorKind::Consistency);
        assert!(violation.to_string().contains("Button(\"save\")"));

        let policy: AuthzError = PolicyError::new("directory unavailable").into();
        assert_eq!(policy.kind(), ErrorKind::Policy);
        assert_eq!(policy.to_string(), "directory unavailable");
    }

    #[test]
    fn test_policy_error_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "ldap timeout");
        let err = PolicyError::with_source("role lookup failed", io);

        assert_eq!(err.message(), "role lookup failed");
        assert_eq!(err.source().map(|s| s.to_string()), Some("ldap timeout".to_string()));
        assert!(PolicyError::new("plain").source().is_none());
    }
}
