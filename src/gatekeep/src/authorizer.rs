//! Authorizers and the registry that dispatches permissions to them
//!
//! Every permission type has exactly one [`Authorizer`]. The registry is keyed
//! by [`PermissionType`] and is validated when it is built: an empty set or two
//! authorizers for the same type are configuration errors.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::error::{AuthzError, PolicyError, Result};
use crate::permission::{Perm, Permission, PermissionType};

/// Policy for one permission type
///
/// # Examples
///
/// ```
/// use gatekeep::{Authorizer, PolicyError};
///
/// #[derive(Debug, PartialEq, Eq, Hash)]
/// enum Role { User, Admin }
///
/// struct RoleAuthorizer { admin: bool }
///
/// impl Authorizer for RoleAuthorizer {
///     type Permission = Role;
///
///     fn is_granted(&self, role: &Role) -> Result<bool, PolicyError> {
///         Ok(match role {
///             Role::User => true,
///             Role::Admin => self.admin,
///         })
///     }
/// }
/// ```
pub trait Authorizer: Send + Sync + 'static {
    /// The permission type this authorizer decides
    type Permission: Permission;

    /// Whether `permission` is granted right now
    fn is_granted(&self, permission: &Self::Permission) -> std::result::Result<bool, PolicyError>;
}

/// Authorizer backed by a closure
pub struct FnAuthorizer<P, F> {
    decide: F,
    _permission: PhantomData<fn(&P)>,
}

impl<P, F> Authorizer for FnAuthorizer<P, F>
where
    P: Permission,
    F: Fn(&P) -> std::result::Result<bool, PolicyError> + Send + Sync + 'static,
{
    type Permission = P;

    fn is_granted(&self, permission: &P) -> std::result::Result<bool, PolicyError> {
        (self.decide)(permission)
    }
}

/// Build an authorizer from a closure
///
/// ```
/// use gatekeep::authorizer;
///
/// let roles = authorizer(|role: &&'static str| Ok(*role == "user"));
/// ```
pub fn authorizer<P, F>(decide: F) -> FnAuthorizer<P, F>
where
    P: Permission,
    F: Fn(&P) -> std::result::Result<bool, PolicyError> + Send + Sync + 'static,
{
    FnAuthorizer {
        decide,
        _permission: PhantomData,
    }
}

/// Object-safe authorizer over erased permissions
trait ErasedAuthorizer: Send + Sync {
    fn permission_type(&self) -> PermissionType;
    fn is_granted(&self, permission: &Perm) -> Result<bool>;
}

struct Typed<A>(A);

impl<A: Authorizer> ErasedAuthorizer for Typed<A> {
    fn permission_type(&self) -> PermissionType {
        PermissionType::of::<A::Permission>()
    }

    fn is_granted(&self, permission: &Perm) -> Result<bool> {
        let typed = permission
            .downcast_ref::<A::Permission>()
            .ok_or_else(|| AuthzError::MissingAuthorizer(permission.permission_type()))?;
        Ok(self.0.is_granted(typed)?)
    }
}

/// Unvalidated collection of authorizers
///
/// Cheap to clone; a supplier can hand the same set to every session.
#[derive(Clone, Default)]
pub struct AuthorizerSet {
    authorizers: Vec<Arc<dyn ErasedAuthorizer>>,
}

impl AuthorizerSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an authorizer
    pub fn with<A: Authorizer>(mut self, authorizer: A) -> Self {
        self.insert(authorizer);
        self
    }

    /// Add an authorizer in place
    pub fn insert<A: Authorizer>(&mut self, authorizer: A) {
        self.authorizers.push(Arc::new(Typed(authorizer)));
    }

    /// Number of authorizers in the set
    pub fn len(&self) -> usize {
        self.authorizers.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.authorizers.is_empty()
    }

    /// Permission types covered by the set, in insertion order
    pub fn permission_types(&self) -> Vec<PermissionType> {
        self.authorizers.iter().map(|a| a.permission_type()).collect()
    }
}

impl fmt::Debug for AuthorizerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.permission_types()).finish()
    }
}

/// Validated mapping from permission type to its authorizer
pub struct AuthorizerRegistry {
    by_type: HashMap<PermissionType, Arc<dyn ErasedAuthorizer>>,
}

impl AuthorizerRegistry {
    /// Validate a set and build the registry
    ///
    /// Fails with [`AuthzError::EmptyAuthorizers`] for an empty set and with
    /// [`AuthzError::DuplicateAuthorizer`] when two authorizers share a type.
    pub fn new(set: AuthorizerSet) -> Result<Self> {
        if set.is_empty() {
            return Err(AuthzError::EmptyAuthorizers);
        }

        let mut by_type = HashMap::with_capacity(set.len());
        for authorizer in set.authorizers {
            let permission_type = authorizer.permission_type();
            if by_type.insert(permission_type, authorizer).is_some() {
                return Err(AuthzError::DuplicateAuthorizer(permission_type));
            }
        }

        debug!("Authorizer registry built for {} permission types", by_type.len());

        Ok(Self { by_type })
    }

    /// Whether an authorizer exists for `permission_type`
    pub fn contains(&self, permission_type: PermissionType) -> bool {
        self.by_type.contains_key(&permission_type)
    }

    /// Fail with [`AuthzError::MissingAuthorizer`] for the first permission
    /// whose type has no authorizer
    pub fn ensure_known<'a>(&self, permissions: impl IntoIterator<Item = &'a Perm>) -> Result<()> {
        for permission in permissions {
            let permission_type = permission.permission_type();
            if !self.contains(permission_type) {
                return Err(AuthzError::MissingAuthorizer(permission_type));
            }
        }
        Ok(())
    }

    /// Ask the responsible authorizer whether `permission` is granted
    pub fn is_granted(&self, permission: &Perm) -> Result<bool> {
        let permission_type = permission.permission_type();
        let authorizer = self
            .by_type
            .get(&permission_type)
            .ok_or(AuthzError::MissingAuthorizer(permission_type))?;
        authorizer.is_granted(permission)
    }

    /// Number of registered permission types
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Always false for a successfully built registry
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl fmt::Debug for AuthorizerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.by_type.keys()).finish()
    }
}
