//! Type-erased permission values
//!
//! A permission is any application value that can be compared and hashed.
//! The engine keeps permissions of many different types in one set, so each
//! value is wrapped in a [`Perm`] handle. Equality and hashing follow the
//! wrapped value; authorizer dispatch follows its runtime type
//! ([`PermissionType`]).

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Marker for values usable as permissions.
///
/// Implemented for every `'static` type that is `Debug + Eq + Hash + Send + Sync`,
/// so enums, strings, newtypes and domain rows all qualify without ceremony.
pub trait Permission: Any + fmt::Debug + Eq + Hash + Send + Sync {}

impl<T> Permission for T where T: Any + fmt::Debug + Eq + Hash + Send + Sync {}

/// Runtime type of a permission, used to pick its authorizer
#[derive(Clone, Copy)]
pub struct PermissionType {
    id: TypeId,
    name: &'static str,
}

impl PermissionType {
    /// Permission type of `P`
    pub fn of<P: Permission>() -> Self {
        Self {
            id: TypeId::of::<P>(),
            name: std::any::type_name::<P>(),
        }
    }

    /// Fully qualified Rust type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for PermissionType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PermissionType {}

impl Hash for PermissionType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PermissionType").field(&self.name).finish()
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Object-safe view of a [`Permission`]
trait ErasedPermission: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn permission_type(&self) -> PermissionType;
    fn eq_erased(&self, other: &dyn ErasedPermission) -> bool;
    fn hash_erased(&self, state: &mut dyn Hasher);
    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<P: Permission> ErasedPermission for P {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn permission_type(&self) -> PermissionType {
        PermissionType::of::<P>()
    }

    fn eq_erased(&self, other: &dyn ErasedPermission) -> bool {
        other
            .as_any()
            .downcast_ref::<P>()
            .is_some_and(|other| self == other)
    }

    fn hash_erased(&self, mut state: &mut dyn Hasher) {
        self.hash(&mut state);
    }

    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Shared handle to a permission value of any type
#[derive(Clone)]
pub struct Perm(Arc<dyn ErasedPermission>);

impl Perm {
    /// Wrap a permission value
    ///
    /// Wrapping a `Perm` again returns a clone of it instead of nesting.
    pub fn new<P: Permission>(permission: P) -> Self {
        if let Some(perm) = (&permission as &dyn Any).downcast_ref::<Perm>() {
            return perm.clone();
        }
        Self(Arc::new(permission))
    }

    /// Runtime type of the wrapped value
    pub fn permission_type(&self) -> PermissionType {
        self.0.permission_type()
    }

    /// Borrow the wrapped value if it is a `P`
    pub fn downcast_ref<P: Permission>(&self) -> Option<&P> {
        self.0.as_any().downcast_ref::<P>()
    }

    /// Whether the wrapped value is a `P`
    pub fn is<P: Permission>(&self) -> bool {
        self.0.as_any().is::<P>()
    }
}

impl PartialEq for Perm {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_erased(other.0.as_ref())
    }
}

impl Eq for Perm {}

impl Hash for Perm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.permission_type().hash(state);
        self.0.hash_erased(state);
    }
}

impl fmt::Debug for Perm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_erased(f)
    }
}

/// Build a `Vec<Perm>` from permission values of mixed types
///
/// ```
/// use gatekeep::perms;
///
/// #[derive(Debug, PartialEq, Eq, Hash)]
/// enum Clearance { Secret }
///
/// let required = perms!["user", Clearance::Secret];
/// assert_eq!(required.len(), 2);
/// ```
#[macro_export]
macro_rules! perms {
    ($($permission:expr),* $(,)?) => {
        ::std::vec![$($crate::Perm::new($permission)),*]
    };
}
