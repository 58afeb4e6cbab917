//! Host-side capabilities the engine drives
//!
//! The engine never creates or destroys these objects. It only holds weak
//! references to them and reads or writes the one piece of state each trait
//! exposes.

use std::fmt;
use std::sync::Arc;

use crate::permission::Permission;

/// A gated widget: anything with a boolean "shown" state
///
/// Once an element is bound, only the engine may call [`Element::set_visible`].
/// Hosts that want to hide a bound element for other reasons must use styling.
pub trait Element: fmt::Debug + Send + Sync {
    /// Current shown state as the host sees it
    fn is_visible(&self) -> bool;

    /// Replace the shown state
    fn set_visible(&self, visible: bool);
}

/// A navigable view, addressed by its destination name
pub trait View: fmt::Debug + Send + Sync {
    /// Destination under which the navigator registers this view
    fn destination(&self) -> &str;
}

/// A collection whose rows are themselves permissions
///
/// Each row is shown only while the authorizer for [`DataView::Item`] grants it.
pub trait DataView: fmt::Debug + Send + Sync + 'static {
    /// Row type, doubling as the permission type
    type Item: Permission + Clone;

    /// Every row currently provided by the data source
    fn items(&self) -> Vec<Self::Item>;

    /// Display only `granted`
    fn show_only(&self, granted: Vec<Self::Item>);

    /// Remove any row filtering
    fn show_all(&self);
}

/// Stable identity of a host object for the lifetime of its allocation
///
/// Derived from the address of the shared allocation. A key may be reused
/// after the object is dropped, which is why every registry entry also keeps
/// a weak reference to check liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementKey(usize);

impl ElementKey {
    /// Key of a shared host object
    pub fn of<T: ?Sized>(target: &Arc<T>) -> Self {
        Self(Arc::as_ptr(target) as *const () as usize)
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
