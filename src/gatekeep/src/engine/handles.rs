//! Fluent bind/unbind handles returned by [`SessionEngine`]

use std::sync::Arc;

use super::SessionEngine;
use crate::element::{Element, View};
use crate::error::Result;
use crate::permission::Perm;

/// Pending binding of elements, completed by [`ElementBind::to`]
#[must_use = "nothing is bound until `to` is called"]
pub struct ElementBind<'e> {
    engine: &'e SessionEngine,
    elements: Vec<Arc<dyn Element>>,
}

impl<'e> ElementBind<'e> {
    pub(crate) fn new(engine: &'e SessionEngine, elements: Vec<Arc<dyn Element>>) -> Self {
        Self { engine, elements }
    }

    /// Require `permissions` on every element and apply immediately
    pub fn to(self, permissions: impl IntoIterator<Item = Perm>) -> Result<()> {
        let permissions: Vec<Perm> = permissions.into_iter().collect();
        self.engine.bind_elements(&self.elements, &permissions)
    }
}

/// Pending unbinding of elements
#[must_use = "nothing is unbound until `from` or `from_all` is called"]
pub struct ElementUnbind<'e> {
    engine: &'e SessionEngine,
    elements: Vec<Arc<dyn Element>>,
}

impl<'e> ElementUnbind<'e> {
    pub(crate) fn new(engine: &'e SessionEngine, elements: Vec<Arc<dyn Element>>) -> Self {
        Self { engine, elements }
    }

    /// Stop requiring `permissions` and apply immediately
    pub fn from(self, permissions: impl IntoIterator<Item = Perm>) -> Result<()> {
        let permissions: Vec<Perm> = permissions.into_iter().collect();
        self.engine.unbind_elements(&self.elements, &permissions)
    }

    /// Release the elements from authorization and make them visible
    pub fn from_all(self) -> Result<()> {
        self.engine.unbind_all_elements(&self.elements);
        Ok(())
    }
}

/// Pending binding of views, completed by [`ViewBind::to`]
#[must_use = "nothing is bound until `to` is called"]
pub struct ViewBind<'e> {
    engine: &'e SessionEngine,
    views: Vec<Arc<dyn View>>,
}

impl<'e> ViewBind<'e> {
    pub(crate) fn new(engine: &'e SessionEngine, views: Vec<Arc<dyn View>>) -> Self {
        Self { engine, views }
    }

    /// Require `permissions` to enter every view, then re-validate navigation
    pub fn to(self, permissions: impl IntoIterator<Item = Perm>) -> Result<()> {
        let permissions: Vec<Perm> = permissions.into_iter().collect();
        self.engine.bind_views(&self.views, &permissions)
    }
}

/// Pending unbinding of views
#[must_use = "nothing is unbound until `from` or `from_all` is called"]
pub struct ViewUnbind<'e> {
    engine: &'e SessionEngine,
    views: Vec<Arc<dyn View>>,
}

impl<'e> ViewUnbind<'e> {
    pub(crate) fn new(engine: &'e SessionEngine, views: Vec<Arc<dyn View>>) -> Self {
        Self { engine, views }
    }

    /// Stop requiring `permissions`, then re-validate navigation
    pub fn from(self, permissions: impl IntoIterator<Item = Perm>) -> Result<()> {
        let permissions: Vec<Perm> = permissions.into_iter().collect();
        if permissions.is_empty() {
            return Err(crate::error::AuthzError::Empty("permission"));
        }
        self.engine.unbind_views(&self.views, Some(&permissions))
    }

    /// Remove every permission from the views
    pub fn from_all(self) -> Result<()> {
        self.engine.unbind_views(&self.views, None)
    }
}
