//! Revertible restrictions
//!
//! A restriction adds permissions to a fixed set of elements or views and
//! hands back a [`Reverter`] that removes exactly what it added. Permissions
//! the targets held before, or hold through another restriction, survive the
//! undo.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::binding::RestrictionId;
use crate::element::{Element, View};
use crate::engine::{EngineInner, SessionEngine};
use crate::error::{AuthzError, Result};
use crate::permission::Perm;

/// What a restriction applies to
#[derive(Clone)]
pub(crate) enum Targets {
    Elements(Vec<Weak<dyn Element>>),
    Views(Vec<Weak<dyn View>>),
}

impl Targets {
    pub(crate) fn elements(elements: &[Arc<dyn Element>]) -> Self {
        Self::Elements(elements.iter().map(Arc::downgrade).collect())
    }

    pub(crate) fn views(views: &[Arc<dyn View>]) -> Self {
        Self::Views(views.iter().map(Arc::downgrade).collect())
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Elements(elements) => elements.len(),
            Self::Views(views) => views.len(),
        }
    }
}

/// An open restriction collecting permissions until [`Restriction::commit`]
///
/// While it is open no other restriction can be opened on the same session.
/// Dropping it without committing abandons it and changes nothing.
#[must_use = "a restriction does nothing until committed"]
pub struct Restriction {
    engine: SessionEngine,
    targets: Targets,
    permissions: Vec<Perm>,
    seen: HashSet<Perm>,
    committed: bool,
}

impl Restriction {
    pub(crate) fn new(engine: SessionEngine, targets: Targets) -> Self {
        Self {
            engine,
            targets,
            permissions: Vec::new(),
            seen: HashSet::new(),
            committed: false,
        }
    }

    /// Add permissions to the restriction; duplicates are ignored
    pub fn add_permissions(&mut self, permissions: impl IntoIterator<Item = Perm>) -> &mut Self {
        for permission in permissions {
            if self.seen.insert(permission.clone()) {
                self.permissions.push(permission);
            }
        }
        self
    }

    /// Permissions collected so far
    pub fn permissions(&self) -> &[Perm] {
        &self.permissions
    }

    /// Bind the collected permissions, apply, and close the restriction
    ///
    /// Fails without side effects when no permission was added or one has no
    /// authorizer. When the apply that follows the merge fails, the merged
    /// permissions are released again before the error is returned. The
    /// restriction is closed in every case.
    pub fn commit(mut self) -> Result<Reverter> {
        let id = self.engine.commit_restriction(&self.targets, &self.permissions)?;
        self.committed = true;

        if let Err(err) = self.engine.apply_targets(&self.targets) {
            self.engine.release_restriction(&self.targets, id);
            // may fail for the same reason; the bindings are already restored
            if let Err(reapply) = self.engine.apply_targets(&self.targets) {
                warn!(restriction = id.0, error = %reapply, "re-apply after failed commit failed");
            }
            return Err(err);
        }

        Ok(Reverter {
            engine: self.engine.downgrade(),
            id,
            targets: self.targets.clone(),
            used: false,
        })
    }
}

impl Drop for Restriction {
    fn drop(&mut self) {
        if !self.committed {
            debug!(targets = self.targets.len(), "restriction abandoned");
            self.engine.close_restriction();
        }
    }
}

impl fmt::Debug for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Restriction")
            .field("targets", &self.targets.len())
            .field("permissions", &self.permissions)
            .field("committed", &self.committed)
            .finish()
    }
}

/// Single-use undo of a committed restriction
pub struct Reverter {
    engine: Weak<EngineInner>,
    id: RestrictionId,
    targets: Targets,
    used: bool,
}

impl Reverter {
    /// Remove what the restriction added and re-apply its targets
    ///
    /// A second call fails with [`AuthzError::ReverterUsed`]. Undoing after
    /// the session engine is gone does nothing.
    pub fn undo(&mut self) -> Result<()> {
        if self.used {
            return Err(AuthzError::ReverterUsed);
        }
        self.used = true;

        let Some(inner) = self.engine.upgrade() else {
            return Ok(());
        };
        let engine = SessionEngine::from_inner(inner);
        engine.release_restriction(&self.targets, self.id);
        engine.apply_targets(&self.targets)
    }

    /// Whether [`Reverter::undo`] already ran
    pub fn is_used(&self) -> bool {
        self.used
    }
}

impl fmt::Debug for Reverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reverter")
            .field("id", &self.id.0)
            .field("targets", &self.targets.len())
            .field("used", &self.used)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::{authorizer, AuthorizerSet};
    use crate::config::EngineConfig;
    use crate::perms;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug)]
    struct Toggle(AtomicBool);

    impl Element for Toggle {
        fn is_visible(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }

        fn set_visible(&self, visible: bool) {
            self.0.store(visible, Ordering::SeqCst);
        }
    }

    fn setup() -> (SessionEngine, Arc<dyn Element>) {
        let set = AuthorizerSet::new().with(authorizer(|role: &&'static str| Ok(*role != "admin")));
        let engine = SessionEngine::new(set, EngineConfig::default()).unwrap();
        let toggle: Arc<dyn Element> = Arc::new(Toggle(AtomicBool::new(true)));
        (engine, toggle)
    }

    #[test]
    fn test_only_one_open_restriction() {
        let (engine, toggle) = setup();

        let first = engine.open_restriction(&[toggle.clone()]).unwrap();
        assert!(engine.is_restriction_open());
        assert!(matches!(
            engine.open_restriction(&[toggle.clone()]),
            Err(AuthzError::RestrictionOpen)
        ));

        drop(first);
        assert!(!engine.is_restriction_open());
        assert!(engine.open_restriction(&[toggle]).is_ok());
    }

    #[test]
    fn test_empty_commit_closes_restriction() {
        let (engine, toggle) = setup();

        let restriction = engine.open_restriction(&[toggle.clone()]).unwrap();
        assert!(matches!(restriction.commit(), Err(AuthzError::Empty("permission"))));
        assert!(!engine.is_restriction_open());
        assert!(!engine.is_bound(&toggle));
    }

    #[test]
    fn test_duplicate_permissions_collapse() {
        let (engine, toggle) = setup();

        let mut restriction = engine.open_restriction(&[toggle]).unwrap();
        restriction.add_permissions(perms!["admin", "user"]).add_permissions(perms!["admin"]);
        assert_eq!(restriction.permissions().len(), 2);
    }

    #[test]
    fn test_undo_is_single_use() {
        let (engine, toggle) = setup();

        let mut restriction = engine.open_restriction(&[toggle.clone()]).unwrap();
        restriction.add_permissions(perms!["admin"]);
        let mut reverter = restriction.commit().unwrap();
        assert!(!toggle.is_visible());

        reverter.undo().unwrap();
        assert!(toggle.is_visible());
        assert!(reverter.is_used());
        assert!(matches!(reverter.undo(), Err(AuthzError::ReverterUsed)));
    }

    #[test]
    fn test_undo_after_engine_dropped_is_noop() {
        let (engine, toggle) = setup();

        let mut restriction = engine.open_restriction(&[toggle]).unwrap();
        restriction.add_permissions(perms!["admin"]);
        let mut reverter = restriction.commit().unwrap();

        drop(engine);
        assert!(reverter.undo().is_ok());
    }
}
