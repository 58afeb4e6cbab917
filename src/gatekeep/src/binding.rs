//! Weakly-held bindings between host objects and required permissions
//!
//! Entries are keyed by [`ElementKey`] and keep only a [`Weak`] reference to
//! their target, so binding never extends an element's lifetime. Reclaimed
//! targets are dropped by [`BindingRegistry::sweep`] or replaced when a new
//! object is bound at the same address.
//!
//! Each required permission remembers who holds it: a direct `bind` call
//! and/or any number of committed restrictions. A permission stays required
//! while at least one holder remains, which lets a reverter take back exactly
//! its own contribution.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use crate::element::ElementKey;
use crate::permission::Perm;

/// Identity of one committed restriction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RestrictionId(pub(crate) u64);

#[derive(Debug, Default)]
struct Holders {
    direct: bool,
    restrictions: HashSet<RestrictionId>,
}

impl Holders {
    fn is_empty(&self) -> bool {
        !self.direct && self.restrictions.is_empty()
    }
}

struct BindingEntry<T: ?Sized> {
    target: Weak<T>,
    permissions: HashMap<Perm, Holders>,
}

impl<T: ?Sized> BindingEntry<T> {
    fn new(target: &Arc<T>) -> Self {
        Self {
            target: Arc::downgrade(target),
            permissions: HashMap::new(),
        }
    }

    fn is_live(&self) -> bool {
        self.target.strong_count() > 0
    }

    fn required(&self) -> Vec<Perm> {
        self.permissions.keys().cloned().collect()
    }
}

/// Bindings for one kind of host object (elements or views)
pub struct BindingRegistry<T: ?Sized> {
    entries: HashMap<ElementKey, BindingEntry<T>>,
}

impl<T: ?Sized> Default for BindingRegistry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: ?Sized> BindingRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `target`, replacing a reclaimed entry at the same key.
    /// The flag is true when a reclaimed entry was replaced.
    fn entry_mut(&mut self, target: &Arc<T>) -> (&mut BindingEntry<T>, bool) {
        let key = ElementKey::of(target);
        let mut replaced = false;
        let entry = self
            .entries
            .entry(key)
            .and_modify(|entry| {
                if !entry.is_live() {
                    *entry = BindingEntry::new(target);
                    replaced = true;
                }
            })
            .or_insert_with(|| BindingEntry::new(target));
        (entry, replaced)
    }

    /// Add directly held permissions to `target`.
    ///
    /// Returns true when a reclaimed entry at the same key was replaced; any
    /// state kept for the old object under that key is stale.
    pub fn bind(&mut self, target: &Arc<T>, permissions: &[Perm]) -> bool {
        let (entry, replaced) = self.entry_mut(target);
        for permission in permissions {
            entry.permissions.entry(permission.clone()).or_default().direct = true;
        }
        replaced
    }

    /// Add permissions held by restriction `id` to `target`
    pub(crate) fn restrict(
        &mut self,
        target: &Arc<T>,
        permissions: &[Perm],
        id: RestrictionId,
    ) -> bool {
        let (entry, replaced) = self.entry_mut(target);
        for permission in permissions {
            entry
                .permissions
                .entry(permission.clone())
                .or_default()
                .restrictions
                .insert(id);
        }
        replaced
    }

    /// Drop restriction `id`'s hold on `target`'s permissions.
    ///
    /// Permissions still held directly or by another restriction remain
    /// required. Returns false if the target is gone or no longer bound.
    pub(crate) fn release(&mut self, target: &Weak<T>, id: RestrictionId) -> bool {
        let Some(target) = target.upgrade() else {
            return false;
        };
        let Some(entry) = self.entries.get_mut(&ElementKey::of(&target)) else {
            return false;
        };

        entry.permissions.retain(|_, holders| {
            holders.restrictions.remove(&id);
            !holders.is_empty()
        });
        true
    }

    /// Remove `permissions` from `key` regardless of who holds them
    pub fn unbind(&mut self, key: ElementKey, permissions: &[Perm]) {
        if let Some(entry) = self.entries.get_mut(&key) {
            for permission in permissions {
                entry.permissions.remove(permission);
            }
        }
    }

    /// Remove the whole binding for `key`; returns whether one existed
    pub fn unbind_all(&mut self, key: ElementKey) -> bool {
        self.entries.remove(&key).is_some()
    }

    /// Whether `key` has a live binding
    pub fn contains(&self, key: ElementKey) -> bool {
        self.entries.get(&key).is_some_and(BindingEntry::is_live)
    }

    /// Permissions currently required by `key`, `None` if unbound or reclaimed
    pub fn required(&self, key: ElementKey) -> Option<Vec<Perm>> {
        self.entries
            .get(&key)
            .filter(|entry| entry.is_live())
            .map(BindingEntry::required)
    }

    /// Every live binding with a strong handle to its target
    pub fn live(&self) -> Vec<(ElementKey, Arc<T>, Vec<Perm>)> {
        self.entries
            .iter()
            .filter_map(|(key, entry)| {
                entry
                    .target
                    .upgrade()
                    .map(|target| (*key, target, entry.required()))
            })
            .collect()
    }

    /// Union of the permissions required by live targets matching `predicate`
    pub fn required_where(&self, predicate: impl Fn(&T) -> bool) -> Vec<Perm> {
        let mut union = HashSet::new();
        for entry in self.entries.values() {
            if let Some(target) = entry.target.upgrade() {
                if predicate(&*target) {
                    union.extend(entry.permissions.keys().cloned());
                }
            }
        }
        union.into_iter().collect()
    }

    /// Remove entries whose target was reclaimed and return their keys
    pub fn sweep(&mut self) -> Vec<ElementKey> {
        let dead: Vec<ElementKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live())
            .map(|(key, _)| *key)
            .collect();

        for key in &dead {
            self.entries.remove(key);
        }
        dead
    }

    /// Number of entries, including not yet swept reclaimed ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
