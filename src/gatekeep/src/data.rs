//! Row-level gating of data views
//!
//! Each row of a bound [`DataView`] is itself a permission. Rows are filtered
//! in every apply cycle with the same per-cycle cache as elements, so a row
//! value that also gates an element reaches its authorizer once.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tracing::trace;

use crate::element::{DataView, ElementKey};
use crate::engine::EvaluationEngine;
use crate::error::Result;
use crate::permission::Perm;

/// A data view with its row type erased
pub(crate) trait DataBinding: Send + Sync {
    fn is_live(&self) -> bool;

    /// Show only the granted rows; returns how many are shown
    fn refresh(&self, evaluation: &mut EvaluationEngine<'_>) -> Result<usize>;

    /// Remove the row filter
    fn clear(&self);
}

struct TypedDataBinding<V: DataView> {
    view: Weak<V>,
}

impl<V: DataView> DataBinding for TypedDataBinding<V> {
    fn is_live(&self) -> bool {
        self.view.strong_count() > 0
    }

    fn refresh(&self, evaluation: &mut EvaluationEngine<'_>) -> Result<usize> {
        let Some(view) = self.view.upgrade() else {
            return Ok(0);
        };

        let items = view.items();
        let total = items.len();
        let mut granted = Vec::with_capacity(total);
        for item in items {
            if evaluation.is_granted(&Perm::new(item.clone()))? {
                granted.push(item);
            }
        }

        let shown = granted.len();
        trace!(view = ?view, shown, total, "data items filtered");
        view.show_only(granted);
        Ok(shown)
    }

    fn clear(&self) {
        if let Some(view) = self.view.upgrade() {
            view.show_all();
        }
    }
}

/// Data views under row-level gating
#[derive(Default)]
pub(crate) struct DataBindings {
    entries: HashMap<ElementKey, Box<dyn DataBinding>>,
}

impl DataBindings {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Bind `view`; rebinding the same view is a no-op
    pub(crate) fn bind<V: DataView>(&mut self, view: &Arc<V>) {
        let key = ElementKey::of(view);
        let stale = self.entries.get(&key).is_some_and(|binding| !binding.is_live());
        if stale || !self.entries.contains_key(&key) {
            self.entries.insert(
                key,
                Box::new(TypedDataBinding {
                    view: Arc::downgrade(view),
                }),
            );
        }
    }

    pub(crate) fn unbind(&mut self, key: ElementKey) -> Option<Box<dyn DataBinding>> {
        self.entries.remove(&key)
    }

    /// Filter every live view against the cycle's evaluation
    pub(crate) fn refresh(&self, evaluation: &mut EvaluationEngine<'_>) -> Result<()> {
        for binding in self.entries.values() {
            binding.refresh(evaluation)?;
        }
        Ok(())
    }

    /// Drop reclaimed views and return how many were removed
    pub(crate) fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, binding| binding.is_live());
        before - self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::{authorizer, AuthorizerRegistry, AuthorizerSet};
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Document {
        owner: &'static str,
    }

    #[derive(Debug, Default)]
    struct Table {
        rows: Vec<Document>,
        shown: Mutex<Option<Vec<Document>>>,
    }

    impl DataView for Table {
        type Item = Document;

        fn items(&self) -> Vec<Document> {
            self.rows.clone()
        }

        fn show_only(&self, granted: Vec<Document>) {
            *self.shown.lock() = Some(granted);
        }

        fn show_all(&self) {
            *self.shown.lock() = None;
        }
    }

    fn registry() -> AuthorizerRegistry {
        let owned_by_alice = authorizer(|doc: &Document| Ok(doc.owner == "alice"));
        AuthorizerRegistry::new(AuthorizerSet::new().with(owned_by_alice)).unwrap()
    }

    fn table() -> Arc<Table> {
        Arc::new(Table {
            rows: vec![
                Document { owner: "alice" },
                Document { owner: "bob" },
                Document { owner: "alice" },
            ],
            shown: Mutex::new(None),
        })
    }

    #[test]
    fn test_refresh_filters_rows() {
        let registry = registry();
        let table = table();
        let mut bindings = DataBindings::new();
        bindings.bind(&table);

        let mut evaluation = EvaluationEngine::new(&registry, 8);
        bindings.refresh(&mut evaluation).unwrap();

        let shown = table.shown.lock().clone().unwrap();
        assert_eq!(shown, vec![Document { owner: "alice" }, Document { owner: "alice" }]);
        // duplicate rows share one decision
        assert_eq!(evaluation.authorizer_calls(), 2);
    }

    #[test]
    fn test_unbind_and_clear() {
        let table = table();
        let mut bindings = DataBindings::new();
        bindings.bind(&table);
        bindings.bind(&table);
        assert_eq!(bindings.len(), 1);

        *table.shown.lock() = Some(Vec::new());
        let binding = bindings.unbind(ElementKey::of(&table)).unwrap();
        binding.clear();
        assert!(table.shown.lock().is_none());
        assert_eq!(bindings.len(), 0);
    }

    #[test]
    fn test_sweep_drops_reclaimed_views() {
        let mut bindings = DataBindings::new();
        let kept = table();
        bindings.bind(&kept);
        bindings.bind(&table());

        assert_eq!(bindings.sweep(), 1);
        assert_eq!(bindings.len(), 1);
    }
}
