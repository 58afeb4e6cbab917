//! Detection of external writes to engine-owned visibility

use std::collections::HashMap;

use tracing::warn;

use crate::element::{Element, ElementKey};
use crate::error::{AuthzError, Result};

/// Last visibility the engine assigned to each bound element
#[derive(Debug, Default)]
pub struct ConsistencyGuard {
    records: HashMap<ElementKey, bool>,
}

impl ConsistencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail if `element` no longer shows the value last assigned by the engine.
    ///
    /// Elements without a record (never applied) always pass.
    pub fn check(&self, key: ElementKey, element: &dyn Element) -> Result<()> {
        let Some(&recorded) = self.records.get(&key) else {
            return Ok(());
        };

        let observed = element.is_visible();
        if observed != recorded {
            warn!(%key, ?element, recorded, observed, "visibility changed outside the engine");
            return Err(AuthzError::ConsistencyViolation {
                element: format!("{:?}", element),
                recorded,
                observed,
            });
        }
        Ok(())
    }

    /// Record the value just assigned, replacing any previous record
    pub fn remember(&mut self, key: ElementKey, visible: bool) {
        self.records.insert(key, visible);
    }

    /// Drop the record for `key`
    pub fn forget(&mut self, key: ElementKey) {
        self.records.remove(&key);
    }

    /// Last assigned value, if any
    pub fn recorded(&self, key: ElementKey) -> Option<bool> {
        self.records.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
