//! Navigation access control
//!
//! Every destination may declare an ordered chain of [`AccessEvaluator`]s, each
//! paired with the metadata instance it should receive. A navigation attempt
//! walks the chain; the first [`Access::Restricted`] stops it and becomes a
//! reroute. Per attempt the controller moves through
//! `Idle → Evaluating → {Entered | Redirected}`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{AuthzError, PolicyError, Result};

/// Answer of a single access evaluator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Access {
    /// Continue with the next evaluator
    Granted,
    /// Stop and reroute to `redirect`
    Restricted { reason: String, redirect: String },
}

impl Access {
    /// Restricted access with a reroute target
    pub fn restricted(reason: impl Into<String>, redirect: impl Into<String>) -> Self {
        Self::Restricted {
            reason: reason.into(),
            redirect: redirect.into(),
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Where a navigation attempt comes from and goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location<'a> {
    /// Current destination, `None` when re-entering the active destination
    pub from: Option<&'a str>,
    /// Requested destination
    pub to: &'a str,
}

impl<'a> Location<'a> {
    pub fn new(from: Option<&'a str>, to: &'a str) -> Self {
        Self { from, to }
    }
}

/// Pluggable access policy for destinations
pub trait AccessEvaluator: Send + Sync + 'static {
    /// Metadata instance declared alongside the evaluator on a destination
    type Metadata: Send + Sync + 'static;

    /// Decide whether `location.to` may be entered
    fn evaluate(
        &self,
        location: &Location<'_>,
        metadata: &Self::Metadata,
    ) -> std::result::Result<Access, PolicyError>;
}

/// Result of a whole navigation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NavigationOutcome {
    Entered,
    Redirected { reason: String, target: String },
}

impl NavigationOutcome {
    pub fn is_entered(&self) -> bool {
        matches!(self, Self::Entered)
    }
}

/// Controller state for the current or last navigation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NavigationPhase {
    Idle,
    Evaluating,
    Entered,
    Redirected,
}

/// Host navigation facade
pub trait NavigatorFacade: Send + Sync {
    /// Destination currently shown
    fn current_destination(&self) -> String;

    /// Show `destination`
    fn navigate_to(&self, destination: &str);
}

trait ErasedEvaluator: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, location: &Location<'_>) -> std::result::Result<Access, PolicyError>;
}

struct Declared<E: AccessEvaluator> {
    evaluator: Arc<E>,
    metadata: E::Metadata,
}

impl<E: AccessEvaluator> ErasedEvaluator for Declared<E> {
    fn name(&self) -> &'static str {
        std::any::type_name::<E>()
    }

    fn evaluate(&self, location: &Location<'_>) -> std::result::Result<Access, PolicyError> {
        self.evaluator.evaluate(location, &self.metadata)
    }
}

/// Ordered evaluator chain declared on one destination
#[derive(Clone, Default)]
pub struct DestinationGuards {
    chain: Vec<Arc<dyn ErasedEvaluator>>,
}

impl DestinationGuards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `evaluator`, which will receive `metadata` on every attempt
    pub fn with<E: AccessEvaluator>(mut self, evaluator: Arc<E>, metadata: E::Metadata) -> Self {
        self.chain.push(Arc::new(Declared { evaluator, metadata }));
        self
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Type names of the evaluators, in chain order
    pub fn evaluator_names(&self) -> Vec<&'static str> {
        self.chain.iter().map(|e| e.name()).collect()
    }
}

impl fmt::Debug for DestinationGuards {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.evaluator_names()).finish()
    }
}

/// Runs destination evaluator chains
pub struct NavigationAccessController {
    chains: RwLock<HashMap<String, Arc<DestinationGuards>>>,
    phase: Mutex<NavigationPhase>,
}

impl Default for NavigationAccessController {
    fn default() -> Self {
        Self {
            chains: RwLock::new(HashMap::new()),
            phase: Mutex::new(NavigationPhase::Idle),
        }
    }
}

impl NavigationAccessController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the evaluator chain of `destination`; a destination is declared once
    pub fn declare(&self, destination: impl Into<String>, guards: DestinationGuards) -> Result<()> {
        let destination = destination.into();
        let mut chains = self.chains.write();
        if chains.contains_key(&destination) {
            return Err(AuthzError::DuplicateDestination(destination));
        }

        debug!(%destination, evaluators = guards.len(), "destination guards declared");
        chains.insert(destination, Arc::new(guards));
        Ok(())
    }

    /// Whether `destination` has a declared chain
    pub fn is_declared(&self, destination: &str) -> bool {
        self.chains.read().contains_key(destination)
    }

    /// Phase of the current or most recent attempt
    pub fn phase(&self) -> NavigationPhase {
        *self.phase.lock()
    }

    /// Run the declared chain for `location.to`
    pub fn evaluate(&self, location: &Location<'_>) -> Result<NavigationOutcome> {
        self.evaluate_with(location, |_| Ok(Access::Granted))
    }

    /// Run `first` and then the declared chain for `location.to`
    ///
    /// Errors from any evaluator propagate unchanged and leave the controller idle.
    pub fn evaluate_with(
        &self,
        location: &Location<'_>,
        first: impl FnOnce(&Location<'_>) -> Result<Access>,
    ) -> Result<NavigationOutcome> {
        self.set_phase(NavigationPhase::Evaluating);

        match self.run_chain(location, first) {
            Ok(outcome) => {
                self.set_phase(match outcome {
                    NavigationOutcome::Entered => NavigationPhase::Entered,
                    NavigationOutcome::Redirected { .. } => NavigationPhase::Redirected,
                });
                Ok(outcome)
            }
            Err(err) => {
                self.set_phase(NavigationPhase::Idle);
                Err(err)
            }
        }
    }

    fn run_chain(
        &self,
        location: &Location<'_>,
        first: impl FnOnce(&Location<'_>) -> Result<Access>,
    ) -> Result<NavigationOutcome> {
        if let Access::Restricted { reason, redirect } = first(location)? {
            return Ok(Self::redirected(location, reason, redirect));
        }

        // evaluators may navigate themselves, so never hold the lock while they run
        let guards = self.chains.read().get(location.to).cloned();
        let Some(guards) = guards else {
            trace!(destination = location.to, "no evaluators declared");
            return Ok(NavigationOutcome::Entered);
        };

        for evaluator in &guards.chain {
            match evaluator.evaluate(location)? {
                Access::Granted => {
                    trace!(
                        destination = location.to,
                        evaluator = evaluator.name(),
                        "access granted"
                    );
                }
                Access::Restricted { reason, redirect } => {
                    return Ok(Self::redirected(location, reason, redirect));
                }
            }
        }

        Ok(NavigationOutcome::Entered)
    }

    fn redirected(location: &Location<'_>, reason: String, target: String) -> NavigationOutcome {
        debug!(destination = location.to, %reason, %target, "navigation restricted");
        NavigationOutcome::Redirected { reason, target }
    }

    fn set_phase(&self, phase: NavigationPhase) {
        *self.phase.lock() = phase;
    }
}

impl fmt::Debug for NavigationAccessController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationAccessController")
            .field("destinations", &self.chains.read().len())
            .field("phase", &self.phase())
            .finish()
    }
}
