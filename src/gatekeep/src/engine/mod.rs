//! Per-session authorization engine
//!
//! Owns the binding registries, the consistency guard and the navigation
//! controller of one session, and runs apply cycles over them.

pub mod cache;
pub mod evaluation;
pub mod guard;
pub mod handles;
pub mod metrics;

pub use cache::{CacheStats, GrantCache};
pub use evaluation::EvaluationEngine;
pub use guard::ConsistencyGuard;
pub use handles::{ElementBind, ElementUnbind, ViewBind, ViewUnbind};
pub use metrics::{EngineMetrics, MetricsCollector};

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::authorizer::{AuthorizerRegistry, AuthorizerSet};
use crate::binding::{BindingRegistry, RestrictionId};
use crate::config::EngineConfig;
use crate::data::DataBindings;
use crate::element::{DataView, Element, ElementKey, View};
use crate::error::{AuthzError, Result};
use crate::navigation::{
    Access, DestinationGuards, Location, NavigationAccessController, NavigationOutcome,
    NavigatorFacade,
};
use crate::permission::{Perm, PermissionType};
use crate::restriction::{Restriction, Targets};

/// Mutable bookkeeping guarded by the session lock
struct EngineState {
    elements: BindingRegistry<dyn Element>,
    views: BindingRegistry<dyn View>,
    data: DataBindings,
    guard: ConsistencyGuard,
    restriction_open: bool,
}

impl EngineState {
    fn new() -> Self {
        Self {
            elements: BindingRegistry::new(),
            views: BindingRegistry::new(),
            data: DataBindings::new(),
            guard: ConsistencyGuard::new(),
            restriction_open: false,
        }
    }

    /// Drop reclaimed bindings and the records that belonged to them
    fn sweep(&mut self) -> usize {
        let elements = self.elements.sweep();
        for key in &elements {
            self.guard.forget(*key);
        }
        elements.len() + self.views.sweep().len() + self.data.sweep()
    }
}

pub(crate) struct EngineInner {
    authorizers: AuthorizerRegistry,
    state: Mutex<EngineState>,
    access: NavigationAccessController,
    navigator: RwLock<Option<Arc<dyn NavigatorFacade>>>,
    metrics: Option<MetricsCollector>,
    config: EngineConfig,
    next_restriction: AtomicU64,
}

/// Which elements an apply cycle covers
enum Batch<'a> {
    All,
    Only(&'a [Arc<dyn Element>]),
}

/// Authorization engine of one session
///
/// Cheap to clone; clones share the same state. All registry mutation and
/// apply cycles are serialized by one lock. Host callbacks that may call back
/// into the engine (the navigator) only run after that lock is released.
/// Authorizers and `Element::set_visible` run under the lock and must not
/// call into the same engine.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use gatekeep::{authorizer, perms, AuthorizerSet, Element, EngineConfig, SessionEngine};
///
/// #[derive(Debug)]
/// struct Button(AtomicBool);
///
/// impl Element for Button {
///     fn is_visible(&self) -> bool { self.0.load(Ordering::SeqCst) }
///     fn set_visible(&self, visible: bool) { self.0.store(visible, Ordering::SeqCst) }
/// }
///
/// let authorizers = AuthorizerSet::new()
///     .with(authorizer(|role: &&'static str| Ok(*role == "user")));
/// let engine = SessionEngine::new(authorizers, EngineConfig::default()).unwrap();
///
/// let save = Arc::new(Button(AtomicBool::new(true)));
/// let delete = Arc::new(Button(AtomicBool::new(true)));
/// let elements: [Arc<dyn Element>; 2] = [save.clone(), delete.clone()];
///
/// engine.bind(&elements[..1]).unwrap().to(perms!["user"]).unwrap();
/// engine.bind(&elements[1..]).unwrap().to(perms!["admin"]).unwrap();
///
/// assert!(save.is_visible());
/// assert!(!delete.is_visible());
/// ```
#[derive(Clone)]
pub struct SessionEngine {
    inner: Arc<EngineInner>,
}

impl SessionEngine {
    /// Create an engine from an authorizer set
    pub fn new(authorizers: AuthorizerSet, config: EngineConfig) -> Result<Self> {
        let authorizers = AuthorizerRegistry::new(authorizers)?;
        let metrics = config.enable_metrics.then(MetricsCollector::new);

        info!(
            "SessionEngine initialized with {} authorizers, metrics={}, revalidate_navigation={}",
            authorizers.len(),
            config.enable_metrics,
            config.revalidate_navigation
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                authorizers,
                state: Mutex::new(EngineState::new()),
                access: NavigationAccessController::new(),
                navigator: RwLock::new(None),
                metrics,
                config,
                next_restriction: AtomicU64::new(1),
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<EngineInner> {
        Arc::downgrade(&self.inner)
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Registered authorizers
    pub fn authorizers(&self) -> &AuthorizerRegistry {
        &self.inner.authorizers
    }

    // ------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------

    /// Start binding `elements` to permissions
    pub fn bind(&self, elements: &[Arc<dyn Element>]) -> Result<ElementBind<'_>> {
        non_empty(elements, "element")?;
        Ok(ElementBind::new(self, elements.to_vec()))
    }

    /// Start unbinding `elements` from permissions
    pub fn unbind(&self, elements: &[Arc<dyn Element>]) -> Result<ElementUnbind<'_>> {
        non_empty(elements, "element")?;
        Ok(ElementUnbind::new(self, elements.to_vec()))
    }

    /// Re-evaluate every bound element
    ///
    /// Call this whenever authorizers may answer differently than before,
    /// e.g. after the current user's roles changed. Visibility is never
    /// updated on its own between calls.
    ///
    /// # Errors
    ///
    /// A consistency violation is detected before any element is written, so
    /// the cycle then changes nothing. An authorizer error stops the cycle at
    /// the failing element: elements written before it keep their new value,
    /// and data views and navigation are not refreshed.
    pub fn rebind(&self) -> Result<()> {
        self.apply_batch(Batch::All)
    }

    /// Re-evaluate only `elements`; unbound elements become visible
    ///
    /// Fails the same way as [`Self::rebind`].
    pub fn apply(&self, elements: &[Arc<dyn Element>]) -> Result<()> {
        self.apply_batch(Batch::Only(elements))
    }

    /// Permissions currently required by `element`
    pub fn permissions_of<T: ?Sized>(&self, element: &Arc<T>) -> HashSet<Perm> {
        let state = self.inner.state.lock();
        state
            .elements
            .required(ElementKey::of(element))
            .map(|perms| perms.into_iter().collect())
            .unwrap_or_default()
    }

    /// Whether `element` is under authorization
    pub fn is_bound<T: ?Sized>(&self, element: &Arc<T>) -> bool {
        self.inner.state.lock().elements.contains(ElementKey::of(element))
    }

    /// Number of live bound elements
    pub fn bound_elements(&self) -> usize {
        self.inner.state.lock().elements.live().len()
    }

    /// Drop bindings of reclaimed elements, views and data views
    pub fn sweep(&self) -> usize {
        let removed = self.inner.state.lock().sweep();
        if removed > 0 {
            debug!(removed, "swept reclaimed bindings");
        }
        removed
    }

    pub(crate) fn bind_elements(
        &self,
        elements: &[Arc<dyn Element>],
        permissions: &[Perm],
    ) -> Result<()> {
        non_empty(permissions, "permission")?;
        self.inner.authorizers.ensure_known(permissions)?;

        {
            let mut state = self.inner.state.lock();
            for element in elements {
                if state.elements.bind(element, permissions) {
                    state.guard.forget(ElementKey::of(element));
                }
            }
        }

        debug!(elements = elements.len(), ?permissions, "elements bound");
        self.apply(elements)
    }

    pub(crate) fn unbind_elements(
        &self,
        elements: &[Arc<dyn Element>],
        permissions: &[Perm],
    ) -> Result<()> {
        non_empty(permissions, "permission")?;

        {
            let mut state = self.inner.state.lock();
            for element in elements {
                state.elements.unbind(ElementKey::of(element), permissions);
            }
        }

        debug!(elements = elements.len(), ?permissions, "elements unbound");
        self.apply(elements)
    }

    pub(crate) fn unbind_all_elements(&self, elements: &[Arc<dyn Element>]) {
        {
            let mut state = self.inner.state.lock();
            for element in elements {
                let key = ElementKey::of(element);
                state.elements.unbind_all(key);
                state.guard.forget(key);
            }
        }

        for element in elements {
            element.set_visible(true);
        }
        debug!(elements = elements.len(), "elements released from authorization");
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Start binding `views` to permissions
    pub fn bind_view(&self, views: &[Arc<dyn View>]) -> Result<ViewBind<'_>> {
        non_empty(views, "view")?;
        Ok(ViewBind::new(self, views.to_vec()))
    }

    /// Start unbinding `views` from permissions
    pub fn unbind_view(&self, views: &[Arc<dyn View>]) -> Result<ViewUnbind<'_>> {
        non_empty(views, "view")?;
        Ok(ViewUnbind::new(self, views.to_vec()))
    }

    /// Permissions currently required to enter `view`
    pub fn view_permissions_of<T: ?Sized>(&self, view: &Arc<T>) -> HashSet<Perm> {
        let state = self.inner.state.lock();
        state
            .views
            .required(ElementKey::of(view))
            .map(|perms| perms.into_iter().collect())
            .unwrap_or_default()
    }

    pub(crate) fn bind_views(&self, views: &[Arc<dyn View>], permissions: &[Perm]) -> Result<()> {
        non_empty(permissions, "permission")?;
        self.inner.authorizers.ensure_known(permissions)?;

        {
            let mut state = self.inner.state.lock();
            for view in views {
                state.views.bind(view, permissions);
            }
        }

        debug!(views = views.len(), ?permissions, "views bound");
        self.revalidate_navigation().map(|_| ())
    }

    pub(crate) fn unbind_views(
        &self,
        views: &[Arc<dyn View>],
        permissions: Option<&[Perm]>,
    ) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            for view in views {
                let key = ElementKey::of(view);
                match permissions {
                    Some(permissions) => state.views.unbind(key, permissions),
                    None => {
                        state.views.unbind_all(key);
                    }
                }
            }
        }

        debug!(views = views.len(), "views unbound");
        self.revalidate_navigation().map(|_| ())
    }

    // ------------------------------------------------------------------
    // Data items
    // ------------------------------------------------------------------

    /// Gate every row of `view` on its own authorizer decision
    ///
    /// The row type must have a registered authorizer.
    pub fn bind_data_items<V: DataView>(&self, view: &Arc<V>) -> Result<()> {
        let item_type = PermissionType::of::<V::Item>();
        if !self.inner.authorizers.contains(item_type) {
            return Err(AuthzError::MissingAuthorizer(item_type));
        }

        self.inner.state.lock().data.bind(view);
        debug!(%item_type, "data items bound");
        self.apply_batch(Batch::Only(&[]))
    }

    /// Stop gating the rows of `view`; returns whether it was bound
    pub fn unbind_data_items<V: DataView>(&self, view: &Arc<V>) -> bool {
        let removed = self.inner.state.lock().data.unbind(ElementKey::of(view));
        match removed {
            Some(binding) => {
                binding.clear();
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Restrictions
    // ------------------------------------------------------------------

    /// Open a revertible restriction on `elements`
    ///
    /// Only one restriction may be open per session at a time.
    pub fn open_restriction(&self, elements: &[Arc<dyn Element>]) -> Result<Restriction> {
        non_empty(elements, "restriction target")?;
        self.open(Targets::elements(elements))
    }

    /// Open a revertible restriction on `views`
    pub fn open_view_restriction(&self, views: &[Arc<dyn View>]) -> Result<Restriction> {
        non_empty(views, "restriction target")?;
        self.open(Targets::views(views))
    }

    /// Whether a restriction is currently open
    pub fn is_restriction_open(&self) -> bool {
        self.inner.state.lock().restriction_open
    }

    fn open(&self, targets: Targets) -> Result<Restriction> {
        let mut state = self.inner.state.lock();
        if state.restriction_open {
            return Err(AuthzError::RestrictionOpen);
        }
        state.restriction_open = true;
        drop(state);

        debug!(targets = targets.len(), "restriction opened");
        Ok(Restriction::new(self.clone(), targets))
    }

    /// Abandon the open restriction without committing
    pub(crate) fn close_restriction(&self) {
        self.inner.state.lock().restriction_open = false;
    }

    /// Merge a restriction into the registries and close it
    pub(crate) fn commit_restriction(
        &self,
        targets: &Targets,
        permissions: &[Perm],
    ) -> Result<RestrictionId> {
        non_empty(permissions, "permission")?;
        self.inner.authorizers.ensure_known(permissions)?;

        let id = RestrictionId(self.inner.next_restriction.fetch_add(1, Ordering::Relaxed));
        let mut state = self.inner.state.lock();
        match targets {
            Targets::Elements(elements) => {
                for element in elements.iter().filter_map(Weak::upgrade) {
                    if state.elements.restrict(&element, permissions, id) {
                        state.guard.forget(ElementKey::of(&element));
                    }
                }
            }
            Targets::Views(views) => {
                for view in views.iter().filter_map(Weak::upgrade) {
                    state.views.restrict(&view, permissions, id);
                }
            }
        }
        state.restriction_open = false;

        debug!(restriction = id.0, ?permissions, "restriction committed");
        Ok(id)
    }

    /// Take back what restriction `id` added
    pub(crate) fn release_restriction(&self, targets: &Targets, id: RestrictionId) {
        let mut state = self.inner.state.lock();
        match targets {
            Targets::Elements(elements) => {
                for element in elements {
                    state.elements.release(element, id);
                }
            }
            Targets::Views(views) => {
                for view in views {
                    state.views.release(view, id);
                }
            }
        }
        debug!(restriction = id.0, "restriction reverted");
    }

    /// Re-apply after a restriction changed `targets`
    pub(crate) fn apply_targets(&self, targets: &Targets) -> Result<()> {
        match targets {
            Targets::Elements(elements) => {
                let live: Vec<Arc<dyn Element>> =
                    elements.iter().filter_map(Weak::upgrade).collect();
                self.apply(&live)
            }
            Targets::Views(_) => self.revalidate_navigation().map(|_| ()),
        }
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Attach the host navigator used for re-validation and [`Self::navigate`]
    pub fn set_navigator(&self, navigator: Arc<dyn NavigatorFacade>) {
        *self.inner.navigator.write() = Some(navigator);
    }

    /// Detach the host navigator
    pub fn clear_navigator(&self) {
        *self.inner.navigator.write() = None;
    }

    fn navigator(&self) -> Option<Arc<dyn NavigatorFacade>> {
        self.inner.navigator.read().clone()
    }

    /// Navigation access controller of this session
    pub fn access_controller(&self) -> &NavigationAccessController {
        &self.inner.access
    }

    /// Declare the evaluator chain guarding `destination`
    pub fn declare_destination(
        &self,
        destination: impl Into<String>,
        guards: DestinationGuards,
    ) -> Result<()> {
        self.inner.access.declare(destination, guards)
    }

    /// Decide a navigation attempt without performing it
    ///
    /// Views bound to `to` are checked first, then the declared evaluators.
    pub fn check_navigation(&self, from: Option<&str>, to: &str) -> Result<NavigationOutcome> {
        let location = Location::new(from, to);
        self.inner
            .access
            .evaluate_with(&location, |location| self.view_access(location))
    }

    /// Navigate to `destination`, or to the reroute target if access is restricted
    pub fn navigate(&self, destination: &str) -> Result<NavigationOutcome> {
        let navigator = self.navigator().ok_or(AuthzError::NoNavigator)?;
        let current = navigator.current_destination();
        let outcome = self.check_navigation(Some(current.as_str()), destination)?;

        match &outcome {
            NavigationOutcome::Entered => navigator.navigate_to(destination),
            NavigationOutcome::Redirected { target, .. } => {
                self.record_redirect();
                navigator.navigate_to(target);
            }
        }
        Ok(outcome)
    }

    /// Re-enter the active destination and reroute if it is now restricted
    ///
    /// Returns `None` when re-validation is disabled or no navigator is attached.
    pub fn revalidate_navigation(&self) -> Result<Option<NavigationOutcome>> {
        if !self.inner.config.revalidate_navigation {
            return Ok(None);
        }
        let Some(navigator) = self.navigator() else {
            return Ok(None);
        };

        let current = navigator.current_destination();
        let outcome = self.check_navigation(None, &current)?;
        if let NavigationOutcome::Redirected { target, .. } = &outcome {
            debug!(from = %current, to = %target, "active destination no longer accessible");
            self.record_redirect();
            navigator.navigate_to(target);
        }
        Ok(Some(outcome))
    }

    fn record_redirect(&self) {
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_redirect();
        }
    }

    fn view_access(&self, location: &Location<'_>) -> Result<Access> {
        let required = self
            .inner
            .state
            .lock()
            .views
            .required_where(|view| view.destination() == location.to);

        if required.is_empty() {
            return Ok(Access::Granted);
        }

        let mut evaluation = EvaluationEngine::new(&self.inner.authorizers, required.len());
        if evaluation.evaluate(&required)? {
            Ok(Access::Granted)
        } else {
            Ok(Access::restricted(
                format!("permissions required by view `{}` are not granted", location.to),
                self.inner.config.view_denied_destination.clone(),
            ))
        }
    }

    // ------------------------------------------------------------------
    // Apply cycle
    // ------------------------------------------------------------------

    fn apply_batch(&self, batch: Batch<'_>) -> Result<()> {
        let started = Instant::now();
        let inner = &*self.inner;
        let mut evaluation =
            EvaluationEngine::new(&inner.authorizers, inner.config.grant_cache_capacity);

        let applied = {
            let mut state = inner.state.lock();
            let state = &mut *state;

            if matches!(batch, Batch::All) && inner.config.sweep_on_rebind {
                state.sweep();
            }

            let targets: Vec<(ElementKey, Arc<dyn Element>, Option<Vec<Perm>>)> = match batch {
                Batch::All => state
                    .elements
                    .live()
                    .into_iter()
                    .map(|(key, element, permissions)| (key, element, Some(permissions)))
                    .collect(),
                Batch::Only(elements) => elements
                    .iter()
                    .map(|element| {
                        let key = ElementKey::of(element);
                        (key, element.clone(), state.elements.required(key))
                    })
                    .collect(),
            };

            // a violation anywhere in the batch leaves every element untouched
            for (key, element, _) in &targets {
                if let Err(err) = state.guard.check(*key, element.as_ref()) {
                    if let Some(metrics) = &inner.metrics {
                        metrics.record_violation();
                    }
                    return Err(err);
                }
            }

            for (key, element, permissions) in &targets {
                let visible = match permissions {
                    Some(permissions) => evaluation.evaluate(permissions)?,
                    None => true,
                };

                element.set_visible(visible);
                if permissions.is_some() {
                    state.guard.remember(*key, visible);
                }
            }

            state.data.refresh(&mut evaluation)?;
            targets.len()
        };

        debug!(
            elements = applied,
            authorizer_calls = evaluation.authorizer_calls(),
            "apply cycle finished"
        );
        if let Some(metrics) = &inner.metrics {
            metrics.record_cycle(
                applied,
                evaluation.authorizer_calls(),
                evaluation.cache_stats(),
                started.elapsed(),
            );
        }

        self.revalidate_navigation().map(|_| ())
    }

    /// Snapshot of the engine metrics, if enabled
    pub fn metrics(&self) -> Option<EngineMetrics> {
        self.inner.metrics.as_ref().map(MetricsCollector::snapshot)
    }
}

impl fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEngine")
            .field("authorizers", &self.inner.authorizers)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

fn non_empty<T>(items: &[T], what: &'static str) -> Result<()> {
    if items.is_empty() {
        Err(AuthzError::Empty(what))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::authorizer;
    use crate::error::ErrorKind;
    use crate::perms;
    use std::sync::atomic::AtomicBool;

    #[derive(Debug)]
    struct Button(AtomicBool);

    impl Element for Button {
        fn is_visible(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }

        fn set_visible(&self, visible: bool) {
            self.0.store(visible, Ordering::SeqCst);
        }
    }

    fn button() -> Arc<dyn Element> {
        Arc::new(Button(AtomicBool::new(true)))
    }

    fn engine() -> SessionEngine {
        let set = AuthorizerSet::new().with(authorizer(|role: &&'static str| Ok(*role == "user")));
        SessionEngine::new(set, EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_engine_creation() {
        let engine = engine();
        assert_eq!(engine.authorizers().len(), 1);
        assert_eq!(engine.bound_elements(), 0);
        assert!(engine.metrics().is_some());
        assert!(!engine.is_restriction_open());
    }

    #[test]
    fn test_empty_arguments_are_usage_errors() {
        let engine = engine();
        let save = button();

        assert!(matches!(engine.bind(&[]), Err(AuthzError::Empty("element"))));
        assert!(matches!(engine.unbind(&[]), Err(AuthzError::Empty("element"))));
        assert!(matches!(engine.bind_view(&[]), Err(AuthzError::Empty("view"))));

        let err = engine.bind(&[save.clone()]).unwrap().to(Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(!engine.is_bound(&save));
    }

    #[test]
    fn test_bind_rejects_unknown_permission_types_before_mutating() {
        let engine = engine();
        let save = button();

        let err = engine.bind(&[save.clone()]).unwrap().to(perms!["user", 3u8]).unwrap_err();
        assert!(matches!(err, AuthzError::MissingAuthorizer(_)));
        assert!(!engine.is_bound(&save));
        assert!(save.is_visible());
    }

    #[test]
    fn test_apply_unbound_element_makes_it_visible() {
        let engine = engine();
        let save = button();
        save.set_visible(false);

        engine.apply(&[save.clone()]).unwrap();
        assert!(save.is_visible());
        assert!(!engine.is_bound(&save));
    }

    #[test]
    fn test_metrics_track_cycles() {
        let engine = engine();
        let a = button();
        let b = button();

        engine.bind(&[a.clone(), b.clone()]).unwrap().to(perms!["user"]).unwrap();
        engine.rebind().unwrap();

        let metrics = engine.metrics().unwrap();
        assert_eq!(metrics.apply_cycles, 2);
        assert_eq!(metrics.elements_applied, 4);
        assert_eq!(metrics.authorizer_calls, 2);
        assert_eq!(metrics.cache_hits, 2);
    }
}
