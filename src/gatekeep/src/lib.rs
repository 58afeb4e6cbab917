//! # Gatekeep
//!
//! Permission binding and re-evaluation for UI elements, navigable views and
//! data collections.
//!
//! ## Features
//!
//! - **Typed permissions** of any `Eq + Hash` type, one [`Authorizer`] per type
//! - **Declarative binding** of elements and views to permission sets
//! - **Explicit re-evaluation** with a per-cycle grant cache
//! - **Consistency checks** against visibility changed outside the engine
//! - **Revertible restrictions** that undo exactly what they added
//! - **Navigation guards** with pluggable access evaluators and reroutes
//! - **Row-level gating** of data views
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use gatekeep::{authorizer, perms, AuthorizerSet, Element, EngineConfig, SessionEngine};
//!
//! #[derive(Debug)]
//! struct Button(AtomicBool);
//!
//! impl Element for Button {
//!     fn is_visible(&self) -> bool { self.0.load(Ordering::SeqCst) }
//!     fn set_visible(&self, visible: bool) { self.0.store(visible, Ordering::SeqCst) }
//! }
//!
//! fn main() -> Result<(), gatekeep::AuthzError> {
//!     let admin = Arc::new(AtomicBool::new(false));
//!     let is_admin = admin.clone();
//!     let authorizers = AuthorizerSet::new()
//!         .with(authorizer(move |role: &&'static str| {
//!             Ok(*role == "user" || is_admin.load(Ordering::SeqCst))
//!         }));
//!
//!     let engine = SessionEngine::new(authorizers, EngineConfig::default())?;
//!     let delete: Arc<dyn Element> = Arc::new(Button(AtomicBool::new(true)));
//!     engine.bind(&[delete.clone()])?.to(perms!["admin"])?;
//!     assert!(!delete.is_visible());
//!
//!     admin.store(true, Ordering::SeqCst);
//!     engine.rebind()?;
//!     assert!(delete.is_visible());
//!     Ok(())
//! }
//! ```

pub mod authorizer;
pub mod binding;
pub mod config;
mod data;
pub mod element;
pub mod engine;
pub mod error;
pub mod navigation;
pub mod permission;
pub mod restriction;
pub mod session;
pub mod telemetry;

// Re-export commonly used types
pub use authorizer::{authorizer, Authorizer, AuthorizerRegistry, AuthorizerSet, FnAuthorizer};
pub use binding::BindingRegistry;
pub use config::EngineConfig;
pub use element::{DataView, Element, ElementKey, View};
pub use engine::{CacheStats, EngineMetrics, EvaluationEngine, SessionEngine};
pub use error::{AuthzError, ErrorKind, PolicyError, Result};
pub use navigation::{
    Access, AccessEvaluator, DestinationGuards, Location, NavigationAccessController,
    NavigationOutcome, NavigationPhase, NavigatorFacade,
};
pub use permission::{Perm, Permission, PermissionType};
pub use restriction::{Restriction, Reverter};
pub use session::{Gatekeeper, SessionId, SessionInitListener, SessionInitNotifier};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
