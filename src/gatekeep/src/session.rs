//! Session entry point
//!
//! A [`Gatekeeper`] is started once per application. From then on it creates
//! one [`SessionEngine`] per host session as the host announces them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::authorizer::{AuthorizerRegistry, AuthorizerSet};
use crate::config::EngineConfig;
use crate::engine::SessionEngine;
use crate::error::{AuthzError, Result};

/// Identifier of a host session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback run by the host for every new session
pub type SessionInitListener = Box<dyn Fn(SessionId) -> Result<()> + Send + Sync>;

/// Host hook announcing new sessions
pub trait SessionInitNotifier {
    /// Register `listener`, to be invoked once per session before it is used
    fn add_session_init_listener(&self, listener: SessionInitListener);
}

/// Application-wide entry point
pub struct Gatekeeper {
    config: EngineConfig,
    started: AtomicBool,
    sessions: Arc<DashMap<SessionId, SessionEngine>>,
}

impl Gatekeeper {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            started: AtomicBool::new(false),
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Start with a fixed authorizer set shared by every session
    ///
    /// The set is validated immediately; an empty set or two authorizers for
    /// one permission type fail here rather than on the first session.
    pub fn start(
        &self,
        notifier: &dyn SessionInitNotifier,
        authorizers: AuthorizerSet,
    ) -> Result<()> {
        if authorizers.is_empty() {
            return Err(AuthzError::EmptyAuthorizers);
        }
        AuthorizerRegistry::new(authorizers.clone())?;

        self.start_with(notifier, move || authorizers.clone())
    }

    /// Start with a supplier producing a fresh authorizer set per session
    ///
    /// Use this when authorizers carry per-session state such as the
    /// current user.
    pub fn start_with<F>(&self, notifier: &dyn SessionInitNotifier, supplier: F) -> Result<()>
    where
        F: Fn() -> AuthorizerSet + Send + Sync + 'static,
    {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AuthzError::AlreadyStarted);
        }

        let sessions = Arc::clone(&self.sessions);
        let config = self.config.clone();
        notifier.add_session_init_listener(Box::new(move |id| {
            let engine = SessionEngine::new(supplier(), config.clone())?;
            sessions.insert(id, engine);
            info!(session = %id, "session engine created");
            Ok(())
        }));

        info!("Gatekeeper started");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Engine of session `id`
    pub fn session(&self, id: SessionId) -> Result<SessionEngine> {
        if !self.is_started() {
            return Err(AuthzError::NotStarted("session"));
        }
        self.sessions
            .get(&id)
            .map(|engine| engine.value().clone())
            .ok_or(AuthzError::UnknownSession(id))
    }

    /// Forget session `id`; returns whether it existed
    pub fn end_session(&self, id: SessionId) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        if removed {
            info!(session = %id, "session engine dropped");
        }
        removed
    }

    /// Number of active sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Default for Gatekeeper {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("started", &self.is_started())
            .field("sessions", &self.session_count())
            .finish()
    }
}
