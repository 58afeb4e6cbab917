//! Host fakes shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use gatekeep::{
    authorizer, AuthorizerSet, DataView, Element, EngineConfig, NavigatorFacade, SessionEngine,
    SessionId, SessionInitListener, SessionInitNotifier, View,
};
use parking_lot::Mutex;

/// Clearance levels, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Clearance {
    Non,
    Confidential,
    Secret,
    TopSecret,
}

impl Clearance {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Non,
            1 => Self::Confidential,
            2 => Self::Secret,
            _ => Self::TopSecret,
        }
    }
}

/// Current user of a test session
#[derive(Debug, Default)]
pub struct User {
    clearance: AtomicU8,
    admin: AtomicBool,
}

impl User {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_clearance(&self, clearance: Clearance) {
        self.clearance.store(clearance as u8, Ordering::SeqCst);
    }

    pub fn clearance(&self) -> Clearance {
        Clearance::from_u8(self.clearance.load(Ordering::SeqCst))
    }

    pub fn set_admin(&self, admin: bool) {
        self.admin.store(admin, Ordering::SeqCst);
    }

    pub fn is_admin(&self) -> bool {
        self.admin.load(Ordering::SeqCst)
    }
}

/// Counts authorizer invocations per permission type
#[derive(Debug, Default)]
pub struct CallCounter {
    pub roles: AtomicUsize,
    pub clearances: AtomicUsize,
}

impl CallCounter {
    pub fn roles(&self) -> usize {
        self.roles.load(Ordering::SeqCst)
    }

    pub fn clearances(&self) -> usize {
        self.clearances.load(Ordering::SeqCst)
    }
}

/// Role strings: "user" always granted, "admin" iff the user is admin
pub fn authorizers(user: &Arc<User>, calls: &Arc<CallCounter>) -> AuthorizerSet {
    let role_user = Arc::clone(user);
    let role_calls = Arc::clone(calls);
    let clearance_user = Arc::clone(user);
    let clearance_calls = Arc::clone(calls);

    AuthorizerSet::new()
        .with(authorizer(move |role: &&'static str| {
            role_calls.roles.fetch_add(1, Ordering::SeqCst);
            Ok(match *role {
                "user" => true,
                "admin" => role_user.is_admin(),
                _ => false,
            })
        }))
        .with(authorizer(move |required: &Clearance| {
            clearance_calls.clearances.fetch_add(1, Ordering::SeqCst);
            Ok(clearance_user.clearance() >= *required)
        }))
}

/// Engine, user and call counter for one test session
pub struct Fixture {
    pub engine: SessionEngine,
    pub user: Arc<User>,
    pub calls: Arc<CallCounter>,
}

pub fn fixture() -> Fixture {
    fixture_with(EngineConfig::default())
}

pub fn fixture_with(config: EngineConfig) -> Fixture {
    gatekeep::telemetry::init_test_tracing();

    let user = User::new();
    let calls = Arc::new(CallCounter::default());
    let engine = SessionEngine::new(authorizers(&user, &calls), config).expect("valid authorizers");
    Fixture { engine, user, calls }
}

/// Widget with a visibility flag
#[derive(Debug)]
pub struct Button {
    pub caption: &'static str,
    visible: AtomicBool,
}

impl Element for Button {
    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }
}

pub fn button(caption: &'static str) -> Arc<dyn Element> {
    Arc::new(Button {
        caption,
        visible: AtomicBool::new(true),
    })
}

/// Navigable view registered under a destination name
#[derive(Debug)]
pub struct Page {
    pub destination: &'static str,
}

impl View for Page {
    fn destination(&self) -> &str {
        self.destination
    }
}

pub fn page(destination: &'static str) -> Arc<dyn View> {
    Arc::new(Page { destination })
}

/// Classified document row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Document {
    pub title: &'static str,
    pub classification: Clearance,
}

/// Data grid of documents
#[derive(Debug)]
pub struct Grid {
    rows: Mutex<Vec<Document>>,
    shown: Mutex<Option<Vec<Document>>>,
}

impl Grid {
    pub fn new(rows: Vec<Document>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            shown: Mutex::new(None),
        })
    }

    pub fn push(&self, row: Document) {
        self.rows.lock().push(row);
    }

    /// Titles currently displayed, `None` when unfiltered
    pub fn shown_titles(&self) -> Option<Vec<&'static str>> {
        self.shown
            .lock()
            .as_ref()
            .map(|rows| rows.iter().map(|row| row.title).collect())
    }
}

impl DataView for Grid {
    type Item = Document;

    fn items(&self) -> Vec<Document> {
        self.rows.lock().clone()
    }

    fn show_only(&self, granted: Vec<Document>) {
        *self.shown.lock() = Some(granted);
    }

    fn show_all(&self) {
        *self.shown.lock() = None;
    }
}

/// Navigator recording every navigation it performs
#[derive(Debug)]
pub struct FakeNavigator {
    current: Mutex<String>,
    history: Mutex<Vec<String>>,
}

impl FakeNavigator {
    pub fn at(destination: &str) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(destination.to_string()),
            history: Mutex::new(Vec::new()),
        })
    }

    pub fn current(&self) -> String {
        self.current.lock().clone()
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }
}

impl NavigatorFacade for FakeNavigator {
    fn current_destination(&self) -> String {
        self.current()
    }

    fn navigate_to(&self, destination: &str) {
        *self.current.lock() = destination.to_string();
        self.history.lock().push(destination.to_string());
    }
}

/// Host that announces sessions to registered listeners
#[derive(Default)]
pub struct FakeHost {
    listeners: Mutex<Vec<SessionInitListener>>,
}

impl FakeHost {
    pub fn open_session(&self) -> gatekeep::Result<SessionId> {
        let id = SessionId::new();
        for listener in self.listeners.lock().iter() {
            listener(id)?;
        }
        Ok(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl SessionInitNotifier for FakeHost {
    fn add_session_init_listener(&self, listener: SessionInitListener) {
        self.listeners.lock().push(listener);
    }
}
