//! Drag registry — views, drag sessions and per-view drop handlers.
//!
//! Views and sessions are identified by integer handles from private
//! monotonic counters, so a handle is never reused and a stale one is
//! simply not found. Drags this registry starts carry a private
//! [`SessionToken`] as their local state. A token minted by another
//! registry, or a value that is not a token at all, never matches.
//!
//! Owned by the coordinator. All methods are plain state transitions.

use std::collections::HashMap;

use uuid::Uuid;

use crate::transfer::{DragEvent, LocalState, Surface};

/// Integer identifying a registered view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewHandle(i64);

impl ViewHandle {
    pub fn get(self) -> i64 {
        self.0
    }
}

/// Identifies one drag operation started by this broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Opaque drop-handler identifier supplied by the native core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(i64);

impl HandlerId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

/// Local state attached to drags started here. Not constructible
/// outside this module.
#[derive(Debug)]
struct SessionToken {
    registry: Uuid,
    session: SessionId,
}

#[derive(Debug)]
struct ViewEntry {
    surface: Surface,
    drop_handler: Option<HandlerId>,
}

#[derive(Debug)]
pub struct DragRegistry {
    /// Distinguishes this registry's tokens from any other's.
    instance: Uuid,
    next_view: i64,
    next_session: u64,
    views: HashMap<ViewHandle, ViewEntry>,
    /// Live sessions, with the view that started each (once started).
    sessions: HashMap<SessionId, Option<ViewHandle>>,
}

impl Default for DragRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DragRegistry {
    pub fn new() -> Self {
        Self {
            instance: Uuid::new_v4(),
            next_view: 1,
            next_session: 1,
            views: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    // -- Views --

    pub fn register_view(&mut self, surface: Surface) -> ViewHandle {
        let view = ViewHandle(self.next_view);
        self.next_view += 1;
        self.views.insert(
            view,
            ViewEntry {
                surface,
                drop_handler: None,
            },
        );
        view
    }

    /// Remove a view and the sessions it started. Returns `false` for a
    /// handle that is unknown or already unregistered.
    pub fn unregister_view(&mut self, view: ViewHandle) -> bool {
        if self.views.remove(&view).is_none() {
            return false;
        }
        self.sessions.retain(|_, owner| *owner != Some(view));
        true
    }

    pub fn surface(&self, view: ViewHandle) -> Option<&Surface> {
        self.views.get(&view).map(|entry| &entry.surface)
    }

    // -- Sessions --

    pub fn begin_session(&mut self) -> SessionId {
        let session = SessionId(self.next_session);
        self.next_session += 1;
        self.sessions.insert(session, None);
        session
    }

    /// Bind a begun session to the view starting its drag and mint the
    /// token the drag will carry.
    ///
    /// `None` when the view is not registered, the session is unknown, or
    /// the session already started a drag.
    pub fn bind_session(&mut self, session: SessionId, view: ViewHandle) -> Option<LocalState> {
        if !self.views.contains_key(&view) {
            return None;
        }
        let owner = self.sessions.get_mut(&session)?;
        if owner.is_some() {
            return None;
        }
        *owner = Some(view);
        Some(LocalState::new(SessionToken {
            registry: self.instance,
            session,
        }))
    }

    /// Forget a session, e.g. after the platform refused to start it.
    pub fn end_session(&mut self, session: SessionId) -> bool {
        self.sessions.remove(&session).is_some()
    }

    /// The session a drag event belongs to, if this registry started it
    /// and the session is still live.
    pub fn lookup(&self, event: &DragEvent) -> Option<SessionId> {
        let token = event
            .local_state
            .as_ref()?
            .downcast_ref::<SessionToken>()?;
        if token.registry != self.instance {
            tracing::debug!(session = token.session.get(), "drag token from another broker");
            return None;
        }
        self.sessions
            .contains_key(&token.session)
            .then_some(token.session)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    // -- Drop handlers --

    /// Attach `handler` to `view`, replacing any previous one.
    pub fn set_drop_handler(&mut self, view: ViewHandle, handler: HandlerId) -> bool {
        match self.views.get_mut(&view) {
            Some(entry) => {
                entry.drop_handler = Some(handler);
                true
            }
            None => false,
        }
    }

    pub fn drop_handler(&self, view: ViewHandle) -> Option<HandlerId> {
        self.views.get(&view)?.drop_handler
    }
}
