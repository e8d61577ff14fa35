//! Broker state — native core, drag platform, registry, pending requests.
//!
//! Owned exclusively by the coordinator and reached only through
//! [`Coordinator::state`](super::scheduler::Coordinator::state). Each part
//! sits in its own `RefCell` and is borrowed only for the duration of a
//! single call, never across a loop pump, so nested work run while the
//! coordinator pumps can still reach every part.

use std::cell::{RefCell, RefMut};

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::native::{DataReply, DragFlags, DragPlatform, DragRequest, NativeCore};
use crate::transfer::{DragEvent, FormatTag, Point, PreviewImage, Surface, Transfer};

use super::BrokerError;
use super::pending::{CorrelationHandle, PendingRequests};
use super::registry::{DragRegistry, HandlerId, SessionId, ViewHandle};
use super::scheduler::LoopSender;

/// Where a completed data request is delivered.
pub(crate) enum Completion {
    /// `NativeCore::on_data_ready`.
    Notify,
    /// An awaiting reader.
    Reply(oneshot::Sender<Option<Vec<u8>>>),
}

pub struct BrokerState {
    sender: LoopSender,
    core: RefCell<Box<dyn NativeCore>>,
    platform: RefCell<Box<dyn DragPlatform>>,
    registry: RefCell<DragRegistry>,
    pending: RefCell<PendingRequests<Completion>>,
}

impl BrokerState {
    pub(crate) fn new(
        sender: LoopSender,
        core: Box<dyn NativeCore>,
        platform: Box<dyn DragPlatform>,
    ) -> Self {
        Self {
            sender,
            core: RefCell::new(core),
            platform: RefCell::new(platform),
            registry: RefCell::new(DragRegistry::new()),
            pending: RefCell::new(PendingRequests::new()),
        }
    }

    /// The native core, unless a core callback is already running further
    /// up this thread's stack.
    fn core(&self) -> Option<RefMut<'_, Box<dyn NativeCore>>> {
        match self.core.try_borrow_mut() {
            Ok(core) => Some(core),
            Err(_) => {
                tracing::error!("native core re-entered from one of its own callbacks");
                None
            }
        }
    }

    // -- Provider data --

    /// Formats the native core reports for one of our content URIs.
    pub fn stream_types(&self, uri: &str, filter: &str) -> Vec<FormatTag> {
        self.core()
            .map(|mut core| core.resolve_formats(uri, filter))
            .unwrap_or_default()
    }

    /// Ask the native core for data and return where it will arrive.
    pub fn request_data(&self, uri: &str, format: &FormatTag) -> oneshot::Receiver<Option<Bytes>> {
        let (reply, rx) = DataReply::channel(self.sender.clone());
        match self.core() {
            Some(mut core) => core.resolve_data(uri, format, reply),
            None => reply.empty(),
        }
        rx
    }

    // -- Pending requests --

    pub(crate) fn issue(&self, completion: Completion) -> CorrelationHandle {
        self.pending.borrow_mut().issue(completion)
    }

    /// Deliver the result for `handle`. A handle that already completed,
    /// or was never issued, is ignored.
    pub(crate) fn complete(&self, handle: CorrelationHandle, data: Option<Vec<u8>>) {
        let Some(completion) = self.pending.borrow_mut().take(handle) else {
            tracing::debug!(handle = handle.get(), "stale completion ignored");
            return;
        };
        match completion {
            Completion::Reply(tx) => {
                let _ = tx.send(data);
            }
            Completion::Notify => match self.core.try_borrow_mut() {
                Ok(mut core) => core.on_data_ready(handle, data),
                Err(_) => {
                    // Core is busy further up the stack; deliver next turn.
                    self.pending.borrow_mut().restore(handle, Completion::Notify);
                    let _ = self
                        .sender
                        .post(move |c| c.state().complete(handle, data));
                }
            },
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Complete every outstanding request with no data. Awaiting readers
    /// see their channel close.
    pub(crate) fn drain_pending(&self) {
        let drained = self.pending.borrow_mut().drain();
        if drained.is_empty() {
            return;
        }
        tracing::debug!(count = drained.len(), "completing pending requests at shutdown");
        for (handle, completion) in drained {
            if let Completion::Notify = completion {
                if let Some(mut core) = self.core() {
                    core.on_data_ready(handle, None);
                }
            }
        }
    }

    // -- Drag registry --

    pub fn register_view(&self, surface: Surface) -> ViewHandle {
        let view = self.registry.borrow_mut().register_view(surface);
        tracing::debug!(view = view.get(), "view registered");
        view
    }

    pub fn unregister_view(&self, view: ViewHandle) -> bool {
        let removed = self.registry.borrow_mut().unregister_view(view);
        if !removed {
            tracing::debug!(view = view.get(), "unregister of unknown view ignored");
        }
        removed
    }

    pub fn begin_session(&self) -> SessionId {
        self.registry.borrow_mut().begin_session()
    }

    /// Start a drag from `view` for a begun session.
    ///
    /// `Ok(false)` when the view is stale or the session is unknown or
    /// already started. A platform refusal ends the session.
    pub fn start_drag(
        &self,
        view: ViewHandle,
        session: SessionId,
        transfer: Transfer,
        preview: PreviewImage,
        touch_point: Point,
    ) -> Result<bool, BrokerError> {
        let (surface, token) = {
            let mut registry = self.registry.borrow_mut();
            let Some(surface) = registry.surface(view).cloned() else {
                tracing::debug!(view = view.get(), "drag from stale view ignored");
                return Ok(false);
            };
            let Some(token) = registry.bind_session(session, view) else {
                tracing::debug!(session = session.get(), "drag for unknown session ignored");
                return Ok(false);
            };
            (surface, token)
        };

        let request = DragRequest {
            transfer,
            preview,
            touch_point,
            local_state: token,
            flags: DragFlags::GLOBAL | DragFlags::GLOBAL_URI_READ,
        };
        let started = match self.platform.try_borrow_mut() {
            Ok(mut platform) => platform.start_drag(&surface, request),
            Err(_) => Err(crate::native::PlatformError("drag already starting".into())),
        };
        match started {
            Ok(()) => {
                tracing::debug!(view = view.get(), session = session.get(), "drag started");
                Ok(true)
            }
            Err(e) => {
                self.registry.borrow_mut().end_session(session);
                Err(e.into())
            }
        }
    }

    pub fn lookup_session(&self, event: &DragEvent) -> Option<SessionId> {
        self.registry.borrow().lookup(event)
    }

    pub fn register_drop_handler(&self, view: ViewHandle, handler: HandlerId) -> bool {
        self.registry.borrow_mut().set_drop_handler(view, handler)
    }

    /// Route a drag event to the drop handler registered for `view`.
    /// Without one, the event is left unconsumed.
    pub fn dispatch_drag_event(&self, view: ViewHandle, event: &DragEvent) -> bool {
        let Some(handler) = self.registry.borrow().drop_handler(view) else {
            return false;
        };
        self.core()
            .is_some_and(|mut core| core.on_drag_event(event, handler))
    }

    pub fn session_count(&self) -> usize {
        self.registry.borrow().session_count()
    }
}
