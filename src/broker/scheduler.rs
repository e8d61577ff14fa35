//! Coordinator run loop — thread affinity and cross-thread posting.
//!
//! One designated thread (the coordinator, standing in for the platform
//! UI thread) owns all broker state and runs a cooperative loop over an
//! unbounded queue. Other threads reach that state only by posting work
//! through a [`LoopSender`]. Posted work runs in post order.
//!
//! Code already running on the coordinator may need a value that is
//! produced elsewhere. It must not block the thread, so it pumps the
//! loop ([`Coordinator::pump_until`]) until the value shows up. Producers
//! that complete a value without posting call [`LoopSender::wake`] so a
//! pumping coordinator notices.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use tokio::sync::mpsc;
use tokio::sync::oneshot::{self, error::TryRecvError};

use super::BrokerError;
use super::state::BrokerState;

/// Work posted to the coordinator.
pub type Task = Box<dyn FnOnce(&Coordinator) + Send>;

pub(crate) enum LoopMessage {
    Run(Task),
    Wake,
    Shutdown,
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<Coordinator>>> = const { RefCell::new(None) };
}

/// Cloneable, thread-safe handle for posting to the coordinator.
#[derive(Clone)]
pub struct LoopSender {
    tx: mpsc::UnboundedSender<LoopMessage>,
    thread: Arc<OnceLock<ThreadId>>,
}

impl LoopSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<LoopMessage>) -> Self {
        Self {
            tx,
            thread: Arc::new(OnceLock::new()),
        }
    }

    /// Whether the calling thread is the coordinator thread.
    pub fn is_coordinator_thread(&self) -> bool {
        self.thread.get() == Some(&thread::current().id())
    }

    /// The running coordinator, when called on its thread.
    pub fn coordinator(&self) -> Option<Rc<Coordinator>> {
        if self.is_coordinator_thread() {
            Coordinator::current()
        } else {
            None
        }
    }

    /// Queue `task` for the next loop iteration and return immediately.
    pub fn post(&self, task: impl FnOnce(&Coordinator) + Send + 'static) -> Result<(), BrokerError> {
        self.tx
            .send(LoopMessage::Run(Box::new(task)))
            .map_err(|_| BrokerError::Stopped)
    }

    /// Post a no-op so a coordinator pumping for a value re-checks it.
    pub fn wake(&self) {
        let _ = self.tx.send(LoopMessage::Wake);
    }

    /// Run `work` inline when off the coordinator; on the coordinator,
    /// post it to the next iteration instead. Callers must not assume the
    /// work has completed when this returns.
    pub fn ensure_off_affinity(&self, work: impl FnOnce() + Send + 'static) -> Result<(), BrokerError> {
        if self.is_coordinator_thread() {
            self.post(move |_| work())
        } else {
            work();
            Ok(())
        }
    }

    /// Run `f` on the coordinator and wait for its result.
    ///
    /// On the coordinator thread `f` runs inline. Elsewhere this blocks
    /// the calling thread, so it must not be used from async contexts;
    /// use [`LoopSender::call_async`] there.
    pub fn call<R: Send + 'static>(
        &self,
        f: impl FnOnce(&Coordinator) -> R + Send + 'static,
    ) -> Result<R, BrokerError> {
        if let Some(coordinator) = self.coordinator() {
            return Ok(f(&coordinator));
        }
        let (tx, rx) = oneshot::channel();
        self.post(move |c| {
            let _ = tx.send(f(c));
        })?;
        rx.blocking_recv().map_err(|_| BrokerError::Stopped)
    }

    /// Run `f` on the coordinator and await its result.
    pub async fn call_async<R: Send + 'static>(
        &self,
        f: impl FnOnce(&Coordinator) -> R + Send + 'static,
    ) -> Result<R, BrokerError> {
        let (tx, rx) = oneshot::channel();
        self.post(move |c| {
            let _ = tx.send(f(c));
        })?;
        rx.await.map_err(|_| BrokerError::Stopped)
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(LoopMessage::Shutdown);
    }

    fn bind_current_thread(&self) {
        let _ = self.thread.set(thread::current().id());
    }
}

/// The coordinator: loop queue plus the state it exclusively owns.
pub struct Coordinator {
    rx: RefCell<mpsc::UnboundedReceiver<LoopMessage>>,
    sender: LoopSender,
    state: BrokerState,
    stopped: Cell<bool>,
}

impl Coordinator {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<LoopMessage>,
        sender: LoopSender,
        state: BrokerState,
    ) -> Self {
        Self {
            rx: RefCell::new(rx),
            sender,
            state,
            stopped: Cell::new(false),
        }
    }

    /// The coordinator running on this thread, if any.
    pub fn current() -> Option<Rc<Coordinator>> {
        CURRENT.with(|c| c.borrow().clone())
    }

    pub fn state(&self) -> &BrokerState {
        &self.state
    }

    pub fn sender(&self) -> &LoopSender {
        &self.sender
    }

    /// Run the loop on the calling thread until shutdown.
    pub(crate) fn run(self) {
        self.sender.bind_current_thread();
        let this = Rc::new(self);
        CURRENT.with(|c| *c.borrow_mut() = Some(Rc::clone(&this)));
        tracing::debug!("coordinator loop started");

        while this.poll_once() {}

        this.state.drain_pending();
        let dropped = this.discard_queued();
        CURRENT.with(|c| c.borrow_mut().take());
        tracing::debug!(dropped, "coordinator loop stopped");
    }

    /// Block for one message and handle it. Returns `false` once the
    /// loop has been asked to stop.
    pub fn poll_once(&self) -> bool {
        if self.stopped.get() {
            return false;
        }
        let message = self.rx.borrow_mut().blocking_recv();
        match message {
            Some(LoopMessage::Run(task)) => {
                task(self);
                !self.stopped.get()
            }
            Some(LoopMessage::Wake) => true,
            Some(LoopMessage::Shutdown) | None => {
                self.stopped.set(true);
                false
            }
        }
    }

    /// Keep running posted work until `rx` yields.
    ///
    /// `None` when the producer closed without sending or the loop was
    /// stopped while waiting.
    pub fn pump_until<T>(&self, mut rx: oneshot::Receiver<T>) -> Option<T> {
        loop {
            match rx.try_recv() {
                Ok(value) => return Some(value),
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => {
                    if !self.poll_once() {
                        return None;
                    }
                }
            }
        }
    }

    /// Drop everything still queued. Dropping a task closes whatever
    /// reply channels it captured, which unblocks their waiters.
    fn discard_queued(&self) -> usize {
        let mut rx = self.rx.borrow_mut();
        rx.close();
        let mut dropped = 0;
        while let Ok(message) = rx.try_recv() {
            if matches!(message, LoopMessage::Run(_)) {
                dropped += 1;
            }
        }
        dropped
    }
}
