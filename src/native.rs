//! Native-core seam — what the broker calls out to.
//!
//! The native core owns the application's data providers and reacts to
//! drag events. The drag platform is the OS side that actually starts a
//! drag. Both run only on the coordinator thread and must not call back
//! into the broker synchronously from inside these methods.

use std::ops::BitOr;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::broker::pending::CorrelationHandle;
use crate::broker::registry::HandlerId;
use crate::broker::scheduler::LoopSender;
use crate::transfer::{DragEvent, FormatTag, LocalState, Point, PreviewImage, Surface, Transfer};

/// Application-side callbacks invoked by the broker.
pub trait NativeCore: Send + 'static {
    /// Formats the provider behind `uri` can supply under `filter`.
    fn resolve_formats(&mut self, uri: &str, filter: &str) -> Vec<FormatTag>;

    /// Produce the bytes for `uri` in `format`.
    ///
    /// May reply immediately or hand `reply` to another thread and reply
    /// later. Dropping `reply` without sending means "no data".
    fn resolve_data(&mut self, uri: &str, format: &FormatTag, reply: DataReply);

    /// Completion of a request issued by `request_item_data`. Called
    /// exactly once per handle, on the coordinator.
    fn on_data_ready(&mut self, handle: CorrelationHandle, data: Option<Vec<u8>>);

    /// A drag event arrived for a view whose drop handler is `handler`.
    /// Returns whether the event was consumed.
    fn on_drag_event(&mut self, event: &DragEvent, handler: HandlerId) -> bool {
        let _ = (event, handler);
        false
    }
}

/// One-shot reply slot for [`NativeCore::resolve_data`].
///
/// `Send`, so it can be completed from any thread. Completing it (or
/// dropping it) wakes the coordinator in case it is pumping for the value.
pub struct DataReply {
    tx: Option<oneshot::Sender<Option<Bytes>>>,
    waker: LoopSender,
}

impl DataReply {
    pub(crate) fn channel(waker: LoopSender) -> (Self, oneshot::Receiver<Option<Bytes>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx), waker }, rx)
    }

    pub fn send(mut self, data: Option<Bytes>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(data);
            self.waker.wake();
        }
    }

    pub fn bytes(self, data: impl Into<Bytes>) {
        self.send(Some(data.into()));
    }

    pub fn empty(self) {
        self.send(None);
    }
}

impl Drop for DataReply {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            drop(tx);
            self.waker.wake();
        }
    }
}

/// Errors reported by a [`DragPlatform`].
#[derive(Debug, thiserror::Error)]
#[error("drag platform: {0}")]
pub struct PlatformError(pub String);

/// OS drag flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragFlags(u32);

impl DragFlags {
    /// Drag may leave the process.
    pub const GLOBAL: Self = Self(1 << 8);
    /// Drop targets in other processes may read URIs in the payload.
    pub const GLOBAL_URI_READ: Self = Self(0x1);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DragFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Everything the OS needs to start a drag.
#[derive(Debug, Clone)]
pub struct DragRequest {
    pub transfer: Transfer,
    pub preview: PreviewImage,
    pub touch_point: Point,
    pub local_state: LocalState,
    pub flags: DragFlags,
}

/// The OS drag facility.
pub trait DragPlatform: Send + 'static {
    fn start_drag(&mut self, surface: &Surface, request: DragRequest) -> Result<(), PlatformError>;
}

/// Platform without drag support. Every start is refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDragPlatform;

impl DragPlatform for NoDragPlatform {
    fn start_drag(&mut self, surface: &Surface, _request: DragRequest) -> Result<(), PlatformError> {
        Err(PlatformError(format!(
            "drag not supported (surface {})",
            surface.name
        )))
    }
}
