//! Broker — clipboard and drag-and-drop data exchange with the OS.
//!
//! The broker sits between a native core (which owns the application's
//! published data and reacts to drags) and the OS (which asks for that
//! data on arbitrary threads and hands us foreign clipboard and drag
//! payloads).
//!
//! Architecture: single-owner coordinator. One dedicated thread runs the
//! loop in [`scheduler`] and exclusively owns [`state::BrokerState`]:
//! the native core, the drag platform, the drag registry and the table
//! of pending data requests. [`BrokerHandle`] is the cloneable,
//! thread-safe front door; every state access is posted to the
//! coordinator. Data for our own content URIs is served through pipes by
//! the virtual resource relay ([`vrr`]).

mod loopback;
pub mod pending;
pub mod registry;
pub mod scheduler;
pub mod state;
mod vrr;

#[cfg(test)]
pub(crate) mod test_support;

use std::fs::File;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};

use crate::native::{DragPlatform, NativeCore, PlatformError};
use crate::resolver::data::DEFAULT_CHUNK_SIZE;
use crate::resolver::fs::FileContentResolver;
use crate::resolver::{ContentResolver, DataResolver, enumerate_formats};
use crate::transfer::{
    DragEvent, FormatTag, ItemDescriptor, MIME_ANY, Point, PreviewImage, Surface, Transfer,
};

use loopback::LoopbackResolver;
use scheduler::Coordinator;
use state::{BrokerState, Completion};

pub use pending::CorrelationHandle;
pub use registry::{HandlerId, SessionId, ViewHandle};
pub use scheduler::LoopSender;

/// Content-provider authority used when none is configured.
pub const DEFAULT_AUTHORITY: &str = "dev.clipferry.provider";

/// Broker startup/runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker coordinator is not running")]
    Stopped,
    #[error("data provider does not support {0}")]
    Unsupported(&'static str),
    #[error("failed to create pipe: {0}")]
    Pipe(#[source] nix::Error),
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("drag preview data does not match its dimensions")]
    InvalidPreview,
}

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Authority for this process's `content://` URIs.
    pub authority: String,
    /// Chunk size used when draining OS descriptors.
    pub read_chunk_size: usize,
    /// Name of the coordinator thread.
    pub coordinator_name: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_owned(),
            read_chunk_size: DEFAULT_CHUNK_SIZE,
            coordinator_name: "clipferry-coordinator".to_owned(),
        }
    }
}

/// A running broker. Dropping it stops the coordinator and joins it.
pub struct Broker {
    handle: BrokerHandle,
    thread: Option<JoinHandle<()>>,
}

impl Broker {
    /// Spawn the coordinator thread.
    ///
    /// `os` is the platform content resolver. URIs under the configured
    /// authority are routed back through this broker instead.
    pub fn start(
        config: BrokerConfig,
        core: impl NativeCore,
        platform: impl DragPlatform,
        os: Arc<dyn ContentResolver>,
    ) -> Result<Self, BrokerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = LoopSender::new(tx);

        let loopback = LoopbackResolver::new(config.authority.clone(), sender.clone(), os);
        let resolver =
            DataResolver::new(Arc::new(loopback)).with_chunk_size(config.read_chunk_size);
        let state = BrokerState::new(sender.clone(), Box::new(core), Box::new(platform));

        let loop_sender = sender.clone();
        let thread = std::thread::Builder::new()
            .name(config.coordinator_name.clone())
            .spawn(move || Coordinator::new(rx, loop_sender, state).run())
            .map_err(BrokerError::Spawn)?;

        tracing::info!(
            authority = %config.authority,
            thread = %config.coordinator_name,
            "broker started"
        );
        Ok(Self {
            handle: BrokerHandle {
                sender,
                resolver,
                authority: config.authority.into(),
            },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> BrokerHandle {
        self.handle.clone()
    }

    /// Stop the coordinator and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.handle.sender.shutdown();
        if thread.thread().id() == std::thread::current().id() {
            // Dropped from a task on the coordinator; the loop exits by itself.
            return;
        }
        if thread.join().is_err() {
            tracing::error!("coordinator thread panicked");
        }
        tracing::info!("broker stopped");
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cloneable, thread-safe access to a running broker.
///
/// Blocking methods must not be called from inside an async runtime;
/// use `spawn_blocking` or the `async` variants there.
#[derive(Clone)]
pub struct BrokerHandle {
    sender: LoopSender,
    resolver: DataResolver,
    authority: Arc<str>,
}

impl BrokerHandle {
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn sender(&self) -> &LoopSender {
        &self.sender
    }

    /// Wait until everything posted before this call has run.
    pub fn flush(&self) -> Result<(), BrokerError> {
        self.sender.call(|_| ())
    }

    // -- Virtual resource relay (OS asks us for our data) --

    /// Open one of our content URIs as a readable pipe of its first
    /// format matching `filter`.
    pub fn open_resource(&self, uri: &str, filter: &str) -> Result<File, BrokerError> {
        vrr::open_resource(&self.sender, uri, filter)
    }

    /// Formats the native core can supply for `uri` under `filter`.
    pub fn stream_types(&self, uri: &str, filter: &str) -> Result<Vec<FormatTag>, BrokerError> {
        let (uri, filter) = (uri.to_owned(), filter.to_owned());
        self.sender
            .call(move |c| c.state().stream_types(&uri, &filter))
    }

    /// Primary type of `uri`: its first format under `*/*`.
    pub fn resource_type(&self, uri: &str) -> Result<Option<FormatTag>, BrokerError> {
        Ok(self.stream_types(uri, MIME_ANY)?.into_iter().next())
    }

    /// Published data is read-only.
    pub fn insert(&self, _uri: &str) -> Result<(), BrokerError> {
        Err(BrokerError::Unsupported("insert"))
    }

    pub fn update(&self, _uri: &str) -> Result<(), BrokerError> {
        Err(BrokerError::Unsupported("update"))
    }

    pub fn delete(&self, _uri: &str) -> Result<(), BrokerError> {
        Err(BrokerError::Unsupported("delete"))
    }

    pub fn query(&self, _uri: &str) -> Result<(), BrokerError> {
        Err(BrokerError::Unsupported("query"))
    }

    // -- Item reading (we ask the OS for foreign data) --

    /// Formats `item` can plausibly supply, best first. Runs on the
    /// calling thread.
    pub fn item_formats(&self, item: &ItemDescriptor) -> Vec<FormatTag> {
        match item.item() {
            Some(clip) => enumerate_formats(clip, self.resolver.content_resolver()),
            None => Vec::new(),
        }
    }

    /// Start reading `item` as `format`; the result is delivered to
    /// `NativeCore::on_data_ready` on the coordinator.
    ///
    /// Called off the coordinator, resolution happens on the calling
    /// thread before this returns. On the coordinator it is deferred to a
    /// later turn so the loop is not blocked.
    pub fn request_item_data(
        &self,
        item: ItemDescriptor,
        format: FormatTag,
    ) -> Result<CorrelationHandle, BrokerError> {
        let handle = self
            .sender
            .call(|c| c.state().issue(Completion::Notify))?;
        self.resolve_then_complete(handle, item, format)?;
        Ok(handle)
    }

    /// Read `item` as `format` without blocking the caller.
    ///
    /// `None` when the data is unavailable or the broker stopped.
    pub async fn read_item_data(&self, item: ItemDescriptor, format: FormatTag) -> Option<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        let posted = self.sender.post(move |c| {
            let handle = c.state().issue(Completion::Reply(tx));
            if let Err(e) = this.resolve_then_complete(handle, item, format) {
                tracing::debug!(error = %e, "item read not scheduled");
            }
        });
        if posted.is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    fn resolve_then_complete(
        &self,
        handle: CorrelationHandle,
        item: ItemDescriptor,
        format: FormatTag,
    ) -> Result<(), BrokerError> {
        let resolver = self.resolver.clone();
        let sender = self.sender.clone();
        self.sender.ensure_off_affinity(move || {
            let data = resolver.resolve_item(&item, format.as_str());
            tracing::trace!(
                handle = handle.get(),
                %format,
                bytes = data.as_ref().map(Vec::len),
                "item data resolved"
            );
            if sender
                .post(move |c| c.state().complete(handle, data))
                .is_err()
            {
                tracing::debug!(handle = handle.get(), "broker stopped before completion");
            }
        })
    }

    /// File name to suggest for a dropped item, from its URI.
    ///
    /// `None` for items without a URI and for our own content URIs.
    pub fn suggested_name(&self, item: &ItemDescriptor) -> Option<String> {
        let uri = item.uri()?;
        if crate::provider::parse_content_uri(&self.authority, uri).is_some() {
            return None;
        }
        name_from_uri(uri)
    }

    // -- Drag and drop --

    pub fn register_view(&self, surface: Surface) -> Result<ViewHandle, BrokerError> {
        self.sender
            .call(move |c| c.state().register_view(surface))
    }

    /// Unregister `view`. Unknown or already-unregistered handles are a
    /// no-op.
    pub fn unregister_view(&self, view: ViewHandle) -> Result<bool, BrokerError> {
        self.sender
            .call(move |c| c.state().unregister_view(view))
    }

    pub fn begin_session(&self) -> Result<SessionId, BrokerError> {
        self.sender.call(|c| c.state().begin_session())
    }

    /// Start a drag of `transfer` from `view` under `session`.
    ///
    /// `Ok(false)` when the view or session is not usable.
    pub fn start_drag(
        &self,
        view: ViewHandle,
        session: SessionId,
        transfer: Transfer,
        preview: PreviewImage,
        touch_point: Point,
    ) -> Result<bool, BrokerError> {
        if !preview.is_well_formed() {
            return Err(BrokerError::InvalidPreview);
        }
        self.sender.call(move |c| {
            c.state()
                .start_drag(view, session, transfer, preview, touch_point)
        })?
    }

    /// The drag session `event` belongs to, if this broker started it.
    pub fn lookup_session(&self, event: &DragEvent) -> Result<Option<SessionId>, BrokerError> {
        let event = event.clone();
        self.sender
            .call(move |c| c.state().lookup_session(&event))
    }

    pub fn register_drop_handler(&self, view: ViewHandle, handler: HandlerId) -> Result<bool, BrokerError> {
        self.sender
            .call(move |c| c.state().register_drop_handler(view, handler))
    }

    /// Deliver an OS drag event for `view`. Returns whether it was
    /// consumed; views without a drop handler never consume.
    pub fn dispatch_drag_event(&self, view: ViewHandle, event: DragEvent) -> Result<bool, BrokerError> {
        self.sender
            .call(move |c| c.state().dispatch_drag_event(view, &event))
    }
}

/// Last path segment of `uri`, without query or fragment.
fn name_from_uri(uri: &str) -> Option<String> {
    if let Some(path) = FileContentResolver::path_for_uri(uri) {
        return path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
    }
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    let uri = &uri[..end];
    let path = match uri.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path)?,
        None => uri,
    };
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_owned)
}
