//! Test fixtures: a broker wired to recording fakes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::native::{DataReply, DragPlatform, DragRequest, NativeCore, PlatformError};
use crate::provider::{LazyDataSource, ProviderCore, ProviderTable};
use crate::resolver::memory::MemoryContentResolver;
use crate::transfer::{DragAction, DragEvent, FormatTag, LocalState, PreviewImage, Surface};

use super::{Broker, BrokerConfig, BrokerHandle, CorrelationHandle, HandlerId, LoopSender};

pub struct StartedDrag {
    pub surface: String,
    pub flags: u32,
    pub local_state: LocalState,
}

#[derive(Default)]
pub struct Recorded {
    pub data_ready: Vec<(CorrelationHandle, Option<Vec<u8>>)>,
    pub drag_events: Vec<(DragAction, HandlerId)>,
    pub drags: Vec<StartedDrag>,
}

/// Lazy source answering `lazy-<id>` from a separate thread, or holding
/// replies unanswered while `hold` is set.
#[derive(Default)]
pub struct TestLazySource {
    pub calls: AtomicUsize,
    pub hold: AtomicBool,
    held: Mutex<Vec<DataReply>>,
}

impl LazyDataSource for TestLazySource {
    fn produce(&self, id: u64, _format: &FormatTag, reply: DataReply) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hold.load(Ordering::SeqCst) {
            self.held.lock().unwrap().push(reply);
            return;
        }
        std::thread::spawn(move || reply.bytes(format!("lazy-{id}")));
    }
}

struct RecordingCore {
    inner: ProviderCore,
    log: Arc<Mutex<Recorded>>,
}

impl NativeCore for RecordingCore {
    fn resolve_formats(&mut self, uri: &str, filter: &str) -> Vec<FormatTag> {
        self.inner.resolve_formats(uri, filter)
    }

    fn resolve_data(&mut self, uri: &str, format: &FormatTag, reply: DataReply) {
        self.inner.resolve_data(uri, format, reply);
    }

    fn on_data_ready(&mut self, handle: CorrelationHandle, data: Option<Vec<u8>>) {
        self.log.lock().unwrap().data_ready.push((handle, data));
    }

    fn on_drag_event(&mut self, event: &DragEvent, handler: HandlerId) -> bool {
        self.log.lock().unwrap().drag_events.push((event.action, handler));
        true
    }
}

struct RecordingPlatform {
    log: Arc<Mutex<Recorded>>,
    refuse: Arc<AtomicBool>,
}

impl DragPlatform for RecordingPlatform {
    fn start_drag(&mut self, surface: &Surface, request: DragRequest) -> Result<(), PlatformError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(PlatformError("refused".into()));
        }
        self.log.lock().unwrap().drags.push(StartedDrag {
            surface: surface.name.clone(),
            flags: request.flags.bits(),
            local_state: request.local_state,
        });
        Ok(())
    }
}

/// Field order matters: the broker stops before the lazy source (and any
/// replies it holds) is dropped.
pub struct TestBroker {
    pub broker: Broker,
    pub os: Arc<MemoryContentResolver>,
    pub table: ProviderTable,
    pub lazy: Arc<TestLazySource>,
    pub log: Arc<Mutex<Recorded>>,
    pub refuse_drags: Arc<AtomicBool>,
}

impl TestBroker {
    pub fn start() -> Self {
        let config = BrokerConfig::default();
        let table = ProviderTable::new(config.authority.clone());
        let lazy = Arc::new(TestLazySource::default());
        let log = Arc::new(Mutex::new(Recorded::default()));
        let refuse_drags = Arc::new(AtomicBool::new(false));
        let os = Arc::new(MemoryContentResolver::new());

        let core = RecordingCore {
            inner: ProviderCore::new(table.clone()).with_lazy_source(lazy.clone()),
            log: Arc::clone(&log),
        };
        let platform = RecordingPlatform {
            log: Arc::clone(&log),
            refuse: Arc::clone(&refuse_drags),
        };
        let broker = Broker::start(config, core, platform, os.clone()).unwrap();
        Self {
            broker,
            os,
            table,
            lazy,
            log,
            refuse_drags,
        }
    }

    pub fn handle(&self) -> BrokerHandle {
        self.broker.handle()
    }

    pub fn sender(&self) -> LoopSender {
        self.broker.handle().sender().clone()
    }
}

pub fn recorded(t: &TestBroker) -> MutexGuard<'_, Recorded> {
    t.log.lock().unwrap()
}

/// 1x1 RGBA preview.
pub fn preview() -> PreviewImage {
    PreviewImage {
        width: 1,
        height: 1,
        bytes_per_row: 4,
        data: Bytes::from_static(&[0, 0, 0, 255]),
    }
}
