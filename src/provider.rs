//! Data providers — the native core's published clipboard/drag data.
//!
//! A provider is a list of representations, each either ready bytes or a
//! lazy slot filled on demand by a [`LazyDataSource`]. Providers are
//! exposed to other processes under `content://<authority>/<id>` and
//! served back through the broker's virtual resource relay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::broker::pending::CorrelationHandle;
use crate::broker::registry::HandlerId;
use crate::native::{DataReply, NativeCore};
use crate::transfer::{
    ClipItem, DragEvent, FormatTag, MIME_TEXT_HTML, MIME_TEXT_PLAIN, MIME_URI_LIST, Transfer,
    mime_matches,
};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("unknown data provider {0}")]
    Unknown(u64),
    #[error("data provider {0} offers text/html without a text/plain fallback")]
    HtmlWithoutText(u64),
}

/// `content://<authority>/<id>`.
pub fn content_uri(authority: &str, id: u64) -> String {
    format!("content://{authority}/{id}")
}

/// Provider id from one of `authority`'s content URIs.
///
/// Anything after the id segment (a trailing path, query or fragment) is
/// ignored.
pub fn parse_content_uri(authority: &str, uri: &str) -> Option<u64> {
    let rest = uri.strip_prefix("content://")?.strip_prefix(authority)?;
    let rest = rest.strip_prefix('/')?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// One format a provider can supply.
#[derive(Debug, Clone)]
pub enum Representation {
    Simple { format: FormatTag, data: Bytes },
    /// Produced on request by the provider's [`LazyDataSource`] under `id`.
    Lazy { format: FormatTag, id: u64 },
}

impl Representation {
    pub fn simple(format: impl Into<FormatTag>, data: impl Into<Bytes>) -> Self {
        Self::Simple {
            format: format.into(),
            data: data.into(),
        }
    }

    pub fn lazy(format: impl Into<FormatTag>, id: u64) -> Self {
        Self::Lazy {
            format: format.into(),
            id,
        }
    }

    pub fn format(&self) -> &FormatTag {
        match self {
            Self::Simple { format, .. } | Self::Lazy { format, .. } => format,
        }
    }

    fn simple_text(&self, wanted: &str) -> Option<String> {
        match self {
            Self::Simple { format, data } if format == wanted => {
                Some(String::from_utf8_lossy(data).into_owned())
            }
            _ => None,
        }
    }
}

/// Produces lazy representations. Called on the coordinator; replies may
/// come from any thread.
pub trait LazyDataSource: Send + Sync {
    fn produce(&self, id: u64, format: &FormatTag, reply: DataReply);
}

#[derive(Debug, Clone, Default)]
pub struct DataProvider {
    pub representations: Vec<Representation>,
}

impl DataProvider {
    pub fn new(representations: Vec<Representation>) -> Self {
        Self { representations }
    }
}

enum Lookup {
    Ready(Bytes),
    Lazy(u64),
}

/// Shared table of live providers.
#[derive(Clone)]
pub struct ProviderTable {
    authority: Arc<str>,
    next_id: Arc<AtomicU64>,
    providers: Arc<Mutex<HashMap<u64, DataProvider>>>,
}

impl ProviderTable {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into().into(),
            next_id: Arc::new(AtomicU64::new(1)),
            providers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn providers(&self) -> MutexGuard<'_, HashMap<u64, DataProvider>> {
        self.providers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn register(&self, provider: DataProvider) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.providers().insert(id, provider);
        tracing::debug!(id, "data provider registered");
        id
    }

    pub fn unregister(&self, id: u64) -> bool {
        self.providers().remove(&id).is_some()
    }

    pub fn uri(&self, id: u64) -> String {
        content_uri(&self.authority, id)
    }

    /// The clip item the OS sees for provider `id`.
    ///
    /// Simple `text/plain`, `text/html` and `text/uri-list` representations
    /// become the item's literal text, HTML and URI (first of each wins).
    /// Any other or lazy representation makes the item point at the
    /// provider's content URI instead. `None` for a provider with nothing
    /// to offer.
    pub fn clip_item(&self, id: u64) -> Result<Option<ClipItem>, ProviderError> {
        let providers = self.providers();
        let provider = providers.get(&id).ok_or(ProviderError::Unknown(id))?;

        let mut item = ClipItem::default();
        let mut needs_provider_uri = false;
        for repr in &provider.representations {
            if let Some(text) = repr.simple_text(MIME_TEXT_PLAIN) {
                item.text.get_or_insert(text);
            } else if let Some(html) = repr.simple_text(MIME_TEXT_HTML) {
                item.html_text.get_or_insert(html);
            } else if let Some(uri) = repr.simple_text(MIME_URI_LIST) {
                item.uri.get_or_insert(uri);
            } else {
                needs_provider_uri = true;
            }
        }
        if item.html_text.is_some() && item.text.is_none() {
            return Err(ProviderError::HtmlWithoutText(id));
        }
        if needs_provider_uri {
            item.uri = Some(self.uri(id));
        }
        Ok((!item.is_empty()).then_some(item))
    }

    /// Transfer built from several providers, with every distinct format
    /// they offer in first-seen order.
    pub fn transfer(&self, ids: &[u64]) -> Result<(Transfer, Vec<FormatTag>), ProviderError> {
        let mut items = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(item) = self.clip_item(id)? {
                items.push(item);
            }
        }
        let mut formats: Vec<FormatTag> = Vec::new();
        let providers = self.providers();
        for id in ids {
            let Some(provider) = providers.get(id) else {
                continue;
            };
            for repr in &provider.representations {
                if !formats.contains(repr.format()) {
                    formats.push(repr.format().clone());
                }
            }
        }
        Ok((Transfer::new(items), formats))
    }

    fn formats_for_uri(&self, uri: &str, filter: &str) -> Vec<FormatTag> {
        let Some(id) = parse_content_uri(&self.authority, uri) else {
            return Vec::new();
        };
        let providers = self.providers();
        let Some(provider) = providers.get(&id) else {
            tracing::debug!(id, "formats requested for unknown provider");
            return Vec::new();
        };
        provider
            .representations
            .iter()
            .map(Representation::format)
            .filter(|format| mime_matches(format.as_str(), filter))
            .cloned()
            .collect()
    }

    fn lookup(&self, uri: &str, format: &FormatTag) -> Option<Lookup> {
        let id = parse_content_uri(&self.authority, uri)?;
        let providers = self.providers();
        let repr = providers
            .get(&id)?
            .representations
            .iter()
            .find(|r| r.format() == format)?;
        Some(match repr {
            Representation::Simple { data, .. } => Lookup::Ready(data.clone()),
            Representation::Lazy { id, .. } => Lookup::Lazy(*id),
        })
    }
}

type DropPolicy = Box<dyn FnMut(&DragEvent, HandlerId) -> bool + Send>;

/// [`NativeCore`] backed by a [`ProviderTable`].
pub struct ProviderCore {
    table: ProviderTable,
    lazy: Option<Arc<dyn LazyDataSource>>,
    data_sink: Option<mpsc::UnboundedSender<(CorrelationHandle, Option<Vec<u8>>)>>,
    drop_policy: Option<DropPolicy>,
}

impl ProviderCore {
    pub fn new(table: ProviderTable) -> Self {
        Self {
            table,
            lazy: None,
            data_sink: None,
            drop_policy: None,
        }
    }

    pub fn with_lazy_source(mut self, source: Arc<dyn LazyDataSource>) -> Self {
        self.lazy = Some(source);
        self
    }

    /// Forward completed item-data requests to `sink`.
    pub fn with_data_sink(
        mut self,
        sink: mpsc::UnboundedSender<(CorrelationHandle, Option<Vec<u8>>)>,
    ) -> Self {
        self.data_sink = Some(sink);
        self
    }

    /// Decide which drag events are consumed. Without a policy none are.
    pub fn with_drop_policy(
        mut self,
        policy: impl FnMut(&DragEvent, HandlerId) -> bool + Send + 'static,
    ) -> Self {
        self.drop_policy = Some(Box::new(policy));
        self
    }
}

impl NativeCore for ProviderCore {
    fn resolve_formats(&mut self, uri: &str, filter: &str) -> Vec<FormatTag> {
        self.table.formats_for_uri(uri, filter)
    }

    fn resolve_data(&mut self, uri: &str, format: &FormatTag, reply: DataReply) {
        match self.table.lookup(uri, format) {
            Some(Lookup::Ready(data)) => reply.send(Some(data)),
            Some(Lookup::Lazy(id)) => match &self.lazy {
                Some(source) => source.produce(id, format, reply),
                None => {
                    tracing::warn!(uri, id, "lazy representation without a data source");
                    reply.empty();
                }
            },
            None => {
                tracing::debug!(uri, %format, "no representation");
                reply.empty();
            }
        }
    }

    fn on_data_ready(&mut self, handle: CorrelationHandle, data: Option<Vec<u8>>) {
        tracing::debug!(
            handle = handle.get(),
            bytes = data.as_ref().map(Vec::len),
            "item data ready"
        );
        if let Some(sink) = &self.data_sink {
            let _ = sink.send((handle, data));
        }
    }

    fn on_drag_event(&mut self, event: &DragEvent, handler: HandlerId) -> bool {
        match &mut self.drop_policy {
            Some(policy) => policy(event, handler),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTHORITY: &str = "test.provider";

    #[test]
    fn content_uri_round_trip() {
        let uri = content_uri(AUTHORITY, 42);
        assert_eq!(uri, "content://test.provider/42");
        assert_eq!(parse_content_uri(AUTHORITY, &uri), Some(42));
        assert_eq!(parse_content_uri(AUTHORITY, "content://test.provider/42/extra"), Some(42));
        assert_eq!(parse_content_uri(AUTHORITY, "content://other/42"), None);
        assert_eq!(parse_content_uri(AUTHORITY, "content://test.provider.evil/42"), None);
        assert_eq!(parse_content_uri(AUTHORITY, "content://test.provider/abc"), None);
        assert_eq!(parse_content_uri(AUTHORITY, "https://test.provider/42"), None);
    }

    #[test]
    fn simple_text_becomes_literal_item() {
        let table = ProviderTable::new(AUTHORITY);
        let id = table.register(DataProvider::new(vec![
            Representation::simple("text/plain", "hi"),
            Representation::simple("text/html", "<b>hi</b>"),
            Representation::simple("text/plain", "ignored second"),
        ]));
        let item = table.clip_item(id).unwrap().unwrap();
        assert_eq!(item.text.as_deref(), Some("hi"));
        assert_eq!(item.html_text.as_deref(), Some("<b>hi</b>"));
        assert_eq!(item.uri, None);
    }

    #[test]
    fn binary_or_lazy_representation_uses_content_uri() {
        let table = ProviderTable::new(AUTHORITY);
        let id = table.register(DataProvider::new(vec![
            Representation::simple("text/plain", "caption"),
            Representation::lazy("image/png", 7),
        ]));
        let item = table.clip_item(id).unwrap().unwrap();
        assert_eq!(item.text.as_deref(), Some("caption"));
        assert_eq!(item.uri, Some(table.uri(id)));
    }

    #[test]
    fn html_requires_plain_text() {
        let table = ProviderTable::new(AUTHORITY);
        let id = table.register(DataProvider::new(vec![Representation::simple(
            "text/html",
            "<p/>",
        )]));
        assert!(matches!(
            table.clip_item(id),
            Err(ProviderError::HtmlWithoutText(_))
        ));
    }

    #[test]
    fn empty_and_unknown_providers() {
        let table = ProviderTable::new(AUTHORITY);
        let id = table.register(DataProvider::default());
        assert_eq!(table.clip_item(id).unwrap(), None);
        assert!(matches!(table.clip_item(999), Err(ProviderError::Unknown(999))));
        assert!(table.unregister(id));
        assert!(!table.unregister(id));
    }

    #[test]
    fn transfer_collects_distinct_formats() {
        let table = ProviderTable::new(AUTHORITY);
        let a = table.register(DataProvider::new(vec![
            Representation::simple("text/plain", "a"),
            Representation::lazy("image/png", 1),
        ]));
        let b = table.register(DataProvider::new(vec![
            Representation::simple("text/plain", "b"),
            Representation::simple("application/json", "{}"),
        ]));
        let (transfer, formats) = table.transfer(&[a, b]).unwrap();
        assert_eq!(transfer.len(), 2);
        let tags: Vec<&str> = formats.iter().map(FormatTag::as_str).collect();
        assert_eq!(tags, vec!["text/plain", "image/png", "application/json"]);
    }

    #[test]
    fn formats_for_uri_apply_filter() {
        let table = ProviderTable::new(AUTHORITY);
        let id = table.register(DataProvider::new(vec![
            Representation::simple("text/plain", "a"),
            Representation::lazy("image/png", 1),
        ]));
        let mut core = ProviderCore::new(table.clone());
        let uri = table.uri(id);
        assert_eq!(core.resolve_formats(&uri, "*/*").len(), 2);
        assert_eq!(core.resolve_formats(&uri, "image/*"), vec![FormatTag::from("image/png")]);
        assert!(core.resolve_formats("content://elsewhere/1", "*/*").is_empty());
    }

    #[test]
    fn default_drop_policy_declines() {
        let mut core = ProviderCore::new(ProviderTable::new(AUTHORITY));
        let event = DragEvent::new(crate::transfer::DragAction::Drop);
        assert!(!core.on_drag_event(&event, HandlerId::new(1)));

        let mut core = ProviderCore::new(ProviderTable::new(AUTHORITY))
            .with_drop_policy(|_, handler| handler.get() == 1);
        assert!(core.on_drag_event(&event, HandlerId::new(1)));
        assert!(!core.on_drag_event(&event, HandlerId::new(2)));
    }
}
