//! Transfer data model — items, format tags, drag events.
//!
//! A [`Transfer`] is one clipboard or drag payload: an immutable,
//! cheaply cloned list of [`ClipItem`]s. An [`ItemDescriptor`] points at
//! one item of a transfer and keeps the transfer alive for as long as the
//! descriptor exists, so a descriptor can never outlive its transfer.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

pub const MIME_TEXT_PLAIN: &str = "text/plain";
pub const MIME_TEXT_HTML: &str = "text/html";
pub const MIME_URI_LIST: &str = "text/uri-list";
pub const MIME_TEXT_ANY: &str = "text/*";
pub const MIME_ANY: &str = "*/*";

/// URI schemes whose string form is never used as a textual fallback.
pub const OPAQUE_SCHEMES: [&str; 3] = ["content", "android.resource", "file"];

/// A data representation label, compared by exact match only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormatTag(String);

impl FormatTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FormatTag {
    fn from(tag: &str) -> Self {
        Self(tag.to_owned())
    }
}

impl From<String> for FormatTag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

impl PartialEq<str> for FormatTag {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for FormatTag {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// One addressable unit of a transfer.
///
/// Mirrors what the OS exposes for a clip item: optional literal plain
/// text, optional literal HTML text, and an optional URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipItem {
    pub text: Option<String>,
    pub html_text: Option<String>,
    pub uri: Option<String>,
}

impl ClipItem {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html_text = Some(html.into());
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.html_text.is_none() && self.uri.is_none()
    }
}

/// An immutable clipboard or drag payload.
#[derive(Debug, Clone, Default)]
pub struct Transfer {
    items: Arc<[ClipItem]>,
}

impl Transfer {
    pub fn new(items: Vec<ClipItem>) -> Self {
        Self {
            items: items.into(),
        }
    }

    pub fn single(item: ClipItem) -> Self {
        Self::new(vec![item])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ClipItem> {
        self.items.get(index)
    }

    /// Descriptor for the item at `index`, or `None` past the end.
    pub fn item(&self, index: usize) -> Option<ItemDescriptor> {
        (index < self.items.len()).then(|| ItemDescriptor {
            transfer: self.clone(),
            index,
        })
    }

    pub fn descriptors(&self) -> impl Iterator<Item = ItemDescriptor> + '_ {
        (0..self.items.len()).map(|index| ItemDescriptor {
            transfer: self.clone(),
            index,
        })
    }
}

/// Identifies one item of a transfer.
#[derive(Debug, Clone)]
pub struct ItemDescriptor {
    transfer: Transfer,
    index: usize,
}

impl ItemDescriptor {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn item(&self) -> Option<&ClipItem> {
        self.transfer.get(self.index)
    }

    pub fn uri(&self) -> Option<&str> {
        self.item().and_then(|item| item.uri.as_deref())
    }
}

/// Scheme of `uri` (the part before the first `:`), if it has one.
///
/// Follows RFC 3986: a letter followed by letters, digits, `+`, `-` or `.`.
pub fn uri_scheme(uri: &str) -> Option<&str> {
    let (scheme, _) = uri.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    chars
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        .then_some(scheme)
}

pub fn is_opaque_scheme(uri: &str) -> bool {
    uri_scheme(uri)
        .is_some_and(|scheme| OPAQUE_SCHEMES.iter().any(|s| s.eq_ignore_ascii_case(scheme)))
}

/// OS-layer MIME filter matching: `*/*`, `type/*` or exact.
///
/// The broker core never calls this for its own comparisons; it exists
/// for adapters that emulate the OS's wildcard stream-type queries.
pub fn mime_matches(concrete: &str, filter: &str) -> bool {
    if concrete == filter || filter == MIME_ANY {
        return true;
    }
    match (concrete.split_once('/'), filter.split_once('/')) {
        (Some((c_type, _)), Some((f_type, "*"))) => c_type.eq_ignore_ascii_case(f_type),
        (Some((c_type, c_sub)), Some((f_type, f_sub))) => {
            c_type.eq_ignore_ascii_case(f_type) && c_sub.eq_ignore_ascii_case(f_sub)
        }
        _ => false,
    }
}

/// Opaque value the OS carries on drag events on behalf of the drag's
/// originator. The broker can only recognise values it minted itself.
#[derive(Clone)]
pub struct LocalState(Arc<dyn Any + Send + Sync>);

impl LocalState {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for LocalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LocalState(..)")
    }
}

/// A live UI surface that drags start from and drops land on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub name: String,
    /// Enclosing window or activity, when the platform needs one.
    pub window: Option<String>,
}

impl Surface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            window: None,
        }
    }

    pub fn in_window(mut self, window: impl Into<String>) -> Self {
        self.window = Some(window.into());
        self
    }
}

/// Drag lifecycle stage reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragAction {
    Started,
    Entered,
    Location,
    Exited,
    Drop,
    Ended,
}

/// One inbound drag notification.
#[derive(Debug, Clone)]
pub struct DragEvent {
    pub action: DragAction,
    pub x: f32,
    pub y: f32,
    /// Payload, present on `Drop` (and `Started` on some platforms).
    pub transfer: Option<Transfer>,
    /// Token attached by whoever started the drag; `None` for drags
    /// from other processes.
    pub local_state: Option<LocalState>,
    /// Outcome reported with `Ended`.
    pub result: bool,
}

impl DragEvent {
    pub fn new(action: DragAction) -> Self {
        Self {
            action,
            x: 0.0,
            y: 0.0,
            transfer: None,
            local_state: None,
            result: false,
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_transfer(mut self, transfer: Transfer) -> Self {
        self.transfer = Some(transfer);
        self
    }

    pub fn with_local_state(mut self, state: LocalState) -> Self {
        self.local_state = Some(state);
        self
    }
}

/// RGBA drag preview image.
#[derive(Debug, Clone)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    pub data: Bytes,
}

impl PreviewImage {
    /// Whether `data` covers `height` rows of `bytes_per_row`, each at
    /// least `width` RGBA pixels wide.
    pub fn is_well_formed(&self) -> bool {
        let min_row = u64::from(self.width) * 4;
        let needed = u64::from(self.bytes_per_row) * u64::from(self.height);
        u64::from(self.bytes_per_row) >= min_row && self.data.len() as u64 >= needed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}
