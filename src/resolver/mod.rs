//! Resolver abstraction — the OS content-resolver seam plus the logic
//! built on top of it.
//!
//! Platform adapters implement [`ContentResolver`]; everything that
//! decides *which* formats an item offers ([`formats`]) and *how* bytes
//! are produced for a format ([`data`]) is written once against that
//! trait.

pub mod data;
pub mod formats;
pub mod fs;
pub mod memory;

use std::io::Read;

use crate::transfer::ClipItem;

pub use data::DataResolver;
pub use formats::enumerate_formats;

/// Errors returned by resolver adapters.
///
/// None of these cross the pipe boundary: the data resolver logs them
/// and reports an empty payload instead.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// No stream of the requested type exists for the URI.
    #[error("not found: {0}")]
    NotFound(String),

    /// The OS refused access to the URI. Not retried with other types.
    #[error("permission denied: {0}")]
    Security(String),

    /// The adapter does not handle this URI scheme.
    #[error("unsupported uri: {0}")]
    UnsupportedUri(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scoped handle to an OS-provided readable descriptor.
///
/// Reading drains the underlying stream. The descriptor is released when
/// the handle is dropped, on every exit path.
pub struct TypedDescriptor {
    stream: Box<dyn Read + Send>,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl TypedDescriptor {
    pub fn new(stream: impl Read + Send + 'static) -> Self {
        Self {
            stream: Box::new(stream),
            on_release: None,
        }
    }

    /// Run `hook` when the descriptor is released.
    pub fn on_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }
}

impl Read for TypedDescriptor {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Drop for TypedDescriptor {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

/// The OS content resolver, as seen by the broker.
///
/// `Send + Sync` is required because resolution may run on the
/// coordinator thread or on whichever OS thread asked for data.
pub trait ContentResolver: Send + Sync {
    /// Stream types the OS reports for `uri` under `filter`.
    ///
    /// `None` means the OS has no stream types registered for the URI.
    fn stream_types(&self, uri: &str, filter: &str) -> Option<Vec<String>>;

    /// Open `uri` as a readable stream of `format`.
    fn open_typed(&self, uri: &str, format: &str) -> Result<TypedDescriptor, ResolverError>;

    /// OS-native coercion of an item to HTML.
    ///
    /// Default: literal HTML, else escaped literal text, else a link to
    /// the item's URI.
    fn coerce_to_html(&self, item: &ClipItem) -> Option<String> {
        if let Some(html) = &item.html_text {
            return Some(html.clone());
        }
        if let Some(text) = &item.text {
            return Some(escape_html(text));
        }
        item.uri.as_ref().map(|uri| {
            let escaped = escape_html(uri);
            format!("<a href=\"{escaped}\">{escaped}</a>")
        })
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
