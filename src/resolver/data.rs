//! Data resolution — concrete bytes for an (item, format) pair.
//!
//! Every failure below this boundary (stream open errors, read errors,
//! missing items) is logged and reported as "no data". Callers cannot
//! tell an absent representation from a failed one.

use std::io::{self, Read};
use std::sync::Arc;

use crate::transfer::{
    ClipItem, ItemDescriptor, MIME_TEXT_ANY, MIME_TEXT_HTML, MIME_TEXT_PLAIN, MIME_URI_LIST,
    is_opaque_scheme,
};

use super::{ContentResolver, ResolverError, TypedDescriptor};

/// Default copy chunk for descriptor reads.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Resolves item data through an OS [`ContentResolver`].
#[derive(Clone)]
pub struct DataResolver {
    resolver: Arc<dyn ContentResolver>,
    chunk_size: usize,
}

impl DataResolver {
    pub fn new(resolver: Arc<dyn ContentResolver>) -> Self {
        Self {
            resolver,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn content_resolver(&self) -> &dyn ContentResolver {
        &*self.resolver
    }

    /// Resolve the item a descriptor points at. `None` past the end.
    pub fn resolve_item(&self, item: &ItemDescriptor, format: &str) -> Option<Vec<u8>> {
        match item.item() {
            Some(clip) => self.resolve(clip, format),
            None => {
                tracing::debug!(index = item.index(), format, "item index out of range");
                None
            }
        }
    }

    /// Bytes for `item` in `format`, or `None` when unavailable.
    pub fn resolve(&self, item: &ClipItem, format: &str) -> Option<Vec<u8>> {
        match format {
            MIME_TEXT_HTML => self.resolver.coerce_to_html(item).map(String::into_bytes),
            MIME_TEXT_PLAIN => self.coerce_to_plain_text(item).map(String::into_bytes),
            MIME_URI_LIST => self.uri_list(item),
            other => {
                let uri = item.uri.as_deref()?;
                self.read_uri(uri, other)
            }
        }
    }

    /// Plain text with preference: literal text, the URI's `text/plain`
    /// stream, its `text/*` stream, then the URI string itself unless
    /// the scheme is opaque.
    fn coerce_to_plain_text(&self, item: &ClipItem) -> Option<String> {
        if let Some(text) = &item.text {
            return Some(text.clone());
        }
        let Some(uri) = item.uri.as_deref() else {
            return Some(String::new());
        };

        let descriptor = match self.resolver.open_typed(uri, MIME_TEXT_PLAIN) {
            Ok(d) => Some(d),
            Err(ResolverError::Security(reason)) => {
                tracing::warn!(uri, reason = %reason, "text stream refused");
                None
            }
            Err(_) => match self.resolver.open_typed(uri, MIME_TEXT_ANY) {
                Ok(d) => Some(d),
                Err(e) => {
                    tracing::debug!(uri, error = %e, "no text stream for uri");
                    None
                }
            },
        };

        if let Some(descriptor) = descriptor {
            match self.drain(descriptor) {
                Ok(bytes) => return Some(String::from_utf8_lossy(&bytes).into_owned()),
                Err(e) => tracing::warn!(uri, error = %e, "failed loading text stream"),
            }
        }

        if is_opaque_scheme(uri) {
            Some(String::new())
        } else {
            Some(uri.to_owned())
        }
    }

    /// The URI's own `text/uri-list` stream, else the bare URI string.
    fn uri_list(&self, item: &ClipItem) -> Option<Vec<u8>> {
        let uri = item.uri.as_deref()?;
        self.read_uri(uri, MIME_URI_LIST)
            .or_else(|| Some(uri.as_bytes().to_vec()))
    }

    fn read_uri(&self, uri: &str, format: &str) -> Option<Vec<u8>> {
        let descriptor = match self.resolver.open_typed(uri, format) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(uri, format, error = %e, "failed to open resource stream");
                return None;
            }
        };
        match self.drain(descriptor) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(uri, format, error = %e, "failed loading resource stream");
                None
            }
        }
    }

    /// Copy a descriptor into a buffer in fixed-size chunks.
    ///
    /// Takes the descriptor by value: it is released when this returns,
    /// whether the copy succeeded or not.
    fn drain(&self, mut descriptor: TypedDescriptor) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = vec![0u8; self.chunk_size];
        loop {
            match descriptor.read(&mut chunk) {
                Ok(0) => return Ok(out),
                Ok(n) => out.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
