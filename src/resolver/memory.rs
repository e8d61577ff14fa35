//! In-memory content resolver — a simulated OS content table.
//!
//! Maps URIs to typed byte payloads. Supports per-URI access denial and
//! injected read failures, and counts live descriptors so callers can
//! check that every opened descriptor was released.

use std::collections::{HashMap, HashSet};
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::transfer::mime_matches;

use super::{ContentResolver, ResolverError, TypedDescriptor};

#[derive(Default)]
struct Table {
    /// Per-URI representations, in registration order.
    entries: HashMap<String, Vec<(String, Bytes)>>,
    denied: HashSet<String>,
    failing_reads: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryContentResolver {
    table: Mutex<Table>,
    open_descriptors: Arc<AtomicUsize>,
}

impl MemoryContentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        // A panic while holding the lock leaves the table consistent.
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `data` as the `format` representation of `uri`.
    pub fn insert(&self, uri: &str, format: &str, data: impl Into<Bytes>) {
        let mut table = self.table();
        let reprs = table.entries.entry(uri.to_owned()).or_default();
        let data = data.into();
        match reprs.iter_mut().find(|(f, _)| f == format) {
            Some(slot) => slot.1 = data,
            None => reprs.push((format.to_owned(), data)),
        }
    }

    /// Refuse every open of `uri` with a security error.
    pub fn deny(&self, uri: &str) {
        self.table().denied.insert(uri.to_owned());
    }

    /// Let opens of `uri` succeed but fail the first read.
    pub fn fail_reads(&self, uri: &str) {
        self.table().failing_reads.insert(uri.to_owned());
    }

    /// Number of descriptors opened and not yet released.
    pub fn open_descriptors(&self) -> usize {
        self.open_descriptors.load(Ordering::SeqCst)
    }
}

struct FailingRead;

impl Read for FailingRead {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("simulated read failure"))
    }
}

impl ContentResolver for MemoryContentResolver {
    fn stream_types(&self, uri: &str, filter: &str) -> Option<Vec<String>> {
        let table = self.table();
        let reprs = table.entries.get(uri)?;
        Some(
            reprs
                .iter()
                .filter(|(format, _)| mime_matches(format, filter))
                .map(|(format, _)| format.clone())
                .collect(),
        )
    }

    fn open_typed(&self, uri: &str, format: &str) -> Result<TypedDescriptor, ResolverError> {
        let table = self.table();
        if table.denied.contains(uri) {
            return Err(ResolverError::Security(uri.to_owned()));
        }
        let data = table
            .entries
            .get(uri)
            .and_then(|reprs| reprs.iter().find(|(f, _)| mime_matches(f, format)))
            .map(|(_, data)| data.clone())
            .ok_or_else(|| ResolverError::NotFound(format!("{uri} as {format}")))?;

        let counter = Arc::clone(&self.open_descriptors);
        counter.fetch_add(1, Ordering::SeqCst);
        let release = move || {
            counter.fetch_sub(1, Ordering::SeqCst);
        };
        let descriptor = if table.failing_reads.contains(uri) {
            TypedDescriptor::new(FailingRead)
        } else {
            TypedDescriptor::new(io::Cursor::new(data))
        };
        Ok(descriptor.on_release(release))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_uri_reports_no_types() {
        let os = MemoryContentResolver::new();
        assert!(os.stream_types("content://x/1", "*/*").is_none());
    }

    #[test]
    fn filter_applies_wildcards() {
        let os = MemoryContentResolver::new();
        os.insert("content://x/1", "text/plain", "a");
        os.insert("content://x/1", "image/png", vec![0u8]);
        assert_eq!(
            os.stream_types("content://x/1", "text/*"),
            Some(vec!["text/plain".to_owned()])
        );
        assert_eq!(os.stream_types("content://x/1", "*/*").map(|t| t.len()), Some(2));
    }

    #[test]
    fn insert_replaces_same_format() {
        let os = MemoryContentResolver::new();
        os.insert("content://x/1", "text/plain", "old");
        os.insert("content://x/1", "text/plain", "new");
        let mut out = Vec::new();
        os.open_typed("content://x/1", "text/plain")
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"new");
        assert_eq!(os.open_descriptors(), 0);
    }

    #[test]
    fn denied_uri_is_security_error() {
        let os = MemoryContentResolver::new();
        os.insert("content://x/1", "text/plain", "a");
        os.deny("content://x/1");
        assert!(matches!(
            os.open_typed("content://x/1", "text/plain"),
            Err(ResolverError::Security(_))
        ));
        assert_eq!(os.open_descriptors(), 0);
    }

    #[test]
    fn descriptor_counter_tracks_lifetime() {
        let os = MemoryContentResolver::new();
        os.insert("content://x/1", "text/plain", "a");
        let desc = os.open_typed("content://x/1", "text/plain").unwrap();
        assert_eq!(os.open_descriptors(), 1);
        drop(desc);
        assert_eq!(os.open_descriptors(), 0);
    }
}
