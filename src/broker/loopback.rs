//! Loopback resolver — our own content URIs read back through the relay.
//!
//! When this process pastes or drops data it published itself, the OS
//! hands back one of our `content://<authority>/…` URIs. Those are served
//! by the virtual resource relay; every other URI goes to the wrapped OS
//! resolver.

use std::sync::Arc;

use crate::provider::parse_content_uri;
use crate::resolver::{ContentResolver, ResolverError, TypedDescriptor};
use crate::transfer::ClipItem;

use super::scheduler::LoopSender;
use super::vrr;

pub(crate) struct LoopbackResolver {
    authority: String,
    sender: LoopSender,
    os: Arc<dyn ContentResolver>,
}

impl LoopbackResolver {
    pub fn new(authority: String, sender: LoopSender, os: Arc<dyn ContentResolver>) -> Self {
        Self {
            authority,
            sender,
            os,
        }
    }

    fn is_ours(&self, uri: &str) -> bool {
        parse_content_uri(&self.authority, uri).is_some()
    }
}

impl ContentResolver for LoopbackResolver {
    fn stream_types(&self, uri: &str, filter: &str) -> Option<Vec<String>> {
        if !self.is_ours(uri) {
            return self.os.stream_types(uri, filter);
        }
        let (owned_uri, owned_filter) = (uri.to_owned(), filter.to_owned());
        match self
            .sender
            .call(move |c| c.state().stream_types(&owned_uri, &owned_filter))
        {
            Ok(formats) => Some(formats.into_iter().map(|f| f.as_str().to_owned()).collect()),
            Err(e) => {
                tracing::debug!(uri, error = %e, "loopback stream types unavailable");
                None
            }
        }
    }

    fn open_typed(&self, uri: &str, format: &str) -> Result<TypedDescriptor, ResolverError> {
        if !self.is_ours(uri) {
            return self.os.open_typed(uri, format);
        }
        let has_format = self
            .stream_types(uri, format)
            .is_some_and(|formats| !formats.is_empty());
        if !has_format {
            return Err(ResolverError::NotFound(format!("{uri} as {format}")));
        }
        vrr::open_resource(&self.sender, uri, format)
            .map(TypedDescriptor::new)
            .map_err(|e| ResolverError::Io(std::io::Error::other(e)))
    }

    fn coerce_to_html(&self, item: &ClipItem) -> Option<String> {
        self.os.coerce_to_html(item)
    }
}
