//! Format negotiation — which representations an item can plausibly supply.

use crate::transfer::{ClipItem, FormatTag, MIME_ANY, MIME_TEXT_HTML, MIME_TEXT_PLAIN, MIME_URI_LIST};

use super::ContentResolver;

/// Ordered, deduplicated format tags for `item`.
///
/// Literal HTML comes first, then literal plain text, then whatever the
/// OS reports for the item's URI under `*/*`. A URI the OS knows nothing
/// about contributes only `text/uri-list`. The first entry is the item's
/// best representation.
pub fn enumerate_formats(item: &ClipItem, resolver: &dyn ContentResolver) -> Vec<FormatTag> {
    let mut formats: Vec<FormatTag> = Vec::new();
    let mut push = |tag: &str| {
        if !formats.iter().any(|f| f == tag) {
            formats.push(FormatTag::from(tag));
        }
    };

    if item.html_text.is_some() {
        push(MIME_TEXT_HTML);
    }
    if item.text.is_some() {
        push(MIME_TEXT_PLAIN);
    }
    if let Some(uri) = &item.uri {
        match resolver.stream_types(uri, MIME_ANY) {
            Some(types) if !types.is_empty() => {
                for tag in &types {
                    push(tag);
                }
            }
            _ => push(MIME_URI_LIST),
        }
    }
    formats
}

/// First negotiated format, if any.
pub fn best_format(item: &ClipItem, resolver: &dyn ContentResolver) -> Option<FormatTag> {
    enumerate_formats(item, resolver).into_iter().next()
}
