//! Filesystem content resolver — `file://` URIs backed by local files.
//!
//! Stream types are guessed from the file extension. A file opens for a
//! requested type only when its guessed type matches that type.

use std::ffi::OsString;
use std::fs::File;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use crate::transfer::{mime_matches, uri_scheme};

use super::{ContentResolver, ResolverError, TypedDescriptor};

const EXTENSION_TYPES: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("csv", "text/csv"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct FileContentResolver;

impl FileContentResolver {
    pub fn new() -> Self {
        Self
    }

    /// Local path for a `file://` URI.
    pub fn path_for_uri(uri: &str) -> Option<PathBuf> {
        let scheme = uri_scheme(uri)?;
        if !scheme.eq_ignore_ascii_case("file") {
            return None;
        }
        let rest = &uri[scheme.len() + 1..];
        let path = match rest.strip_prefix("//") {
            // `file://localhost/x` and `file:///x` both name `/x`.
            Some(authority_and_path) => match authority_and_path.strip_prefix("localhost") {
                Some(p) if p.is_empty() || p.starts_with('/') => p,
                _ => authority_and_path,
            },
            None => rest,
        };
        (!path.is_empty()).then(|| PathBuf::from(OsString::from_vec(percent_decode(path))))
    }

    /// `file://` URI for `path`, percent-encoded so that
    /// [`path_for_uri`](Self::path_for_uri) gives `path` back.
    pub fn uri_for_path(path: &Path) -> String {
        let mut uri = String::from("file://");
        for &b in path.as_os_str().as_bytes() {
            if is_path_safe(b) {
                uri.push(char::from(b));
            } else {
                uri.push_str(&format!("%{b:02X}"));
            }
        }
        uri
    }

    fn guess_type(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        EXTENSION_TYPES
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, mime)| *mime)
    }
}

/// Bytes a URI path may carry unescaped.
fn is_path_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"/-._~!$&'()*+,;=:@".contains(&b)
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push((hex_value(bytes[i + 1]) << 4) | hex_value(bytes[i + 2]));
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

impl ContentResolver for FileContentResolver {
    fn stream_types(&self, uri: &str, filter: &str) -> Option<Vec<String>> {
        let path = Self::path_for_uri(uri)?;
        if !path.is_file() {
            return None;
        }
        let mime = Self::guess_type(&path)?;
        Some(
            mime_matches(mime, filter)
                .then(|| mime.to_owned())
                .into_iter()
                .collect(),
        )
    }

    fn open_typed(&self, uri: &str, format: &str) -> Result<TypedDescriptor, ResolverError> {
        let path =
            Self::path_for_uri(uri).ok_or_else(|| ResolverError::UnsupportedUri(uri.to_owned()))?;
        let mime = Self::guess_type(&path)
            .ok_or_else(|| ResolverError::NotFound(format!("{} has no known type", path.display())))?;
        if !mime_matches(mime, format) {
            return Err(ResolverError::NotFound(format!("{uri} as {format}")));
        }
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => ResolverError::Security(path.display().to_string()),
            std::io::ErrorKind::NotFound => ResolverError::NotFound(path.display().to_string()),
            _ => ResolverError::Io(e),
        })?;
        tracing::trace!(path = %path.display(), mime, "opened file descriptor");
        Ok(TypedDescriptor::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn path_from_uri_forms() {
        assert_eq!(
            FileContentResolver::path_for_uri("file:///tmp/a.txt"),
            Some(PathBuf::from("/tmp/a.txt"))
        );
        assert_eq!(
            FileContentResolver::path_for_uri("file://localhost/tmp/a.txt"),
            Some(PathBuf::from("/tmp/a.txt"))
        );
        assert_eq!(
            FileContentResolver::path_for_uri("file:///tmp/with%20space.txt"),
            Some(PathBuf::from("/tmp/with space.txt"))
        );
        assert_eq!(FileContentResolver::path_for_uri("https://x/a.txt"), None);
        assert_eq!(FileContentResolver::path_for_uri("/tmp/a.txt"), None);
    }

    #[test]
    fn localhost_only_as_whole_authority() {
        assert_eq!(FileContentResolver::path_for_uri("file://localhost"), None);
        assert_eq!(
            FileContentResolver::path_for_uri("file://localhostfoo/x"),
            Some(PathBuf::from("localhostfoo/x"))
        );
    }

    #[test]
    fn malformed_escapes_kept_literally() {
        assert_eq!(
            FileContentResolver::path_for_uri("file:///tmp/%+1.txt"),
            Some(PathBuf::from("/tmp/%+1.txt"))
        );
        assert_eq!(
            FileContentResolver::path_for_uri("file:///tmp/50%"),
            Some(PathBuf::from("/tmp/50%"))
        );
        assert_eq!(
            FileContentResolver::path_for_uri("file:///tmp/%4a%4A"),
            Some(PathBuf::from("/tmp/JJ"))
        );
    }

    #[test]
    fn uri_round_trips_awkward_names() {
        let dir = tempfile::tempdir().unwrap();
        let os = FileContentResolver::new();
        for name in ["100%41.txt", "a b#c?.txt", "caf\u{e9}.txt", "50%.txt"] {
            let path = dir.path().join(name);
            std::fs::write(&path, name).unwrap();
            let uri = FileContentResolver::uri_for_path(&path);
            assert!(!uri.contains('#') && !uri.contains('?') && !uri.contains(' '));
            assert!(uri.is_ascii());
            assert_eq!(FileContentResolver::path_for_uri(&uri), Some(path.clone()));

            let mut out = String::new();
            os.open_typed(&uri, "text/plain")
                .unwrap()
                .read_to_string(&mut out)
                .unwrap();
            assert_eq!(out, name);
        }
    }

    #[test]
    fn types_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.html");
        std::fs::write(&path, "<p>hi</p>").unwrap();
        let uri = FileContentResolver::uri_for_path(&path);
        let os = FileContentResolver::new();

        assert_eq!(os.stream_types(&uri, "*/*"), Some(vec!["text/html".to_owned()]));
        assert_eq!(os.stream_types(&uri, "image/*"), Some(vec![]));
    }

    #[test]
    fn missing_file_has_no_types() {
        let os = FileContentResolver::new();
        assert!(os.stream_types("file:///definitely/not/here.txt", "*/*").is_none());
    }

    #[test]
    fn open_matching_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "plain words").unwrap();
        let uri = FileContentResolver::uri_for_path(&path);
        let os = FileContentResolver::new();

        let mut out = String::new();
        os.open_typed(&uri, "text/*")
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "plain words");
        assert!(matches!(
            os.open_typed(&uri, "image/png"),
            Err(ResolverError::NotFound(_))
        ));
    }

    #[test]
    fn foreign_scheme_unsupported() {
        let os = FileContentResolver::new();
        assert!(matches!(
            os.open_typed("https://example.com/a.txt", "text/plain"),
            Err(ResolverError::UnsupportedUri(_))
        ));
    }
}
