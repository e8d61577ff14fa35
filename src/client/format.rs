//! Output formatting for CLI commands.
//!
//! Metadata goes to stderr and payload bytes to stdout, so piping works
//! naturally (`clipferry read notes.txt | less`).

use std::io::{self, Write};

use clipferry::transfer::{ClipItem, FormatTag};

/// Print format tags to stdout, one per line, best first.
pub fn print_formats(formats: &[FormatTag]) {
    if formats.is_empty() {
        eprintln!("No matching formats");
        return;
    }
    for format in formats {
        println!("{format}");
    }
}

pub fn print_payload_header(uri: &str, format: &FormatTag, len: usize) {
    eprintln!("{uri} as {format} ({len} bytes)");
}

/// Describe a published provider and the item the OS would see for it.
pub fn print_published(uri: &str, item: Option<&ClipItem>) {
    eprintln!("Published: {uri}");
    let Some(item) = item else {
        eprintln!("Item:      (empty)");
        return;
    };
    eprintln!("Text:      {}", describe(item.text.as_deref()));
    eprintln!("HTML:      {}", describe(item.html_text.as_deref()));
    eprintln!("URI:       {}", describe(item.uri.as_deref()));
    eprintln!("---");
}

fn describe(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("{} bytes", v.len()),
        None => "-".to_owned(),
    }
}

/// Write raw payload bytes to stdout.
pub fn write_payload(data: &[u8]) -> Result<(), io::Error> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(data)?;
    stdout.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_lengths() {
        assert_eq!(describe(Some("abc")), "3 bytes");
        assert_eq!(describe(None), "-");
    }
}
