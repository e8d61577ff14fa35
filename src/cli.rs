use clap::{Parser, Subcommand};

use clipferry::broker::DEFAULT_AUTHORITY;
use clipferry::resolver::data::DEFAULT_CHUNK_SIZE;

#[derive(Parser)]
#[command(name = "clipferry", about = "Clipboard and drag-and-drop data broker")]
pub struct Cli {
    /// Authority for this process's content URIs
    #[arg(long, global = true, default_value = DEFAULT_AUTHORITY)]
    pub authority: String,

    /// Chunk size for descriptor reads, in bytes
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the formats a URI or file can supply, best first
    Formats {
        /// URI or local path
        target: String,

        /// Only list formats matching this MIME filter
        #[arg(long, default_value = "*/*")]
        filter: String,
    },

    /// Read URIs or files in one format and write them to stdout
    Read {
        /// URIs or local paths, read concurrently, written in order
        #[arg(required = true)]
        targets: Vec<String>,

        /// Format to read (default: each item's best format)
        #[arg(long)]
        format: Option<String>,
    },

    /// Publish data and read it back through the resource relay
    Serve {
        /// Plain text representation
        #[arg(long)]
        text: Option<String>,

        /// HTML representation (requires --text)
        #[arg(long)]
        html: Option<String>,

        /// Produce the text on demand instead of up front
        #[arg(long)]
        lazy: bool,

        /// MIME filter used to open the published resource
        #[arg(long, default_value = "*/*")]
        format: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Formats { .. } => "formats",
            Command::Read { .. } => "read",
            Command::Serve { .. } => "serve",
        }
    }
}
