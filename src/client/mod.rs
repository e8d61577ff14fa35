//! CLI commands run against an in-process broker.
//!
//! Each command starts a broker over the local filesystem resolver,
//! performs one operation, prints the result, and exits. Blocking broker
//! calls run on the blocking pool; item reads use the async path.

mod format;

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clipferry::broker::{Broker, BrokerConfig, BrokerError, BrokerHandle};
use clipferry::native::{DataReply, NoDragPlatform};
use clipferry::provider::{
    DataProvider, LazyDataSource, ProviderCore, ProviderError, ProviderTable, Representation,
};
use clipferry::resolver::fs::FileContentResolver;
use clipferry::transfer::{
    ClipItem, FormatTag, MIME_TEXT_HTML, MIME_TEXT_PLAIN, Transfer, mime_matches, uri_scheme,
};

use crate::cli::{Cli, Command};

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("broker: {0}")]
    Broker(#[from] BrokerError),
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("{0}: no readable formats")]
    NoFormats(String),
    #[error("{0}: no data as {1}")]
    NoData(String, FormatTag),
    #[error("{0}")]
    Usage(String),
}

/// Run the selected command. Called from `main.rs`.
pub async fn run(cli: Cli) -> Result<(), ClientError> {
    let config = BrokerConfig {
        authority: cli.authority,
        read_chunk_size: cli.chunk_size,
        ..BrokerConfig::default()
    };

    match cli.command {
        Command::Formats { target, filter } => {
            let uri = target_uri(&target)?;
            let (broker, _) = start(config)?;
            let formats = item_formats(broker.handle(), uri).await?;
            let matching: Vec<FormatTag> = formats
                .into_iter()
                .filter(|f| mime_matches(f.as_str(), &filter))
                .collect();
            format::print_formats(&matching);
        }
        Command::Read { targets, format } => {
            let uris = targets
                .iter()
                .map(String::as_str)
                .map(target_uri)
                .collect::<Result<Vec<_>, _>>()?;
            let (broker, _) = start(config)?;
            let handle = broker.handle();
            let reads = uris
                .into_iter()
                .map(|uri| read_one(handle.clone(), uri, format.clone()));
            for result in futures::future::join_all(reads).await {
                let (uri, format, data) = result?;
                format::print_payload_header(&uri, &format, data.len());
                format::write_payload(&data)?;
            }
        }
        Command::Serve {
            text,
            html,
            lazy,
            format,
        } => {
            let provider = published_provider(text, html, lazy)?;
            let (broker, table) = start_with(config, lazy_source(&provider))?;
            let id = table.register(provider.provider);
            let item = table.clip_item(id)?;
            format::print_published(&table.uri(id), item.as_ref());

            let handle = broker.handle();
            let uri = table.uri(id);
            let data = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ClientError> {
                let mut pipe = handle.open_resource(&uri, &format)?;
                let mut out = Vec::new();
                pipe.read_to_end(&mut out)?;
                Ok(out)
            })
            .await??;
            format::write_payload(&data)?;
        }
    }

    Ok(())
}

/// URI for a command-line target: URIs pass through, paths become
/// `file://` URIs.
fn target_uri(target: &str) -> Result<String, ClientError> {
    if uri_scheme(target).is_some() {
        return Ok(target.to_owned());
    }
    let path = std::fs::canonicalize(Path::new(target))
        .map_err(|e| ClientError::Usage(format!("{target}: {e}")))?;
    Ok(FileContentResolver::uri_for_path(&path))
}

fn start(config: BrokerConfig) -> Result<(Broker, ProviderTable), ClientError> {
    start_with(config, None)
}

fn start_with(
    config: BrokerConfig,
    lazy: Option<Arc<dyn LazyDataSource>>,
) -> Result<(Broker, ProviderTable), ClientError> {
    let table = ProviderTable::new(config.authority.clone());
    let mut core = ProviderCore::new(table.clone());
    if let Some(source) = lazy {
        core = core.with_lazy_source(source);
    }
    let broker = Broker::start(
        config,
        core,
        NoDragPlatform,
        Arc::new(FileContentResolver::new()),
    )?;
    Ok((broker, table))
}

/// Format negotiation may loop back into the broker, which blocks.
async fn item_formats(handle: BrokerHandle, uri: String) -> Result<Vec<FormatTag>, ClientError> {
    let formats = tokio::task::spawn_blocking(move || {
        let transfer = Transfer::single(ClipItem::with_uri(uri));
        transfer
            .item(0)
            .map(|item| handle.item_formats(&item))
            .unwrap_or_default()
    })
    .await?;
    Ok(formats)
}

async fn read_one(
    handle: BrokerHandle,
    uri: String,
    format: Option<String>,
) -> Result<(String, FormatTag, Vec<u8>), ClientError> {
    let format = match format {
        Some(f) => FormatTag::from(f),
        None => item_formats(handle.clone(), uri.clone())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NoFormats(uri.clone()))?,
    };
    let transfer = Transfer::single(ClipItem::with_uri(uri.clone()));
    let Some(item) = transfer.item(0) else {
        return Err(ClientError::NoFormats(uri));
    };
    match handle.read_item_data(item, format.clone()).await {
        Some(data) => Ok((uri, format, data)),
        None => Err(ClientError::NoData(uri, format)),
    }
}

/// Provider for `serve`: lazy text is produced on demand under id 1.
fn published_provider(
    text: Option<String>,
    html: Option<String>,
    lazy: bool,
) -> Result<ServedProvider, ClientError> {
    if text.is_none() && html.is_none() {
        return Err(ClientError::Usage("nothing to serve; pass --text or --html".into()));
    }
    if html.is_some() && text.is_none() {
        return Err(ClientError::Usage("--html requires --text".into()));
    }
    if lazy && text.is_none() {
        return Err(ClientError::Usage("--lazy requires --text".into()));
    }

    let mut representations = Vec::new();
    let mut lazy_text = None;
    if let Some(text) = text {
        if lazy {
            representations.push(Representation::lazy(MIME_TEXT_PLAIN, 1));
            lazy_text = Some(text);
        } else {
            representations.push(Representation::simple(MIME_TEXT_PLAIN, text));
        }
    }
    if let Some(html) = html {
        representations.push(Representation::simple(MIME_TEXT_HTML, html));
    }
    Ok(ServedProvider {
        provider: DataProvider::new(representations),
        lazy_text,
    })
}

struct ServedProvider {
    provider: DataProvider,
    lazy_text: Option<String>,
}

fn lazy_source(provider: &ServedProvider) -> Option<Arc<dyn LazyDataSource>> {
    provider
        .lazy_text
        .clone()
        .map(|text| Arc::new(DeferredText { text }) as Arc<dyn LazyDataSource>)
}

/// Answers from a worker thread after a short delay.
struct DeferredText {
    text: String,
}

impl LazyDataSource for DeferredText {
    fn produce(&self, id: u64, format: &FormatTag, reply: DataReply) {
        tracing::debug!(id, %format, "producing lazy text");
        let text = self.text.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            reply.bytes(text);
        });
    }
}
