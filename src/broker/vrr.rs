//! Virtual resource relay — serves our content URIs as readable pipes.
//!
//! Opening a resource returns the read end of a fresh pipe. A dedicated
//! writer thread fills the write end and closes it, so the reader always
//! sees EOF: after the full payload, after nothing at all, or after the
//! writer gave up.
//!
//! When the opener is the coordinator itself, the data is resolved
//! (pumping the loop) before the pipe is returned. A writer that had to
//! post back to a coordinator blocked on the read end would deadlock.
//! Any other opener gets the pipe immediately and the writer thread
//! resolves through the coordinator while the reader waits.

use std::fs::File;
use std::io::{ErrorKind, Write};

use bytes::Bytes;

use crate::transfer::FormatTag;

use super::BrokerError;
use super::scheduler::LoopSender;

/// Writer-thread name.
const WRITER_THREAD: &str = "clipferry-pipe-writer";

/// What the writer thread writes.
pub(crate) enum PipeSource {
    /// Already resolved.
    Ready(Option<Bytes>),
    /// Resolved on the writer thread.
    Deferred(Box<dyn FnOnce() -> Option<Bytes> + Send>),
}

/// Open `uri` as a pipe of its first format matching `filter`.
///
/// A URI with no matching format yields an empty stream, not an error.
/// Each open resolves once; nothing is cached between opens.
pub(crate) fn open_resource(sender: &LoopSender, uri: &str, filter: &str) -> Result<File, BrokerError> {
    if let Some(coordinator) = sender.coordinator() {
        let state = coordinator.state();
        let data = match state.stream_types(uri, filter).into_iter().next() {
            Some(format) => {
                tracing::debug!(uri, %format, "resolving before returning pipe");
                let rx = state.request_data(uri, &format);
                coordinator.pump_until(rx).flatten()
            }
            None => None,
        };
        return open_pipe(PipeSource::Ready(data));
    }

    let format = {
        let (uri, filter) = (uri.to_owned(), filter.to_owned());
        sender.call(move |c| c.state().stream_types(&uri, &filter).into_iter().next())?
    };
    let Some(format) = format else {
        tracing::debug!(uri, filter, "no matching format; empty stream");
        return open_pipe(PipeSource::Ready(None));
    };

    let sender = sender.clone();
    let uri = uri.to_owned();
    open_pipe(PipeSource::Deferred(Box::new(move || {
        resolve_on_coordinator(&sender, uri, format)
    })))
}

/// Blocking resolution from a thread other than the coordinator.
fn resolve_on_coordinator(sender: &LoopSender, uri: String, format: FormatTag) -> Option<Bytes> {
    let rx = match sender.call(move |c| c.state().request_data(&uri, &format)) {
        Ok(rx) => rx,
        Err(e) => {
            tracing::debug!(error = %e, "coordinator gone before resolution");
            return None;
        }
    };
    rx.blocking_recv().ok().flatten()
}

/// Create a pipe, hand the write end to a writer thread, return the read end.
pub(crate) fn open_pipe(source: PipeSource) -> Result<File, BrokerError> {
    let (read_end, write_end) = nix::unistd::pipe().map_err(BrokerError::Pipe)?;
    let writer = File::from(write_end);
    std::thread::Builder::new()
        .name(WRITER_THREAD.into())
        .spawn(move || {
            write_to_pipe(writer, source);
        })
        .map_err(BrokerError::Spawn)?;
    Ok(File::from(read_end))
}

#[derive(Debug, PartialEq, Eq)]
enum WriteOutcome {
    Written(usize),
    Empty,
    ReaderClosed,
    Failed,
}

/// Write the payload and close the pipe. Write errors are logged only.
fn write_to_pipe(mut pipe: File, source: PipeSource) -> WriteOutcome {
    let data = match source {
        PipeSource::Ready(data) => data,
        PipeSource::Deferred(resolve) => resolve(),
    };
    let Some(data) = data else {
        tracing::debug!("no data; closing pipe empty");
        return WriteOutcome::Empty;
    };
    match pipe.write_all(&data) {
        Ok(()) => {
            tracing::trace!(bytes = data.len(), "pipe write complete");
            WriteOutcome::Written(data.len())
        }
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            tracing::debug!("reader closed pipe before write finished");
            WriteOutcome::ReaderClosed
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed writing to pipe");
            WriteOutcome::Failed
        }
    }
}
