//! Concurrent draining of the encoder's progress and diagnostic streams.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::progress::{CycleAssembler, ProgressSample};

const CHANNEL_CAPACITY: usize = 256;

/// Longest line kept from either stream.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// An event read from one of the encoder's output streams.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent {
    /// A complete progress cycle from the structured stream.
    Sample(ProgressSample),
    /// One line of free-text diagnostics.
    Diagnostic(String),
}

/// Drains both encoder streams on their own tasks.
///
/// A silent or backed-up diagnostic stream never delays progress samples and
/// the other way around. Samples keep the order in which the encoder wrote
/// them; diagnostics interleave freely.
#[derive(Debug)]
pub struct SignalReader {
    events: mpsc::Receiver<SignalEvent>,
    progress_task: JoinHandle<()>,
    diagnostic_task: JoinHandle<()>,
}

impl SignalReader {
    /// Starts draining `progress` (structured) and `diagnostics` (free text).
    pub fn spawn<P, D>(progress: P, diagnostics: D) -> Self
    where
        P: AsyncRead + Unpin + Send + 'static,
        D: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, events) = mpsc::channel(CHANNEL_CAPACITY);

        let progress_task = tokio::spawn(drain_progress(progress, tx.clone()));
        let diagnostic_task = tokio::spawn(drain_diagnostics(diagnostics, tx));

        Self {
            events,
            progress_task,
            diagnostic_task,
        }
    }

    /// Returns the next event, or `None` once both streams reached EOF.
    pub async fn next(&mut self) -> Option<SignalEvent> {
        self.events.recv().await
    }

    /// Stops both drain tasks without waiting for EOF.
    pub fn abort(&self) {
        self.progress_task.abort();
        self.diagnostic_task.abort();
    }
}

impl Drop for SignalReader {
    fn drop(&mut self) {
        self.abort();
    }
}

/// One read from an encoder stream.
#[derive(Debug, PartialEq)]
enum ReadLine {
    Text(String),
    /// A line longer than [`MAX_LINE_BYTES`]; its bytes were discarded.
    Oversized,
    End,
}

/// Reads one line as lossy UTF-8. EOF and read errors both end the stream.
///
/// At most [`MAX_LINE_BYTES`] are buffered; the remainder of a longer line is
/// consumed and dropped up to the next newline.
async fn read_line<R>(reader: &mut BufReader<R>, buf: &mut Vec<u8>) -> ReadLine
where
    R: AsyncRead + Unpin,
{
    buf.clear();
    let mut oversized = false;

    loop {
        let available = match reader.fill_buf().await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "Encoder stream read failed");
                return ReadLine::End;
            }
        };
        if available.is_empty() {
            if buf.is_empty() && !oversized {
                return ReadLine::End;
            }
            break;
        }

        let (used, complete) = match available.iter().position(|b| *b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        if !oversized {
            if buf.len() + used > MAX_LINE_BYTES {
                oversized = true;
                buf.clear();
            } else {
                buf.extend_from_slice(&available[..used]);
            }
        }
        reader.consume(used);

        if complete {
            break;
        }
    }

    if oversized {
        ReadLine::Oversized
    } else {
        ReadLine::Text(String::from_utf8_lossy(buf).trim_end().to_string())
    }
}

async fn drain_progress<R>(stream: R, tx: mpsc::Sender<SignalEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut assembler = CycleAssembler::new();

    loop {
        let line = match read_line(&mut reader, &mut buf).await {
            ReadLine::Text(line) => line,
            ReadLine::Oversized => {
                debug!(limit = MAX_LINE_BYTES, "Ignoring oversized progress line");
                continue;
            }
            ReadLine::End => break,
        };
        trace!(line = %line, "Progress line");
        if let Some(sample) = assembler.push_line(&line) {
            if tx.send(SignalEvent::Sample(sample)).await.is_err() {
                return;
            }
        }
    }

    if assembler.has_partial_cycle() {
        debug!("Progress stream closed mid-cycle, dropping partial cycle");
    }
}

async fn drain_diagnostics<R>(stream: R, tx: mpsc::Sender<SignalEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        let line = match read_line(&mut reader, &mut buf).await {
            ReadLine::Text(line) => line,
            ReadLine::Oversized => {
                debug!(limit = MAX_LINE_BYTES, "Ignoring oversized diagnostic line");
                continue;
            }
            ReadLine::End => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if tx.send(SignalEvent::Diagnostic(line.to_string())).await.is_err() {
            return;
        }
    }
}
