//! # Flush / Emit
//!
//! Every `flush` call gets exactly one completion signal. Whoever signals
//! first (the flush itself, or the stream acknowledging a write) wins; later
//! signals are ignored.

use crate::error::{FlushError, StreamError};
use bytes::Bytes;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

pub type FlushResult = Result<(), FlushError>;

type Callback = Box<dyn FnOnce(FlushResult) + Send>;

/// The response body collaborator.
pub trait OutputStream {
    /// The stream can no longer accept writes.
    fn is_closed(&self) -> bool;

    /// Write one chunk. Streams that acknowledge writes receive a
    /// [`WriteAck`] and must complete it once the chunk is handed off.
    fn write(&mut self, chunk: Bytes, ack: Option<WriteAck>) -> Result<(), StreamError>;

    fn acknowledges_writes(&self) -> bool {
        false
    }
}

/// Once-only completion handle for one flush.
#[derive(Clone)]
pub struct Done {
    callback: Arc<Mutex<Option<Callback>>>,
}

impl Done {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(FlushResult) + Send + 'static,
    {
        Self {
            callback: Arc::new(Mutex::new(Some(Box::new(callback)))),
        }
    }

    /// A handle plus a future resolving to its result.
    pub fn channel() -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        let done = Self::new(move |result| {
            // The receiver may have been dropped; nobody is listening then.
            let _ = tx.send(result);
        });
        (done, Completion { rx })
    }

    /// Deliver the result. Returns false if completion was already signalled.
    pub fn signal(&self, result: FlushResult) -> bool {
        let callback = self.callback.lock().take();
        match callback {
            Some(callback) => {
                callback(result);
                true
            }
            None => {
                if let Err(error) = result {
                    tracing::debug!(%error, "Flush already completed, dropping late error");
                }
                false
            }
        }
    }

    pub fn is_signalled(&self) -> bool {
        self.callback.lock().is_none()
    }
}

impl std::fmt::Debug for Done {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Done")
            .field("signalled", &self.is_signalled())
            .finish()
    }
}

/// Write confirmation handed to acknowledging streams.
///
/// Dropping it unfinished signals [`FlushError::AckDropped`]. A drop that
/// happens inside the `write` call is held back until `write` returns, so a
/// failing write reports its own error instead.
#[derive(Debug)]
pub struct WriteAck {
    done: Option<Done>,
    scope: WriteScope,
}

impl WriteAck {
    pub(crate) fn within(done: Done, scope: WriteScope) -> Self {
        Self {
            done: Some(done),
            scope,
        }
    }

    pub fn complete(mut self, result: Result<(), StreamError>) {
        if let Some(done) = self.done.take() {
            done.signal(result.map_err(FlushError::Write));
        }
    }
}

impl Drop for WriteAck {
    fn drop(&mut self) {
        let Some(done) = self.done.take() else {
            return;
        };
        if self.scope.defer_drop() {
            return;
        }
        done.signal(Err(FlushError::AckDropped));
    }
}

/// Marks the span of one `OutputStream::write` call.
#[derive(Debug, Clone, Default)]
pub(crate) struct WriteScope {
    state: Arc<Mutex<ScopeState>>,
}

#[derive(Debug, Default)]
enum ScopeState {
    #[default]
    Open,
    AckDropped,
    Closed,
}

impl WriteScope {
    /// Record a drop while the write is running. False once it returned.
    fn defer_drop(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            ScopeState::Closed => false,
            _ => {
                *state = ScopeState::AckDropped;
                true
            }
        }
    }

    /// End the write. Returns true if the ack was dropped during it.
    pub(crate) fn close(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.lock(), ScopeState::Closed);
        matches!(previous, ScopeState::AckDropped)
    }
}

/// Future resolving to the result of one flush.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<FlushResult>,
}

impl Completion {
    /// The result, if the flush has completed already.
    pub fn try_result(&mut self) -> Option<FlushResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(FlushError::Abandoned)),
        }
    }
}

impl Future for Completion {
    type Output = FlushResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(FlushError::Abandoned)))
    }
}

/// An in-memory output stream, handy for tests and buffering.
#[derive(Debug, Default)]
pub struct BufferStream {
    pub chunks: Vec<Bytes>,
    pub closed: bool,
    pub acknowledge: bool,
}

impl BufferStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acknowledging() -> Self {
        Self {
            acknowledge: true,
            ..Self::default()
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Everything written so far, concatenated.
    pub fn contents(&self) -> Vec<u8> {
        self.chunks.iter().flat_map(|chunk| chunk.iter().copied()).collect()
    }
}

impl OutputStream for BufferStream {
    fn is_closed(&self) -> bool {
        self.closed
    }

    fn write(&mut self, chunk: Bytes, ack: Option<WriteAck>) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.chunks.push(chunk);
        if let Some(ack) = ack {
            ack.complete(Ok(()));
        }
        Ok(())
    }

    fn acknowledges_writes(&self) -> bool {
        self.acknowledge
    }
}
