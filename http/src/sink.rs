//! # Hyper response sink
//!
//! Bridges the core `HeaderSink`/`OutputStream` seams to a Hyper response.
//! The head (status and headers) is handed to the service the moment it is
//! committed; body chunks follow over an unbounded channel, so the client
//! sees each flush as soon as it is written.

use bytes::Bytes;
use futures_util::stream;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, StreamBody};
use hyper::body::Frame;
use pagelet_core::flush::WriteAck;
use pagelet_core::{HeaderSink, OutputStream, StreamError};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

/// Streamed response body.
pub type PageBody = UnsyncBoxBody<Bytes, Infallible>;

/// Create a connected sink and the response it will produce.
pub fn response_channel() -> (HyperSink, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::unbounded_channel();

    let sink = HyperSink {
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        head: Some(head_tx),
        pending_body: Some(body_rx),
        body: Some(body_tx),
    };
    (sink, PendingResponse { rx: head_rx })
}

fn streamed(rx: mpsc::UnboundedReceiver<Bytes>) -> PageBody {
    let frames = stream::unfold(rx, |mut rx| async move {
        let chunk = rx.recv().await?;
        Some((Ok::<_, Infallible>(Frame::data(chunk)), rx))
    });
    StreamBody::new(frames).boxed_unsync()
}

fn empty() -> PageBody {
    Empty::<Bytes>::new().boxed_unsync()
}

/// Write side of one streamed response.
pub struct HyperSink {
    status: StatusCode,
    headers: HeaderMap,
    head: Option<oneshot::Sender<Response<PageBody>>>,
    pending_body: Option<mpsc::UnboundedReceiver<Bytes>>,
    body: Option<mpsc::UnboundedSender<Bytes>>,
}

impl HyperSink {
    /// Set the status code. Returns false once the head is committed.
    pub fn set_status(&mut self, status: StatusCode) -> bool {
        if self.headers_sent() {
            tracing::debug!(%status, "Status ignored, headers already sent");
            return false;
        }
        self.status = status;
        true
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Commit the head if needed and close the body.
    pub fn end(&mut self) {
        self.commit();
        self.body = None;
    }

    fn commit(&mut self) {
        let Some(head) = self.head.take() else {
            return;
        };

        let body = self.pending_body.take().map(streamed).unwrap_or_else(empty);
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();

        if head.send(response).is_err() {
            tracing::debug!("Response receiver dropped before the head was sent");
            self.body = None;
        }
    }
}

impl std::fmt::Debug for HyperSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperSink")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("headers_sent", &self.headers_sent())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl HeaderSink for HyperSink {
    fn headers_sent(&self) -> bool {
        self.head.is_none()
    }

    fn set_header(&mut self, name: &str, value: &str) {
        if self.headers_sent() {
            tracing::debug!(header = name, "Header ignored, headers already sent");
            return;
        }

        let name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => name,
            Err(error) => {
                tracing::warn!(%error, header = name, "Invalid header name");
                return;
            }
        };
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(error) => tracing::warn!(%error, header = %name, "Invalid header value"),
        }
    }
}

impl OutputStream for HyperSink {
    fn is_closed(&self) -> bool {
        self.body.as_ref().is_none_or(|tx| tx.is_closed())
    }

    fn write(&mut self, chunk: Bytes, ack: Option<WriteAck>) -> Result<(), StreamError> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }
        self.commit();

        let Some(tx) = &self.body else {
            return Err(StreamError::Closed);
        };
        tx.send(chunk).map_err(|_| StreamError::Closed)?;

        if let Some(ack) = ack {
            ack.complete(Ok(()));
        }
        Ok(())
    }

    fn acknowledges_writes(&self) -> bool {
        true
    }
}

impl Drop for HyperSink {
    fn drop(&mut self) {
        self.commit();
    }
}

/// Resolves to the response once its head is committed.
pub struct PendingResponse {
    rx: oneshot::Receiver<Response<PageBody>>,
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse").finish_non_exhaustive()
    }
}

impl Future for PendingResponse {
    type Output = Response<PageBody>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                tracing::error!("Response sink vanished without committing");
                let mut response = Response::new(empty());
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_text(response: Response<PageBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_first_write_commits_head() {
        let (mut sink, pending) = response_channel();
        sink.set_header("Content-Type", "text/html; charset=utf-8");
        assert!(!sink.headers_sent());

        sink.write(Bytes::from_static(b"<p>"), None).unwrap();
        assert!(sink.headers_sent());
        sink.set_header("X-Late", "1");
        assert!(!sink.set_status(StatusCode::NOT_FOUND));

        sink.write(Bytes::from_static(b"</p>"), None).unwrap();
        sink.end();

        let response = pending.await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/html; charset=utf-8");
        assert!(response.headers().get("x-late").is_none());
        assert_eq!(body_text(response).await, "<p></p>");
    }

    #[tokio::test]
    async fn test_drop_commits_empty_response() {
        let (mut sink, pending) = response_channel();
        sink.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        drop(sink);

        let response = pending.await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn test_invalid_header_is_skipped() {
        let (mut sink, _pending) = response_channel();
        sink.set_header("bad header", "x");
        sink.set_header("X-Ok", "bad\nvalue");
        assert!(sink.headers().is_empty());
    }

    #[tokio::test]
    async fn test_write_after_client_left() {
        let (mut sink, pending) = response_channel();
        sink.write(Bytes::from_static(b"a"), None).unwrap();
        drop(pending.await);

        assert!(sink.is_closed());
        assert!(matches!(
            sink.write(Bytes::from_static(b"b"), None),
            Err(StreamError::Closed)
        ));
    }

    #[test]
    fn test_end_closes_stream() {
        let (mut sink, _pending) = response_channel();
        assert!(!sink.is_closed());
        sink.end();
        assert!(sink.is_closed());
        assert!(sink.acknowledges_writes());
    }
}
