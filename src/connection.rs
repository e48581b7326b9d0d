//! A single client connection: read loop, request parsing, and the serial
//! response queue.
//!
//! One [`HttpConnection`] owns exactly one [`IoChannel`] and one async task.
//! Because that task is the only thing ever popping from its response
//! queue, pipelined requests are answered in the order they were received
//! without any additional synchronization — the ordering guarantee falls
//! out of "one task, one queue" rather than an explicit lock.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::{debug, info, warn};

use crate::buffer::ReaderBuffer;
use crate::channel::{IoChannel, ReadEvent};
use crate::error::ServerError;
use crate::http::parser::{Parser, ParserOk};
use crate::http::request::HttpRequest;
use crate::http::validator::Validator;
use crate::provider::ResourceProvider;
use crate::response_operation::{ResponseOperation, response_operation_for_request};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Notified exactly once, when a connection reaches its terminal closed
/// state. Held non-owning by the connection (`Weak`) since the embedder,
/// not the connection, owns the delegate's lifetime.
pub trait ConnectionDelegate: Send + Sync {
    fn on_connection_closed(&self, connection_id: ConnectionId);
}

pub struct HttpConnection {
    pub id: ConnectionId,
    channel: Arc<IoChannel>,
    document_root: PathBuf,
    provider: Arc<dyn ResourceProvider>,
    delegate: Option<Weak<dyn ConnectionDelegate>>,
    cancelled: Arc<AtomicBool>,
    closed_notified: AtomicBool,
}

impl HttpConnection {
    pub fn new(
        channel: Arc<IoChannel>,
        document_root: PathBuf,
        provider: Arc<dyn ResourceProvider>,
        delegate: Option<Weak<dyn ConnectionDelegate>>,
    ) -> Self {
        Self {
            id: ConnectionId::next(),
            channel,
            document_root,
            provider,
            delegate,
            cancelled: Arc::new(AtomicBool::new(false)),
            closed_notified: AtomicBool::new(false),
        }
    }

    /// Whether this connection may keep answering requests on the same
    /// socket after a keep-alive response. `true` by default; an embedder
    /// that cannot tolerate pipelined responses can override dispatch to
    /// report `false`, which forces the connection closed after one
    /// response regardless of what `Connection:` the client sent.
    pub fn supports_pipelining(&self) -> bool {
        true
    }

    /// Cancels every queued and in-flight response operation on this
    /// connection and closes the underlying channel. Idempotent — the
    /// delegate is notified exactly once no matter how many times this is
    /// called or whether it races with `run()`'s own end-of-connection
    /// cleanup.
    pub async fn close(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.channel.close();

        if self
            .closed_notified
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("connection {:?} closed", self.id);
            if let Some(delegate) = self.delegate.as_ref().and_then(Weak::upgrade) {
                delegate.on_connection_closed(self.id);
            }
        }
    }

    /// Drives the connection until the peer disconnects, a fatal I/O error
    /// occurs, or a non-keep-alive response has been sent.
    pub async fn run(&self) {
        debug!("connection {:?} opened", self.id);

        let mut parser = Parser::new();
        let mut req = HttpRequest::new();
        let mut pending: VecDeque<HttpRequest> = VecDeque::new();
        let mut reader = ReaderBuffer::new();

        'outer: loop {
            let event = match self.channel.next_read_event().await {
                Ok(event) => event,
                Err(e) => {
                    warn!("connection {:?} read error: {:?}", self.id, e);
                    break;
                }
            };

            match event {
                ReadEvent::Eof => {
                    if !pending.is_empty() {
                        self.drain_pending(&mut pending).await;
                    }
                    break;
                }
                ReadEvent::Data(bytes) => reader.append(&bytes),
            };

            let chunk = reader.read(reader.len());

            match self.feed_parser(&mut parser, &mut req, &chunk) {
                Ok(requests_completed) => {
                    for completed in requests_completed {
                        let keep_alive = completed.keep_alive();
                        pending.push_back(completed);
                        if !self.drain_pending(&mut pending).await {
                            break 'outer;
                        }
                        if !keep_alive || !self.supports_pipelining() {
                            break 'outer;
                        }
                    }
                }
                Err(err) => {
                    let op = self.error_operation_for(err).await;
                    let keep_alive = op.keep_alive;
                    if op.write(&self.channel, self.provider.as_ref()).await.is_err() || !keep_alive {
                        break;
                    }
                }
            }
        }

        self.close().await;
    }

    /// Feeds newly-read bytes into the parser, possibly producing more than
    /// one completed request if the client pipelined several requests into
    /// one read.
    fn feed_parser(
        &self,
        parser: &mut Parser,
        req: &mut HttpRequest,
        chunk: &[u8],
    ) -> Result<Vec<HttpRequest>, ServerError> {
        let mut completed = Vec::new();
        let mut remaining = chunk;

        loop {
            let outcome = parser.feed(remaining, req)?;
            // Bytes handed to `feed` are buffered internally; subsequent
            // calls in this loop just let the parser keep progressing
            // through what it already has.
            remaining = &[];

            match outcome {
                ParserOk::Incomplete => break,
                ParserOk::Ok => continue,
                ParserOk::HeadersDone => {
                    Validator::validate_request(req)?;
                    continue;
                }
                ParserOk::Done => {
                    completed.push(std::mem::take(req));
                    parser.reset_for_next_request();
                    if parser.is_buffer_empty() {
                        break;
                    }
                    continue;
                }
            }
        }

        Ok(completed)
    }

    /// Runs and writes the response operation for every request currently
    /// queued. Returns `false` if the channel failed mid-write and the
    /// connection should be torn down.
    async fn drain_pending(&self, pending: &mut VecDeque<HttpRequest>) -> bool {
        while let Some(request) = pending.pop_front() {
            let operation = response_operation_for_request(
                &request,
                &self.document_root,
                self.provider.as_ref(),
                self.cancelled.clone(),
            )
            .await;

            if operation
                .write(&self.channel, self.provider.as_ref())
                .await
                .is_err()
            {
                return false;
            }
        }
        true
    }

    async fn error_operation_for(&self, err: ServerError) -> ResponseOperation {
        info!("connection {:?} request error: {}", self.id, err);
        crate::response_operation::error_response(
            err.into_http_status(),
            false,
            self.cancelled.clone(),
        )
    }
}
