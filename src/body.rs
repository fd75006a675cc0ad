//! Body plumbing on both sides of a call.
//!
//! [`BodyReader`] drains a request body publisher into a string with a bounded
//! wait. [`BodyHandler`]s turn the raw bytes of a stubbed response into the
//! value handed back to the caller, through a [`BodySubscriber`].

use crate::error::{Error, Result};
use crate::flow::{Subscriber, Subscription};
use crate::request::BodyPublisher;
use crate::response::ResponseInfo;
use bytes::Bytes;
use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tracing::warn;

/// Default bound on how long a request body may take to arrive.
pub const DEFAULT_BODY_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocking capture of a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyReader {
    timeout: Duration,
}

impl Default for BodyReader {
    fn default() -> Self {
        Self::new(DEFAULT_BODY_TIMEOUT)
    }
}

impl BodyReader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drain `publisher` and decode the bytes as UTF-8, replacing invalid sequences.
    pub fn read(&self, publisher: &dyn BodyPublisher) -> Result<String> {
        let bytes = self.read_bytes(publisher)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Drain `publisher` into memory.
    ///
    /// Blocks until the publisher completes or fails, or until the timeout
    /// expires, whichever comes first.
    pub fn read_bytes(&self, publisher: &dyn BodyPublisher) -> Result<Bytes> {
        let (tx, rx) = mpsc::sync_channel(1);
        publisher.subscribe(Box::new(CaptureSubscriber {
            buffer: Vec::new(),
            done: Some(tx),
        }));

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(bytes)) => Ok(Bytes::from(bytes)),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout = ?self.timeout, "Request body did not complete in time");
                Err(Error::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "body publisher dropped its subscriber before completing",
            ))),
        }
    }
}

struct CaptureSubscriber {
    buffer: Vec<u8>,
    done: Option<mpsc::SyncSender<io::Result<Vec<u8>>>>,
}

impl CaptureSubscriber {
    fn finish(&mut self, outcome: io::Result<Vec<u8>>) {
        if let Some(done) = self.done.take() {
            // The reader may already have given up waiting.
            let _ = done.send(outcome);
        }
    }
}

impl Subscriber<Bytes> for CaptureSubscriber {
    fn on_subscribe(&mut self, subscription: Box<dyn Subscription>) {
        subscription.request(u64::MAX);
    }

    fn on_next(&mut self, item: Bytes) {
        self.buffer.extend_from_slice(&item);
    }

    fn on_error(&mut self, error: io::Error) {
        self.finish(Err(error));
    }

    fn on_complete(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        self.finish(Ok(buffer));
    }
}

/// Future resolving to a decoded response body.
pub type BodyFuture<T> = BoxFuture<'static, io::Result<T>>;

/// Subscriber that consumes raw response chunks and produces a body value.
pub trait BodySubscriber<T>: Subscriber<Vec<Bytes>> {
    /// The decoded body, available once the stream has terminated.
    fn body(&mut self) -> BodyFuture<T>;
}

/// Maps response metadata to the subscriber that will decode the body.
pub trait BodyHandler<T>: Send + Sync {
    fn apply(&self, info: &dyn ResponseInfo) -> Box<dyn BodySubscriber<T>>;
}

impl<T, F> BodyHandler<T> for F
where
    F: Fn(&dyn ResponseInfo) -> Box<dyn BodySubscriber<T>> + Send + Sync,
{
    fn apply(&self, info: &dyn ResponseInfo) -> Box<dyn BodySubscriber<T>> {
        self(info)
    }
}

/// Subscriber that buffers every chunk and decodes the whole body on completion.
pub struct BufferingSubscriber<T> {
    buffer: Vec<u8>,
    decode: fn(Bytes) -> io::Result<T>,
    sender: Option<oneshot::Sender<io::Result<T>>>,
    receiver: Option<oneshot::Receiver<io::Result<T>>>,
}

impl<T> BufferingSubscriber<T> {
    pub fn new(decode: fn(Bytes) -> io::Result<T>) -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            buffer: Vec::new(),
            decode,
            sender: Some(sender),
            receiver: Some(receiver),
        }
    }

    fn resolve(&mut self, outcome: io::Result<T>) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(outcome);
        }
    }
}

impl<T: Send> Subscriber<Vec<Bytes>> for BufferingSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Box<dyn Subscription>) {
        subscription.request(u64::MAX);
    }

    fn on_next(&mut self, item: Vec<Bytes>) {
        for chunk in item {
            self.buffer.extend_from_slice(&chunk);
        }
    }

    fn on_error(&mut self, error: io::Error) {
        self.resolve(Err(error));
    }

    fn on_complete(&mut self) {
        let bytes = Bytes::from(std::mem::take(&mut self.buffer));
        let decoded = (self.decode)(bytes);
        self.resolve(decoded);
    }
}

impl<T: Send + 'static> BodySubscriber<T> for BufferingSubscriber<T> {
    fn body(&mut self) -> BodyFuture<T> {
        match self.receiver.take() {
            Some(receiver) => receiver
                .map(|outcome| {
                    outcome.unwrap_or_else(|_| {
                        Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "body stream ended without a terminal signal",
                        ))
                    })
                })
                .boxed(),
            None => future::ready(Err(io::Error::other("body already taken"))).boxed(),
        }
    }
}

/// Handler built from a decoding function over the complete body.
pub struct DecodingHandler<T> {
    decode: fn(Bytes) -> io::Result<T>,
}

impl<T> DecodingHandler<T> {
    pub fn new(decode: fn(Bytes) -> io::Result<T>) -> Self {
        Self { decode }
    }
}

impl<T: Send + 'static> BodyHandler<T> for DecodingHandler<T> {
    fn apply(&self, _info: &dyn ResponseInfo) -> Box<dyn BodySubscriber<T>> {
        Box::new(BufferingSubscriber::new(self.decode))
    }
}

/// The common response body handlers.
pub struct BodyHandlers;

impl BodyHandlers {
    /// Body as UTF-8 text; invalid UTF-8 fails the call.
    pub fn of_string() -> DecodingHandler<String> {
        DecodingHandler::new(decode_utf8)
    }

    pub fn of_bytes() -> DecodingHandler<Bytes> {
        DecodingHandler::new(Ok)
    }

    /// Body deserialized from JSON.
    pub fn of_json<T: DeserializeOwned + Send + 'static>() -> DecodingHandler<T> {
        DecodingHandler::new(decode_json::<T>)
    }

    /// Ignore the body entirely.
    pub fn discarding() -> DecodingHandler<()> {
        DecodingHandler::new(|_| Ok(()))
    }
}

fn decode_utf8(bytes: Bytes) -> io::Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn decode_json<T: DeserializeOwned>(bytes: Bytes) -> io::Result<T> {
    serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
