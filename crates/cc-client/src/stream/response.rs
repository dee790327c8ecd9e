//! Streaming session driver.
//!
//! A [`StreamResponse`] owns the consumer side of a bounded channel. A
//! background pump task owns the body, splits it into frames, parses each
//! frame into a [`StreamEvent`] and pushes it onto the channel. The pump
//! races every read and every send against the close signal, the caller's
//! cancellation token and the optional deadline; whichever fires first
//! decides the terminal state.

use std::{
    fmt,
    pin::Pin,
    sync::{Arc, OnceLock},
    task::{Context, Poll},
    time::Duration,
};

use futures_util::{Stream, StreamExt};
use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info};

use super::{event::StreamEvent, scanner::FrameScanner};
use crate::{
    error::{CancelReason, ClientError},
    response::ResponseMeta,
};

// ---------------------------------------------------------------------------
// Lifecycle state
// ---------------------------------------------------------------------------

/// Lifecycle of a stream session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// The session exists but the pump has not started reading.
    Opening,
    /// Events are being read and delivered.
    Streaming,
    /// The body ended, or the caller closed the stream.
    Closed,
    /// The API refused the stream or the body failed mid-flight.
    Errored,
    /// The caller's token fired or the deadline elapsed.
    Cancelled,
}

impl StreamState {
    /// Returns `true` once the pump has stopped for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored | Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-stream cancellation settings.
#[derive(Clone, Debug, Default)]
pub struct StreamOptions {
    cancel: Option<CancellationToken>,
    timeout: Option<Duration>,
    opened_at: Option<Instant>,
}

impl StreamOptions {
    /// Options with no cancellation token and no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the stream when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Stop the stream once `timeout` has elapsed since it was opened.
    ///
    /// The clock starts when the stream request is made, so waiting for the
    /// response headers counts against the same deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The configured cancellation token.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Start the timeout clock now, unless it is already running.
    pub(crate) fn anchored(mut self) -> Self {
        self.opened_at.get_or_insert_with(Instant::now);
        self
    }

    /// The absolute deadline. An unanchored clock starts at this call.
    pub(crate) fn deadline(&self) -> Option<Deadline> {
        let after = self.timeout?;
        let opened_at = self.opened_at.unwrap_or_else(Instant::now);
        Some(Deadline {
            at: opened_at.checked_add(after)?,
            after,
        })
    }
}

/// One absolute deadline shared by every phase of a stream.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Deadline {
    at: Instant,
    after: Duration,
}

/// Resolves when the optional deadline passes; never without one.
pub(crate) async fn until_deadline(deadline: Option<Deadline>) -> CancelReason {
    match deadline {
        Some(Deadline { at, after }) => {
            tokio::time::sleep_until(at).await;
            CancelReason::DeadlineExceeded(after)
        }
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// StreamCloser
// ---------------------------------------------------------------------------

/// Clone-able handle that closes a running stream.
#[derive(Clone, Debug)]
pub struct StreamCloser {
    close_tx: mpsc::Sender<()>,
}

impl StreamCloser {
    /// Ask the pump to stop. Never blocks; calling it again, or after the
    /// stream ended, is a no-op.
    pub fn close(&self) {
        let _ = self.close_tx.try_send(());
    }

    /// Returns `true` once the pump has exited.
    pub fn is_closed(&self) -> bool {
        self.close_tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// StreamResponse
// ---------------------------------------------------------------------------

/// An open event stream, typed by its payload.
///
/// Events are delivered in order through [`recv`](Self::recv) or the
/// [`Stream`] impl. Once the channel yields `None`, [`error`](Self::error)
/// reports why the stream stopped, if it did not end cleanly. Dropping the
/// response closes the stream.
pub struct StreamResponse<T> {
    meta: ResponseMeta,
    events: mpsc::Receiver<StreamEvent<T>>,
    closer: StreamCloser,
    error: Arc<OnceLock<ClientError>>,
    state: watch::Receiver<StreamState>,
}

impl<T: 'static> StreamResponse<T> {
    /// Start pumping `body` into a channel of `capacity` events.
    ///
    /// Must be called from within a tokio runtime: the pump is spawned as a
    /// task that inherits the current tracing span.
    pub fn from_byte_stream<S, B, E>(
        meta: ResponseMeta,
        body: S,
        options: &StreamOptions,
        capacity: usize,
    ) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let (event_tx, event_rx) = mpsc::channel(capacity.max(1));
        let (close_tx, close_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(StreamState::Opening);
        let error = Arc::new(OnceLock::new());

        let pump = Pump {
            events: event_tx,
            close_rx,
            cancel: options.cancellation().cloned().unwrap_or_default(),
            deadline: options.deadline(),
            error: Arc::clone(&error),
            state: state_tx,
        };
        tokio::spawn(pump.run(body).instrument(Span::current()));

        Self {
            meta,
            events: event_rx,
            closer: StreamCloser { close_tx },
            error,
            state: state_rx,
        }
    }
}

impl<T> StreamResponse<T> {
    /// A stream that never opened. The channel is already closed and `err`
    /// is the terminal error.
    pub fn from_error(meta: ResponseMeta, err: ClientError) -> Self {
        let state = if err.is_cancelled() {
            StreamState::Cancelled
        } else {
            StreamState::Errored
        };
        let (_, events) = mpsc::channel(1);
        let (close_tx, _) = mpsc::channel(1);
        let (_, state_rx) = watch::channel(state);

        Self {
            meta,
            events,
            closer: StreamCloser { close_tx },
            error: Arc::new(OnceLock::from(err)),
            state: state_rx,
        }
    }

    /// Status, headers and correlation id of the response that opened the
    /// stream.
    pub fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    /// The HTTP status code, or 0 if the request never got a response.
    pub fn status_code(&self) -> u16 {
        self.meta.status_code()
    }

    /// The correlation id reported by the API.
    pub fn correlation_id(&self) -> Option<&str> {
        self.meta.correlation_id()
    }

    /// Receive the next event, or `None` once the stream has stopped.
    pub async fn recv(&mut self) -> Option<StreamEvent<T>> {
        self.events.recv().await
    }

    /// Close the stream. Idempotent and non-blocking.
    pub fn close(&self) {
        self.closer.close();
    }

    /// A handle that can close the stream from elsewhere.
    pub fn closer(&self) -> StreamCloser {
        self.closer.clone()
    }

    /// The current lifecycle state.
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Wait until the stream reaches a terminal state.
    pub async fn finished(&self) -> StreamState {
        let mut state = self.state.clone();
        let outcome = state.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        outcome.unwrap_or_else(|_| *state.borrow())
    }

    /// The terminal error, if the stream failed or was cancelled.
    pub fn error(&self) -> Option<&ClientError> {
        self.error.get()
    }

    /// Returns `true` if a terminal error was recorded.
    pub fn has_error(&self) -> bool {
        self.error.get().is_some()
    }
}

impl<T> Stream for StreamResponse<T> {
    type Item = StreamEvent<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

impl<T> fmt::Debug for StreamResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamResponse")
            .field("meta", &self.meta)
            .field("state", &self.state())
            .field("error", &self.error())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Internal: pump task
// ---------------------------------------------------------------------------

/// How the pump loop ended.
enum Termination {
    /// The body ended.
    Finished,
    /// The caller closed the stream or dropped every handle to it.
    Closed,
    /// The consumer dropped the receiving side.
    ConsumerGone,
    Failed(ClientError),
    Cancelled(CancelReason),
}

struct Pump<T> {
    events: mpsc::Sender<StreamEvent<T>>,
    close_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
    deadline: Option<Deadline>,
    error: Arc<OnceLock<ClientError>>,
    state: watch::Sender<StreamState>,
}

impl<T> Pump<T> {
    async fn run<S, B, E>(mut self, body: S)
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        self.state.send_replace(StreamState::Streaming);
        info!("event stream opened");

        let mut delivered: u64 = 0;
        // The body lives in this block only, so it is released before the
        // terminal state is published.
        let termination = {
            let frames = FrameScanner::new(body);
            tokio::pin!(frames);
            let deadline = until_deadline(self.deadline);
            tokio::pin!(deadline);

            loop {
                let frame = tokio::select! {
                    biased;
                    _ = self.close_rx.recv() => break Termination::Closed,
                    () = self.cancel.cancelled() => {
                        break Termination::Cancelled(CancelReason::Cancelled);
                    }
                    reason = &mut deadline => break Termination::Cancelled(reason),
                    () = self.events.closed() => break Termination::ConsumerGone,
                    frame = frames.next() => frame,
                };

                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        break Termination::Failed(ClientError::stream_read(e.to_string()));
                    }
                    None => break Termination::Finished,
                };

                let event = StreamEvent::<T>::parse(&frame);
                debug!(
                    event = event.event_name(),
                    id = ?event.id,
                    data_len = event.data.len(),
                    "stream event"
                );

                // A full channel parks the pump here until the consumer
                // catches up, unless the stream is stopped meanwhile.
                tokio::select! {
                    biased;
                    _ = self.close_rx.recv() => break Termination::Closed,
                    () = self.cancel.cancelled() => {
                        break Termination::Cancelled(CancelReason::Cancelled);
                    }
                    reason = &mut deadline => break Termination::Cancelled(reason),
                    sent = self.events.send(event) => {
                        if sent.is_err() {
                            break Termination::ConsumerGone;
                        }
                    }
                }
                delivered += 1;
            }
        };

        let state = match termination {
            Termination::Finished => {
                info!(delivered, "event stream ended");
                StreamState::Closed
            }
            Termination::Closed | Termination::ConsumerGone => {
                info!(delivered, "event stream closed by caller");
                StreamState::Closed
            }
            Termination::Failed(err) => {
                error!(delivered, error = %err, "event stream read failed");
                let _ = self.error.set(err);
                StreamState::Errored
            }
            Termination::Cancelled(reason) => {
                info!(delivered, %reason, "event stream cancelled");
                let _ = self.error.set(ClientError::cancelled(reason));
                StreamState::Cancelled
            }
        };

        // Publish before the sender drops so a consumer that sees the channel
        // close also sees the error and the terminal state.
        self.state.send_replace(state);
        drop(self.events);
    }
}
