//! Server-Sent Events streaming.
//!
//! A stream request hands its response body to a background pump that
//! splits it into frames ([`FrameScanner`]), parses each frame into a
//! [`StreamEvent`] and delivers it through the bounded channel behind a
//! [`StreamResponse`].
//!
//! # Example
//!
//! ```rust,no_run
//! use cc_client::{Client, stream::StreamOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(client: Client) {
//! let token = CancellationToken::new();
//! let mut events = client
//!     .stream_with::<serde_json::Value>(
//!         "/v4/events",
//!         StreamOptions::new().with_cancellation(token.clone()),
//!     )
//!     .await;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event}");
//! }
//! if let Some(err) = events.error() {
//!     eprintln!("stream stopped: {err}");
//! }
//! # }
//! ```

mod event;
mod response;
mod scanner;

pub use event::StreamEvent;
pub use response::{StreamCloser, StreamOptions, StreamResponse, StreamState};
pub use scanner::FrameScanner;

pub(crate) use response::{Deadline, until_deadline};
