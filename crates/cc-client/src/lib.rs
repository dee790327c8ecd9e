//! # cc-client
//!
//! Signed HTTP client for the Clever Cloud API.
//!
//! ## Features
//!
//! - **Request signing**: OAuth1 HMAC-SHA512 or bearer token, chosen once per
//!   client through a closed [`Authenticator`] enum
//! - **Typed responses**: every call returns a [`Response<T>`] carrying the
//!   status, correlation id, raw body and either the payload or the error
//! - **Event streams**: Server-Sent Events decoded by a background pump into
//!   a bounded channel, with idempotent close, cancellation and deadlines
//! - **Credential discovery**: environment variables, then the clever-tools
//!   configuration file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cc_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .default_consumer("consumer-key", "consumer-secret")
//!         .auto_oauth1_from_env()
//!         .build()?;
//!
//!     let res = client.get::<serde_json::Value>("/v2/self").await;
//!     println!("{} {:?}", res.status_code(), res.correlation_id());
//!     let me = res.into_result()?;
//!     println!("{me}");
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod response;
pub mod stream;

// Re-export commonly used types
pub use auth::{Authenticator, BearerConfig, OAuth1Config};
pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use credentials::{
    ChainedCredentialProvider, ConfigFileCredentialProvider, CredentialProvider,
    EnvCredentialProvider, OAuth1Credentials,
};
pub use error::{CancelReason, ClientError, ClientResult};
pub use response::{Nothing, Response, ResponseMeta};
pub use stream::{StreamCloser, StreamEvent, StreamOptions, StreamResponse, StreamState};
