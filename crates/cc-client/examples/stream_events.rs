//! Event Stream Example
//!
//! Opens an event stream with OAuth1 credentials discovered from the
//! environment (`CC_OAUTH_TOKEN`, `CC_OAUTH_SECRET`, ...) or the clever-tools
//! config file, and prints every event until Ctrl-C or the optional deadline.
//!
//! Run with:
//! `RUST_LOG=cc_client=debug cargo run -p cc-client --example stream_events -- /v4/events 60`

use std::time::Duration;

use cc_client::{Client, StreamOptions};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "/v4/events".to_string());
    let deadline = args.next().map(|s| s.parse()).transpose()?;

    let mut builder = Client::builder().auto_oauth1_from_env();
    if let (Ok(key), Ok(secret)) = (
        std::env::var("CC_DEFAULT_CONSUMER_KEY"),
        std::env::var("CC_DEFAULT_CONSUMER_SECRET"),
    ) {
        builder = builder.default_consumer(key, secret);
    }
    let client = builder.build()?;

    let token = CancellationToken::new();
    let mut options = StreamOptions::new().with_cancellation(token.clone());
    if let Some(secs) = deadline {
        options = options.with_timeout(Duration::from_secs(secs));
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let mut events = client
        .stream_with::<serde_json::Value>(&path, options)
        .await;
    println!(
        "status={} correlation_id={}",
        events.status_code(),
        events.correlation_id().unwrap_or("-")
    );

    while let Some(event) = events.recv().await {
        println!("{event}");
    }

    println!("stream ended: {:?}", events.finished().await);
    if let Some(err) = events.error() {
        println!("reason: {err}");
    }
    Ok(())
}
