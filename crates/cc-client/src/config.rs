//! Client configuration.

use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// Production API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.clever-cloud.com";

/// Header carrying the API's request correlation id.
pub const DEFAULT_CORRELATION_HEADER: &str = "Sozu-Id";

/// Default `User-Agent`: crate name and version, then platform.
pub fn default_user_agent() -> String {
    format!(
        "cc-client/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Configuration shared by every request a [`Client`](crate::Client) makes.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL every request path is appended to.
    pub endpoint: String,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Response header read as the correlation id.
    pub correlation_header: String,
    /// Capacity of each stream's event channel.
    pub stream_channel_capacity: usize,
    /// Timeout applied to one-shot requests. Streams use
    /// [`StreamOptions`](crate::stream::StreamOptions) instead.
    pub timeout: Option<Duration>,
    /// Consumer key used when OAuth1 credentials carry none.
    pub default_consumer_key: Option<String>,
    /// Consumer secret used when OAuth1 credentials carry none.
    pub default_consumer_secret: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: default_user_agent(),
            correlation_header: DEFAULT_CORRELATION_HEADER.to_string(),
            stream_channel_capacity: 10,
            timeout: None,
            default_consumer_key: None,
            default_consumer_secret: None,
        }
    }
}

impl ClientConfig {
    /// Configuration for the given endpoint, defaults elsewhere.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the base URL.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the `User-Agent` header value.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the response header read as the correlation id.
    #[must_use]
    pub fn correlation_header(mut self, name: impl Into<String>) -> Self {
        self.correlation_header = name.into();
        self
    }

    /// Set the number of events buffered per stream before the pump waits.
    #[must_use]
    pub fn stream_channel_capacity(mut self, capacity: usize) -> Self {
        self.stream_channel_capacity = capacity;
        self
    }

    /// Set the timeout for one-shot requests.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer used for user-only OAuth1 credentials.
    #[must_use]
    pub fn default_consumer(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.default_consumer_key = Some(key.into());
        self.default_consumer_secret = Some(secret.into());
        self
    }

    /// Resolve the URL of an API path.
    ///
    /// Absolute `http(s)` URLs are used as is; anything else is appended to
    /// the endpoint.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.endpoint.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any field has an invalid value.
    pub fn validate(&self) -> ClientResult<()> {
        if self.endpoint.is_empty() {
            return Err(ClientError::config("Endpoint cannot be empty"));
        }
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| ClientError::config(format!("Invalid endpoint: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::config(format!(
                "Unsupported endpoint scheme: {}",
                url.scheme()
            )));
        }
        if self.stream_channel_capacity == 0 {
            return Err(ClientError::config("Stream channel capacity must be > 0"));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ClientError::config("Timeout cannot be zero"));
        }
        http::HeaderName::from_bytes(self.correlation_header.as_bytes()).map_err(|e| {
            ClientError::config(format!(
                "Invalid correlation header {:?}: {e}",
                self.correlation_header
            ))
        })?;
        http::HeaderValue::from_str(&self.user_agent)
            .map_err(|e| ClientError::config(format!("Invalid user agent: {e}")))?;
        Ok(())
    }
}
