//! The API client: signed one-shot calls and event streams.

use std::{sync::Arc, time::Duration};

use http::{
    HeaderValue, Method,
    header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, USER_AGENT},
};
use serde::{Serialize, de::DeserializeOwned};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

use crate::{
    auth::{Authenticator, OAuth1Config},
    config::ClientConfig,
    credentials::{ChainedCredentialProvider, CredentialProvider, OAuth1Credentials},
    error::{CancelReason, ClientError, ClientResult},
    response::{Response, ResponseMeta},
    stream::{Deadline, StreamOptions, StreamResponse, until_deadline},
};

/// A signed HTTP client for the Clever Cloud API.
///
/// Cheap to clone; clones share the connection pool, configuration and
/// authenticator.
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    authenticator: Arc<Authenticator>,
}

impl Client {
    /// A client for the production endpoint with unsigned requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP transport cannot be initialized.
    pub fn new() -> ClientResult<Self> {
        Self::builder().build()
    }

    /// Start building a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The strategy signing every request.
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// The OAuth1 access token and secret, if requests are OAuth1-signed.
    pub fn oauth1_user_credentials(&self) -> Option<(&str, &str)> {
        self.authenticator.oauth1_user_credentials()
    }

    /// Perform a GET request.
    pub async fn get<T>(&self, path: &str) -> Response<T>
    where
        T: DeserializeOwned + 'static,
    {
        self.request::<T, ()>(Method::GET, path, None).await
    }

    /// Perform a POST request with a JSON body.
    pub async fn post<T, B>(&self, path: &str, payload: &B) -> Response<T>
    where
        T: DeserializeOwned + 'static,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(payload)).await
    }

    /// Perform a PUT request with a JSON body.
    pub async fn put<T, B>(&self, path: &str, payload: &B) -> Response<T>
    where
        T: DeserializeOwned + 'static,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, path, Some(payload)).await
    }

    /// Perform a DELETE request.
    pub async fn delete<T>(&self, path: &str) -> Response<T>
    where
        T: DeserializeOwned + 'static,
    {
        self.request::<T, ()>(Method::DELETE, path, None).await
    }

    /// Perform a PATCH request with a JSON body.
    pub async fn patch<T, B>(&self, path: &str, payload: &B) -> Response<T>
    where
        T: DeserializeOwned + 'static,
        B: Serialize + ?Sized,
    {
        self.request(Method::PATCH, path, Some(payload)).await
    }

    /// Perform a request and decode its response.
    ///
    /// Never fails outright: every failure is recorded in the returned
    /// [`Response`]. Drop the future to abandon the call.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&B>,
    ) -> Response<T>
    where
        T: DeserializeOwned + 'static,
        B: Serialize + ?Sized,
    {
        let url = self.config.url_for(path);

        let body = match payload.map(serde_json::to_vec).transpose() {
            Ok(body) => body,
            Err(e) => {
                return Response::from_error(ResponseMeta::none(), ClientError::Serialization(e));
            }
        };

        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header(USER_AGENT, &self.config.user_agent);
        if let Some(body) = body.filter(|b| !b.is_empty()) {
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body);
        }
        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }

        let mut request = match builder.build() {
            Ok(request) => request,
            Err(e) => return Response::from_error(ResponseMeta::none(), e.into()),
        };
        self.authenticator.sign(&mut request);

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%method, %url, error = %e, "request failed");
                return Response::from_error(ResponseMeta::none(), e.into());
            }
        };

        let status = response.status();
        info!(%method, %url, %status, "response");
        let meta = self.meta(&response);

        match response.bytes().await {
            Ok(body) => Response::decode(meta, body),
            Err(e) if meta.is_error_status() => {
                warn!(%method, %url, error = %e, "cannot read error body");
                Response::from_error(meta, ClientError::status(status, String::new()))
            }
            Err(e) => {
                warn!(%method, %url, error = %e, "cannot read response body");
                Response::from_error(meta, e.into())
            }
        }
    }

    /// Open an event stream with no cancellation token and no deadline.
    pub async fn stream<T: 'static>(&self, path: &str) -> StreamResponse<T> {
        self.stream_with(path, StreamOptions::new()).await
    }

    /// Open an event stream.
    ///
    /// The cancellation token and deadline from `options` also bound the
    /// wait for the response headers; the deadline is measured from this
    /// call, not from the first event. A status >= 300 yields a stream that
    /// is already closed, with a status error carrying the response body.
    pub async fn stream_with<T: 'static>(
        &self,
        path: &str,
        options: StreamOptions,
    ) -> StreamResponse<T> {
        let url = self.config.url_for(path);
        let options = options.anchored();
        let deadline = options.deadline();

        let builder = self
            .http
            .get(&url)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        let mut request = match builder.build() {
            Ok(request) => request,
            Err(e) => return StreamResponse::from_error(ResponseMeta::none(), e.into()),
        };
        self.authenticator.sign(&mut request);

        let cancel = options.cancellation().cloned().unwrap_or_default();
        let response = match interruptible(&cancel, deadline, self.http.execute(request))
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(%url, error = %e, "event stream request failed");
                return StreamResponse::from_error(ResponseMeta::none(), e.into());
            }
            Err(reason) => {
                info!(%url, %reason, "event stream cancelled while opening");
                return StreamResponse::from_error(
                    ResponseMeta::none(),
                    ClientError::cancelled(reason),
                );
            }
        };

        let status = response.status();
        info!(%url, %status, "event stream response");
        let meta = self.meta(&response);

        if meta.is_error_status() {
            let body = match interruptible(&cancel, deadline, response.bytes()).await {
                Ok(Ok(body)) => String::from_utf8_lossy(&body).into_owned(),
                Ok(Err(_)) | Err(_) => String::new(),
            };
            return StreamResponse::from_error(meta, ClientError::status(status, body));
        }

        info_span!("event_stream", %url).in_scope(|| {
            StreamResponse::from_byte_stream(
                meta,
                response.bytes_stream(),
                &options,
                self.config.stream_channel_capacity,
            )
        })
    }

    fn meta(&self, response: &reqwest::Response) -> ResponseMeta {
        ResponseMeta::new(
            response.status(),
            response.headers().clone(),
            &self.config.correlation_header,
        )
    }
}

/// Run `fut` unless `cancel` fires or `deadline` passes first.
async fn interruptible<F: Future>(
    cancel: &CancellationToken,
    deadline: Option<Deadline>,
    fut: F,
) -> Result<F::Output, CancelReason> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CancelReason::Cancelled),
        reason = until_deadline(deadline) => Err(reason),
        output = fut => Ok(output),
    }
}

// ---------------------------------------------------------------------------
// ClientBuilder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
enum AuthChoice {
    #[default]
    Unsigned,
    Ready(Authenticator),
    /// OAuth1 user credentials waiting for the default consumer.
    User(OAuth1Credentials),
}

/// Builder for [`Client`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    http: Option<reqwest::Client>,
    auth: AuthChoice,
}

impl ClientBuilder {
    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Base URL of the API.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config = self.config.endpoint(endpoint);
        self
    }

    /// `User-Agent` sent with every request.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config = self.config.user_agent(user_agent);
        self
    }

    /// Response header read as the correlation id.
    #[must_use]
    pub fn correlation_header(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.correlation_header(name);
        self
    }

    /// Events buffered per stream before the pump waits.
    #[must_use]
    pub fn stream_channel_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.stream_channel_capacity(capacity);
        self
    }

    /// Timeout for one-shot requests.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Consumer used by [`user_oauth1`](Self::user_oauth1) and
    /// [`auto_oauth1`](Self::auto_oauth1).
    #[must_use]
    pub fn default_consumer(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config = self.config.default_consumer(key, secret);
        self
    }

    /// Use a preconfigured HTTP transport.
    #[must_use]
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Sign with a ready-made authenticator.
    #[must_use]
    pub fn authenticator(mut self, authenticator: Authenticator) -> Self {
        self.auth = AuthChoice::Ready(authenticator);
        self
    }

    /// Sign with OAuth1 using explicit consumer and user credentials.
    #[must_use]
    pub fn oauth1(
        self,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_secret: impl Into<String>,
    ) -> Self {
        self.authenticator(Authenticator::oauth1(
            consumer_key,
            consumer_secret,
            access_token,
            access_secret,
        ))
    }

    /// Sign with OAuth1 using the default consumer.
    #[must_use]
    pub fn user_oauth1(
        mut self,
        access_token: impl Into<String>,
        access_secret: impl Into<String>,
    ) -> Self {
        self.auth = AuthChoice::User(OAuth1Credentials {
            access_token: access_token.into(),
            access_secret: access_secret.into(),
            consumer_key: None,
            consumer_secret: None,
        });
        self
    }

    /// Sign with a static bearer token.
    #[must_use]
    pub fn bearer(self, token: impl Into<String>) -> Self {
        self.authenticator(Authenticator::bearer(token))
    }

    /// Sign with OAuth1 credentials discovered by `provider`.
    ///
    /// Leaves the current authenticator untouched when nothing is found.
    #[must_use]
    pub fn auto_oauth1(mut self, provider: &dyn CredentialProvider) -> Self {
        match provider.oauth1_credentials() {
            Some(credentials) => self.auth = AuthChoice::User(credentials),
            None => info!(source = provider.name(), "no OAuth1 user credentials found"),
        }
        self
    }

    /// [`auto_oauth1`](Self::auto_oauth1) with the environment, then the
    /// clever-tools config file.
    #[must_use]
    pub fn auto_oauth1_from_env(self) -> Self {
        self.auto_oauth1(&ChainedCredentialProvider::default())
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configuration is invalid or the
    /// HTTP transport cannot be initialized.
    pub fn build(self) -> ClientResult<Client> {
        self.config.validate()?;

        let authenticator = match self.auth {
            AuthChoice::Unsigned => Authenticator::None,
            AuthChoice::Ready(authenticator) => authenticator,
            AuthChoice::User(credentials) => {
                Authenticator::OAuth1(user_config(&self.config, credentials))
            }
        };

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .build()
                .map_err(|e| ClientError::config(format!("Failed to build HTTP client: {e}")))?,
        };

        Ok(Client {
            http,
            config: Arc::new(self.config),
            authenticator: Arc::new(authenticator),
        })
    }
}

/// OAuth1 config for user credentials, completed with the default consumer.
fn user_config(config: &ClientConfig, credentials: OAuth1Credentials) -> OAuth1Config {
    let key = config.default_consumer_key.as_deref();
    let secret = config.default_consumer_secret.as_deref();
    let needs_default = credentials.consumer_key.is_none() || credentials.consumer_secret.is_none();
    if needs_default && (key.is_none() || secret.is_none()) {
        warn!("no default OAuth1 consumer configured, signing with an empty consumer");
    }
    credentials.into_config(key.unwrap_or_default(), secret.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fixed(Option<OAuth1Credentials>);

    impl CredentialProvider for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn oauth1_credentials(&self) -> Option<OAuth1Credentials> {
            self.0.clone()
        }
    }

    #[test]
    fn test_default_client_is_unsigned() {
        let client = Client::new().expect("client");
        assert!(client.authenticator().is_none());
        assert!(client.oauth1_user_credentials().is_none());
        assert_eq!(client.config().endpoint, "https://api.clever-cloud.com");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = Client::builder()
            .endpoint("not a url")
            .build()
            .expect_err("invalid endpoint");
        assert!(matches!(err, ClientError::Config { .. }));
    }

    #[test]
    fn test_user_oauth1_uses_default_consumer() {
        let client = Client::builder()
            .default_consumer("ck", "cs")
            .user_oauth1("tok", "sec")
            .build()
            .expect("client");

        match client.authenticator() {
            Authenticator::OAuth1(config) => assert_eq!(config.consumer_key(), "ck"),
            other => panic!("expected OAuth1, got {other:?}"),
        }
        assert_eq!(client.oauth1_user_credentials(), Some(("tok", "sec")));
    }

    #[test]
    fn test_auto_oauth1_keeps_explicit_consumer() {
        let provider = Fixed(Some(OAuth1Credentials {
            access_token: "tok".to_string(),
            access_secret: "sec".to_string(),
            consumer_key: Some("env-ck".to_string()),
            consumer_secret: Some("env-cs".to_string()),
        }));
        let client = Client::builder()
            .default_consumer("ck", "cs")
            .auto_oauth1(&provider)
            .build()
            .expect("client");

        match client.authenticator() {
            Authenticator::OAuth1(config) => assert_eq!(config.consumer_key(), "env-ck"),
            other => panic!("expected OAuth1, got {other:?}"),
        }
    }

    #[test]
    fn test_auto_oauth1_without_credentials_keeps_authenticator() {
        let client = Client::builder()
            .bearer("token")
            .auto_oauth1(&Fixed(None))
            .build()
            .expect("client");
        assert!(matches!(client.authenticator(), Authenticator::Bearer(_)));
    }
}
