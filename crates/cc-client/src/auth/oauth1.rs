//! OAuth 1.0 request signing with HMAC-SHA512.
//!
//! The signature follows the classic three-legged OAuth1 construction:
//!
//! ```text
//! base   = UPPER(method) & enc(url without query) & enc(parameter string)
//! key    = enc(consumer secret) & enc(access secret)
//! oauth_signature = base64(HMAC-SHA512(key, base))
//! ```
//!
//! where `enc` is query-component escaping (space becomes `+`). The parameter
//! string is form-encoded and then has every `+` rewritten to `%20`, which is
//! what the upstream API verifies against.
//!
//! Everything except nonce and timestamp generation is a pure function, so a
//! [`FixedNonceSource`] makes the produced header byte-for-byte reproducible.

use std::{
    collections::BTreeMap,
    fmt,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::{Rng, distr::Alphanumeric};
use sha2::Sha512;

/// Value of `oauth_signature_method`.
pub const SIGNATURE_METHOD: &str = "HMAC-SHA512";
/// Value of `oauth_version`.
pub const OAUTH_VERSION: &str = "1.0";
/// Length of generated nonces.
pub const NONCE_LEN: usize = 48;

/// Bytes left untouched by query-component escaping: alphanumerics and `-_.~`.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

type HmacSha512 = Hmac<Sha512>;

/// Escape a string for use in a URL query component.
///
/// Space is encoded as `+`, every other reserved byte as `%XX`.
pub fn query_escape(input: &str) -> String {
    // An encoded space is the only way "%20" can appear in the output.
    utf8_percent_encode(input, QUERY_COMPONENT)
        .to_string()
        .replace("%20", "+")
}

/// Build the normalized parameter string.
///
/// Pairs are sorted by key (values of a repeated key keep their order), each
/// side escaped with [`query_escape`], then `+` is rewritten to `%20`.
pub fn parameter_string<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut sorted: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (key, value) in params {
        sorted.entry(key).or_default().push(value);
    }

    let encoded = sorted
        .iter()
        .flat_map(|(key, values)| {
            values
                .iter()
                .map(move |value| format!("{}={}", query_escape(key), query_escape(value)))
        })
        .collect::<Vec<_>>()
        .join("&");

    encoded.replace('+', "%20")
}

/// Build the signature base string from a method, a full URL and an already
/// normalized parameter string. The URL's query string is dropped.
pub fn signature_base(method: &str, url: &str, parameter_string: &str) -> String {
    let without_query = url.split('?').next().unwrap_or_default();
    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        query_escape(without_query),
        query_escape(parameter_string)
    )
}

/// Build the HMAC signing key.
pub fn signing_key(consumer_secret: &str, access_secret: &str) -> String {
    format!(
        "{}&{}",
        query_escape(consumer_secret),
        query_escape(access_secret)
    )
}

/// Compute `base64(HMAC-SHA512(key, base))`.
pub fn sign(base: &str, key: &str) -> String {
    let mut mac =
        HmacSha512::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(base.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Source of the time-varying parts of a signature.
///
/// Implementations must be safe to call from many in-flight requests at once.
pub trait NonceSource: Send + Sync + fmt::Debug {
    /// A fresh single-use nonce.
    fn nonce(&self) -> String;

    /// Current Unix time in seconds.
    fn timestamp(&self) -> u64;
}

/// Nonces from the thread-local CSPRNG, timestamps from the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNonceSource;

impl NonceSource for SystemNonceSource {
    fn nonce(&self) -> String {
        rand::rng()
            .sample_iter(Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect()
    }

    fn timestamp(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Always returns the same nonce and timestamp. Used for golden-value tests.
#[derive(Debug, Clone)]
pub struct FixedNonceSource {
    nonce: String,
    timestamp: u64,
}

impl FixedNonceSource {
    /// Create a source that always yields `nonce` and `timestamp`.
    pub fn new(nonce: impl Into<String>, timestamp: u64) -> Self {
        Self {
            nonce: nonce.into(),
            timestamp,
        }
    }
}

impl NonceSource for FixedNonceSource {
    fn nonce(&self) -> String {
        self.nonce.clone()
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// OAuth1 credentials plus the nonce source used when signing.
#[derive(Clone)]
pub struct OAuth1Config {
    consumer_key: String,
    consumer_secret: String,
    access_token: String,
    access_secret: String,
    nonce_source: Arc<dyn NonceSource>,
}

impl OAuth1Config {
    /// Create a new OAuth1 configuration using [`SystemNonceSource`].
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            access_token: access_token.into(),
            access_secret: access_secret.into(),
            nonce_source: Arc::new(SystemNonceSource),
        }
    }

    /// Replace the nonce source.
    #[must_use]
    pub fn with_nonce_source(mut self, source: impl NonceSource + 'static) -> Self {
        self.nonce_source = Arc::new(source);
        self
    }

    /// The consumer key.
    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// The user's access token and access secret.
    pub fn user_credentials(&self) -> (&str, &str) {
        (&self.access_token, &self.access_secret)
    }

    /// Build an `Authorization` header value for `method` and `url`, drawing a
    /// fresh nonce and timestamp.
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        extra: &[(String, String)],
    ) -> String {
        let nonce = self.nonce_source.nonce();
        let timestamp = self.nonce_source.timestamp();
        self.authorization_header_at(method, url, extra, &nonce, timestamp)
    }

    /// Build an `Authorization` header value with an explicit nonce and
    /// timestamp. Deterministic.
    pub fn authorization_header_at(
        &self,
        method: &str,
        url: &str,
        extra: &[(String, String)],
        nonce: &str,
        timestamp: u64,
    ) -> String {
        let timestamp = timestamp.to_string();
        let oauth_params = [
            ("oauth_nonce", nonce),
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.access_token.as_str()),
            ("oauth_version", OAUTH_VERSION),
        ];
        let params = parameter_string(
            oauth_params
                .into_iter()
                .chain(extra.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        );

        let base = signature_base(method, url, &params);
        let signature = sign(&base, &signing_key(&self.consumer_secret, &self.access_secret));

        format!(
            "OAuth oauth_consumer_key=\"{}\", oauth_nonce=\"{}\", oauth_signature=\"{}\", \
             oauth_signature_method=\"{}\", oauth_timestamp=\"{}\", oauth_token=\"{}\", \
             oauth_version=\"{}\"",
            query_escape(&self.consumer_key),
            query_escape(nonce),
            query_escape(&signature),
            query_escape(SIGNATURE_METHOD),
            query_escape(&timestamp),
            query_escape(&self.access_token),
            query_escape(OAUTH_VERSION),
        )
    }
}

impl fmt::Debug for OAuth1Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth1Config")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &self.access_token)
            .field("access_secret", &"<redacted>")
            .field("nonce_source", &self.nonce_source)
            .finish()
    }
}
