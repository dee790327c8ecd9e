//! Request signing strategies.
//!
//! A client holds exactly one [`Authenticator`], chosen when the client is
//! built. Signing mutates the request's `Authorization` header in place and
//! never fails: [`Authenticator::None`] leaves the request unsigned, and a
//! header value that HTTP cannot carry is logged and skipped.

mod bearer;
pub mod oauth1;

use std::borrow::Cow;

use http::{HeaderName, HeaderValue, Method, header::AUTHORIZATION};
use tracing::warn;

pub use bearer::BearerConfig;
pub use oauth1::{FixedNonceSource, NonceSource, OAuth1Config, SystemNonceSource};

/// A request that can be signed.
pub trait SignableRequest {
    /// The request method.
    fn method(&self) -> &Method;

    /// The full request URL, query string included.
    fn url(&self) -> Cow<'_, str>;

    /// Set (replace) a header.
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);
}

impl SignableRequest for reqwest::Request {
    fn method(&self) -> &Method {
        reqwest::Request::method(self)
    }

    fn url(&self) -> Cow<'_, str> {
        Cow::Borrowed(reqwest::Request::url(self).as_str())
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers_mut().insert(name, value);
    }
}

impl<B> SignableRequest for http::Request<B> {
    fn method(&self) -> &Method {
        http::Request::method(self)
    }

    fn url(&self) -> Cow<'_, str> {
        Cow::Owned(self.uri().to_string())
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers_mut().insert(name, value);
    }
}

/// The closed set of signing strategies.
#[derive(Debug, Clone, Default)]
pub enum Authenticator {
    /// Requests are sent unsigned.
    #[default]
    None,
    /// OAuth1 HMAC-SHA512 signature.
    OAuth1(OAuth1Config),
    /// Static bearer token.
    Bearer(BearerConfig),
}

impl Authenticator {
    /// OAuth1 signing with the given consumer and user credentials.
    pub fn oauth1(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_secret: impl Into<String>,
    ) -> Self {
        Self::OAuth1(OAuth1Config::new(
            consumer_key,
            consumer_secret,
            access_token,
            access_secret,
        ))
    }

    /// Bearer token signing.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(BearerConfig::new(token))
    }

    /// Returns `true` when requests are left unsigned.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Sign `request` in place.
    pub fn sign(&self, request: &mut dyn SignableRequest) {
        let value = match self {
            Self::None => return,
            Self::OAuth1(config) => {
                let url = request.url();
                let extra = query_pairs(&url);
                config.authorization_header(request.method().as_str(), &url, &extra)
            }
            Self::Bearer(config) => config.header_value(),
        };

        match HeaderValue::from_str(&value) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.set_header(AUTHORIZATION, value);
            }
            Err(e) => {
                warn!(error = %e, "authorization value is not a valid header, sending unsigned");
            }
        }
    }

    /// The OAuth1 access token and secret, if this is an OAuth1 authenticator.
    pub fn oauth1_user_credentials(&self) -> Option<(&str, &str)> {
        match self {
            Self::OAuth1(config) => Some(config.user_credentials()),
            _ => None,
        }
    }
}

impl From<OAuth1Config> for Authenticator {
    fn from(config: OAuth1Config) -> Self {
        Self::OAuth1(config)
    }
}

impl From<BearerConfig> for Authenticator {
    fn from(config: BearerConfig) -> Self {
        Self::Bearer(config)
    }
}

/// Decoded query-string pairs of `url`, in order.
fn query_pairs(url: &str) -> Vec<(String, String)> {
    let url = url.split('#').next().unwrap_or_default();
    match url.split_once('?') {
        Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reqwest_get(url: &str) -> reqwest::Request {
        reqwest::Request::new(Method::GET, url.parse().expect("url"))
    }

    fn fixed_oauth1() -> OAuth1Config {
        OAuth1Config::new("ck", "cs", "tok", "ts")
            .with_nonce_source(FixedNonceSource::new("nonce", 1_700_000_000))
    }

    #[test]
    fn test_none_leaves_request_unsigned() {
        let mut request = reqwest_get("https://api.example.com/v2/self");
        Authenticator::None.sign(&mut request);
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_bearer_sets_header() {
        let mut request = reqwest_get("https://api.example.com/v2/self");
        Authenticator::bearer("abc").sign(&mut request);
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer abc");
        assert!(request.headers()[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn test_bearer_replaces_existing_header() {
        let mut request = http::Request::builder()
            .uri("https://api.example.com/v2/self")
            .header(AUTHORIZATION, "Basic old")
            .body(())
            .expect("request");
        Authenticator::bearer("new").sign(&mut request);
        assert_eq!(request.headers().get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer new");
    }

    #[test]
    fn test_oauth1_signs_reqwest_request() {
        let config = fixed_oauth1();
        let mut request = reqwest_get("https://api.example.com/v2/self");
        Authenticator::from(config.clone()).sign(&mut request);

        let expected = config.authorization_header_at(
            "GET",
            "https://api.example.com/v2/self",
            &[],
            "nonce",
            1_700_000_000,
        );
        assert_eq!(request.headers()[AUTHORIZATION], expected.as_str());
    }

    #[test]
    fn test_oauth1_collects_query_parameters() {
        let config = fixed_oauth1();
        let mut request = reqwest_get("https://api.example.com/v4/logs?limit=10&filter=a%20b");
        Authenticator::from(config.clone()).sign(&mut request);

        let extra = vec![
            ("limit".to_string(), "10".to_string()),
            ("filter".to_string(), "a b".to_string()),
        ];
        let expected = config.authorization_header_at(
            "GET",
            "https://api.example.com/v4/logs",
            &extra,
            "nonce",
            1_700_000_000,
        );
        let unsigned_query = config.authorization_header_at(
            "GET",
            "https://api.example.com/v4/logs",
            &[],
            "nonce",
            1_700_000_000,
        );

        assert_eq!(request.headers()[AUTHORIZATION], expected.as_str());
        assert_ne!(request.headers()[AUTHORIZATION], unsigned_query.as_str());
    }

    #[test]
    fn test_oauth1_signs_http_request() {
        let config = fixed_oauth1();
        let mut request = http::Request::builder()
            .method(Method::DELETE)
            .uri("https://api.example.com/v2/apps/app_1")
            .body(())
            .expect("request");
        Authenticator::from(config.clone()).sign(&mut request);

        let expected = config.authorization_header_at(
            "DELETE",
            "https://api.example.com/v2/apps/app_1",
            &[],
            "nonce",
            1_700_000_000,
        );
        assert_eq!(request.headers()[AUTHORIZATION], expected.as_str());
    }

    #[test]
    fn test_user_credentials() {
        let auth = Authenticator::oauth1("ck", "cs", "tok", "ts");
        assert_eq!(auth.oauth1_user_credentials(), Some(("tok", "ts")));
        assert_eq!(Authenticator::bearer("t").oauth1_user_credentials(), None);
        assert!(Authenticator::default().is_none());
    }

    #[test]
    fn test_query_pairs() {
        assert!(query_pairs("https://h/p").is_empty());
        assert_eq!(
            query_pairs("https://h/p?a=1&b=x+y#frag"),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "x y".to_string())
            ]
        );
    }
}
