//! Typed responses for one-shot API calls.
//!
//! A [`Response`] always carries the response metadata and raw body, plus
//! either the decoded payload or the error that prevented it.
//!
//! # Example
//!
//! ```rust,no_run
//! use cc_client::{Client, Nothing};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Organisation {
//!     id: String,
//!     name: String,
//! }
//!
//! # async fn run(client: Client) {
//! let res = client.get::<Organisation>("/v2/self").await;
//! match res.payload() {
//!     Some(org) => println!("{} ({})", org.name, org.id),
//!     None if res.is_not_found() => println!("no such organisation"),
//!     None => eprintln!("request failed: {:?}", res.error()),
//! }
//!
//! // Endpoints without a meaningful body.
//! let res = client.delete::<Nothing>("/v2/self/tokens/abc").await;
//! assert!(!res.has_error() || res.status_code() >= 300);
//! # }
//! ```

use std::any::TypeId;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::{
    Deserialize, Serialize,
    de::{DeserializeOwned, IntoDeserializer},
};

use crate::error::{ClientError, ClientResult};

/// Payload type for calls whose response body is ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nothing;

/// Status, headers and correlation id of an API response.
///
/// Two metas are equal when their status and correlation id are.
#[derive(Clone, Debug, Default)]
pub struct ResponseMeta {
    status: Option<StatusCode>,
    headers: HeaderMap,
    correlation_id: Option<String>,
}

impl ResponseMeta {
    /// Capture the metadata of a response, reading the correlation id from
    /// `correlation_header`.
    pub fn new(status: StatusCode, headers: HeaderMap, correlation_header: &str) -> Self {
        let correlation_id = headers
            .get(correlation_header)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Self {
            status: Some(status),
            headers,
            correlation_id,
        }
    }

    /// Metadata for a request that never produced a response.
    pub fn none() -> Self {
        Self::default()
    }

    /// The HTTP status, if a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// The HTTP status code, or 0 if no response was received.
    pub fn status_code(&self) -> u16 {
        self.status.map_or(0, |s| s.as_u16())
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The correlation id the API attached to the response.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns `true` for a status >= 300.
    pub fn is_error_status(&self) -> bool {
        self.status.is_some_and(|s| s.as_u16() >= 300)
    }

    /// Returns `true` for a 404 status.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(StatusCode::NOT_FOUND)
    }
}

impl PartialEq for ResponseMeta {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status && self.correlation_id == other.correlation_id
    }
}

impl Eq for ResponseMeta {}

/// The outcome of a one-shot API call.
#[derive(Debug)]
pub struct Response<T> {
    meta: ResponseMeta,
    raw_body: Bytes,
    result: ClientResult<T>,
}

impl<T: DeserializeOwned + 'static> Response<T> {
    /// Classify a fully read body.
    ///
    /// A status >= 300 becomes a status error carrying the body text. A
    /// [`Nothing`] payload is never decoded; anything else is decoded from
    /// JSON.
    pub fn decode(meta: ResponseMeta, body: Bytes) -> Self {
        let result = match meta.status() {
            Some(status) if status.as_u16() >= 300 => Err(ClientError::status(
                status,
                String::from_utf8_lossy(&body),
            )),
            _ if TypeId::of::<T>() == TypeId::of::<Nothing>() => {
                let unit = <() as IntoDeserializer<'_, serde_json::Error>>::into_deserializer(());
                T::deserialize(unit).map_err(ClientError::Decode)
            }
            _ => serde_json::from_slice(&body).map_err(ClientError::Decode),
        };

        Self {
            meta,
            raw_body: body,
            result,
        }
    }
}

impl<T> Response<T> {
    /// A response that failed before a payload could be decoded.
    pub fn from_error(meta: ResponseMeta, err: ClientError) -> Self {
        Self {
            meta,
            raw_body: Bytes::new(),
            result: Err(err),
        }
    }

    /// Status, headers and correlation id.
    pub fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    /// The HTTP status code, or 0 if no response was received.
    pub fn status_code(&self) -> u16 {
        self.meta.status_code()
    }

    /// The correlation id the API attached to the response.
    pub fn correlation_id(&self) -> Option<&str> {
        self.meta.correlation_id()
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        self.meta.headers()
    }

    /// The body as received.
    pub fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    /// Returns `true` for a 404 status.
    pub fn is_not_found(&self) -> bool {
        self.meta.is_not_found()
    }

    /// The decoded payload, if the call succeeded.
    pub fn payload(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    /// The error that prevented decoding, if any.
    pub fn error(&self) -> Option<&ClientError> {
        self.result.as_ref().err()
    }

    /// Returns `true` if the call failed.
    pub fn has_error(&self) -> bool {
        self.result.is_err()
    }

    /// Drop the metadata and keep the outcome.
    pub fn into_result(self) -> ClientResult<T> {
        self.result
    }

    /// Map the decoded payload.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Response<U> {
        Response {
            meta: self.meta,
            raw_body: self.raw_body,
            result: self.result.map(f),
        }
    }
}

impl<T> PartialEq for Response<T> {
    fn eq(&self, other: &Self) -> bool {
        self.meta == other.meta
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Application {
        id: String,
        name: String,
    }

    fn meta(status: u16, correlation_id: Option<&'static str>) -> ResponseMeta {
        let mut headers = HeaderMap::new();
        if let Some(id) = correlation_id {
            headers.insert("sozu-id", HeaderValue::from_static(id));
        }
        ResponseMeta::new(
            StatusCode::from_u16(status).expect("status"),
            headers,
            "Sozu-Id",
        )
    }

    #[test]
    fn test_decode_payload() {
        let res = Response::<Application>::decode(
            meta(200, Some("req-1")),
            Bytes::from_static(br#"{"id":"app_1","name":"api"}"#),
        );

        assert!(!res.has_error());
        assert_eq!(
            res.payload(),
            Some(&Application {
                id: "app_1".to_string(),
                name: "api".to_string()
            })
        );
        assert_eq!(res.correlation_id(), Some("req-1"));
        assert_eq!(res.status_code(), 200);
    }

    #[test]
    fn test_not_found_is_status_error() {
        let res = Response::<Application>::decode(
            meta(404, Some("abc")),
            Bytes::from_static(br#"{"message":"not found"}"#),
        );

        assert!(res.is_not_found());
        assert_eq!(res.correlation_id(), Some("abc"));
        assert!(res.payload().is_none());
        match res.error() {
            Some(ClientError::Status { status, body }) => {
                assert_eq!(*status, StatusCode::NOT_FOUND);
                assert_eq!(body, r#"{"message":"not found"}"#);
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn test_redirect_status_is_an_error() {
        let res = Response::<Nothing>::decode(meta(302, None), Bytes::new());
        assert!(res.has_error());
        assert_eq!(res.error().and_then(ClientError::status_code), Some(StatusCode::FOUND));
    }

    #[test]
    fn test_no_content_with_nothing() {
        let res = Response::<Nothing>::decode(meta(204, None), Bytes::new());
        assert!(!res.has_error());
        assert_eq!(res.payload(), Some(&Nothing));
    }

    #[test]
    fn test_nothing_ignores_any_body() {
        let res = Response::<Nothing>::decode(meta(200, None), Bytes::from_static(b"<html>"));
        assert_eq!(res.into_result().ok(), Some(Nothing));
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let res = Response::<Application>::decode(meta(200, None), Bytes::from_static(b"{"));
        assert!(matches!(res.error(), Some(ClientError::Decode(_))));
        assert_eq!(res.raw_body().as_ref(), b"{");
    }

    #[test]
    fn test_empty_body_for_payload_is_decode_error() {
        let res = Response::<Application>::decode(meta(204, None), Bytes::new());
        assert!(matches!(res.error(), Some(ClientError::Decode(_))));
    }

    #[test]
    fn test_equality_ignores_body() {
        type Value = Response<serde_json::Value>;
        let a = Value::decode(meta(200, Some("x")), Bytes::from_static(b"1"));
        let b = Value::decode(meta(200, Some("x")), Bytes::from_static(b"2"));
        let c = Value::decode(meta(200, Some("y")), Bytes::from_static(b"1"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_from_error_has_no_status() {
        let res = Response::<Nothing>::from_error(
            ResponseMeta::none(),
            ClientError::config("bad endpoint"),
        );
        assert_eq!(res.status_code(), 0);
        assert!(res.correlation_id().is_none());
        assert!(res.has_error());
    }

    #[test]
    fn test_map_keeps_meta() {
        let res = Response::<u32>::decode(meta(200, Some("m")), Bytes::from_static(b"41"));
        let res = res.map(|n| n + 1);
        assert_eq!(res.payload(), Some(&42));
        assert_eq!(res.correlation_id(), Some("m"));
    }
}
