//! Decoded Server-Sent Events frames.

use std::{borrow::Cow, fmt, marker::PhantomData, time::Duration};

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;

use super::scanner::{CR, LF};
use crate::error::{ClientError, ClientResult};

/// One decoded SSE frame, typed by the payload carried in `data`.
///
/// `data` is the in-order concatenation of every `data:` line of the frame,
/// taken verbatim after the colon; no separator is inserted between lines.
pub struct StreamEvent<T> {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// Concatenated `data:` lines.
    pub data: Bytes,
    /// The `id:` field, if present.
    pub id: Option<Bytes>,
    /// The `retry:` hint in milliseconds, if present and numeric.
    pub retry: Option<i64>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> StreamEvent<T> {
    /// Parse a frame (lines separated by LF or CRLF, no trailing blank line).
    ///
    /// Never fails: comment lines, unknown fields and lines without a colon
    /// are skipped, so a frame with nothing recognizable yields an empty event.
    pub fn parse(frame: &[u8]) -> Self {
        let mut event = Self::default();
        let mut data = BytesMut::new();

        for line in frame.split(|&b| b == LF) {
            let line = line.strip_suffix(&[CR]).unwrap_or(line);
            if line.first() == Some(&b':') {
                continue;
            }
            let Some(colon) = memchr::memchr(b':', line) else {
                continue;
            };
            let raw = &line[colon + 1..];
            let value = raw.strip_prefix(b" ").unwrap_or(raw);

            match &line[..colon] {
                b"id" => event.id = Some(Bytes::copy_from_slice(value)),
                b"event" => event.event = Some(String::from_utf8_lossy(value).into_owned()),
                b"retry" => {
                    if let Some(retry) = std::str::from_utf8(value)
                        .ok()
                        .and_then(|v| v.parse().ok())
                    {
                        event.retry = Some(retry);
                    }
                }
                // Leading spaces are payload: the API splits text across
                // lines and relies on them between words.
                b"data" => data.extend_from_slice(raw),
                _ => {}
            }
        }

        event.data = data.freeze();
        event
    }

    /// The event name, or `""` when the frame had none.
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or_default()
    }

    /// The data payload as text, lossily decoded.
    pub fn data_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    /// The retry hint as a duration. Negative hints are ignored.
    pub fn retry_duration(&self) -> Option<Duration> {
        self.retry
            .and_then(|ms| u64::try_from(ms).ok())
            .map(Duration::from_millis)
    }

    /// Decode `data` as JSON into the stream's payload type.
    pub fn decode(&self) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.data).map_err(ClientError::Decode)
    }
}

impl<T> Default for StreamEvent<T> {
    fn default() -> Self {
        Self {
            event: None,
            data: Bytes::new(),
            id: None,
            retry: None,
            _payload: PhantomData,
        }
    }
}

impl<T> Clone for StreamEvent<T> {
    fn clone(&self) -> Self {
        Self {
            event: self.event.clone(),
            data: self.data.clone(),
            id: self.id.clone(),
            retry: self.retry,
            _payload: PhantomData,
        }
    }
}

impl<T> PartialEq for StreamEvent<T> {
    fn eq(&self, other: &Self) -> bool {
        self.event == other.event
            && self.data == other.data
            && self.id == other.id
            && self.retry == other.retry
    }
}

impl<T> Eq for StreamEvent<T> {}

impl<T> fmt::Debug for StreamEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEvent")
            .field("event", &self.event)
            .field("data", &self.data)
            .field("id", &self.id)
            .field("retry", &self.retry)
            .finish()
    }
}

impl<T> fmt::Display for StreamEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id.as_deref().map(String::from_utf8_lossy);
        write!(
            f,
            "Event={}\tID={}\t{}",
            self.event_name(),
            id.unwrap_or_default(),
            self.data_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    type Event = StreamEvent<()>;

    #[test]
    fn test_parse_all_fields() {
        let event = Event::parse(b"event: deploy\nid: 42\nretry: 3000\ndata: {\"ok\":true}");
        assert_eq!(event.event.as_deref(), Some("deploy"));
        assert_eq!(event.id.as_deref(), Some(&b"42"[..]));
        assert_eq!(event.retry, Some(3000));
        assert_eq!(event.retry_duration(), Some(Duration::from_secs(3)));
        assert_eq!(event.data, Bytes::from_static(b" {\"ok\":true}"));
    }

    #[test]
    fn test_data_lines_concatenate_without_separator() {
        let event = Event::parse(b"data:{\"a\":\ndata:1,\ndata:\"b\":2}");
        assert_eq!(event.data_str(), "{\"a\":1,\"b\":2}");
    }

    #[test]
    fn test_data_reconstruction_for_many_lines() {
        let lines = [" alpha", " beta", "", "  gamma delta", "{}", " "];
        let frame = lines
            .iter()
            .map(|line| format!("data:{line}"))
            .collect::<Vec<_>>()
            .join("\n");
        let event = Event::parse(frame.as_bytes());
        assert_eq!(event.data_str(), lines.concat());
    }

    #[test]
    fn test_comments_and_unknown_fields_are_skipped() {
        let event = Event::parse(b": keep-alive\nfoo: bar\nnocolon\ndata:x");
        assert_eq!(event.data_str(), "x");
        assert!(event.event.is_none());
        assert!(event.id.is_none());
    }

    #[test]
    fn test_unrecognized_frame_yields_empty_event() {
        assert_eq!(Event::parse(b": only a comment"), Event::default());
        assert_eq!(Event::parse(b""), Event::default());
    }

    #[test]
    fn test_invalid_retry_is_ignored() {
        let event = Event::parse(b"retry: soon\ndata: x");
        assert_eq!(event.retry, None);

        let event = Event::parse(b"retry: 10\nretry: later");
        assert_eq!(event.retry, Some(10));

        let event = Event::parse(b"retry: -5");
        assert_eq!(event.retry, Some(-5));
        assert_eq!(event.retry_duration(), None);
    }

    #[test]
    fn test_crlf_lines() {
        let event = Event::parse(b"event: a\r\ndata: b\r\n");
        assert_eq!(event.event_name(), "a");
        assert_eq!(event.data_str(), " b");
    }

    #[test]
    fn test_data_keeps_leading_spaces() {
        let event = Event::parse(b"data: hello\ndata: world");
        assert_eq!(event.data_str(), " hello world");

        let event = Event::parse(b"data:  two");
        assert_eq!(event.data_str(), "  two");
    }

    #[test]
    fn test_one_leading_space_is_stripped_from_other_fields() {
        let event = Event::parse(b"event:  two\nid:x\nretry: 5");
        assert_eq!(event.event_name(), " two");
        assert_eq!(event.id.as_deref(), Some(&b"x"[..]));
        assert_eq!(event.retry, Some(5));
    }

    #[test]
    fn test_invalid_utf8_is_degraded_not_rejected() {
        let event = Event::parse(b"event: \xFFbad\ndata: \xFE");
        assert_eq!(event.event_name(), "\u{FFFD}bad");
        assert_eq!(event.data.as_ref(), b" \xFE");
    }

    #[test]
    fn test_decode_payload() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct LogLine {
            message: String,
        }

        let event = StreamEvent::<LogLine>::parse(b"data: {\"message\":\"started\"}");
        assert_eq!(
            event.decode().expect("decode"),
            LogLine {
                message: "started".to_string()
            }
        );

        let event = StreamEvent::<LogLine>::parse(b"data: not json");
        assert!(matches!(event.decode(), Err(ClientError::Decode(_))));
    }

    #[test]
    fn test_display() {
        let event = Event::parse(b"event: log\nid: 7\ndata:hello");
        assert_eq!(event.to_string(), "Event=log\tID=7\thello");
    }
}
