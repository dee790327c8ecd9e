//! [`Stream`] adapter that splits a stream of byte chunks into SSE frames.
//!
//! A frame is every line up to the next blank line. Lines may end in LF, CR
//! or CRLF; the emitted frame has its lines re-joined with LF and carries no
//! trailing delimiter. At end of input any unterminated remainder is emitted
//! as a final frame, while an empty remainder is absorbed.

use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::Stream;

/// Newline byte
pub(crate) const LF: u8 = b'\n';
/// Carriage return byte
pub(crate) const CR: u8 = b'\r';
/// UTF-8 byte order mark
const BOM: &[u8; 3] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScannerState {
    NotStarted,
    Started,
    Terminated,
}

pin_project_lite::pin_project! {
    /// Splits a byte stream into blank-line delimited frames.
    #[derive(Debug)]
    pub struct FrameScanner<S> {
        #[pin]
        stream: S,
        buffer: BytesMut,
        frame: BytesMut,
        state: ScannerState,
    }
}

impl<S> FrameScanner<S> {
    /// Wrap a stream of byte chunks.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            frame: BytesMut::new(),
            state: ScannerState::NotStarted,
        }
    }
}

/// Finds the next end-of-line in `bytes`.
///
/// Returns `(line_end, remainder_start)`, or `None` if more data is needed
/// (no terminator yet, or a trailing CR that may be half of a CRLF).
fn find_eol(bytes: &[u8]) -> Option<(usize, usize)> {
    let pos = memchr::memchr2(CR, LF, bytes)?;

    match bytes[pos] {
        LF => Some((pos, pos + 1)),
        _ => match bytes.get(pos + 1) {
            None => None,
            Some(&LF) => Some((pos, pos + 2)),
            Some(_) => Some((pos, pos + 1)),
        },
    }
}

/// Split the next complete line off `buffer`, without its terminator.
fn next_line(buffer: &mut BytesMut) -> Option<Bytes> {
    let (line_end, rem_start) = find_eol(buffer)?;
    let line = buffer.split_to(line_end).freeze();
    buffer.advance(rem_start - line_end);
    Some(line)
}

/// `Some(true)` if `buf` starts with a BOM, `None` if undecidable yet.
fn starts_with_bom(buf: &[u8]) -> Option<bool> {
    if buf.len() < BOM.len() {
        if BOM.starts_with(buf) {
            None
        } else {
            Some(false)
        }
    } else {
        Some(buf.starts_with(BOM))
    }
}

/// Drain complete lines into `frame` until a blank line closes a non-empty
/// frame.
fn take_frame(buffer: &mut BytesMut, frame: &mut BytesMut) -> Option<Bytes> {
    while let Some(line) = next_line(buffer) {
        if line.is_empty() {
            // Consecutive blank lines do not make empty frames.
            if !frame.is_empty() {
                return Some(frame.split().freeze());
            }
            continue;
        }
        if !frame.is_empty() {
            frame.put_u8(LF);
        }
        frame.extend_from_slice(&line);
    }
    None
}

impl<S, B, E> Stream for FrameScanner<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(frame) = take_frame(this.buffer, this.frame) {
                return Poll::Ready(Some(Ok(frame)));
            }

            if *this.state == ScannerState::Terminated {
                return Poll::Ready(None);
            }

            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    let chunk = chunk.as_ref();
                    if chunk.is_empty() {
                        continue;
                    }
                    this.buffer.extend_from_slice(chunk);

                    if *this.state == ScannerState::NotStarted {
                        match starts_with_bom(this.buffer) {
                            Some(true) => {
                                this.buffer.advance(BOM.len());
                                *this.state = ScannerState::Started;
                            }
                            Some(false) => *this.state = ScannerState::Started,
                            None => continue,
                        }
                    }
                }
                Some(Err(e)) => {
                    *this.state = ScannerState::Terminated;
                    this.buffer.clear();
                    this.frame.clear();
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    // Final token: close any open line and any open frame. A
                    // trailing CR becomes CRLF, which is still one line end.
                    *this.state = ScannerState::Terminated;
                    this.buffer.put_slice(&[LF, LF]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    async fn scan(chunks: Vec<Bytes>) -> Vec<Bytes> {
        FrameScanner::new(futures_util::stream::iter(
            chunks.into_iter().map(Ok::<_, ()>),
        ))
        .map(|frame| frame.expect("frame"))
        .collect()
        .await
    }

    async fn frames(chunks: &[&'static str]) -> Vec<Bytes> {
        scan(chunks.iter().map(|&c| Bytes::from_static(c.as_bytes())).collect()).await
    }

    #[tokio::test]
    async fn splits_on_blank_lines() {
        assert_eq!(
            frames(&["data: a\n\ndata: b\nid: 2\n\n"]).await,
            vec![Bytes::from_static(b"data: a"), Bytes::from_static(b"data: b\nid: 2")]
        );
    }

    #[tokio::test]
    async fn frames_span_chunks() {
        assert_eq!(
            frames(&["data: He", "", "llo\n", "\ndata: x\n\n"]).await,
            vec![Bytes::from_static(b"data: Hello"), Bytes::from_static(b"data: x")]
        );
    }

    #[tokio::test]
    async fn accepts_crlf_and_cr() {
        assert_eq!(
            frames(&["data: a\r\n\r\ndata: b\r", "\rdata: c\r\n", "\r\n"]).await,
            vec![
                Bytes::from_static(b"data: a"),
                Bytes::from_static(b"data: b"),
                Bytes::from_static(b"data: c"),
            ]
        );
    }

    #[tokio::test]
    async fn final_token_is_emitted() {
        assert_eq!(
            frames(&["data: a\n\ndata: tail"]).await,
            vec![Bytes::from_static(b"data: a"), Bytes::from_static(b"data: tail")]
        );
        assert_eq!(
            frames(&["data: tail\n"]).await,
            vec![Bytes::from_static(b"data: tail")]
        );
        assert_eq!(
            frames(&["data: tail\r"]).await,
            vec![Bytes::from_static(b"data: tail")]
        );
    }

    #[tokio::test]
    async fn empty_remainders_are_absorbed() {
        assert_eq!(
            frames(&["data: a\n\n", "\n\n\n"]).await,
            vec![Bytes::from_static(b"data: a")]
        );
        assert!(frames(&[]).await.is_empty());
        assert!(frames(&["\n\n"]).await.is_empty());
    }

    #[tokio::test]
    async fn strips_bom() {
        assert_eq!(
            scan(vec![
                Bytes::from_static(b"\xEF\xBB"),
                Bytes::from_static(b"\xBFdata: a\n\n"),
            ])
            .await,
            vec![Bytes::from_static(b"data: a")]
        );
        assert_eq!(
            frames(&[":", "\ndata: a\n\n"]).await,
            vec![Bytes::from_static(b":\ndata: a")]
        );
    }

    #[tokio::test]
    async fn transport_error_terminates() {
        let chunks = vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Err("reset"),
            Ok(Bytes::from_static(b"data: b\n\n")),
        ];
        let items: Vec<_> = FrameScanner::new(futures_util::stream::iter(chunks))
            .collect()
            .await;
        assert_eq!(items, vec![Ok(Bytes::from_static(b"data: a")), Err("reset")]);
    }
}
