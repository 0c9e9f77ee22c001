//! Server-sent events decoding for `streamGenerateContent?alt=sse`
//!
//! Network chunks can split lines (and UTF-8 sequences) anywhere, so the
//! decoder buffers raw bytes and only interprets complete lines.

use std::collections::VecDeque;
use std::fmt::Display;

use futures_util::{Stream, StreamExt};

use super::GeminiError;

/// Incremental SSE decoder yielding the `data` payload of each event
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final event not terminated by a blank line
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(event) = self.process_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.take_event()
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.take_event();
        }
        if let Some(data) = line.strip_prefix("data:") {
            self.data_lines
                .push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
        // Comments, event names and ids carry nothing we use
        None
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data_lines).join("\n"))
    }
}

/// Turn a byte stream into a stream of SSE `data` payloads.
///
/// A transport error is yielded once and ends the stream.
pub fn sse_events<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, GeminiError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    struct State<S> {
        bytes: S,
        decoder: SseDecoder,
        ready: VecDeque<String>,
        done: bool,
    }

    let state = State {
        bytes,
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.ready.pop_front() {
                return Some((Ok(event), st));
            }
            if st.done {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = st.decoder.push(chunk.as_ref());
                    st.ready.extend(events);
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(GeminiError::Network(e.to_string())), st));
                }
                None => {
                    st.done = true;
                    st.ready.extend(st.decoder.finish());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"a\":1}\r\n\r\n");
        assert_eq!(events, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"da").is_empty());
        assert!(decoder.push(b"ta: hel").is_empty());
        assert!(decoder.push(b"lo\n").is_empty());
        assert_eq!(decoder.push(b"\n"), vec!["hello".to_string()]);
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let text = "data: £5\n\n".as_bytes();
        let mut decoder = SseDecoder::new();
        // '£' is two bytes; split between them
        let split = text.iter().position(|&b| b == 0xC2).unwrap() + 1;
        assert!(decoder.push(&text[..split]).is_empty());
        assert_eq!(decoder.push(&text[split..]), vec!["£5".to_string()]);
    }

    #[test]
    fn test_multiple_events_one_chunk() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: one\n\ndata: two\n\n");
        assert_eq!(events, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_comments_ignored_and_multiline_joined() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keepalive\ndata: a\ndata: b\n\n");
        assert_eq!(events, vec!["a\nb".to_string()]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), Some("tail".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    #[tokio::test]
    async fn test_sse_events_stream() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"data: x\n".to_vec()),
            Ok(b"\ndata: y".to_vec()),
        ];
        let events: Vec<_> = sse_events(futures_util::stream::iter(chunks)).collect().await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap(), "x");
        assert_eq!(events[1].as_ref().unwrap(), "y");
    }

    #[tokio::test]
    async fn test_sse_events_stops_after_error() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"data: x\n\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "reset")),
            Ok(b"data: never\n\n".to_vec()),
        ];
        let events: Vec<_> = sse_events(futures_util::stream::iter(chunks)).collect().await;

        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(&events[1], Err(GeminiError::Network(m)) if m.contains("reset")));
    }
}
