//! Incremental Server-Sent Events parser for `streamGenerateContent?alt=sse`.
//!
//! Bytes are buffered until a full line is available, so multi-byte UTF-8
//! sequences split across network chunks decode correctly. Each event's
//! `data:` lines are joined with `\n`.

/// A parsed Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, when present.
    pub event_type: Option<String>,
    /// Joined `data:` payload.
    pub data: String,
}

impl SseEvent {
    /// Whether this is a `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Streaming SSE parser.
#[derive(Debug, Default)]
pub struct SseLineParser {
    pending: Vec<u8>,
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl SseLineParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Emit whatever is left once the stream has ended.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest);
            let line = line.trim_end_matches('\r').to_owned();
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.take_event()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.take_event();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data_lines.push(value.to_owned()),
            "event" => self.event_type = Some(value.to_owned()),
            _ => {}
        }
        None
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() {
            self.event_type = None;
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(SseEvent {
            event_type: self.event_type.take(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_events_split_across_chunks() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"data: {\"a\":").is_empty());
        let events = parser.push(b"1}\n\ndata: two\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"a\":1}");
        assert_eq!(events[1].data, "two");
    }

    #[test]
    fn joins_multiline_data_and_reads_event_type() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b"event: chunk\ndata: one\ndata: two\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("chunk"));
        assert_eq!(events[0].data, "one\ntwo");
    }

    #[test]
    fn handles_crlf_and_comments() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b": keep-alive\r\ndata: x\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn utf8_split_across_chunks_is_preserved() {
        let text = "data: नमस्ते\n\n".as_bytes();
        let (a, b) = text.split_at(9);
        let mut parser = SseLineParser::new();
        assert!(parser.push(a).is_empty());
        let events = parser.push(b);
        assert_eq!(events[0].data, "नमस्ते");
    }

    #[test]
    fn flush_emits_trailing_event() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"data: tail").is_empty());
        let event = parser.flush();
        assert_eq!(event.map(|e| e.data), Some("tail".to_owned()));
        assert!(parser.flush().is_none());
    }

    #[test]
    fn done_sentinel_detected() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b"data: [DONE]\n\n");
        assert!(events[0].is_done());
    }
}
