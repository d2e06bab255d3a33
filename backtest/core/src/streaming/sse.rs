//! Server-Sent Events Decoding
//!
//! Incremental decoder for `text/event-stream` bodies. Chunks may split
//! lines (or multi-byte characters) anywhere; complete frames are emitted
//! only when the terminating blank line arrives.
//!
//! Recognised fields: `event`, `data` (repeated lines joined with `\n`),
//! `id`. Lines starting with `:` are comments. `retry` and unknown fields
//! are ignored.

/// One dispatched server-sent event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name (`message` when the server sent none)
    pub event: String,
    /// Data payload, lines joined with `\n`
    pub data: String,
    /// Last event id, if the server sent one
    pub id: Option<String>,
}

impl SseFrame {
    /// Build a frame with the given name and data
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
        }
    }
}

const DEFAULT_EVENT: &str = "message";

/// Incremental `text/event-stream` decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Undecoded bytes (partial line, possibly a partial UTF-8 sequence)
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    /// Bytes received counter
    bytes_received: usize,
}

impl SseDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes fed so far
    #[must_use]
    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    /// Feed a chunk and collect every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.bytes_received += chunk.len();
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing frame when the body ends without a blank line
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest).into_owned();
            self.process_line(line.trim_end_matches('\r'));
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
            id: self.id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_frame() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"event: trade\ndata: {\"index\":0}\n\n");
        assert_eq!(frames, vec![SseFrame::new("trade", "{\"index\":0}")]);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: prog").is_empty());
        assert!(decoder.feed(b"ress\ndata: {\"pct\"").is_empty());
        let frames = decoder.feed(b":50}\n\n");
        assert_eq!(frames, vec![SseFrame::new("progress", "{\"pct\":50}")]);
        assert_eq!(decoder.bytes_received(), 34);
    }

    #[test]
    fn test_multibyte_split() {
        let text = "event: result\ndata: {\"note\":\"caf\u{e9}\"}\n\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&text[..split]).is_empty());
        let frames = decoder.feed(&text[split..]);
        assert_eq!(frames[0].data, "{\"note\":\"caf\u{e9}\"}");
    }

    #[test]
    fn test_crlf_and_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": keep-alive\r\nevent: done\r\ndata: \r\n\r\n");
        assert_eq!(frames, vec![SseFrame::new("done", "")]);
    }

    #[test]
    fn test_multiline_data_and_default_name() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: [1,\ndata: 2]\nid: 7\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "[1,\n2]");
        assert_eq!(frames[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn test_several_frames_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"event: trade\ndata: 1\n\nevent: trade\ndata: 2\n\nevent: done\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(decoder.finish(), Some(SseFrame::new("done", "")));
    }

    #[test]
    fn test_blank_lines_alone_dispatch_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"\n\n\n").is_empty());
        assert!(decoder.finish().is_none());
    }
}
