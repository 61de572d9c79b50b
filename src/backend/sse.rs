//! Incremental server-sent events parser

use crate::{Error, Result};

/// A complete server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    /// Concatenated `data:` lines
    pub data: String,
}

/// Splits a byte stream into events
///
/// Chunks may end anywhere, including mid-line or inside a UTF-8 sequence;
/// incomplete input is kept as bytes until the next [`SseParser::push`].
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    current: SseEvent,
    has_data: bool,
}

impl SseParser {
    /// Create an empty parser
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendStream`] if a complete line is not UTF-8
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = decode_line(&raw)?;

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }

            self.field(line);
        }

        Ok(events)
    }

    /// Flush an event left open when the stream ends without a blank line
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendStream`] if the trailing line is not UTF-8
    pub fn finish(&mut self) -> Result<Option<SseEvent>> {
        let rest = std::mem::take(&mut self.buffer);
        let line = decode_line(&rest)?;
        if !line.is_empty() {
            self.field(line);
        }
        Ok(self.dispatch())
    }

    fn field(&mut self, line: &str) {
        // Comment line
        if line.starts_with(':') {
            return;
        }

        let (name, value) = line.split_once(':').map_or((line, ""), |(n, v)| {
            (n, v.strip_prefix(' ').unwrap_or(v))
        });

        match name {
            "event" => self.current.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
                self.has_data = true;
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if !self.has_data && self.current.event.is_none() {
            return None;
        }
        self.has_data = false;
        Some(std::mem::take(&mut self.current))
    }
}

fn decode_line(raw: &[u8]) -> Result<&str> {
    let line = std::str::from_utf8(raw)
        .map_err(|e| Error::BackendStream(format!("invalid UTF-8 in event stream: {e}")))?;
    Ok(line.trim_end_matches(['\n', '\r']))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_events() {
        let mut parser = SseParser::new();
        let events = parser
            .push(
                b"event: thread.run.created\ndata: {\"id\":\"run_1\"}\n\nevent: done\ndata: [DONE]\n\n",
            )
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.as_deref(), Some("thread.run.created"));
        assert_eq!(events[0].data, "{\"id\":\"run_1\"}");
        assert_eq!(events[1].data, "[DONE]");
    }

    #[test]
    fn keeps_partial_lines_between_chunks() {
        let mut parser = SseParser::new();

        assert!(parser.push(b"event: thread.message.de").unwrap().is_empty());
        assert!(parser.push(b"lta\r\ndata: {\"a\":").unwrap().is_empty());
        let events = parser.push(b"1}\r\n\r\n").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("thread.message.delta"));
        assert_eq!(events[0].data, "{\"a\":1}");
    }

    #[test]
    fn joins_multiline_data_and_skips_comments() {
        let mut parser = SseParser::new();
        let events = parser
            .push(b": keep-alive\ndata: one\ndata: two\n\n")
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, None);
        assert_eq!(events[0].data, "one\ntwo");
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: done\ndata: [DONE]").unwrap().is_empty());

        let last = parser.finish().unwrap().unwrap();
        assert_eq!(last.event.as_deref(), Some("done"));
        assert_eq!(last.data, "[DONE]");
        assert!(parser.finish().unwrap().is_none());
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let mut parser = SseParser::new();
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        // Cut between the two bytes of "é"
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        assert!(parser.push(&bytes[..split]).unwrap().is_empty());
        let events = parser.push(&bytes[split..]).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "caf\u{e9}");
    }

    #[test]
    fn invalid_utf8_line_is_an_error() {
        let mut parser = SseParser::new();

        assert!(matches!(
            parser.push(b"data: \xFF\xFE\n\n"),
            Err(Error::BackendStream(_))
        ));
    }
}
