use crate::logging::emit_sse_parse_error;
use crate::types::StreamEvent;
use bytes::BytesMut;

/// Incremental SSE framing for the model backend's event stream.
///
/// Raw bytes are buffered until an event is terminated, so a UTF-8 character
/// split across network chunks is decoded whole.
#[derive(Default)]
pub struct StreamParser {
    buffer: BytesMut,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk and returns every event it completed.
    /// Malformed events are logged and skipped.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(end) = self.buffer.windows(2).position(|pair| pair == b"\n\n") {
            let frame = self.buffer.split_to(end + 2);
            let event_text = String::from_utf8_lossy(&frame);

            let mut event_type = None;
            let mut data = None;

            for line in event_text.lines() {
                if let Some(rest) = line.strip_prefix("event: ") {
                    event_type = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix("data: ") {
                    data = Some(rest.trim().to_string());
                }
            }

            let (Some(evt_type), Some(json_data)) = (event_type, data) else {
                continue;
            };
            if json_data == "[DONE]"
                || !matches!(
                    evt_type.as_str(),
                    "message_start"
                        | "content_block_start"
                        | "content_block_delta"
                        | "content_block_stop"
                        | "message_delta"
                        | "message_stop"
                        | "error"
                )
            {
                continue;
            }

            match serde_json::from_str::<StreamEvent>(&json_data) {
                Ok(evt) => events.push(evt),
                Err(e) => emit_sse_parse_error(Some(&evt_type), &json_data, &e),
            }
        }

        events
    }

    /// Unterminated trailing data, if the stream ended mid-event.
    pub fn flush(&mut self) -> String {
        String::from_utf8_lossy(&self.buffer.split()).into_owned()
    }
}
