use super::ByteStream;
use anyhow::anyhow;
use bytes::Bytes;
use futures::stream;

fn frame(chunk: String) -> anyhow::Result<Bytes> {
    let framed = if chunk.ends_with("\n\n") {
        chunk
    } else {
        format!("{chunk}\n\n")
    };
    Ok(Bytes::from(framed))
}

/// In-memory SSE stream; each entry is one event, framed if needed.
pub fn sse_stream(chunks: Vec<String>) -> ByteStream {
    Box::pin(stream::iter(chunks.into_iter().map(frame)))
}

/// Like [`sse_stream`], then a transport error.
pub fn failing_sse_stream(chunks: Vec<String>, error: &str) -> ByteStream {
    let error = error.to_string();
    let items = chunks
        .into_iter()
        .map(frame)
        .chain(std::iter::once(Err(anyhow!(error))));
    Box::pin(stream::iter(items))
}

/// Canned events for a plain text reply split across `deltas`.
pub fn text_round(message_id: &str, deltas: &[&str]) -> Vec<String> {
    let mut events = vec![
        format!(
            r#"event: message_start
data: {{"type":"message_start","message":{{"id":"{message_id}","type":"message","role":"assistant","model":"mock-model","content":[]}}}}"#
        ),
        r#"event: content_block_start
data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#
            .to_string(),
    ];
    for delta in deltas {
        let text = serde_json::to_string(delta).unwrap_or_default();
        events.push(format!(
            r#"event: content_block_delta
data: {{"type":"content_block_delta","index":0,"delta":{{"type":"text_delta","text":{text}}}}}"#
        ));
    }
    events.push(
        r#"event: content_block_stop
data: {"type":"content_block_stop","index":0}"#
            .to_string(),
    );
    events
}

/// Canned events for one `tool_use` block whose input arrives in `json_parts`.
pub fn tool_use_events(index: usize, call_id: &str, name: &str, json_parts: &[&str]) -> Vec<String> {
    let mut events = vec![format!(
        r#"event: content_block_start
data: {{"type":"content_block_start","index":{index},"content_block":{{"type":"tool_use","id":"{call_id}","name":"{name}","input":{{}}}}}}"#
    )];
    for part in json_parts {
        let partial = serde_json::to_string(part).unwrap_or_default();
        events.push(format!(
            r#"event: content_block_delta
data: {{"type":"content_block_delta","index":{index},"delta":{{"type":"input_json_delta","partial_json":{partial}}}}}"#
        ));
    }
    events.push(format!(
        r#"event: content_block_stop
data: {{"type":"content_block_stop","index":{index}}}"#
    ));
    events
}

pub fn message_stop() -> Vec<String> {
    vec![
        r#"event: message_delta
data: {"type":"message_delta","delta":{"stop_reason":"end_turn","stop_sequence":null},"usage":{"output_tokens":9}}"#
            .to_string(),
        r#"event: message_stop
data: {"type":"message_stop"}"#
            .to_string(),
    ]
}
