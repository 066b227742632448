use super::stream::StreamParser;
use crate::error::{SessionError, SessionResult};
use crate::logging::emit_session_event;
use crate::state::{
    ApprovalPolicy, ErrorDetails, Response, ResponsePart, Session, ToolInvocation,
    ToolInvocationGate,
};
use crate::types::{ContentBlock, StreamEvent, TurnId};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

const INCOMPLETE_STREAM_CODE: &str = "incomplete_stream";
const TRANSPORT_ERROR_CODE: &str = "transport_error";
const PROTOCOL_ERROR_CODE: &str = "protocol_error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    Completed,
    Canceled,
    Failed,
}

struct PendingToolUse {
    call_id: String,
    name: String,
    input: serde_json::Value,
    partial_json: String,
}

/// Feeds one model stream into the response of `turn_id` until the model
/// stops, the transport fails, or `cancel` fires.
///
/// Tool calls are appended with a gate already resolved when `policy`
/// auto-approves them; everything else waits for the host. Events the
/// response rejects, such as a repeated tool call id, fail the response with
/// code `protocol_error`.
pub async fn pump_response<S, P>(
    session: &mut Session,
    turn_id: &TurnId,
    mut stream: S,
    policy: &P,
    cancel: &CancellationToken,
) -> SessionResult<PumpOutcome>
where
    S: Stream<Item = anyhow::Result<Bytes>> + Unpin,
    P: ApprovalPolicy + ?Sized,
{
    let scope = session.id().to_string();
    {
        let response = session.response_mut(turn_id)?;
        if response.is_canceled() {
            return Ok(PumpOutcome::Canceled);
        }
        if response.is_complete() {
            return Err(SessionError::invalid_state(format!(
                "response for turn {turn_id} is already {:?}",
                response.state()
            )));
        }
    }

    let mut parser = StreamParser::new();
    let mut tool_uses: HashMap<usize, PendingToolUse> = HashMap::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                session.response_mut(turn_id)?.cancel();
                emit_session_event(&scope, "pump_canceled", &format!("turn={turn_id}"));
                return Ok(PumpOutcome::Canceled);
            }
            chunk = stream.next() => chunk,
        };

        let response = session.response_mut(turn_id)?;
        match next {
            None => {
                response.fail(
                    ErrorDetails::new("model stream ended before message_stop")
                        .with_code(INCOMPLETE_STREAM_CODE),
                );
                return Ok(PumpOutcome::Failed);
            }
            Some(Err(err)) => {
                emit_session_event(&scope, "pump_transport_error", &format!("error={err}"));
                response.fail(ErrorDetails::new(err.to_string()).with_code(TRANSPORT_ERROR_CODE));
                return Ok(PumpOutcome::Failed);
            }
            Some(Ok(chunk)) => {
                for event in parser.process(&chunk) {
                    let outcome = match apply_event(response, event, &mut tool_uses, policy) {
                        Ok(Some(outcome)) => outcome,
                        Ok(None) => continue,
                        Err(err) => {
                            emit_session_event(
                                &scope,
                                "pump_protocol_error",
                                &format!("turn={turn_id} error={err}"),
                            );
                            response.fail(
                                ErrorDetails::new(err.to_string()).with_code(PROTOCOL_ERROR_CODE),
                            );
                            PumpOutcome::Failed
                        }
                    };
                    emit_session_event(
                        &scope,
                        "pump_finished",
                        &format!("turn={turn_id} outcome={outcome:?}"),
                    );
                    return Ok(outcome);
                }
            }
        }
    }
}

fn apply_event<P>(
    response: &mut Response,
    event: StreamEvent,
    tool_uses: &mut HashMap<usize, PendingToolUse>,
    policy: &P,
) -> SessionResult<Option<PumpOutcome>>
where
    P: ApprovalPolicy + ?Sized,
{
    match event {
        StreamEvent::ContentBlockStart {
            content_block: ContentBlock::Text { text },
            ..
        } => {
            response.append_part(ResponsePart::markdown(text))?;
        }
        StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlock::ToolUse { id, name, input },
        } => {
            tool_uses.insert(
                index,
                PendingToolUse {
                    call_id: id,
                    name,
                    input,
                    partial_json: String::new(),
                },
            );
        }
        StreamEvent::ContentBlockDelta { index, delta } => {
            if let Some(text) = delta.text {
                response.append_part(ResponsePart::markdown(text))?;
            }
            if let (Some(partial), Some(tool_use)) = (delta.partial_json, tool_uses.get_mut(&index))
            {
                tool_use.partial_json.push_str(&partial);
            }
        }
        StreamEvent::ContentBlockStop { index } => {
            if let Some(tool_use) = tool_uses.remove(&index) {
                response.append_part(ResponsePart::ToolInvocation(gated_invocation(
                    tool_use, policy,
                )))?;
            }
        }
        StreamEvent::MessageStop => {
            response.mark_complete();
            return Ok(Some(PumpOutcome::Completed));
        }
        StreamEvent::Error { error } => {
            response.fail(ErrorDetails::new(error.message).with_code(error.error_type));
            return Ok(Some(PumpOutcome::Failed));
        }
        StreamEvent::ContentBlockStart { .. }
        | StreamEvent::MessageStart { .. }
        | StreamEvent::MessageDelta { .. }
        | StreamEvent::Unknown => {}
    }
    Ok(None)
}

fn gated_invocation<P>(tool_use: PendingToolUse, policy: &P) -> ToolInvocation
where
    P: ApprovalPolicy + ?Sized,
{
    let input = if tool_use.partial_json.trim().is_empty() {
        tool_use.input
    } else {
        serde_json::from_str(&tool_use.partial_json)
            .unwrap_or(serde_json::Value::String(tool_use.partial_json))
    };
    let gate = policy
        .pre_approval(&tool_use.name, &input)
        .map(ToolInvocationGate::pre_approved)
        .unwrap_or_default();
    ToolInvocation::new(tool_use.call_id, tool_use.name, input).with_gate(gate)
}
