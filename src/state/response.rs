use super::events::{EventBus, Subscription};
use super::response_part::ResponsePart;
use super::tool_gate::{ConfirmReason, GateOutcome, GateState, ToolInvocation, ToolResult};
use crate::error::{SessionError, SessionResult};
use crate::logging::{emit_rejected_operation, emit_session_event};
use crate::types::ResponseId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseState {
    Streaming,
    Complete,
    Canceled,
    Errored,
}

impl ResponseState {
    pub fn is_terminal(self) -> bool {
        self != ResponseState::Streaming
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    /// The backend retracted the response; streamed content must not stay visible.
    #[serde(default)]
    pub response_is_redacted: bool,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            response_is_redacted: false,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn redacted(mut self) -> Self {
        self.response_is_redacted = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    PartAppended { index: usize },
    /// Markdown coalesced into the existing part at `index`.
    PartExtended { index: usize, delta: String },
    StateChanged(ResponseState),
    ToolStateChanged { call_id: String, state: GateState },
    ToolErrored { call_id: String, message: String },
    VoteChanged,
}

/// One reply, built incrementally by the model backend.
#[derive(Debug)]
pub struct Response {
    id: ResponseId,
    parts: Vec<ResponsePart>,
    state: ResponseState,
    error_details: Option<ErrorDetails>,
    vote: Option<Vote>,
    vote_down_reason: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    events: EventBus<ResponseEvent>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            id: ResponseId::new(),
            parts: Vec::new(),
            state: ResponseState::Streaming,
            error_details: None,
            vote: None,
            vote_down_reason: None,
            created_at: Utc::now(),
            completed_at: None,
            events: EventBus::default(),
        }
    }

    pub fn id(&self) -> &ResponseId {
        &self.id
    }

    pub fn parts(&self) -> &[ResponsePart] {
        &self.parts
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_canceled(&self) -> bool {
        self.state == ResponseState::Canceled
    }

    pub fn error_details(&self) -> Option<&ErrorDetails> {
        self.error_details.as_ref()
    }

    pub fn vote(&self) -> Option<Vote> {
        self.vote
    }

    pub fn vote_down_reason(&self) -> Option<&str> {
        self.vote_down_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn subscribe(&mut self) -> Subscription<ResponseEvent> {
        self.events.subscribe()
    }

    /// Records a streamed part and returns its index.
    ///
    /// Parts arriving after `cancel()` are dropped with `Ok(None)`; parts
    /// arriving after completion or failure are rejected.
    pub fn append_part(&mut self, part: ResponsePart) -> SessionResult<Option<usize>> {
        match self.state {
            ResponseState::Streaming => {}
            ResponseState::Canceled => return Ok(None),
            state => {
                let reason = format!("response is {state:?}");
                emit_rejected_operation(self.id.as_str(), "append_part", &reason);
                return Err(SessionError::invalid_state(format!(
                    "cannot append to a response that is {state:?}"
                )));
            }
        }

        if let ResponsePart::ToolInvocation(invocation) = &part {
            if self.tool_invocation(&invocation.call_id).is_some() {
                return Err(SessionError::invalid_state(format!(
                    "tool call {} already belongs to this response",
                    invocation.call_id
                )));
            }
        }

        if let ResponsePart::Markdown { content } = &part {
            if content.is_empty() {
                return Ok(None);
            }
            let last_index = self.parts.len().checked_sub(1);
            if let Some(ResponsePart::Markdown { content: existing }) = self.parts.last_mut() {
                existing.push_str(content);
                let index = last_index.unwrap_or_default();
                self.events.publish(ResponseEvent::PartExtended {
                    index,
                    delta: content.clone(),
                });
                return Ok(Some(index));
            }
        }

        let index = self.parts.len();
        self.parts.push(part);
        self.events.publish(ResponseEvent::PartAppended { index });
        Ok(Some(index))
    }

    /// Returns whether the response transitioned.
    pub fn mark_complete(&mut self) -> bool {
        self.finish(ResponseState::Complete)
    }

    /// Cancels streaming and denies every tool call still waiting for approval.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.deny_pending_tools();
        self.finish(ResponseState::Canceled)
    }

    /// Terminal failure. Content already streamed stays visible unless the
    /// error marks the response as redacted.
    pub fn fail(&mut self, error: ErrorDetails) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if error.response_is_redacted {
            self.parts.clear();
        }
        self.error_details = Some(error);
        self.finish(ResponseState::Errored)
    }

    fn finish(&mut self, state: ResponseState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = state;
        self.completed_at = Some(Utc::now());
        emit_session_event(
            self.id.as_str(),
            "response_finished",
            &format!("state={state:?} parts={}", self.parts.len()),
        );
        self.events.publish(ResponseEvent::StateChanged(state));
        true
    }

    pub fn set_vote(&mut self, vote: Vote) {
        self.vote = Some(vote);
        if vote == Vote::Up {
            self.vote_down_reason = None;
        }
        self.events.publish(ResponseEvent::VoteChanged);
    }

    pub fn clear_vote(&mut self) {
        self.vote = None;
        self.vote_down_reason = None;
        self.events.publish(ResponseEvent::VoteChanged);
    }

    pub fn set_vote_down_reason(&mut self, reason: Option<String>) {
        self.vote_down_reason = reason;
        self.events.publish(ResponseEvent::VoteChanged);
    }

    /// Markdown content concatenated in arrival order.
    pub fn to_plain_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(ResponsePart::as_markdown)
            .collect()
    }

    /// Copy text: markdown runs and one block per tool call, separated by
    /// blank lines.
    pub fn to_repr(&self) -> String {
        let mut blocks = Vec::new();
        let mut current = String::new();
        for part in &self.parts {
            match part {
                ResponsePart::Markdown { content } => current.push_str(content),
                ResponsePart::ToolInvocation(invocation) => {
                    if !current.is_empty() {
                        blocks.push(std::mem::take(&mut current));
                    }
                    blocks.push(invocation.to_repr());
                }
                ResponsePart::Progress { .. } | ResponsePart::CodeCitation { .. } => {}
            }
        }
        if !current.is_empty() {
            blocks.push(current);
        }
        blocks.join("\n\n")
    }

    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(ResponsePart::as_tool_invocation)
    }

    pub fn tool_invocation(&self, call_id: &str) -> Option<&ToolInvocation> {
        self.tool_invocations()
            .find(|invocation| invocation.call_id == call_id)
    }

    pub fn has_pending_confirmation(&self) -> bool {
        self.tool_invocations()
            .any(|invocation| invocation.gate().is_pending())
    }

    pub fn confirm_tool(
        &mut self,
        call_id: &str,
        reason: ConfirmReason,
    ) -> SessionResult<GateOutcome> {
        let outcome = self.tool_invocation_mut(call_id)?.gate_mut().confirm(reason);
        self.publish_tool_outcome(call_id, &outcome);
        outcome
    }

    pub fn begin_tool_execution(&mut self, call_id: &str) -> SessionResult<GateOutcome> {
        let outcome = self.tool_invocation_mut(call_id)?.gate_mut().begin_execution();
        self.publish_tool_outcome(call_id, &outcome);
        outcome
    }

    pub fn complete_tool_execution(
        &mut self,
        call_id: &str,
        result: ToolResult,
        needs_post_approval: bool,
    ) -> SessionResult<GateOutcome> {
        let invocation = self.tool_invocation_mut(call_id)?;
        let outcome = invocation.gate_mut().finish_execution(needs_post_approval);
        if outcome.is_ok() {
            invocation.set_result(result);
        }
        self.publish_tool_outcome(call_id, &outcome);
        outcome
    }

    /// The tool's backing operation failed after it was confirmed.
    pub fn fail_tool_execution(
        &mut self,
        call_id: &str,
        message: impl Into<String>,
    ) -> SessionResult<GateOutcome> {
        let message = message.into();
        let invocation = self.tool_invocation_mut(call_id)?;
        let outcome = invocation.gate_mut().fail_execution(message.clone());
        if outcome.is_ok() {
            invocation.set_result(ToolResult {
                output: message.clone(),
                is_error: true,
            });
        }
        self.publish_tool_outcome(call_id, &outcome);
        if outcome.is_ok() {
            self.events.publish(ResponseEvent::ToolErrored {
                call_id: call_id.to_string(),
                message,
            });
        }
        outcome
    }

    pub fn deny_tool(&mut self, call_id: &str) -> SessionResult<GateOutcome> {
        let outcome = Ok(self.tool_invocation_mut(call_id)?.gate_mut().deny());
        self.publish_tool_outcome(call_id, &outcome);
        outcome
    }

    pub(crate) fn deny_pending_tools(&mut self) -> usize {
        let pending: Vec<String> = self
            .tool_invocations()
            .filter(|invocation| invocation.gate().is_pending())
            .map(|invocation| invocation.call_id.clone())
            .collect();
        for call_id in &pending {
            // Ids were just collected from this response.
            let _ = self.deny_tool(call_id);
        }
        pending.len()
    }

    fn tool_invocation_mut(&mut self, call_id: &str) -> SessionResult<&mut ToolInvocation> {
        self.parts
            .iter_mut()
            .find_map(|part| match part {
                ResponsePart::ToolInvocation(invocation) if invocation.call_id == call_id => {
                    Some(invocation)
                }
                _ => None,
            })
            .ok_or_else(|| SessionError::not_found("tool invocation", call_id))
    }

    fn publish_tool_outcome(&mut self, call_id: &str, outcome: &SessionResult<GateOutcome>) {
        match outcome {
            Ok(GateOutcome::Transitioned(state)) => {
                emit_session_event(
                    self.id.as_str(),
                    "tool_gate",
                    &format!("call={call_id} state={state:?}"),
                );
                self.events.publish(ResponseEvent::ToolStateChanged {
                    call_id: call_id.to_string(),
                    state: *state,
                });
            }
            Ok(GateOutcome::AlreadyResolved) => {}
            Err(err) => {
                emit_rejected_operation(self.id.as_str(), "tool_gate", &err.to_string());
            }
        }
    }

    pub fn snapshot(&self) -> ResponseSnapshot {
        ResponseSnapshot {
            id: self.id.clone(),
            parts: self.parts.clone(),
            state: self.state,
            error_details: self.error_details.clone(),
            vote: self.vote,
            vote_down_reason: self.vote_down_reason.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }

    /// Rebuilds a response from an export. A response that was still streaming
    /// is restored as canceled and its waiting tool calls as denied.
    pub fn restore(snapshot: ResponseSnapshot) -> Self {
        let mut response = Self {
            id: snapshot.id,
            parts: snapshot.parts,
            state: snapshot.state,
            error_details: snapshot.error_details,
            vote: snapshot.vote,
            vote_down_reason: snapshot.vote_down_reason,
            created_at: snapshot.created_at,
            completed_at: snapshot.completed_at,
            events: EventBus::default(),
        };
        if response.state == ResponseState::Streaming {
            response.cancel();
        } else {
            response.deny_pending_tools();
        }
        response
    }
}

/// Serializable export of a [`Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub id: ResponseId,
    pub parts: Vec<ResponsePart>,
    pub state: ResponseState,
    #[serde(default)]
    pub error_details: Option<ErrorDetails>,
    #[serde(default)]
    pub vote: Option<Vote>,
    #[serde(default)]
    pub vote_down_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}
