use crate::error::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};

/// Why a gate was resolved the way it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfirmReason {
    Denied,
    ConfirmationNotNeeded,
    /// Auto-approved by a setting, e.g. a global or per-tool allow list.
    Setting { id: String },
    /// Approved through a per-tool "always allow" choice.
    PerToolApproval,
    UserAction,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    WaitingForConfirmation,
    Confirmed,
    Skipped,
    Executing,
    WaitingForPostApproval,
    PostConfirmed,
    PostSkipped,
    /// Executed and no post-execution approval was required.
    Completed,
    Denied,
    Errored,
}

impl GateState {
    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            GateState::WaitingForConfirmation | GateState::WaitingForPostApproval
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GateState::Skipped
                | GateState::PostConfirmed
                | GateState::PostSkipped
                | GateState::Completed
                | GateState::Denied
                | GateState::Errored
        )
    }

    /// States reached through `confirm`; confirming again is a no-op.
    fn is_confirmation_result(self) -> bool {
        matches!(
            self,
            GateState::Confirmed
                | GateState::Skipped
                | GateState::PostConfirmed
                | GateState::PostSkipped
                | GateState::Denied
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Transitioned(GateState),
    AlreadyResolved,
}

/// Confirmation checkpoint in front of (and optionally behind) one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocationGate {
    state: GateState,
    reason: Option<ConfirmReason>,
    post_reason: Option<ConfirmReason>,
    error: Option<String>,
}

impl Default for ToolInvocationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolInvocationGate {
    pub fn new() -> Self {
        Self {
            state: GateState::WaitingForConfirmation,
            reason: None,
            post_reason: None,
            error: None,
        }
    }

    /// A gate an approval policy resolved before anyone was asked.
    pub fn pre_approved(reason: ConfirmReason) -> Self {
        let mut gate = Self::new();
        // A fresh gate is always waiting, so this cannot fail.
        let _ = gate.confirm(reason);
        gate
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state.is_waiting()
    }

    /// Reason recorded by the most recent confirmation, `None` while nothing
    /// has been decided yet.
    pub fn pending_reason(&self) -> Option<&ConfirmReason> {
        self.post_reason.as_ref().or(self.reason.as_ref())
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn confirm(&mut self, reason: ConfirmReason) -> SessionResult<GateOutcome> {
        let next = match (self.state, &reason) {
            (GateState::WaitingForConfirmation, ConfirmReason::Denied) => GateState::Denied,
            (GateState::WaitingForConfirmation, ConfirmReason::Skipped) => GateState::Skipped,
            (GateState::WaitingForConfirmation, _) => GateState::Confirmed,
            (GateState::WaitingForPostApproval, ConfirmReason::Denied) => GateState::Denied,
            (GateState::WaitingForPostApproval, ConfirmReason::Skipped) => GateState::PostSkipped,
            (GateState::WaitingForPostApproval, _) => GateState::PostConfirmed,
            (state, _) if state.is_confirmation_result() => {
                return Ok(GateOutcome::AlreadyResolved)
            }
            (state, _) => {
                return Err(SessionError::invalid_state(format!(
                    "cannot confirm a tool call in state {state:?}"
                )))
            }
        };

        if self.state == GateState::WaitingForPostApproval {
            self.post_reason = Some(reason);
        } else {
            self.reason = Some(reason);
        }
        self.state = next;
        Ok(GateOutcome::Transitioned(next))
    }

    pub fn begin_execution(&mut self) -> SessionResult<GateOutcome> {
        match self.state {
            GateState::Confirmed => {
                self.state = GateState::Executing;
                Ok(GateOutcome::Transitioned(GateState::Executing))
            }
            state => Err(SessionError::invalid_state(format!(
                "cannot execute a tool call in state {state:?}"
            ))),
        }
    }

    pub fn finish_execution(&mut self, needs_post_approval: bool) -> SessionResult<GateOutcome> {
        if self.state != GateState::Executing {
            return Err(SessionError::invalid_state(format!(
                "cannot finish a tool call in state {:?}",
                self.state
            )));
        }
        let next = if needs_post_approval {
            GateState::WaitingForPostApproval
        } else {
            GateState::Completed
        };
        self.state = next;
        Ok(GateOutcome::Transitioned(next))
    }

    pub fn fail_execution(&mut self, message: impl Into<String>) -> SessionResult<GateOutcome> {
        match self.state {
            GateState::Confirmed | GateState::Executing => {
                self.state = GateState::Errored;
                self.error = Some(message.into());
                Ok(GateOutcome::Transitioned(GateState::Errored))
            }
            state => Err(SessionError::invalid_state(format!(
                "cannot fail a tool call in state {state:?}"
            ))),
        }
    }

    /// Host veto. Terminal gates are left untouched.
    pub fn deny(&mut self) -> GateOutcome {
        if self.state.is_terminal() {
            return GateOutcome::AlreadyResolved;
        }
        if self.state == GateState::WaitingForPostApproval {
            self.post_reason = Some(ConfirmReason::Denied);
        } else if self.reason.is_none() {
            self.reason = Some(ConfirmReason::Denied);
        }
        self.state = GateState::Denied;
        GateOutcome::Transitioned(GateState::Denied)
    }
}

/// Output of an executed tool, attached once the gate leaves `Executing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: String,
    #[serde(default)]
    pub is_error: bool,
}

/// A tool call emitted by the model, with its gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool_id: String,
    pub input: serde_json::Value,
    pub invocation_message: String,
    #[serde(default)]
    pub past_tense_message: Option<String>,
    gate: ToolInvocationGate,
    #[serde(default)]
    result: Option<ToolResult>,
}

impl ToolInvocation {
    pub fn new(
        call_id: impl Into<String>,
        tool_id: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        let tool_id = tool_id.into();
        Self {
            call_id: call_id.into(),
            invocation_message: format!("Running {tool_id}"),
            tool_id,
            input,
            past_tense_message: None,
            gate: ToolInvocationGate::new(),
            result: None,
        }
    }

    pub fn with_gate(mut self, gate: ToolInvocationGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_messages(
        mut self,
        invocation_message: impl Into<String>,
        past_tense_message: Option<String>,
    ) -> Self {
        self.invocation_message = invocation_message.into();
        self.past_tense_message = past_tense_message;
        self
    }

    pub fn gate(&self) -> &ToolInvocationGate {
        &self.gate
    }

    pub(crate) fn gate_mut(&mut self) -> &mut ToolInvocationGate {
        &mut self.gate
    }

    pub fn state(&self) -> GateState {
        self.gate.state()
    }

    pub fn result(&self) -> Option<&ToolResult> {
        self.result.as_ref()
    }

    pub(crate) fn set_result(&mut self, result: ToolResult) {
        self.result = Some(result);
    }

    /// Copy text for this call: the message and, once finished, its input.
    pub fn to_repr(&self) -> String {
        let mut text = self
            .past_tense_message
            .clone()
            .filter(|_| self.state().is_terminal())
            .unwrap_or_else(|| self.invocation_message.clone());
        if matches!(
            self.state(),
            GateState::Completed | GateState::PostConfirmed | GateState::PostSkipped
        ) {
            let input = serde_json::to_string(&self.input).unwrap_or_default();
            text.push_str(&format!("\nCompleted with input: {input}"));
        } else if self.state() == GateState::Errored {
            let input = serde_json::to_string(&self.input).unwrap_or_default();
            text.push_str(&format!("\nErrored with input: {input}"));
        }
        text
    }
}
