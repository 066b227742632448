use super::super::events::{EventBus, Subscription};
use super::super::response::Response;
use super::super::tool_gate::{ConfirmReason, GateOutcome};
use super::turn_log::TurnLog;
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::logging::emit_session_event;
use crate::types::{SessionId, TurnId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Context the user attached to a request (a file, a selection, a symbol).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: serde_json::Value,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub message: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
    pub timestamp: DateTime<Utc>,
    /// Number of times this request was regenerated.
    #[serde(default)]
    pub attempt: u32,
}

/// One request and the response it produced, if any.
#[derive(Debug)]
pub struct Turn {
    pub(super) id: TurnId,
    pub(super) request: Request,
    pub(super) response: Option<Response>,
    pub(super) hidden: bool,
    pub(super) blocked: bool,
}

impl Turn {
    pub fn id(&self) -> &TurnId {
        &self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Waiting to be replaced by the next request; excluded from `turns()`.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// At or after the active checkpoint.
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub(super) fn is_streaming(&self) -> bool {
        self.response
            .as_ref()
            .is_some_and(|response| !response.is_complete())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    Removal,
    Edit,
    Regenerate,
    CheckpointRestore,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    TurnAdded {
        turn_id: TurnId,
    },
    ResponseAttached {
        turn_id: TurnId,
    },
    TurnsRemoved {
        turn_ids: Vec<TurnId>,
        reason: RemovalReason,
    },
    HiddenChanged {
        hidden: Vec<TurnId>,
    },
    CheckpointChanged {
        checkpoint: Option<TurnId>,
        blocked: Vec<TurnId>,
    },
    EditingChanged {
        turn_id: Option<TurnId>,
    },
    Closed,
}

/// A chat session: the turn log plus its edit and checkpoint cursors.
///
/// A session has a single owner; nothing here locks.
#[derive(Debug)]
pub struct Session {
    pub(super) id: SessionId,
    pub(super) config: SessionConfig,
    pub(super) log: TurnLog,
    pub(super) editing: Option<TurnId>,
    pub(super) checkpoint: Option<TurnId>,
    pub(super) created_at: DateTime<Utc>,
    pub(super) closed: bool,
    pub(super) events: EventBus<SessionEvent>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_id(SessionId::new(), config)
    }

    pub fn with_id(id: SessionId, config: SessionConfig) -> Self {
        emit_session_event(id.as_str(), "session_created", "");
        Self {
            id,
            config,
            log: TurnLog::default(),
            editing: None,
            checkpoint: None,
            created_at: Utc::now(),
            closed: false,
            events: EventBus::default(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn subscribe(&mut self) -> Subscription<SessionEvent> {
        self.events.subscribe()
    }

    pub fn turn(&self, turn_id: &TurnId) -> SessionResult<&Turn> {
        self.log
            .get(turn_id)
            .ok_or_else(|| SessionError::not_found("turn", turn_id))
    }

    pub fn response(&self, turn_id: &TurnId) -> SessionResult<&Response> {
        self.turn(turn_id)?
            .response
            .as_ref()
            .ok_or_else(|| SessionError::not_found("response", turn_id))
    }

    /// Mutation surface handed to the model backend and the host's tool flow.
    pub fn response_mut(&mut self, turn_id: &TurnId) -> SessionResult<&mut Response> {
        self.log
            .get_mut(turn_id)
            .ok_or_else(|| SessionError::not_found("turn", turn_id))?
            .response
            .as_mut()
            .ok_or_else(|| SessionError::not_found("response", turn_id))
    }

    /// Tool calls waiting for a decision, oldest turn first.
    pub fn pending_confirmations(&self) -> Vec<(TurnId, String)> {
        self.log
            .iter()
            .filter_map(|turn| turn.response.as_ref().map(|response| (turn, response)))
            .flat_map(|(turn, response)| {
                response
                    .tool_invocations()
                    .filter(|invocation| invocation.gate().is_pending())
                    .map(move |invocation| (turn.id.clone(), invocation.call_id.clone()))
            })
            .collect()
    }

    /// Resolves the first waiting tool call; later ones are left alone.
    pub fn confirm_first_pending(
        &mut self,
        reason: ConfirmReason,
    ) -> SessionResult<Option<(TurnId, String, GateOutcome)>> {
        let Some((turn_id, call_id)) = self.pending_confirmations().into_iter().next() else {
            return Ok(None);
        };
        let outcome = self.response_mut(&turn_id)?.confirm_tool(&call_id, reason)?;
        Ok(Some((turn_id, call_id, outcome)))
    }

    /// Cancels every streaming response and denies every waiting tool call.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        let mut denied = 0;
        for turn in self.log.iter_mut() {
            if let Some(response) = turn.response.as_mut() {
                denied += response.deny_pending_tools();
                response.cancel();
            }
        }
        self.closed = true;
        emit_session_event(
            self.id.as_str(),
            "session_closed",
            &format!("turns={} denied_tools={denied}", self.log.len()),
        );
        self.events.publish(SessionEvent::Closed);
    }

    pub(super) fn ensure_open(&self, operation: &str) -> SessionResult<()> {
        if self.closed {
            return Err(SessionError::invalid_state(format!(
                "cannot {operation}: session {} is closed",
                self.id
            )));
        }
        Ok(())
    }
}
