use super::super::response::{Response, ResponseState};
use super::state::{RemovalReason, Request, Session, SessionEvent, Turn, Variable};
use crate::error::{SessionError, SessionResult};
use crate::logging::{emit_rejected_operation, emit_session_event};
use crate::types::TurnId;
use chrono::Utc;

/// Ordered turns of one session. Removal always truncates.
#[derive(Debug, Default)]
pub(super) struct TurnLog {
    turns: Vec<Turn>,
}

impl TurnLog {
    pub(super) fn position(&self, turn_id: &TurnId) -> Option<usize> {
        self.turns.iter().position(|turn| &turn.id == turn_id)
    }

    pub(super) fn get(&self, turn_id: &TurnId) -> Option<&Turn> {
        self.turns.iter().find(|turn| &turn.id == turn_id)
    }

    pub(super) fn get_mut(&mut self, turn_id: &TurnId) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|turn| &turn.id == turn_id)
    }

    pub(super) fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    pub(super) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Turn> {
        self.turns.iter_mut()
    }

    pub(super) fn len(&self) -> usize {
        self.turns.len()
    }

    pub(super) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub(super) fn truncate_from(&mut self, index: usize) -> Vec<Turn> {
        self.turns.split_off(index.min(self.turns.len()))
    }

    pub(super) fn drain_hidden(&mut self) -> Vec<Turn> {
        let (hidden, kept): (Vec<Turn>, Vec<Turn>) =
            std::mem::take(&mut self.turns)
                .into_iter()
                .partition(|turn| turn.hidden);
        self.turns = kept;
        hidden
    }
}

impl Session {
    /// Appends a turn for `text`. No response is attached yet.
    pub fn add_request(
        &mut self,
        text: impl Into<String>,
        variables: Vec<Variable>,
    ) -> SessionResult<TurnId> {
        self.push_request(text.into(), variables, 0)
    }

    /// `add_request` plus a fresh streaming response.
    pub fn submit(
        &mut self,
        text: impl Into<String>,
        variables: Vec<Variable>,
    ) -> SessionResult<TurnId> {
        let turn_id = self.add_request(text, variables)?;
        self.attach_response(&turn_id, Response::new())?;
        Ok(turn_id)
    }

    /// Attaches the turn's only response. A streaming response is rejected
    /// while another turn still streams, unless concurrent turns are allowed.
    pub fn attach_response(&mut self, turn_id: &TurnId, response: Response) -> SessionResult<()> {
        self.ensure_open("attach a response")?;
        let attached = self
            .log
            .get(turn_id)
            .ok_or_else(|| SessionError::not_found("turn", turn_id))?
            .response
            .is_some();
        if attached {
            return Err(SessionError::DuplicateResponse(turn_id.to_string()));
        }
        if response.state() == ResponseState::Streaming && !self.config.allow_concurrent_turns {
            if let Some(busy) = self
                .log
                .iter()
                .find(|turn| &turn.id != turn_id && turn.is_streaming())
            {
                let reason = format!("turn {} is still streaming", busy.id);
                emit_rejected_operation(self.id.as_str(), "attach_response", &reason);
                return Err(SessionError::invalid_state(format!(
                    "cannot attach a streaming response while {reason}"
                )));
            }
        }
        let turn = self
            .log
            .get_mut(turn_id)
            .ok_or_else(|| SessionError::not_found("turn", turn_id))?;
        turn.response = Some(response);
        self.events.publish(SessionEvent::ResponseAttached {
            turn_id: turn_id.clone(),
        });
        Ok(())
    }

    /// Removes `turn_id` and every later turn.
    pub fn remove_turn(&mut self, turn_id: &TurnId) -> SessionResult<Vec<Turn>> {
        let index = self
            .log
            .position(turn_id)
            .ok_or_else(|| SessionError::not_found("turn", turn_id))?;
        Ok(self.truncate_at(index, RemovalReason::Removal))
    }

    /// Drops `turn_id` and everything after it, then resubmits `new_text`
    /// with the original attachments.
    pub fn edit_request(
        &mut self,
        turn_id: &TurnId,
        new_text: impl Into<String>,
    ) -> SessionResult<TurnId> {
        self.ensure_open("edit a request")?;
        let index = self
            .log
            .position(turn_id)
            .ok_or_else(|| SessionError::not_found("turn", turn_id))?;
        self.ensure_can_add(index)?;
        let variables = self
            .truncate_at(index, RemovalReason::Edit)
            .into_iter()
            .next()
            .map(|turn| turn.request.variables)
            .unwrap_or_default();
        if self.editing.take().is_some() {
            self.events
                .publish(SessionEvent::EditingChanged { turn_id: None });
        }
        self.push_request(new_text.into(), variables, 0)
    }

    /// Drops `turn_id` and everything after it, then resubmits the same
    /// request as a new attempt.
    pub fn regenerate(&mut self, turn_id: &TurnId) -> SessionResult<TurnId> {
        self.ensure_open("regenerate a request")?;
        let index = self
            .log
            .position(turn_id)
            .ok_or_else(|| SessionError::not_found("turn", turn_id))?;
        self.ensure_can_add(index)?;
        let request = self
            .truncate_at(index, RemovalReason::Regenerate)
            .into_iter()
            .next()
            .map(|turn| turn.request)
            .ok_or_else(|| SessionError::not_found("turn", turn_id))?;
        self.push_request(request.message, request.variables, request.attempt + 1)
    }

    /// Turns in insertion order, without hidden ones.
    pub fn turns(&self) -> Vec<&Turn> {
        self.log.iter().filter(|turn| !turn.hidden).collect()
    }

    /// Every turn, hidden ones included.
    pub fn all_turns(&self) -> Vec<&Turn> {
        self.log.iter().collect()
    }

    /// Marks exactly `turn_ids` as hidden. They are dropped on the next send.
    pub fn set_hidden(&mut self, turn_ids: &[TurnId]) -> SessionResult<()> {
        if let Some(missing) = turn_ids.iter().find(|id| self.log.get(id).is_none()) {
            return Err(SessionError::not_found("turn", missing));
        }
        for turn in self.log.iter_mut() {
            turn.hidden = turn_ids.contains(&turn.id);
        }
        self.events.publish(SessionEvent::HiddenChanged {
            hidden: turn_ids.to_vec(),
        });
        Ok(())
    }

    /// Cancels the turn's response. Returns whether it was still streaming.
    pub fn cancel_turn(&mut self, turn_id: &TurnId) -> SessionResult<bool> {
        Ok(self.response_mut(turn_id)?.cancel())
    }

    pub fn begin_edit(&mut self, turn_id: &TurnId) -> SessionResult<()> {
        if self.log.get(turn_id).is_none() {
            return Err(SessionError::not_found("turn", turn_id));
        }
        self.editing = Some(turn_id.clone());
        self.events.publish(SessionEvent::EditingChanged {
            turn_id: Some(turn_id.clone()),
        });
        Ok(())
    }

    pub fn cancel_edit(&mut self) {
        if self.editing.take().is_some() {
            self.events
                .publish(SessionEvent::EditingChanged { turn_id: None });
        }
    }

    /// Turn currently being edited by the host, if any.
    pub fn editing(&self) -> Option<&TurnId> {
        self.editing.as_ref()
    }

    fn push_request(
        &mut self,
        message: String,
        variables: Vec<Variable>,
        attempt: u32,
    ) -> SessionResult<TurnId> {
        self.ensure_open("add a request")?;
        self.ensure_can_add(self.log.len())?;

        let replaced = self.log.drain_hidden();
        if !replaced.is_empty() {
            self.finish_removal(replaced, RemovalReason::Removal);
        }

        let turn_id = TurnId::new();
        self.log.push(Turn {
            id: turn_id.clone(),
            request: Request {
                message,
                variables,
                timestamp: Utc::now(),
                attempt,
            },
            response: None,
            hidden: false,
            blocked: false,
        });
        emit_session_event(
            self.id.as_str(),
            "turn_added",
            &format!("turn={turn_id} attempt={attempt}"),
        );
        self.events.publish(SessionEvent::TurnAdded {
            turn_id: turn_id.clone(),
        });
        Ok(turn_id)
    }

    /// Rejects a new request while one of the first `upto` turns is streaming,
    /// unless concurrent turns are allowed.
    fn ensure_can_add(&self, upto: usize) -> SessionResult<()> {
        if self.config.allow_concurrent_turns {
            return Ok(());
        }
        if let Some(busy) = self.log.iter().take(upto).find(|turn| turn.is_streaming()) {
            let reason = format!("turn {} is still streaming", busy.id);
            emit_rejected_operation(self.id.as_str(), "add_request", &reason);
            return Err(SessionError::invalid_state(format!(
                "cannot add a request while {reason}"
            )));
        }
        Ok(())
    }

    pub(super) fn truncate_at(&mut self, index: usize, reason: RemovalReason) -> Vec<Turn> {
        let removed = self.log.truncate_from(index);
        self.finish_removal(removed, reason)
    }

    fn finish_removal(&mut self, mut removed: Vec<Turn>, reason: RemovalReason) -> Vec<Turn> {
        for turn in removed.iter_mut() {
            if let Some(response) = turn.response.as_mut() {
                response.cancel();
            }
        }
        let turn_ids: Vec<TurnId> = removed.iter().map(|turn| turn.id.clone()).collect();

        if self
            .checkpoint
            .as_ref()
            .is_some_and(|checkpoint| turn_ids.contains(checkpoint))
        {
            self.checkpoint = None;
            for turn in self.log.iter_mut() {
                turn.blocked = false;
            }
            self.events.publish(SessionEvent::CheckpointChanged {
                checkpoint: None,
                blocked: Vec::new(),
            });
        }
        if self
            .editing
            .as_ref()
            .is_some_and(|editing| turn_ids.contains(editing))
        {
            self.editing = None;
            self.events
                .publish(SessionEvent::EditingChanged { turn_id: None });
        }

        emit_session_event(
            self.id.as_str(),
            "turns_removed",
            &format!("count={} reason={reason:?}", turn_ids.len()),
        );
        self.events
            .publish(SessionEvent::TurnsRemoved { turn_ids, reason });
        removed
    }
}
