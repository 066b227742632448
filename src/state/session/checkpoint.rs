use super::state::{RemovalReason, Session, SessionEvent, Turn};
use crate::error::{SessionError, SessionResult};
use crate::logging::emit_session_event;
use crate::types::TurnId;

impl Session {
    /// Moves the checkpoint to `turn_id`, blocking it and every later turn.
    /// `None` clears the checkpoint. Unknown ids leave everything unchanged.
    pub fn set_checkpoint(&mut self, turn_id: Option<&TurnId>) {
        let index = match turn_id {
            Some(turn_id) => match self.log.position(turn_id) {
                Some(index) => Some(index),
                None => return,
            },
            None => None,
        };

        let mut blocked = Vec::new();
        for (i, turn) in self.log.iter_mut().enumerate() {
            turn.blocked = index.is_some_and(|checkpoint| i >= checkpoint);
            if turn.blocked {
                blocked.push(turn.id.clone());
            }
        }
        self.checkpoint = turn_id.cloned();

        emit_session_event(
            self.id.as_str(),
            "checkpoint_set",
            &format!(
                "turn={} blocked={}",
                self.checkpoint
                    .as_ref()
                    .map_or("<none>", |turn_id| turn_id.as_str()),
                blocked.len()
            ),
        );
        self.events.publish(SessionEvent::CheckpointChanged {
            checkpoint: self.checkpoint.clone(),
            blocked,
        });
    }

    pub fn checkpoint(&self) -> Option<&TurnId> {
        self.checkpoint.as_ref()
    }

    /// Unblocks every turn but keeps the checkpoint cursor.
    pub fn reset_checkpoint(&mut self) {
        for turn in self.log.iter_mut() {
            turn.blocked = false;
        }
        self.events.publish(SessionEvent::CheckpointChanged {
            checkpoint: self.checkpoint.clone(),
            blocked: Vec::new(),
        });
    }

    /// Rolls the conversation back to the checkpoint: the checkpoint turn and
    /// everything after it are removed.
    pub fn restore_checkpoint(&mut self) -> SessionResult<Vec<Turn>> {
        let checkpoint = self
            .checkpoint
            .clone()
            .ok_or_else(|| SessionError::invalid_state("no checkpoint is set"))?;
        let index = self
            .log
            .position(&checkpoint)
            .ok_or_else(|| SessionError::not_found("turn", &checkpoint))?;
        Ok(self.truncate_at(index, RemovalReason::CheckpointRestore))
    }
}
