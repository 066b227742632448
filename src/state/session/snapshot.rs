use super::super::events::EventBus;
use super::super::response::{Response, ResponseSnapshot};
use super::state::{Request, Session, Turn};
use super::turn_log::TurnLog;
use crate::config::SessionConfig;
use crate::types::{SessionId, TurnId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Serializable export of a [`Session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub turns: Vec<TurnSnapshot>,
    #[serde(default)]
    pub checkpoint: Option<TurnId>,
    #[serde(default)]
    pub editing: Option<TurnId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSnapshot {
    pub id: TurnId,
    pub request: Request,
    #[serde(default)]
    pub response: Option<ResponseSnapshot>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub blocked: bool,
}

impl Session {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            created_at: self.created_at,
            turns: self
                .log
                .iter()
                .map(|turn| TurnSnapshot {
                    id: turn.id.clone(),
                    request: turn.request.clone(),
                    response: turn.response.as_ref().map(Response::snapshot),
                    hidden: turn.hidden,
                    blocked: turn.blocked,
                })
                .collect(),
            checkpoint: self.checkpoint.clone(),
            editing: self.editing.clone(),
        }
    }

    /// Rebuilds a session from an export. Nothing is left streaming or waiting
    /// for confirmation; cursors pointing at missing turns are dropped.
    pub fn restore(snapshot: SessionSnapshot, config: SessionConfig) -> Self {
        let mut log = TurnLog::default();
        for turn in snapshot.turns {
            log.push(Turn {
                id: turn.id,
                request: turn.request,
                response: turn.response.map(Response::restore),
                hidden: turn.hidden,
                blocked: turn.blocked,
            });
        }
        let checkpoint_index = snapshot
            .checkpoint
            .as_ref()
            .and_then(|turn_id| log.position(turn_id));
        let checkpoint = snapshot.checkpoint.filter(|_| checkpoint_index.is_some());
        if checkpoint_index.is_none() {
            for turn in log.iter_mut() {
                turn.blocked = false;
            }
        }
        let editing = snapshot
            .editing
            .filter(|turn_id| log.position(turn_id).is_some());

        Self {
            id: snapshot.id,
            config,
            log,
            editing,
            checkpoint,
            created_at: snapshot.created_at,
            closed: false,
            events: EventBus::default(),
        }
    }
}
