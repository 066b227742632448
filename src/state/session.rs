mod checkpoint;
mod snapshot;
mod state;
mod turn_log;

#[cfg(test)]
mod tests;

pub use snapshot::{SessionSnapshot, TurnSnapshot};
pub use state::{RemovalReason, Request, Session, SessionEvent, Turn, Variable};
