mod api;
mod ids;

pub use api::{ContentBlock, Delta, MessageDelta, MessageStartData, StreamError, StreamEvent};
pub use ids::{ResponseId, SessionId, TurnId};
