mod approval;
mod events;
mod registry;
mod response;
mod response_part;
mod session;
mod tool_gate;

pub use approval::{
    record_tool_result, AlwaysAsk, ApprovalPolicy, ToolApprovalRules,
    GLOBAL_AUTO_APPROVE_SETTING, TOOL_AUTO_APPROVE_SETTING,
};
pub use events::{EventBus, Subscription};
pub use registry::SessionRegistry;
pub use response::{
    ErrorDetails, Response, ResponseEvent, ResponseSnapshot, ResponseState, Vote,
};
pub use response_part::ResponsePart;
pub use session::{
    RemovalReason, Request, Session, SessionEvent, SessionSnapshot, Turn, TurnSnapshot, Variable,
};
pub use tool_gate::{
    ConfirmReason, GateOutcome, GateState, ToolInvocation, ToolInvocationGate, ToolResult,
};
