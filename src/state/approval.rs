use super::response::Response;
use super::tool_gate::{ConfirmReason, GateState, ToolResult};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};

pub const GLOBAL_AUTO_APPROVE_SETTING: &str = "chat.tools.global.autoApprove";
pub const TOOL_AUTO_APPROVE_SETTING: &str = "chat.tools.autoApprove";

/// Decides whether a tool call can skip the user at either gate.
pub trait ApprovalPolicy {
    /// Reason to approve before execution without asking, if any.
    fn pre_approval(&self, tool_id: &str, input: &serde_json::Value) -> Option<ConfirmReason>;

    /// Whether the executed call's result must be approved before it is shared.
    fn needs_post_approval(&self, tool_id: &str) -> bool;

    /// Reason to approve the result without asking, if any.
    fn post_approval(&self, tool_id: &str, input: &serde_json::Value) -> Option<ConfirmReason>;
}

/// Approval rules taken from [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct ToolApprovalRules {
    global_auto_approve: bool,
    auto_approve_tools: Vec<String>,
    post_approval_tools: Vec<String>,
}

impl ToolApprovalRules {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            global_auto_approve: config.global_auto_approve,
            auto_approve_tools: config.auto_approve_tools.clone(),
            post_approval_tools: config.post_approval_tools.clone(),
        }
    }
}

impl ApprovalPolicy for ToolApprovalRules {
    fn pre_approval(&self, tool_id: &str, _input: &serde_json::Value) -> Option<ConfirmReason> {
        if self.global_auto_approve {
            return Some(ConfirmReason::Setting {
                id: GLOBAL_AUTO_APPROVE_SETTING.to_string(),
            });
        }
        if self.auto_approve_tools.iter().any(|name| name == tool_id) {
            return Some(ConfirmReason::Setting {
                id: TOOL_AUTO_APPROVE_SETTING.to_string(),
            });
        }
        None
    }

    fn needs_post_approval(&self, tool_id: &str) -> bool {
        self.post_approval_tools.iter().any(|name| name == tool_id)
    }

    fn post_approval(&self, _tool_id: &str, _input: &serde_json::Value) -> Option<ConfirmReason> {
        self.global_auto_approve.then(|| ConfirmReason::Setting {
            id: GLOBAL_AUTO_APPROVE_SETTING.to_string(),
        })
    }
}

/// Records an executed tool's result and runs the post-execution gate:
/// tools that need post approval wait for the host unless `policy`
/// auto-approves the result.
pub fn record_tool_result<P>(
    response: &mut Response,
    call_id: &str,
    result: ToolResult,
    policy: &P,
) -> SessionResult<GateState>
where
    P: ApprovalPolicy + ?Sized,
{
    let (tool_id, input) = response
        .tool_invocation(call_id)
        .map(|invocation| (invocation.tool_id.clone(), invocation.input.clone()))
        .ok_or_else(|| SessionError::not_found("tool invocation", call_id))?;

    let needs_post_approval = policy.needs_post_approval(&tool_id);
    response.complete_tool_execution(call_id, result, needs_post_approval)?;
    if needs_post_approval {
        if let Some(reason) = policy.post_approval(&tool_id, &input) {
            response.confirm_tool(call_id, reason)?;
        }
    }

    response
        .tool_invocation(call_id)
        .map(|invocation| invocation.state())
        .ok_or_else(|| SessionError::not_found("tool invocation", call_id))
}

/// Asks the user for everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAsk;

impl ApprovalPolicy for AlwaysAsk {
    fn pre_approval(&self, _tool_id: &str, _input: &serde_json::Value) -> Option<ConfirmReason> {
        None
    }

    fn needs_post_approval(&self, _tool_id: &str) -> bool {
        false
    }

    fn post_approval(&self, _tool_id: &str, _input: &serde_json::Value) -> Option<ConfirmReason> {
        None
    }
}
