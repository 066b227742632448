use super::tool_gate::ToolInvocation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponsePart {
    /// Model text, rendered as markdown by the host.
    Markdown { content: String },
    /// A tool call and its confirmation gate.
    ToolInvocation(ToolInvocation),
    /// Transient status line ("Searching workspace...").
    Progress { message: String },
    /// Reference to licensed code the response resembles.
    CodeCitation {
        uri: String,
        license: String,
        snippet: String,
    },
}

impl ResponsePart {
    pub fn markdown(content: impl Into<String>) -> Self {
        ResponsePart::Markdown {
            content: content.into(),
        }
    }

    pub fn progress(message: impl Into<String>) -> Self {
        ResponsePart::Progress {
            message: message.into(),
        }
    }

    pub fn as_markdown(&self) -> Option<&str> {
        match self {
            ResponsePart::Markdown { content } => Some(content),
            _ => None,
        }
    }

    pub fn as_tool_invocation(&self) -> Option<&ToolInvocation> {
        match self {
            ResponsePart::ToolInvocation(invocation) => Some(invocation),
            _ => None,
        }
    }
}
