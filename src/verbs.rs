//! Call-control directives sent to the telephony platform
//!
//! Each [`Verb`] serializes to the JSON shape jambonz executes on the live
//! call leg. Batches are always executed in the order they are sent.

use crate::config::{AgentTarget, ConversationSettings};
use crate::hooks::HookKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Name of the tool the conversational backend invokes to reach a human
pub const TRANSFER_TOOL_NAME: &str = "call-transfer";

/// A single call-control directive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "lowercase")]
pub enum Verb {
    Answer,
    Pause {
        /// Seconds of silence
        length: f64,
    },
    /// Start a conversational voice-AI session on the call
    Llm(LlmVerb),
    Say {
        text: String,
    },
    Dial(DialVerb),
    Hangup,
}

impl Verb {
    pub fn say(text: impl Into<String>) -> Self {
        Verb::Say { text: text.into() }
    }

    pub fn pause(length: f64) -> Self {
        Verb::Pause { length }
    }

    /// Verb name as jambonz spells it
    pub fn name(&self) -> &'static str {
        match self {
            Verb::Answer => "answer",
            Verb::Pause { .. } => "pause",
            Verb::Llm(_) => "llm",
            Verb::Say { .. } => "say",
            Verb::Dial(_) => "dial",
            Verb::Hangup => "hangup",
        }
    }
}

/// Credentials passed through to the conversational backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmAuth {
    pub api_key: String,
}

/// The `llm` verb: hands the call to the conversational backend with three
/// hooks bound for completion, progress events and tool calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmVerb {
    pub vendor: String,
    pub model: String,
    pub auth: LlmAuth,
    pub action_hook: String,
    pub event_hook: String,
    pub tool_hook: String,
    pub llm_options: Value,
}

impl LlmVerb {
    /// Build the conversation verb, declaring the transfer tool
    pub fn conversation(settings: &ConversationSettings, api_key: &str) -> Self {
        Self {
            vendor: settings.vendor.clone(),
            model: settings.model.clone(),
            auth: LlmAuth {
                api_key: api_key.to_string(),
            },
            action_hook: HookKind::Completion.path().to_string(),
            event_hook: HookKind::Progress.path().to_string(),
            tool_hook: HookKind::ToolCall.path().to_string(),
            llm_options: json!({
                "systemPrompt": settings.system_prompt,
                "firstSpeaker": "FIRST_SPEAKER_AGENT",
                "initialMessages": [{
                    "medium": "MESSAGE_MEDIUM_VOICE",
                    "role": "MESSAGE_ROLE_USER"
                }],
                "model": settings.model,
                "voice": settings.voice,
                "transcriptOptional": true,
                "selectedTools": [transfer_tool_declaration()],
            }),
        }
    }
}

fn transfer_tool_declaration() -> Value {
    json!({
        "temporaryTool": {
            "modelToolName": TRANSFER_TOOL_NAME,
            "description": "Transfers the call to a human agent",
            "dynamicParameters": [{
                "name": "conversationSummary",
                "location": "PARAMETER_LOCATION_BODY",
                "schema": {
                    "type": "string",
                    "description": "A summary of the conversation so far"
                },
                "required": true
            }],
            "client": {}
        }
    })
}

/// Where a dial leg is placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DialTarget {
    Phone {
        number: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        trunk: Option<String>,
    },
}

/// The `dial` verb: places the outbound leg to the human agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialVerb {
    pub action_hook: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_hook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    pub anchor_media: bool,
    pub target: Vec<DialTarget>,
}

impl DialVerb {
    pub fn to_agent(agent: &AgentTarget, use_confirm_hook: bool) -> Self {
        Self {
            action_hook: HookKind::DialAction.path().to_string(),
            confirm_hook: use_confirm_hook.then(|| HookKind::DialConfirm.path().to_string()),
            caller_id: agent.caller_id.clone(),
            anchor_media: true,
            target: vec![DialTarget::Phone {
                number: agent.number.clone(),
                trunk: agent.trunk.clone(),
            }],
        }
    }
}

/// Reply to a backend tool invocation, delivered out of band
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "client_tool_result")]
pub struct ToolOutput {
    pub invocation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolOutput {
    pub fn success(invocation_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            result: Some(result.into()),
            error_message: None,
        }
    }

    pub fn error(invocation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            result: None,
            error_message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }
}
