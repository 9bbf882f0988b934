//! jambonz WebSocket message framing
//!
//! Inbound frames are JSON objects tagged by `type`. Anything the service
//! does not act on decodes to [`Decoded::Ignored`] so new message types on
//! the platform side never break a call.

use crate::hooks::HookKind;
use crate::runtime::Outbound;
use crate::verbs::{ToolOutput, Verb};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Subprotocol jambonz requests on the upgrade
pub const SUBPROTOCOL: &str = "ws.jambonz.org";

/// Call statuses after which the telephony leg is gone
const TERMINAL_CALL_STATUSES: [&str; 4] = ["completed", "failed", "busy", "no-answer"];

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawMessage {
    #[serde(rename = "session:new")]
    SessionNew {
        msgid: String,
        call_sid: Option<String>,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename = "verb:hook")]
    VerbHook {
        msgid: Option<String>,
        hook: String,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename = "llm:event")]
    LlmEvent {
        msgid: Option<String>,
        hook: Option<String>,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename = "llm:tool-call")]
    LlmToolCall {
        msgid: Option<String>,
        hook: Option<String>,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename = "call:status")]
    CallStatus {
        #[serde(default)]
        data: Value,
    },
    #[serde(rename = "jambonz:error")]
    Error {
        #[serde(default)]
        data: Value,
    },
    #[serde(rename = "verb:status")]
    VerbStatus,
    #[serde(rename = "session:redirect")]
    SessionRedirect,
    #[serde(rename = "session:reconnect")]
    SessionReconnect,
    #[serde(other)]
    Unknown,
}

/// An inbound frame, reduced to what the call needs
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    SessionNew {
        msgid: String,
        call_sid: String,
    },
    Hook {
        msgid: Option<String>,
        hook: String,
        data: Value,
    },
    /// Telephony-side status update; `terminal` once the leg is gone
    CallStatus { status: String, terminal: bool },
    Error { message: String },
    Ignored { kind: &'static str },
}

pub fn decode(text: &str) -> Result<Decoded, serde_json::Error> {
    let decoded = match serde_json::from_str::<RawMessage>(text)? {
        RawMessage::SessionNew {
            msgid,
            call_sid,
            data,
        } => {
            let call_sid = call_sid
                .or_else(|| data["call_sid"].as_str().map(str::to_string))
                .unwrap_or_else(|| msgid.clone());
            Decoded::SessionNew { msgid, call_sid }
        }
        RawMessage::VerbHook { msgid, hook, data } => Decoded::Hook { msgid, hook, data },
        RawMessage::LlmEvent { msgid, hook, data } => Decoded::Hook {
            msgid,
            hook: hook.unwrap_or_else(|| HookKind::Progress.path().to_string()),
            data,
        },
        RawMessage::LlmToolCall { msgid, hook, data } => Decoded::Hook {
            msgid,
            hook: hook.unwrap_or_else(|| HookKind::ToolCall.path().to_string()),
            data,
        },
        RawMessage::CallStatus { data } => {
            let status = data["call_status"].as_str().unwrap_or_default().to_string();
            let terminal = TERMINAL_CALL_STATUSES.contains(&status.as_str());
            Decoded::CallStatus { status, terminal }
        }
        RawMessage::Error { data } => Decoded::Error {
            message: data["error"]
                .as_str()
                .map_or_else(|| data.to_string(), str::to_string),
        },
        RawMessage::VerbStatus => Decoded::Ignored { kind: "verb:status" },
        RawMessage::SessionRedirect => Decoded::Ignored {
            kind: "session:redirect",
        },
        RawMessage::SessionReconnect => Decoded::Ignored {
            kind: "session:reconnect",
        },
        RawMessage::Unknown => Decoded::Ignored { kind: "unknown" },
    };
    Ok(decoded)
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireMessage<'a> {
    Ack {
        msgid: &'a str,
        data: &'a [Verb],
    },
    Command {
        command: &'static str,
        #[serde(rename = "queueCommand", skip_serializing_if = "Option::is_none")]
        queue_command: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<&'a str>,
        data: CommandData<'a>,
    },
}

#[derive(Serialize)]
#[serde(untagged)]
enum CommandData<'a> {
    Verbs(&'a [Verb]),
    ToolOutput(&'a ToolOutput),
}

/// Frame an outbound message as JSON text
pub fn encode(message: &Outbound) -> Result<String, serde_json::Error> {
    let wire = match message {
        Outbound::Ack { msgid, verbs } => WireMessage::Ack { msgid, data: verbs },
        Outbound::Redirect { verbs } => WireMessage::Command {
            command: "redirect",
            queue_command: Some(false),
            tool_call_id: None,
            data: CommandData::Verbs(verbs),
        },
        Outbound::ToolOutput { output } => WireMessage::Command {
            command: "llm:tool-output",
            queue_command: None,
            tool_call_id: Some(output.invocation_id.as_str()),
            data: CommandData::ToolOutput(output),
        },
    };
    serde_json::to_string(&wire)
}
