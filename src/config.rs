//! Process configuration loaded from the environment

use crate::state_machine::CallContext;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TRANSFER_DELAY_SECS: u64 = 5;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an agent named Karen. You can help the caller \
with simple questions or transfer them to a human agent. Be brief. When you call the tool to \
transfer the call provide a brief summary of the call with the user so far.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Settings for the conversational backend session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSettings {
    pub vendor: String,
    pub model: String,
    pub voice: String,
    pub system_prompt: String,
    /// Without a key the call cannot start a conversation
    pub api_key: Option<String>,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            vendor: "ultravox".to_string(),
            model: "fixie-ai/ultravox".to_string(),
            voice: "Tanya-English".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            api_key: None,
        }
    }
}

/// The human agent a transfer dials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTarget {
    pub number: String,
    pub trunk: Option<String>,
    pub caller_id: Option<String>,
}

/// Who hears the conversation summary captured at transfer time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryDelivery {
    /// Read back to the caller after the agent call ends
    #[default]
    Caller,
    /// Read to the agent when they answer (requires the confirm hook)
    Agent,
    Off,
}

impl SummaryDelivery {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "caller" => Some(Self::Caller),
            "agent" => Some(Self::Agent),
            "off" | "none" => Some(Self::Off),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub conversation: ConversationSettings,
    pub agent: Option<AgentTarget>,
    pub transfer_delay: Duration,
    pub use_confirm_hook: bool,
    pub summary_delivery: SummaryDelivery,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Empty values count as unset
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match get("WS_PORT") {
            Some(v) => v.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "WS_PORT",
                expected: "a port number",
                value: v,
            })?,
            None => DEFAULT_PORT,
        };

        let transfer_delay = match get("TRANSFER_DELAY_SECS") {
            Some(v) => Duration::from_secs(v.trim().parse().map_err(|_| {
                ConfigError::Invalid {
                    name: "TRANSFER_DELAY_SECS",
                    expected: "a whole number of seconds",
                    value: v,
                }
            })?),
            None => Duration::from_secs(DEFAULT_TRANSFER_DELAY_SECS),
        };

        let use_confirm_hook = match get("USE_CONFIRM_HOOK") {
            Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid {
                name: "USE_CONFIRM_HOOK",
                expected: "true or false",
                value: v,
            })?,
            None => true,
        };

        let summary_delivery = match get("SUMMARY_DELIVERY") {
            Some(v) => SummaryDelivery::parse(&v).ok_or(ConfigError::Invalid {
                name: "SUMMARY_DELIVERY",
                expected: "one of caller, agent, off",
                value: v,
            })?,
            None => SummaryDelivery::default(),
        };

        // The agent only hears the summary from the confirm hook
        if summary_delivery == SummaryDelivery::Agent && !use_confirm_hook {
            return Err(ConfigError::Invalid {
                name: "SUMMARY_DELIVERY",
                expected: "caller or off while USE_CONFIRM_HOOK is false",
                value: "agent".to_string(),
            });
        }

        let defaults = ConversationSettings::default();
        let conversation = ConversationSettings {
            vendor: defaults.vendor,
            model: get("ULTRAVOX_MODEL").unwrap_or(defaults.model),
            voice: get("ULTRAVOX_VOICE").unwrap_or(defaults.voice),
            system_prompt: get("SYSTEM_PROMPT").unwrap_or(defaults.system_prompt),
            api_key: get("ULTRAVOX_API_KEY"),
        };

        let agent = get("HUMAN_AGENT_NUMBER").map(|number| AgentTarget {
            number,
            trunk: get("HUMAN_AGENT_TRUNK"),
            caller_id: get("HUMAN_AGENT_CALLERID"),
        });

        Ok(Self {
            port,
            conversation,
            agent,
            transfer_delay,
            use_confirm_hook,
            summary_delivery,
        })
    }

    /// Per-call context handed to the state machine
    pub fn call_context(&self, call_sid: impl Into<String>) -> CallContext {
        CallContext {
            call_sid: call_sid.into(),
            conversation: self.conversation.clone(),
            agent: self.agent.clone(),
            transfer_delay: self.transfer_delay,
            use_confirm_hook: self.use_confirm_hook,
            summary_delivery: self.summary_delivery,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
