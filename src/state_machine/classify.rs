//! Classification of failed conversation completions
//!
//! Pure: maps the completion hook payload to what the caller hears before
//! the call is hung up. There is no retry path.

use super::event::CompletionEvent;
use crate::verbs::Verb;
use regex::Regex;
use std::sync::LazyLock;

/// Completion reasons the backend uses for failures
const FAILURE_REASONS: [&str; 2] = ["server failure", "server error"];

pub const RATE_LIMIT_CODE: &str = "rate_limit_exceeded";

const RATE_LIMIT_APOLOGY: &str = "Sorry, you have exceeded your rate limits.";
const GENERIC_APOLOGY: &str = "Sorry, there was an error processing your request.";

static RETRY_AFTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"try again in (\d+)").expect("retry-after pattern is valid"));

/// What happens to the call after the apology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Hangup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub message: String,
    pub disposition: Disposition,
}

impl Classification {
    /// One speech directive followed by the disposition
    pub fn into_verbs(self) -> Vec<Verb> {
        match self.disposition {
            Disposition::Hangup => vec![Verb::say(self.message), Verb::Hangup],
        }
    }
}

/// Classify a completion. `None` means a normal completion.
pub fn classify_completion(event: &CompletionEvent) -> Option<Classification> {
    if !FAILURE_REASONS.contains(&event.completion_reason.as_str()) {
        return None;
    }

    let error = event.error.as_ref();
    let message = if error.and_then(|e| e.code.as_deref()) == Some(RATE_LIMIT_CODE) {
        match error.and_then(|e| e.message.as_deref()).and_then(retry_after) {
            Some(wait) => format!("{RATE_LIMIT_APOLOGY} Please try again in {wait} seconds."),
            None => RATE_LIMIT_APOLOGY.to_string(),
        }
    } else {
        GENERIC_APOLOGY.to_string()
    };

    Some(Classification {
        message,
        disposition: Disposition::Hangup,
    })
}

/// Extract the "try again in N" wait from a backend error message. The
/// digits are spoken as sent, however large.
pub fn retry_after(message: &str) -> Option<&str> {
    RETRY_AFTER
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
