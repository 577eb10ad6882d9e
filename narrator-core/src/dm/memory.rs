//! Turn history and context assembly.
//!
//! Only a bounded window of recent turns is kept and replayed to the
//! generator. Anything older survives only inside the free-text story
//! summary, which is carried through untouched.

use super::generator::PromptMessage;
use crate::dice::DiceResult;
use crate::validate::{OutcomeResponse, TurnResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of turns kept in the replay window.
pub const DEFAULT_RECENT_TURNS: usize = 10;

/// Stands in for the player's action on the opening turn.
pub const OPENING_REQUEST: &str = "Begin the adventure. Set the opening scene at the starting \
location and introduce the character. Do not include an event that requires a roll.";

/// One completed player turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// `None` for the opening turn.
    pub action: Option<String>,
    pub response: TurnResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice: Option<DiceResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_request: Option<String>,
    /// Empty when the outcome narration failed and stock text was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_response: Option<OutcomeResponse>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(action: Option<String>, response: TurnResponse) -> Self {
        Self {
            action,
            response,
            dice: None,
            outcome_request: None,
            outcome_response: None,
            timestamp: Utc::now(),
        }
    }

    /// The user message that opened this turn.
    pub fn request_text(&self) -> &str {
        self.action.as_deref().unwrap_or(OPENING_REQUEST)
    }
}

/// The retained window of turns plus the story summary.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnHistory {
    recent_turns: Vec<Turn>,
    pub story_summary: Option<String>,
    window: usize,
}

impl TurnHistory {
    pub fn new(window: usize) -> Self {
        Self {
            recent_turns: Vec::new(),
            story_summary: None,
            window: window.max(1),
        }
    }

    /// Rebuild from persisted parts, trimming to `window`.
    pub fn restore(turns: Vec<Turn>, story_summary: Option<String>, window: usize) -> Self {
        let mut history = Self {
            recent_turns: turns,
            story_summary,
            window: window.max(1),
        };
        history.trim_history();
        history
    }

    pub fn push_turn(&mut self, turn: Turn) {
        self.recent_turns.push(turn);
        self.trim_history();
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.story_summary = Some(summary.into());
    }

    pub fn turns(&self) -> &[Turn] {
        &self.recent_turns
    }

    pub fn len(&self) -> usize {
        self.recent_turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent_turns.is_empty()
    }

    /// Conversation for a primary narration call.
    ///
    /// Order: summary (as a system message), then per retained turn the
    /// action/narration pair and, when both halves exist, the outcome
    /// request/response pair, then `current` last.
    pub fn build_messages(&self, current: &str) -> Vec<PromptMessage> {
        let mut messages = Vec::with_capacity(self.recent_turns.len() * 4 + 2);

        if let Some(ref summary) = self.story_summary {
            messages.push(PromptMessage::system(format!("## Story so far\n{summary}")));
        }

        for turn in &self.recent_turns {
            messages.push(PromptMessage::user(turn.request_text()));
            messages.push(PromptMessage::assistant(replay_text(&turn.response, &turn.response.story)));

            if let (Some(request), Some(response)) = (&turn.outcome_request, &turn.outcome_response) {
                messages.push(PromptMessage::user(request));
                messages.push(PromptMessage::assistant(replay_text(response, &response.story)));
            }
        }

        messages.push(PromptMessage::user(current));
        messages
    }

    /// Conversation for an outcome narration call: the primary exchange of
    /// the in-flight turn followed by the outcome request.
    pub fn build_outcome_messages(
        &self,
        action: &str,
        primary: &TurnResponse,
        outcome_request: &str,
    ) -> Vec<PromptMessage> {
        let mut messages = self.build_messages(action);
        messages.push(PromptMessage::assistant(replay_text(primary, &primary.story)));
        messages.push(PromptMessage::user(outcome_request));
        messages
    }

    fn trim_history(&mut self) {
        if self.recent_turns.len() > self.window {
            let excess = self.recent_turns.len() - self.window;
            self.recent_turns.drain(..excess);
        }
    }
}

impl Default for TurnHistory {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_TURNS)
    }
}

/// Replay validated responses as JSON so the generator keeps the format.
fn replay_text<T: Serialize>(response: &T, story: &str) -> String {
    serde_json::to_string(response).unwrap_or_else(|_| story.to_string())
}
