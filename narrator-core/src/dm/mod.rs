//! Narrator module.
//!
//! Contains the generator boundary, the narrator agent and the bounded
//! turn history used to build generator context.

mod agent;
pub mod generator;
pub mod memory;

pub use agent::{build_system_prompt, generate_world, outcome_request, stock_outcome, Narrator};
pub use generator::{
    send_with_retry, ClaudeGenerator, Generator, GeneratorConfig, GeneratorError, PromptMessage,
    PromptRole, RetryPolicy,
};
pub use memory::{Turn, TurnHistory, DEFAULT_RECENT_TURNS, OPENING_REQUEST};
