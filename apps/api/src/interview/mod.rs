// Interview subsystem: question generation, session state machine, handlers.
// All LLM calls go through llm_client — no direct chat-completions calls here.

pub mod generator;
pub mod handlers;
pub mod manager;
pub mod prompts;
