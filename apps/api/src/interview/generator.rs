//! Question Generator Gateway — turns conversation history into the next
//! interview question via the LLM client, and cleans up whatever the model
//! returns before it reaches a candidate.
//!
//! Completion detection is deliberately split into standalone predicates so
//! the string heuristics can be swapped for a structured generator signal
//! without touching the session state machine.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::interview::prompts::{FIRST_QUESTION_PROMPT_TEMPLATE, NEXT_QUESTION_PROMPT_TEMPLATE};
use crate::llm_client::{LlmClient, LlmError};

/// The interview wraps up once this many questions have been asked.
const QUESTION_CEILING: usize = 5;

/// Generated questions are truncated beyond this length.
const MAX_QUESTION_CHARS: usize = 2000;

/// Terminal punctuation is appended only to questions longer than this.
const MIN_PUNCTUATION_CHARS: usize = 10;

/// Known spurious filler token some models prepend; stripped case-insensitively.
const FILLER_PREFIX: &str = "bruh";

/// Closing-language markers in generated text that signal the interview is over.
const CLOSING_MARKERS: &[&str] = &["thank you", "completed", "end"];

/// Explicit stop keywords a candidate can put anywhere in an answer.
const STOP_KEYWORDS: &[&str] = &["stop", "end"];

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Missing required information: {0}")]
    MissingInput(&'static str),

    #[error("Question generation failed: {0}")]
    Upstream(#[from] LlmError),
}

#[derive(Debug, Clone)]
pub struct GeneratedQuestion {
    pub question: String,
    pub is_completed: bool,
}

/// Produces interview questions from conversation history.
///
/// Carried in `AppState` as `Arc<dyn QuestionGenerator>`.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// The opening question for a new session. Never reports completion.
    async fn first_question(
        &self,
        name: &str,
        topic: &str,
    ) -> Result<GeneratedQuestion, GeneratorError>;

    /// The next question given the history so far. `answers` must already
    /// include the answer being responded to.
    async fn next_question(
        &self,
        session_id: &str,
        topic: &str,
        questions: &[String],
        answers: &[String],
    ) -> Result<GeneratedQuestion, GeneratorError>;
}

/// DeepSeek-backed implementation.
pub struct DeepseekQuestionGenerator {
    llm: LlmClient,
}

impl DeepseekQuestionGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl QuestionGenerator for DeepseekQuestionGenerator {
    async fn first_question(
        &self,
        name: &str,
        topic: &str,
    ) -> Result<GeneratedQuestion, GeneratorError> {
        if name.trim().is_empty() {
            return Err(GeneratorError::MissingInput("name"));
        }
        if topic.trim().is_empty() {
            return Err(GeneratorError::MissingInput("topic"));
        }

        let prompt = FIRST_QUESTION_PROMPT_TEMPLATE
            .replace("{name}", name)
            .replace("{topic}", topic);

        let response = self.llm.complete(&prompt).await?;
        let question = sanitize_question(&extract_question(&response));
        debug!("First question generated for topic {topic:?}");

        Ok(GeneratedQuestion {
            question,
            is_completed: false,
        })
    }

    async fn next_question(
        &self,
        session_id: &str,
        topic: &str,
        questions: &[String],
        answers: &[String],
    ) -> Result<GeneratedQuestion, GeneratorError> {
        if session_id.trim().is_empty() {
            return Err(GeneratorError::MissingInput("session_id"));
        }
        if topic.trim().is_empty() {
            return Err(GeneratorError::MissingInput("topic"));
        }

        let history = build_history(questions, answers);
        let prompt = NEXT_QUESTION_PROMPT_TEMPLATE
            .replace("{topic}", topic)
            .replace("{history}", &history);

        let response = self.llm.complete(&prompt).await?;
        let question = sanitize_question(&extract_question(&response));

        let is_completed = generation_completes(questions.len(), &question);
        debug!(
            "Next question generated for {session_id}, completed: {is_completed}"
        );

        Ok(GeneratedQuestion {
            question,
            is_completed,
        })
    }
}

/// Builds the prompt transcript from the most recent window of the history.
/// Callers pass `answers` with the just-submitted answer already appended,
/// so questions and answers line up pairwise.
fn build_history(questions: &[String], answers: &[String]) -> String {
    let window = questions.len().min(answers.len() + 1);
    let mut history = String::new();

    for i in 0..window {
        let question_index = questions.len() - window + i;
        history.push_str("Interviewer: ");
        history.push_str(&questions[question_index]);
        history.push_str("\n\n");

        // The answer window is shifted by one: the latest question may not
        // have an answer yet.
        if let Some(offset) = (answers.len() + i).checked_sub(window) {
            if let Some(answer) = answers.get(offset) {
                history.push_str("Candidate: ");
                history.push_str(answer);
                history.push_str("\n\n");
            }
        }
    }

    history
}

/// Pulls the question text out of a raw model response. Models sometimes
/// answer with JSON (`{"question": "..."}`) despite instructions; prefer the
/// `question` field, then any string field, then the raw trimmed text.
fn extract_question(response: &str) -> String {
    let trimmed = response.trim();

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(trimmed) {
        if let Some(serde_json::Value::String(q)) = map.get("question") {
            if q.len() > 2 {
                return q.clone();
            }
        }
        for value in map.values() {
            if let serde_json::Value::String(s) = value {
                if s.len() > 2 {
                    warn!("No question field in JSON response, using first string field");
                    return s.clone();
                }
            }
        }
    }

    trimmed.to_string()
}

/// Normalizes a generated question: strips the filler prefix and leading
/// quote/emphasis characters, capitalizes, bounds the length, and appends
/// terminal punctuation when missing.
fn sanitize_question(question: &str) -> String {
    let mut cleaned = question.trim().to_string();

    cleaned = cleaned
        .trim_start_matches(['\'', '"', '*', '_', '~'])
        .to_string();

    if cleaned.to_lowercase().starts_with(FILLER_PREFIX) {
        warn!("Generated question starts with {FILLER_PREFIX:?}, removing it");
        cleaned = cleaned[FILLER_PREFIX.len()..]
            .trim_start_matches([',', '.', ' ', '\t', '\n'])
            .to_string();
    }

    if cleaned.chars().count() > MAX_QUESTION_CHARS {
        warn!("Generated question is too long, truncating");
        cleaned = cleaned.chars().take(MAX_QUESTION_CHARS - 3).collect();
        cleaned.push_str("...");
    }

    if cleaned.len() > MIN_PUNCTUATION_CHARS
        && !cleaned.ends_with('?')
        && !cleaned.ends_with('.')
        && !cleaned.ends_with('!')
    {
        cleaned.push('?');
    }

    let mut chars = cleaned.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => cleaned,
    }
}

/// True when the candidate explicitly asked to stop, anywhere in the answer.
pub fn answer_requests_stop(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    STOP_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// True when generated text reads like a wrap-up rather than a question.
pub fn question_signals_completion(question: &str) -> bool {
    let lower = question.to_lowercase();
    CLOSING_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Generator-side completion: the question ceiling has been reached, or the
/// generated text itself closes the interview.
pub fn generation_completes(question_count: usize, question: &str) -> bool {
    question_count >= QUESTION_CEILING || question_signals_completion(question)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_filler_prefix() {
        assert_eq!(
            sanitize_question("bruh, tell me about your last project"),
            "Tell me about your last project?"
        );
        assert_eq!(
            sanitize_question("BRUH. what is ownership in Rust?"),
            "What is ownership in Rust?"
        );
    }

    #[test]
    fn test_sanitize_strips_leading_emphasis_chars() {
        assert_eq!(
            sanitize_question("*what is borrowing?"),
            "What is borrowing?"
        );
        assert_eq!(
            sanitize_question("~'describe a deadlock."),
            "Describe a deadlock."
        );
    }

    #[test]
    fn test_sanitize_capitalizes_first_letter() {
        assert_eq!(
            sanitize_question("what drew you to this role?"),
            "What drew you to this role?"
        );
    }

    #[test]
    fn test_sanitize_appends_question_mark() {
        assert_eq!(
            sanitize_question("describe your ideal team"),
            "Describe your ideal team?"
        );
    }

    #[test]
    fn test_sanitize_leaves_short_text_unpunctuated() {
        assert_eq!(sanitize_question("why"), "Why");
    }

    #[test]
    fn test_sanitize_keeps_existing_punctuation() {
        assert_eq!(
            sanitize_question("Walk me through your resume."),
            "Walk me through your resume."
        );
    }

    #[test]
    fn test_sanitize_truncates_oversized_question() {
        let long = "a".repeat(3000);
        let cleaned = sanitize_question(&long);
        assert_eq!(cleaned.chars().count(), MAX_QUESTION_CHARS);
        assert!(cleaned.ends_with("..."));
    }

    #[test]
    fn test_sanitize_boundary_length_untouched() {
        let exact = format!("{}.", "b".repeat(MAX_QUESTION_CHARS - 1));
        let cleaned = sanitize_question(&exact);
        assert_eq!(cleaned.chars().count(), MAX_QUESTION_CHARS);
        assert!(!cleaned.ends_with("..."));
    }

    #[test]
    fn test_extract_question_from_json_field() {
        let raw = r#"{"question": "What is your greatest strength?"}"#;
        assert_eq!(extract_question(raw), "What is your greatest strength?");
    }

    #[test]
    fn test_extract_question_falls_back_to_first_string_field() {
        let raw = r#"{"next": "Describe a hard bug you fixed"}"#;
        assert_eq!(extract_question(raw), "Describe a hard bug you fixed");
    }

    #[test]
    fn test_extract_question_passes_plain_text_through() {
        assert_eq!(
            extract_question("  How do you test async code?  "),
            "How do you test async code?"
        );
    }

    #[test]
    fn test_answer_requests_stop_any_case_any_position() {
        assert!(answer_requests_stop("I want to STOP here"));
        assert!(answer_requests_stop("let's end the interview"));
        assert!(!answer_requests_stop("I enjoy working with databases"));
    }

    #[test]
    fn test_question_ceiling_forces_completion() {
        assert!(generation_completes(5, "What else have you built?"));
        assert!(generation_completes(7, "What else have you built?"));
        assert!(!generation_completes(4, "What else have you built?"));
    }

    #[test]
    fn test_closing_language_completes_below_ceiling() {
        assert!(generation_completes(2, "Thank you, that concludes our chat."));
    }

    #[test]
    fn test_question_signals_completion_markers() {
        assert!(question_signals_completion(
            "Thank you for your time, we are done."
        ));
        assert!(question_signals_completion("The interview has COMPLETED."));
        assert!(!question_signals_completion("What motivates you?"));
    }

    #[test]
    fn test_build_history_alternates_pairs() {
        // Call pattern from submit_answer: the current answer is appended,
        // so both slices have equal length.
        let questions: Vec<String> = vec!["q0".into(), "q1".into()];
        let answers: Vec<String> = vec!["a0".into(), "a1".into()];
        let history = build_history(&questions, &answers);
        assert_eq!(
            history,
            "Interviewer: q0\n\nCandidate: a0\n\nInterviewer: q1\n\nCandidate: a1\n\n"
        );
    }

    #[test]
    fn test_build_history_fresh_session() {
        let questions: Vec<String> = vec!["q0".into()];
        let history = build_history(&questions, &[]);
        assert_eq!(history, "Interviewer: q0\n\n");
    }
}
