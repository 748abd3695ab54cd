use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fallback shown when a session was created without a target position.
pub const UNKNOWN_POSITION: &str = "Unknown position";

/// One interview conversation instance, stored as a JSON blob in Redis.
///
/// Field names stay camelCase on the wire so records written by earlier
/// deployments keep deserializing.
///
/// Invariants (enforced by the session manager, not the store):
/// - `questions.len() >= 1` — a session is never created without an opening question
/// - `answers.len() == questions.len() - 1` while the session is active
/// - `is_completed` only ever goes false → true
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSession {
    pub session_id: String,
    pub name: String,
    pub topic: String,
    #[serde(default = "default_position")]
    pub position: String,
    pub questions: Vec<String>,
    pub answers: Vec<String>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_position() -> String {
    UNKNOWN_POSITION.to_string()
}

impl InterviewSession {
    pub fn new(
        session_id: &str,
        name: &str,
        topic: &str,
        first_question: &str,
        position: Option<&str>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            name: name.to_string(),
            topic: topic.to_string(),
            position: position
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(UNKNOWN_POSITION)
                .to_string(),
            questions: vec![first_question.to_string()],
            answers: vec![],
            is_completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends one turn: the submitted answer and the next question.
    /// The completion flag is ORed in — it never reverts to false.
    pub fn apply_turn(&mut self, answer: &str, next_question: &str, is_completed: bool) {
        self.answers.push(answer.to_string());
        self.questions.push(next_question.to_string());
        if is_completed {
            self.is_completed = true;
        }
        self.updated_at = Utc::now();
    }

    /// Reconstructs the conversation as an ordered message sequence:
    /// interviewer question i, then candidate answer i when it exists.
    pub fn transcript(&self) -> Vec<TranscriptMessage> {
        let mut messages = Vec::with_capacity(self.questions.len() + self.answers.len());
        for (i, question) in self.questions.iter().enumerate() {
            messages.push(TranscriptMessage {
                speaker: Speaker::Interviewer,
                text: question.clone(),
            });
            if let Some(answer) = self.answers.get(i) {
                messages.push(TranscriptMessage {
                    speaker: Speaker::Candidate,
                    text: answer.clone(),
                });
            }
        }
        messages
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.session_id.clone(),
            is_active: true,
            is_completed: self.is_completed,
            position: self.position.clone(),
            created_at: self.created_at,
            question_count: self.questions.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Interviewer,
    Candidate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub speaker: Speaker,
    pub text: String,
}

/// Read-only summary view returned by the session status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub is_active: bool,
    pub is_completed: bool,
    pub position: String,
    pub created_at: DateTime<Utc>,
    pub question_count: usize,
}
