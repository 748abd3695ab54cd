//! Interview Session Manager — the only component enforcing the session
//! state machine.
//!
//! States: ACTIVE (`is_completed == false`) and COMPLETED (terminal).
//! `submit_answer` drives ACTIVE → ACTIVE|COMPLETED; nothing leaves
//! COMPLETED. Store reads tolerate read-after-write races with a short
//! not-found retry, and persistence is best-effort: the computed turn is
//! authoritative for the response even when the final write is lost.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::generator::{
    answer_requests_stop, GeneratorError, QuestionGenerator,
};
use crate::models::session::{InterviewSession, SessionStatus, TranscriptMessage};
use crate::store::SessionStore;

/// Substitute question when generation fails mid-interview. Turn continuity
/// beats question quality here: the candidate keeps talking.
pub const FALLBACK_QUESTION: &str = "Can you share more about your experience?";

/// Answers above this length are rejected before any store access.
pub const MAX_ANSWER_CHARS: usize = 5000;

/// Not-found fetches are retried to ride out read-after-write races
/// against the store.
const SESSION_FETCH_ATTEMPTS: u32 = 3;
const SESSION_FETCH_DELAY: Duration = Duration::from_millis(500);

const SESSION_CREATE_ATTEMPTS: u32 = 3;
const SESSION_CREATE_DELAY: Duration = Duration::from_secs(1);

/// Result of one interview turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub question: String,
    pub is_completed: bool,
}

/// Result of starting a new interview.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub session_id: String,
    pub question: String,
    pub is_completed: bool,
}

/// Fetches a session, retrying on not-found. `Err` means the store itself is
/// failing; `Ok(None)` after all attempts means the record truly is gone.
async fn fetch_session_with_retry(
    store: &dyn SessionStore,
    session_id: &str,
) -> Result<Option<InterviewSession>, AppError> {
    for attempt in 1..=SESSION_FETCH_ATTEMPTS {
        if let Some(session) = store.get_session(session_id).await? {
            return Ok(Some(session));
        }
        debug!(
            "Attempt {attempt}/{SESSION_FETCH_ATTEMPTS}: session not found: {session_id}"
        );
        if attempt < SESSION_FETCH_ATTEMPTS {
            tokio::time::sleep(SESSION_FETCH_DELAY).await;
        }
    }
    Ok(None)
}

/// Confirms a session exists before an ancillary operation (voice) may
/// reference it.
pub async fn ensure_session_exists(
    store: &dyn SessionStore,
    session_id: &str,
) -> Result<(), AppError> {
    match fetch_session_with_retry(store, session_id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::SessionNotFound),
    }
}

/// Processes one interview turn: validates the answer, advances the state
/// machine, and returns the next question with the final completion flag.
pub async fn submit_answer(
    store: &dyn SessionStore,
    generator: &dyn QuestionGenerator,
    session_id: &str,
    answer: &str,
) -> Result<TurnOutcome, AppError> {
    if answer.trim().is_empty() {
        return Err(AppError::Validation(
            "Missing session_id or answer information".to_string(),
        ));
    }
    if answer.chars().count() > MAX_ANSWER_CHARS {
        return Err(AppError::Validation(format!(
            "Answer is too long, limit is {MAX_ANSWER_CHARS} characters"
        )));
    }

    let Some(session) = fetch_session_with_retry(store, session_id).await? else {
        // The designed end of a session's life — distinct from store failure.
        return Err(AppError::SessionExpired);
    };

    if session.is_completed {
        return Err(AppError::AlreadyCompleted);
    }

    let stop_requested = answer_requests_stop(answer);

    // History for the generator includes the answer being processed.
    let mut answers = session.answers.clone();
    answers.push(answer.to_string());

    let (next_question, generator_completed) = match generator
        .next_question(session_id, &session.topic, &session.questions, &answers)
        .await
    {
        Ok(generated) => (generated.question, generated.is_completed),
        Err(e) => {
            // Never abort the turn on generator failure.
            warn!("Question generation failed, using fallback question: {e}");
            (FALLBACK_QUESTION.to_string(), false)
        }
    };

    let is_completed = stop_requested || generator_completed;

    persist_turn(store, session_id, answer, &next_question, is_completed).await;

    Ok(TurnOutcome {
        question: next_question,
        is_completed,
    })
}

/// Best-effort persistence: retried, then logged and tolerated. The caller
/// still receives the computed turn.
async fn persist_turn(
    store: &dyn SessionStore,
    session_id: &str,
    answer: &str,
    next_question: &str,
    is_completed: bool,
) {
    for attempt in 1..=SESSION_FETCH_ATTEMPTS {
        match store
            .update_session(session_id, answer, next_question, is_completed)
            .await
        {
            Ok(Some(_)) => return,
            Ok(None) => {
                debug!(
                    "Attempt {attempt}/{SESSION_FETCH_ATTEMPTS}: session vanished during \
                     update: {session_id}"
                );
            }
            Err(e) => {
                warn!(
                    "Attempt {attempt}/{SESSION_FETCH_ATTEMPTS}: session update failed: {e}"
                );
            }
        }
        if attempt < SESSION_FETCH_ATTEMPTS {
            tokio::time::sleep(SESSION_FETCH_DELAY).await;
        }
    }
    warn!(
        "Could not persist turn for session {session_id} after \
         {SESSION_FETCH_ATTEMPTS} attempts, returning the result anyway"
    );
}

/// Creates a new session: mints an id, obtains the opening question, writes
/// the record with retry, and verifies it reads back.
///
/// Unlike `submit_answer` there is no fallback here — without a first
/// question there is no session worth creating.
pub async fn start_interview(
    store: &dyn SessionStore,
    generator: &dyn QuestionGenerator,
    name: &str,
    topic: &str,
    position: Option<&str>,
) -> Result<StartOutcome, AppError> {
    let first = generator
        .first_question(name, topic)
        .await
        .map_err(|e| match e {
            GeneratorError::MissingInput(_) => AppError::Validation(e.to_string()),
            GeneratorError::Upstream(inner) => AppError::Generator(inner.to_string()),
        })?;

    let session_id = mint_session_id();

    let mut created = false;
    let mut last_error = None;
    for attempt in 1..=SESSION_CREATE_ATTEMPTS {
        match store
            .create_session(&session_id, name, topic, &first.question, position)
            .await
        {
            Ok(_) => {
                created = true;
                break;
            }
            Err(e) => {
                warn!(
                    "Session create attempt {attempt}/{SESSION_CREATE_ATTEMPTS} failed: {e}"
                );
                last_error = Some(e);
                if attempt < SESSION_CREATE_ATTEMPTS {
                    tokio::time::sleep(SESSION_CREATE_DELAY).await;
                }
            }
        }
    }
    if !created {
        return Err(AppError::Store(last_error.unwrap_or(
            crate::store::StoreError::Unavailable {
                attempts: SESSION_CREATE_ATTEMPTS,
            },
        )));
    }
    info!("Session created successfully: {session_id}");

    // Read-after-write check; a miss here is unusual but not fatal.
    match store.get_session(&session_id).await {
        Ok(Some(_)) => debug!("Session verification successful"),
        _ => warn!(
            "Session {session_id} created but not immediately retrievable, proceeding anyway"
        ),
    }

    Ok(StartOutcome {
        session_id,
        question: first.question,
        is_completed: first.is_completed,
    })
}

/// Read-only summary for the status endpoint.
pub async fn get_session_status(
    store: &dyn SessionStore,
    session_id: &str,
) -> Result<SessionStatus, AppError> {
    match store.get_session(session_id).await? {
        Some(session) => Ok(session.status()),
        None => Err(AppError::SessionNotFound),
    }
}

/// Ordered interviewer/candidate reconstruction of the conversation.
pub async fn get_transcript(
    store: &dyn SessionStore,
    session_id: &str,
) -> Result<Vec<TranscriptMessage>, AppError> {
    match store.get_session(session_id).await? {
        Some(session) => Ok(session.transcript()),
        None => Err(AppError::SessionNotFound),
    }
}

fn mint_session_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("session_{}", &hex[..16])
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::interview::generator::GeneratedQuestion;
    use crate::llm_client::LlmError;
    use crate::store::StoreError;

    #[derive(Default)]
    struct MemoryStore {
        sessions: Mutex<HashMap<String, InterviewSession>>,
        reads: AtomicUsize,
        fail_updates: AtomicBool,
    }

    impl MemoryStore {
        async fn seed(&self, session: InterviewSession) {
            self.sessions
                .lock()
                .await
                .insert(session.session_id.clone(), session);
        }

        async fn snapshot(&self, session_id: &str) -> Option<InterviewSession> {
            self.sessions.lock().await.get(session_id).cloned()
        }
    }

    #[async_trait]
    impl SessionStore for MemoryStore {
        async fn create_session(
            &self,
            session_id: &str,
            name: &str,
            topic: &str,
            first_question: &str,
            position: Option<&str>,
        ) -> Result<InterviewSession, StoreError> {
            let session =
                InterviewSession::new(session_id, name, topic, first_question, position);
            self.sessions
                .lock()
                .await
                .insert(session_id.to_string(), session.clone());
            Ok(session)
        }

        async fn get_session(
            &self,
            session_id: &str,
        ) -> Result<Option<InterviewSession>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.sessions.lock().await.get(session_id).cloned())
        }

        async fn update_session(
            &self,
            session_id: &str,
            answer: &str,
            next_question: &str,
            is_completed: bool,
        ) -> Result<Option<InterviewSession>, StoreError> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable { attempts: 3 });
            }
            let mut sessions = self.sessions.lock().await;
            let Some(session) = sessions.get_mut(session_id) else {
                return Ok(None);
            };
            session.apply_turn(answer, next_question, is_completed);
            Ok(Some(session.clone()))
        }

        async fn ping(&self) -> bool {
            true
        }
    }

    struct StubGenerator {
        question: String,
        is_completed: bool,
        fail: bool,
    }

    impl StubGenerator {
        fn returning(question: &str) -> Self {
            Self {
                question: question.to_string(),
                is_completed: false,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                question: String::new(),
                is_completed: false,
                fail: true,
            }
        }
    }

    #[async_trait]
    impl QuestionGenerator for StubGenerator {
        async fn first_question(
            &self,
            _name: &str,
            _topic: &str,
        ) -> Result<GeneratedQuestion, GeneratorError> {
            if self.fail {
                return Err(GeneratorError::Upstream(LlmError::EmptyContent));
            }
            Ok(GeneratedQuestion {
                question: self.question.clone(),
                is_completed: false,
            })
        }

        async fn next_question(
            &self,
            _session_id: &str,
            _topic: &str,
            _questions: &[String],
            _answers: &[String],
        ) -> Result<GeneratedQuestion, GeneratorError> {
            if self.fail {
                return Err(GeneratorError::Upstream(LlmError::EmptyContent));
            }
            Ok(GeneratedQuestion {
                question: self.question.clone(),
                is_completed: self.is_completed,
            })
        }
    }

    fn active_session(session_id: &str) -> InterviewSession {
        InterviewSession::new(session_id, "Alice", "Rust", "Why Rust?", Some("Backend"))
    }

    #[tokio::test]
    async fn test_submit_answer_grows_both_sequences_by_one() {
        let store = MemoryStore::default();
        store.seed(active_session("s1")).await;
        let generator = StubGenerator::returning("What about lifetimes?");

        for round in 1..=3u32 {
            let before = store.snapshot("s1").await.unwrap();
            assert_eq!(before.answers.len(), before.questions.len() - 1);

            let outcome = submit_answer(&store, &generator, "s1", "I like the borrow checker")
                .await
                .unwrap();
            assert!(!outcome.is_completed);

            let after = store.snapshot("s1").await.unwrap();
            assert_eq!(after.questions.len(), 1 + round as usize);
            assert_eq!(after.answers.len(), round as usize);
        }
    }

    #[tokio::test]
    async fn test_completed_session_rejects_further_answers() {
        let store = MemoryStore::default();
        let mut session = active_session("s1");
        session.is_completed = true;
        store.seed(session).await;
        let generator = StubGenerator::returning("unused");

        let err = submit_answer(&store, &generator, "s1", "one more thing")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyCompleted));

        let after = store.snapshot("s1").await.unwrap();
        assert_eq!(after.questions.len(), 1);
        assert!(after.answers.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_stop_keyword_completes_regardless_of_generator() {
        let store = MemoryStore::default();
        store.seed(active_session("s1")).await;
        let generator = StubGenerator::returning("Next question?");

        let outcome = submit_answer(&store, &generator, "s1", "Please STOP the interview")
            .await
            .unwrap();
        assert!(outcome.is_completed);
        assert!(store.snapshot("s1").await.unwrap().is_completed);
    }

    #[tokio::test]
    async fn test_generator_completion_flag_is_honored() {
        let store = MemoryStore::default();
        store.seed(active_session("s1")).await;
        let generator = StubGenerator {
            question: "Thank you for your time.".to_string(),
            is_completed: true,
            fail: false,
        };

        let outcome = submit_answer(&store, &generator, "s1", "that was my last point")
            .await
            .unwrap();
        assert!(outcome.is_completed);
    }

    #[tokio::test]
    async fn test_generator_failure_substitutes_fallback_question() {
        let store = MemoryStore::default();
        store.seed(active_session("s1")).await;
        let generator = StubGenerator::failing();

        let outcome = submit_answer(&store, &generator, "s1", "my answer")
            .await
            .unwrap();
        assert_eq!(outcome.question, FALLBACK_QUESTION);
        assert!(!outcome.is_completed);

        // The fallback turn is persisted like any other.
        let after = store.snapshot("s1").await.unwrap();
        assert_eq!(after.questions.last().unwrap(), FALLBACK_QUESTION);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_session_is_expired_after_retries() {
        let store = MemoryStore::default();
        let generator = StubGenerator::returning("unused");

        let err = submit_answer(&store, &generator, "gone", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionExpired));
        assert_eq!(store.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_answer_at_limit_accepted_over_limit_rejected_before_store() {
        let store = MemoryStore::default();
        store.seed(active_session("s1")).await;
        let generator = StubGenerator::returning("Next?");

        let at_limit = "a".repeat(MAX_ANSWER_CHARS);
        assert!(submit_answer(&store, &generator, "s1", &at_limit)
            .await
            .is_ok());

        let reads_before = store.reads.load(Ordering::SeqCst);
        let over_limit = "a".repeat(MAX_ANSWER_CHARS + 1);
        let err = submit_answer(&store, &generator, "s1", &over_limit)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.reads.load(Ordering::SeqCst), reads_before);
    }

    #[tokio::test]
    async fn test_empty_answer_rejected_before_store() {
        let store = MemoryStore::default();
        let generator = StubGenerator::returning("unused");

        let err = submit_answer(&store, &generator, "s1", "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistence_failure_still_returns_turn() {
        let store = MemoryStore::default();
        store.seed(active_session("s1")).await;
        store.fail_updates.store(true, Ordering::SeqCst);
        let generator = StubGenerator::returning("Next question?");

        let outcome = submit_answer(&store, &generator, "s1", "my answer")
            .await
            .unwrap();
        assert_eq!(outcome.question, "Next question?");

        // The write was lost; the stored record is unchanged.
        let after = store.snapshot("s1").await.unwrap();
        assert_eq!(after.questions.len(), 1);
    }

    #[tokio::test]
    async fn test_create_session_is_idempotent_last_write_wins() {
        let store = MemoryStore::default();
        store
            .create_session("s1", "Alice", "Rust", "first", None)
            .await
            .unwrap();
        store
            .update_session("s1", "a0", "q1", false)
            .await
            .unwrap();
        let recreated = store
            .create_session("s1", "Alice", "Rust", "fresh start", None)
            .await
            .unwrap();
        assert_eq!(recreated.questions, vec!["fresh start".to_string()]);
        assert!(recreated.answers.is_empty());

        let stored = store.snapshot("s1").await.unwrap();
        assert_eq!(stored.questions, vec!["fresh start".to_string()]);
    }

    #[tokio::test]
    async fn test_start_interview_creates_and_returns_session() {
        let store = MemoryStore::default();
        let generator = StubGenerator::returning("Tell me about yourself.");

        let outcome = start_interview(&store, &generator, "Alice", "Rust", Some("Backend"))
            .await
            .unwrap();
        assert!(outcome.session_id.starts_with("session_"));
        assert_eq!(outcome.session_id.len(), "session_".len() + 16);
        assert!(!outcome.is_completed);

        let stored = store.snapshot(&outcome.session_id).await.unwrap();
        assert_eq!(stored.questions, vec!["Tell me about yourself.".to_string()]);
        assert_eq!(stored.position, "Backend");
    }

    #[tokio::test]
    async fn test_start_interview_fails_loudly_when_generator_fails() {
        let store = MemoryStore::default();
        let generator = StubGenerator::failing();

        let err = start_interview(&store, &generator, "Alice", "Rust", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Generator(_)));
        assert!(store.sessions.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_status_and_transcript_for_missing_session() {
        let store = MemoryStore::default();
        assert!(matches!(
            get_session_status(&store, "nope").await.unwrap_err(),
            AppError::SessionNotFound
        ));
        assert!(matches!(
            get_transcript(&store, "nope").await.unwrap_err(),
            AppError::SessionNotFound
        ));
    }

    #[tokio::test]
    async fn test_transcript_zips_questions_and_answers() {
        let store = MemoryStore::default();
        store.seed(active_session("s1")).await;
        store.update_session("s1", "a0", "q1", false).await.unwrap();

        let transcript = get_transcript(&store, "s1").await.unwrap();
        let texts: Vec<&str> = transcript.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["Why Rust?", "a0", "q1"]);
    }
}
