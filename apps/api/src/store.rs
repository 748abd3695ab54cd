//! Session store — durable, TTL-bounded storage for interview sessions in Redis.
//!
//! The manager owns the state machine; this layer owns serialization, the
//! sliding 24h expiration, and surviving an unreliable network link. Missing
//! keys and corrupt payloads are reported as `Ok(None)` so callers can apply
//! their own retry policy; only an exhausted connection/command budget
//! escalates as an error.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::session::InterviewSession;

/// Sessions live 24 hours from the last write (sliding expiration).
const SESSION_TTL_SECS: u64 = 60 * 60 * 24;
const SESSION_PREFIX: &str = "interview_session:";

/// Per-operation retry budget. Backoff is linear: attempt × base delay.
const MAX_COMMAND_ATTEMPTS: u32 = 3;
const COMMAND_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Connection dial budget, separate from the command budget.
pub const MAX_CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not connect to Redis after {attempts} attempts")]
    Unavailable { attempts: u32 },

    #[error("Redis command failed after retries: {0}")]
    Command(#[from] redis::RedisError),

    #[error("session serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Storage interface for interview sessions.
///
/// Carried in `AppState` as `Arc<dyn SessionStore>` so the manager can be
/// exercised against an in-memory implementation in tests.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Writes a fresh record with one opening question and no answers.
    /// Overwrites any existing record at the same key (idempotent create).
    async fn create_session(
        &self,
        session_id: &str,
        name: &str,
        topic: &str,
        first_question: &str,
        position: Option<&str>,
    ) -> Result<InterviewSession, StoreError>;

    /// `Ok(None)` on a missing key or an undecodable payload (logged).
    async fn get_session(&self, session_id: &str)
        -> Result<Option<InterviewSession>, StoreError>;

    /// Read-modify-write: appends the answer and next question, ORs the
    /// completion flag, refreshes `updated_at`, and rewrites with the full
    /// TTL. `Ok(None)` if the record does not currently exist — an update
    /// never creates a session.
    async fn update_session(
        &self,
        session_id: &str,
        answer: &str,
        next_question: &str,
        is_completed: bool,
    ) -> Result<Option<InterviewSession>, StoreError>;

    /// Liveness check for the underlying connection.
    async fn ping(&self) -> bool;
}

/// Redis-backed store with a lazily-established multiplexed connection.
///
/// The connection handle is owned here and guarded by an async mutex, so
/// concurrent callers that find it unopened wait on the lock instead of
/// dialing duplicate connections.
pub struct RedisSessionStore {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisSessionStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            conn: Mutex::new(None),
        }
    }

    fn key(session_id: &str) -> String {
        format!("{SESSION_PREFIX}{session_id}")
    }

    /// Returns the shared connection, dialing it first if necessary.
    /// Dial attempts are capped and backed off; the mutex is held across the
    /// whole establishing phase.
    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        for attempt in 1..=MAX_CONNECT_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(CONNECT_RETRY_DELAY * (attempt - 1)).await;
            }
            match tokio::time::timeout(
                CONNECT_TIMEOUT,
                self.client.get_multiplexed_async_connection(),
            )
            .await
            {
                Ok(Ok(conn)) => {
                    info!("Redis connection established");
                    *guard = Some(conn.clone());
                    return Ok(conn);
                }
                Ok(Err(e)) => {
                    warn!(
                        "Redis connect attempt {attempt}/{MAX_CONNECT_ATTEMPTS} failed: {e}"
                    );
                }
                Err(_) => {
                    warn!(
                        "Redis connect attempt {attempt}/{MAX_CONNECT_ATTEMPTS} timed out \
                         after {}s",
                        CONNECT_TIMEOUT.as_secs()
                    );
                }
            }
        }

        Err(StoreError::Unavailable {
            attempts: MAX_CONNECT_ATTEMPTS,
        })
    }

    /// Forgets the cached handle so the next operation redials.
    async fn reset_connection(&self) {
        *self.conn.lock().await = None;
    }

    async fn read_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut last_err = None;
        for attempt in 1..=MAX_COMMAND_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(COMMAND_RETRY_DELAY * (attempt - 1)).await;
            }
            let mut conn = self.connection().await?;
            match conn.get::<_, Option<String>>(key).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        "Redis GET {key} failed (attempt {attempt}/{MAX_COMMAND_ATTEMPTS}): {e}"
                    );
                    self.reset_connection().await;
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .map(StoreError::Command)
            .unwrap_or(StoreError::Unavailable {
                attempts: MAX_COMMAND_ATTEMPTS,
            }))
    }

    async fn write_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut last_err = None;
        for attempt in 1..=MAX_COMMAND_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(COMMAND_RETRY_DELAY * (attempt - 1)).await;
            }
            let mut conn = self.connection().await?;
            match conn
                .set_ex::<_, _, ()>(key, value, SESSION_TTL_SECS)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "Redis SET {key} failed (attempt {attempt}/{MAX_COMMAND_ATTEMPTS}): {e}"
                    );
                    self.reset_connection().await;
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .map(StoreError::Command)
            .unwrap_or(StoreError::Unavailable {
                attempts: MAX_COMMAND_ATTEMPTS,
            }))
    }

    fn decode(key: &str, raw: &str) -> Option<InterviewSession> {
        match serde_json::from_str(raw) {
            Ok(session) => Some(session),
            Err(e) => {
                // Treated like a miss: the record is unusable, and the TTL
                // will eventually reclaim it.
                warn!("Discarding undecodable session payload at {key}: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create_session(
        &self,
        session_id: &str,
        name: &str,
        topic: &str,
        first_question: &str,
        position: Option<&str>,
    ) -> Result<InterviewSession, StoreError> {
        let session = InterviewSession::new(session_id, name, topic, first_question, position);
        let payload = serde_json::to_string(&session)?;
        self.write_raw(&Self::key(session_id), &payload).await?;
        info!("Session created: {session_id}");
        Ok(session)
    }

    async fn get_session(
        &self,
        session_id: &str,
    ) -> Result<Option<InterviewSession>, StoreError> {
        let key = Self::key(session_id);
        let Some(raw) = self.read_raw(&key).await? else {
            debug!("Session not found: {session_id}");
            return Ok(None);
        };
        Ok(Self::decode(&key, &raw))
    }

    async fn update_session(
        &self,
        session_id: &str,
        answer: &str,
        next_question: &str,
        is_completed: bool,
    ) -> Result<Option<InterviewSession>, StoreError> {
        let key = Self::key(session_id);
        let Some(raw) = self.read_raw(&key).await? else {
            warn!("Session not found for update: {session_id}");
            return Ok(None);
        };
        let Some(mut session) = Self::decode(&key, &raw) else {
            return Ok(None);
        };

        session.apply_turn(answer, next_question, is_completed);

        let payload = serde_json::to_string(&session)?;
        self.write_raw(&key, &payload).await?;
        debug!(
            "Session updated: {session_id}, questions: {}, answers: {}",
            session.questions.len(),
            session.answers.len()
        );
        Ok(Some(session))
    }

    async fn ping(&self) -> bool {
        let Ok(mut conn) = self.connection().await else {
            return false;
        };
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(reply) => reply == "PONG",
            Err(e) => {
                warn!("Redis ping failed: {e}");
                self.reset_connection().await;
                false
            }
        }
    }
}
