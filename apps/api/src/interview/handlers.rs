use axum::{
    extract::{FromRequest, Multipart, Path, Request, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::interview::manager;
use crate::models::session::{SessionStatus, TranscriptMessage};
use crate::state::AppState;
use crate::store::{StoreError, MAX_CONNECT_ATTEMPTS};
use crate::voice::{DEFAULT_VOICE, MAX_AUDIO_BYTES, MAX_SPEAK_CHARS};

const SESSION_COOKIE: &str = "interview_session_id";
const SESSION_COOKIE_MAX_AGE_DAYS: i64 = 7;

const MAX_SESSION_ID_CHARS: usize = 100;
const MAX_NAME_CHARS: usize = 100;
const MAX_TOPIC_CHARS: usize = 500;

/// Session cookie: 7 days, whole site, inaccessible to scripts.
fn session_cookie(session_id: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .max_age(time::Duration::days(SESSION_COOKIE_MAX_AGE_DAYS))
        .http_only(true)
        .same_site(SameSite::Strict)
        .build()
}

fn validate_session_id(session_id: &str) -> Result<(), AppError> {
    if session_id.trim().is_empty() {
        return Err(AppError::Validation("Invalid Session ID".to_string()));
    }
    if session_id.chars().count() > MAX_SESSION_ID_CHARS {
        return Err(AppError::Validation(
            "Invalid Session ID (too long)".to_string(),
        ));
    }
    Ok(())
}

// ── Start ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub name: Option<String>,
    pub interview_topic: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub name: String,
    pub topic: String,
    pub position: String,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub success: bool,
    pub message: String,
    pub session_id: String,
    pub question: String,
    pub is_completed: bool,
    pub session_info: SessionInfo,
}

/// POST /api/interview/start
pub async fn handle_start(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<StartRequest>,
) -> Result<(CookieJar, Json<StartResponse>), AppError> {
    let name = req.name.as_deref().unwrap_or("").trim();
    let topic = req.interview_topic.as_deref().unwrap_or("").trim();

    if name.is_empty() || topic.is_empty() {
        return Err(AppError::Validation(
            "Missing name or interview topic information".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "Name must not exceed {MAX_NAME_CHARS} characters"
        )));
    }
    if topic.chars().count() > MAX_TOPIC_CHARS {
        return Err(AppError::Validation(format!(
            "Interview topic must not exceed {MAX_TOPIC_CHARS} characters"
        )));
    }

    // Refuse to mint a session the store cannot hold.
    if !state.store.ping().await {
        return Err(AppError::Store(StoreError::Unavailable {
            attempts: MAX_CONNECT_ATTEMPTS,
        }));
    }

    let outcome = manager::start_interview(
        state.store.as_ref(),
        state.generator.as_ref(),
        name,
        topic,
        req.position.as_deref(),
    )
    .await?;

    let response = StartResponse {
        success: true,
        message: "Interview started successfully".to_string(),
        session_id: outcome.session_id.clone(),
        question: outcome.question,
        is_completed: outcome.is_completed,
        session_info: SessionInfo {
            name: name.to_string(),
            topic: topic.to_string(),
            position: req
                .position
                .clone()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| "Unspecified".to_string()),
        },
    };
    let jar = jar.add(session_cookie(&response.session_id));
    Ok((jar, Json(response)))
}

// ── Answer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub session_id: Option<String>,
    pub answer: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub success: bool,
    pub session_id: String,
    pub question: String,
    pub is_completed: bool,
}

/// POST /api/interview/answer
pub async fn handle_answer(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<AnswerRequest>,
) -> Result<(CookieJar, Json<AnswerResponse>), AppError> {
    let session_id = req.session_id.as_deref().unwrap_or("").trim();
    let answer = req.answer.as_deref().unwrap_or("");

    if session_id.is_empty() || answer.trim().is_empty() {
        return Err(AppError::Validation(
            "Missing session_id or answer information".to_string(),
        ));
    }

    let outcome = manager::submit_answer(
        state.store.as_ref(),
        state.generator.as_ref(),
        session_id,
        answer,
    )
    .await?;

    let jar = jar.add(session_cookie(session_id));
    Ok((
        jar,
        Json(AnswerResponse {
            success: true,
            session_id: session_id.to_string(),
            question: outcome.question,
            is_completed: outcome.is_completed,
        }),
    ))
}

// ── Status & transcript ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(flatten)]
    pub status: SessionStatus,
}

/// GET /api/interview/session/:session_id
pub async fn handle_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    validate_session_id(&session_id)?;
    let status = manager::get_session_status(state.store.as_ref(), &session_id).await?;
    Ok(Json(StatusResponse {
        success: true,
        status,
    }))
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub success: bool,
    pub session_id: String,
    pub messages: Vec<TranscriptMessage>,
}

/// GET /api/interview/session/:session_id/transcript
pub async fn handle_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<TranscriptResponse>, AppError> {
    validate_session_id(&session_id)?;
    let messages = manager::get_transcript(state.store.as_ref(), &session_id).await?;
    Ok(Json(TranscriptResponse {
        success: true,
        session_id,
        messages,
    }))
}

// ── Voice ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VoiceRequest {
    pub text: Option<String>,
    pub session_id: Option<String>,
    pub voice_type: Option<String>,
}

/// POST /api/interview/voice — text to speech, raw mp3 back.
pub async fn handle_voice(
    State(state): State<AppState>,
    Json(req): Json<VoiceRequest>,
) -> Result<Response, AppError> {
    if !state.voice.is_configured() {
        return Err(AppError::Voice(crate::voice::VoiceError::NotConfigured));
    }

    let text = req.text.as_deref().unwrap_or("");
    if text.trim().is_empty() {
        return Err(AppError::Validation(
            "Missing text to convert".to_string(),
        ));
    }
    if text.chars().count() > MAX_SPEAK_CHARS {
        return Err(AppError::Validation(format!(
            "Text is too long, limit is {MAX_SPEAK_CHARS} characters"
        )));
    }

    // Voice interaction is not permitted against an unknown/expired session.
    if let Some(session_id) = req.session_id.as_deref().filter(|s| !s.trim().is_empty()) {
        manager::ensure_session_exists(state.store.as_ref(), session_id).await?;
    }

    let voice = req.voice_type.as_deref().unwrap_or(DEFAULT_VOICE);
    let audio = state.voice.speak(text, voice).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        audio,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct SpeechToTextResponse {
    pub success: bool,
    pub text: String,
}

/// POST /api/interview/voice/speech-to-text — multipart audio upload.
///
/// Takes the raw request so the configuration and content-type checks run
/// before multipart parsing, matching the error contract (501 before 415
/// before 400).
pub async fn handle_speech_to_text(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<SpeechToTextResponse>, AppError> {
    if !state.voice.is_configured() {
        return Err(AppError::Voice(crate::voice::VoiceError::NotConfigured));
    }

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.starts_with("multipart/form-data") {
        return Err(AppError::UnsupportedMediaType(
            "Content-Type must be multipart/form-data".to_string(),
        ));
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart payload: {e}")))?;

    let mut audio: Option<Bytes> = None;
    let mut session_id: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart payload: {e}")))?
    {
        match field.name() {
            Some("audio") => {
                audio = Some(field.bytes().await.map_err(|e| {
                    AppError::Validation(format!("Could not read audio field: {e}"))
                })?);
            }
            Some("session_id") => {
                session_id = Some(field.text().await.map_err(|e| {
                    AppError::Validation(format!("Could not read session_id field: {e}"))
                })?);
            }
            _ => {}
        }
    }

    let Some(audio) = audio else {
        return Err(AppError::Validation(
            "Missing audio file to convert".to_string(),
        ));
    };
    if audio.len() > MAX_AUDIO_BYTES {
        return Err(AppError::Validation(
            "Audio file is too large, limit is 10MB".to_string(),
        ));
    }

    if let Some(session_id) = session_id.as_deref().filter(|s| !s.trim().is_empty()) {
        manager::ensure_session_exists(state.store.as_ref(), session_id).await?;
    }

    let text = state.voice.transcribe(audio).await?;
    Ok(Json(SpeechToTextResponse {
        success: true,
        text,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("session_abc");
        assert_eq!(cookie.name(), "interview_session_id");
        assert_eq!(cookie.value(), "session_abc");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(7)));
    }

    #[test]
    fn test_validate_session_id_bounds() {
        assert!(validate_session_id("session_abc").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("   ").is_err());
        assert!(validate_session_id(&"x".repeat(101)).is_err());
        assert!(validate_session_id(&"x".repeat(100)).is_ok());
    }
}
