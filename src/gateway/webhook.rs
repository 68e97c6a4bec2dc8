//! WhatsApp webhook handlers

use super::AppState;
use crate::whatsapp::{WebhookNotification, extract_messages};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Echo `hub.challenge` when the mode and token match.
pub async fn verify(State(state): State<AppState>, Query(params): Query<VerifyParams>) -> Response {
    let expected = &state.coach.config().verify_token;
    let token_ok = params.verify_token.as_deref() == Some(expected.as_str());
    if params.mode.as_deref() == Some("subscribe") && token_ok {
        tracing::info!("WhatsApp: webhook verified");
        return (StatusCode::OK, params.challenge.unwrap_or_default()).into_response();
    }
    tracing::warn!("WhatsApp: webhook verification rejected");
    StatusCode::FORBIDDEN.into_response()
}

/// Acknowledge right away and process the messages in the background.
pub async fn receive(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let notification: WebhookNotification = match serde_json::from_slice(&body) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!("WhatsApp: unreadable webhook body: {}", e);
            return StatusCode::NOT_FOUND;
        }
    };
    if notification.object.is_none() {
        return StatusCode::NOT_FOUND;
    }

    let messages = extract_messages(&notification);
    if messages.is_empty() {
        return StatusCode::OK;
    }

    let coach = state.coach.clone();
    tokio::spawn(async move {
        for message in messages {
            coach.handle_inbound(message).await;
        }
    });
    StatusCode::OK
}
