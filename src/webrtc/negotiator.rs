//! Offer/answer exchange with the SRS play API
//!
//! One HTTP POST per session:
//!
//! ```text
//! POST <endpoint>
//! {"streamurl": "<stream>", "sdp": "<offer>"}
//!
//! 200 OK
//! {"code": 0, "sdp": "<answer>", ...}
//! ```
//!
//! Any other shape is a failed negotiation. Failures are reported in the
//! returned `NegotiationResult`, never retried.

use std::sync::Arc;

use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::{debug, error, info};

use super::session::Session;
use super::signaling::{ConnectionState, NegotiationResult, PlayRequest};
use super::transport::MediaTransport;
use crate::error::{AppError, Result};
use crate::events::{EventBus, SessionEvent};

/// Stream played when neither the user nor the page URL names one
pub const DEFAULT_STREAM: &str = "livestream";

/// Stream name to request
///
/// An explicit name wins, then the first `stream` query parameter of the
/// page URL, then `livestream`. An empty first `stream` also means `livestream`.
pub fn stream_name(page_url: &Url, explicit: Option<&str>) -> String {
    if let Some(name) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return name.to_string();
    }

    page_url
        .query_pairs()
        .find(|(key, _)| key == "stream")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_STREAM.to_string())
}

/// Validate a play API response and extract the answer SDP
pub fn parse_play_response(status: StatusCode, body: &str) -> Result<String> {
    if status != StatusCode::OK {
        return Err(AppError::NegotiationTransport(format!(
            "server returned status {}: {}",
            status,
            body.trim()
        )));
    }

    let json: Value = serde_json::from_str(body).map_err(|e| AppError::NegotiationProtocol {
        code: None,
        message: format!("response is not JSON: {}", e),
    })?;

    if let Some(code) = json.get("code") {
        if code.as_f64() != Some(0.0) {
            let message = json
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(AppError::NegotiationProtocol {
                code: code.as_i64(),
                message,
            });
        }
    }

    match json.get("sdp").and_then(Value::as_str) {
        Some(sdp) if !sdp.is_empty() => Ok(sdp.to_string()),
        _ => Err(AppError::NegotiationProtocol {
            code: None,
            message: "response has no answer SDP".to_string(),
        }),
    }
}

/// Performs the offer/answer exchange for a session
pub struct SessionNegotiator {
    client: reqwest::Client,
    events: Arc<EventBus>,
}

impl SessionNegotiator {
    pub fn new(client: reqwest::Client, events: Arc<EventBus>) -> Self {
        Self { client, events }
    }

    /// Negotiate `stream` with the server at `endpoint`
    pub async fn negotiate(
        &self,
        session: &Session,
        transport: &dyn MediaTransport,
        endpoint: &Url,
        stream: &str,
    ) -> NegotiationResult {
        let result = match self.exchange(session, transport, endpoint, stream).await {
            Ok(answer) => {
                info!("Negotiation with {} succeeded", endpoint);
                session.advance(ConnectionState::Connecting);
                NegotiationResult::accepted(answer)
            }
            Err(e) => {
                error!("Negotiation with {} failed: {}", endpoint, e);
                NegotiationResult::failed(&e)
            }
        };

        self.events.publish(SessionEvent::Negotiated {
            success: result.success,
            code: result.code,
            message: result.message.clone(),
        });
        result
    }

    async fn exchange(
        &self,
        session: &Session,
        transport: &dyn MediaTransport,
        endpoint: &Url,
        stream: &str,
    ) -> Result<String> {
        session.set_stream(stream)?;
        session.advance(ConnectionState::Negotiating);

        let offer = transport.create_offer().await?;
        session.set_local_offer(offer.clone())?;

        info!("Requesting stream '{}' from {}", stream, endpoint);
        let response = self
            .client
            .post(endpoint.clone())
            .json(&PlayRequest::new(stream, offer))
            .send()
            .await
            .map_err(|e| AppError::NegotiationTransport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::NegotiationTransport(e.to_string()))?;
        debug!("Play API responded {} ({} bytes)", status, body.len());

        let answer = parse_play_response(status, &body)?;

        transport.apply_answer(&answer).await?;
        session.set_remote_answer(answer.clone())?;
        Ok(answer)
    }
}
