//! Matchmaking backend client: register a nearby search, then poll for
//! a partner. The backend's matching algorithm is its own concern; this
//! client only needs "partner found" to enter the session flow.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::auth::Credentials;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::utils::random_id;

#[derive(Serialize, Debug)]
struct SearchRequest<'a> {
    latitude: f64,
    longitude: f64,
    radius_km: f64,
    signal_id: &'a str,
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    search_user_id: String,
}

/// A matched partner as the backend reports it. The partner's
/// `signal_id` is the chat-room identifier.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Partner {
    pub user_id: String,
    pub name: String,
    pub signal_id: String,
}

/// An open search registration.
#[derive(Debug, Clone)]
pub struct SearchHandle {
    pub search_user_id: String,
    /// Our own signal id, announced to whoever finds us.
    pub signal_id: String,
    pub started_at: DateTime<Utc>,
}

/// The matchmaking result that enters the session flow.
///
/// Role rule: the searcher whose poll returned the partner listing is
/// the initiator; the peer that was listed answers. The flag travels
/// here explicitly and is never re-derived elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    /// The chat-room identifier (the counterpart's signal id).
    pub room_id: String,
    pub partner_name: String,
    pub initiator: bool,
}

impl MatchOutcome {
    /// Outcome on the side that found the listing: it initiates.
    pub fn found(partner: &Partner) -> Self {
        Self {
            room_id: partner.signal_id.clone(),
            partner_name: partner.name.clone(),
            initiator: true,
        }
    }

    /// Outcome on the side that was found: it answers. `room_id` is the
    /// peer's signal id as delivered over signaling.
    pub fn listed(room_id: impl Into<String>, partner_name: impl Into<String>) -> Self {
        Self { room_id: room_id.into(), partner_name: partner_name.into(), initiator: false }
    }
}

pub struct MatchClient {
    http: reqwest::Client,
    config: ClientConfig,
    credentials: Credentials,
}

impl MatchClient {
    pub fn new(config: ClientConfig, credentials: Credentials) -> Self {
        Self { http: reqwest::Client::new(), config, credentials }
    }

    /// Register a nearby search with a freshly generated signal id.
    pub async fn start_search(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<SearchHandle, ApiError> {
        self.start_search_with_signal(latitude, longitude, random_id()).await
    }

    pub async fn start_search_with_signal(
        &self,
        latitude: f64,
        longitude: f64,
        signal_id: String,
    ) -> Result<SearchHandle, ApiError> {
        let url = format!("{}/core/v1/search-users", self.config.api_base);
        let request = SearchRequest {
            latitude,
            longitude,
            radius_km: self.config.radius_km,
            signal_id: &signal_id,
        };
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.credentials.token())
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: SearchResponse = response.json().await?;
        info!("search registered: {}", body.search_user_id);
        Ok(SearchHandle {
            search_user_id: body.search_user_id,
            signal_id,
            started_at: Utc::now(),
        })
    }

    /// One poll. `Ok(None)` while no partner is listed yet; a 404 is the
    /// normal "still waiting" reply, not an error.
    pub async fn poll_partner(&self, handle: &SearchHandle) -> Result<Option<Partner>, ApiError> {
        let url =
            format!("{}/core/v1/partners/{}", self.config.api_base, handle.search_user_id);
        let response =
            self.http.get(&url).bearer_auth(self.credentials.token()).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("no partner yet for {}", handle.search_user_id);
            return Ok(None);
        }
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Poll on the configured cadence until a partner appears or the
    /// deadline passes.
    pub async fn find_partner(
        &self,
        handle: &SearchHandle,
        deadline: Duration,
    ) -> Result<Option<MatchOutcome>, ApiError> {
        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            ticker.tick().await;
            if let Some(partner) = self.poll_partner(handle).await? {
                info!("partner found: {}", partner.name);
                return Ok(Some(MatchOutcome::found(&partner)));
            }
            if started.elapsed() >= deadline {
                return Ok(None);
            }
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        #[derive(Deserialize)]
        struct ErrorBody {
            message: Option<String>,
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| {
                status.canonical_reason().unwrap_or("request failed").to_owned()
            });
        return Err(ApiError::Api { status: status.as_u16(), message });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_request_wire_shape() {
        let request = SearchRequest {
            latitude: 52.52,
            longitude: 13.405,
            radius_km: 10.0,
            signal_id: "abc123",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["latitude"], 52.52);
        assert_eq!(json["radius_km"], 10.0);
        assert_eq!(json["signal_id"], "abc123");
    }

    #[test]
    fn partner_parses_backend_record() {
        let partner: Partner = serde_json::from_str(
            r#"{"user_id":"u1","name":"Sam","signal_id":"room-42"}"#,
        )
        .unwrap();
        assert_eq!(partner.signal_id, "room-42");
    }

    #[test]
    fn searcher_who_finds_the_listing_initiates() {
        let partner = Partner {
            user_id: "u1".into(),
            name: "Sam".into(),
            signal_id: "room-42".into(),
        };
        let found = MatchOutcome::found(&partner);
        assert!(found.initiator);
        assert_eq!(found.room_id, "room-42");

        let listed = MatchOutcome::listed("room-42", "Alex");
        assert!(!listed.initiator);
    }
}
