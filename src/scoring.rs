//! Trip scoring collaborator.
//!
//! An external service rates a prospective trip from 1 to 5 before the
//! driver accepts it. The service is optional and may be slow or down; the
//! ride lifecycle bounds every call with a timeout and treats any failure as
//! "no score".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ScoringConfig;
use crate::model::Coordinates;

/// Something that can rate a trip.
///
/// Implementations return the raw score as reported by the service;
/// range enforcement happens in the ride lifecycle.
#[async_trait]
pub trait TripScorer: Send + Sync {
    async fn score_trip(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        time: DateTime<Utc>,
    ) -> anyhow::Result<Option<f64>>;
}

/// Used when no scoring service is configured.
pub struct DisabledScorer;

#[async_trait]
impl TripScorer for DisabledScorer {
    async fn score_trip(
        &self,
        _origin: Coordinates,
        _destination: Coordinates,
        _time: DateTime<Utc>,
    ) -> anyhow::Result<Option<f64>> {
        Ok(None)
    }
}

/// Answers every trip with the same score. Handy for local runs.
pub struct FixedScorer(pub Option<f64>);

#[async_trait]
impl TripScorer for FixedScorer {
    async fn score_trip(
        &self,
        _origin: Coordinates,
        _destination: Coordinates,
        _time: DateTime<Utc>,
    ) -> anyhow::Result<Option<f64>> {
        Ok(self.0)
    }
}

#[derive(Debug, Serialize)]
struct ScoreTripRequest {
    origin: Coordinates,
    destination: Coordinates,
    time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ScoreTripResponse {
    #[serde(default)]
    score: Option<f64>,
}

/// Client for an HTTP scoring service.
///
/// POSTs `{ origin, destination, time }` as JSON and expects
/// `{ "score": <number|null> }` back.
#[derive(Clone)]
pub struct HttpTripScorer {
    client: reqwest::Client,
    url: String,
}

impl HttpTripScorer {
    /// Create a client whose requests give up after `timeout`.
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl TripScorer for HttpTripScorer {
    async fn score_trip(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        time: DateTime<Utc>,
    ) -> anyhow::Result<Option<f64>> {
        let body = ScoreTripRequest {
            origin,
            destination,
            time,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let data = response.json::<ScoreTripResponse>().await?;
        Ok(data.score)
    }
}

/// Build the scorer described by the configuration.
///
/// Falls back to [`DisabledScorer`] when no URL is set or the HTTP client
/// cannot be built.
pub fn scorer_from_config(config: &ScoringConfig) -> Arc<dyn TripScorer> {
    match &config.url {
        Some(url) => match HttpTripScorer::new(url, config.timeout) {
            Ok(scorer) => Arc::new(scorer),
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to build scoring client, scoring disabled");
                Arc::new(DisabledScorer)
            }
        },
        None => {
            warn!("TAXISHIFT_SCORER_URL not set, trip scoring disabled");
            Arc::new(DisabledScorer)
        }
    }
}

/// Clamp a raw service score into 1..=5. Non-finite scores count as none.
pub fn normalize_score(raw: f64) -> Option<u8> {
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(1.0, 5.0) as u8)
}
