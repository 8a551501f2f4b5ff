//! Donor stats enrichment.
//!
//! The stats API is slow and rate limited, so fetches go through an
//! [`EnrichmentGate`] which reuses the last good record between refreshes.

use std::future::Future;
use std::time::Duration;

use fah_core::Donor;
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("donor API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("donor API returned {0}")]
    Status(StatusCode),
    #[error("invalid donor API base URL {0:?}")]
    BaseUrl(String),
}

/// Something that can look up a donor by name.
pub trait DonorSource: Send + Sync {
    fn fetch_donor(&self, user: &str) -> impl Future<Output = Result<Donor, EnrichmentError>> + Send;
}

/// HTTP client for `GET <base>/donor/<user>`.
pub struct StatsApi {
    client: reqwest::Client,
    base_url: Url,
}

impl StatsApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EnrichmentError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|u| !u.cannot_be_a_base())
            .ok_or_else(|| EnrichmentError::BaseUrl(base_url.to_string()))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Builds the donor URL; `user` is percent-encoded as one path segment.
    pub fn donor_url(&self, user: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("donor").push(user);
        }
        url
    }
}

impl DonorSource for StatsApi {
    async fn fetch_donor(&self, user: &str) -> Result<Donor, EnrichmentError> {
        let url = self.donor_url(user);
        debug!(%url, "getting donor API data");
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(EnrichmentError::Status(resp.status()));
        }
        Ok(resp.json::<Donor>().await?)
    }
}

/// Result of [`EnrichmentGate::fetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub donor: Donor,
    /// True when no fresh record was obtained by this call.
    pub cached: bool,
}

/// Throttles a [`DonorSource`] to one attempt per `min_interval`.
///
/// The interval runs from the last attempt, successful or not, so a failing
/// API is retried at most once per interval. A different key always triggers
/// a fetch.
pub struct EnrichmentGate<D> {
    source: D,
    min_interval: Duration,
    last_attempt: Option<Instant>,
    key: Option<String>,
    last_good: Donor,
}

impl<D: DonorSource> EnrichmentGate<D> {
    pub fn new(source: D, min_interval: Duration) -> Self {
        Self {
            source,
            min_interval,
            last_attempt: None,
            key: None,
            last_good: Donor::default(),
        }
    }

    pub async fn fetch(&mut self, key: &str) -> GateOutcome {
        let due = self.key.as_deref() != Some(key)
            || self
                .last_attempt
                .map_or(true, |at| at.elapsed() >= self.min_interval);
        if !due {
            return self.cached();
        }

        self.last_attempt = Some(Instant::now());
        self.key = Some(key.to_string());
        match self.source.fetch_donor(key).await {
            Ok(donor) => {
                self.last_good = donor.clone();
                GateOutcome {
                    donor,
                    cached: false,
                }
            }
            Err(e) => {
                warn!(error = %e, user = key, "cannot get donor info from API, using cached data");
                self.cached()
            }
        }
    }

    fn cached(&self) -> GateOutcome {
        GateOutcome {
            donor: self.last_good.clone(),
            cached: true,
        }
    }
}
