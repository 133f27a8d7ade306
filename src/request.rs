use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::identity::Profile;

static RIDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub fn is_rider_identifier(value: &str) -> bool {
    RIDER_PATTERN.is_match(value)
}

/// Ride request payload as it arrives from a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRequest {
    #[serde(default, alias = "user")]
    pub rider: Option<String>,
    #[serde(default, alias = "startLocation")]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, alias = "imGoing")]
    pub going: Option<bool>,
}

/// A payload that passed field validation. `stop` is whichever endpoint
/// is not the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRequest {
    pub rider: String,
    pub origin: String,
    pub destination: String,
    pub stop: String,
    pub comment: String,
    pub going: bool,
}

impl RawRequest {
    /// checks the rider identifier and the endpoints, collecting the names
    /// of every field that failed.
    pub fn validate(&self, hub: &str) -> Result<ValidRequest, Vec<&'static str>> {
        let mut invalid = Vec::new();

        let rider = self.rider.as_deref().unwrap_or_default().trim();
        if !is_rider_identifier(rider) {
            invalid.push("rider");
        }

        let origin = self.origin.as_deref().unwrap_or_default().trim();
        let destination = self.destination.as_deref().unwrap_or_default().trim();
        if origin.is_empty() {
            invalid.push("origin");
        }
        if destination.is_empty() {
            invalid.push("destination");
        }

        if !origin.is_empty() && !destination.is_empty() && (origin == hub) == (destination == hub) {
            invalid.extend(["origin", "destination"]);
        }

        if !invalid.is_empty() {
            return Err(invalid);
        }

        let stop = if origin == hub { destination } else { origin };

        Ok(ValidRequest {
            rider: rider.to_string(),
            origin: origin.to_string(),
            destination: destination.to_string(),
            stop: stop.to_string(),
            comment: self.comment.clone().unwrap_or_default(),
            going: self.going.unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enrichment {
    Pending,
    Enriched,
    Unavailable,
}

/// Rider details attached after insertion. Blank until the identity
/// lookup answers, and blank forever if it never does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiderDetails {
    pub prefix: String,
    pub phone: String,
    pub name: String,
    pub major: String,
    pub picture: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub id: u64,
    pub rider: String,
    pub origin: String,
    pub destination: String,
    pub comment: String,
    pub going: bool,
    pub status: bool,
    pub enrichment: Enrichment,
    #[serde(flatten)]
    pub details: RiderDetails,
    pub created_at: DateTime<Utc>,
}

impl Request {
    pub fn new(id: u64, valid: ValidRequest) -> Self {
        Self {
            id,
            rider: valid.rider,
            origin: valid.origin,
            destination: valid.destination,
            comment: valid.comment,
            going: valid.going,
            status: true,
            enrichment: Enrichment::Pending,
            details: RiderDetails::default(),
            created_at: Utc::now(),
        }
    }

    pub fn enrich(&mut self, profile: Profile) {
        self.details = RiderDetails {
            prefix: self.rider.split('@').next().unwrap_or_default().to_string(),
            phone: profile.phone,
            name: profile.name,
            major: profile.major,
            picture: profile.picture,
        };
        self.enrichment = Enrichment::Enriched;
    }

    /// the endpoint that is not the hub
    pub fn stop<'a>(&'a self, hub: &str) -> &'a str {
        if self.origin == hub {
            &self.destination
        } else {
            &self.origin
        }
    }
}
