//! # Request Lifecycle
//!
//! Moves requests in and out of the stop queues.
//!
//! ## Phases
//! - Pending validation: raw payload from a client
//! - Rejected: payload failed validation, nothing is queued
//! - Queued: inserted right away with blank rider details, enrichment runs
//!   in the background and fills them in place
//! - Cancelled / Matched: removed from its queue, rider may submit again
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    error::CarpoolError,
    identity::IdentityProvider,
    queue::{QueueError, RequestQueueStore},
    request::{is_rider_identifier, Enrichment, RawRequest, Request},
    stops::StopGraph,
};

/// A queued request plus its background enrichment task. Dropping the
/// handle detaches the task.
#[derive(Debug)]
pub struct Submission {
    pub request: Request,
    pub enrichment: JoinHandle<()>,
}

pub struct RequestLifecycle {
    graph: Arc<StopGraph>,
    store: Arc<RequestQueueStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl RequestLifecycle {
    pub fn new(
        graph: Arc<StopGraph>,
        store: Arc<RequestQueueStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            graph,
            store,
            identity,
        }
    }

    pub async fn submit(&self, raw: &RawRequest) -> Result<Submission, CarpoolError> {
        let valid = raw
            .validate(self.graph.hub())
            .map_err(CarpoolError::Validation)?;

        if !self.store.reserve_rider(&valid.rider).await {
            warn!("Rejected duplicate request from {}", valid.rider);
            return Err(CarpoolError::DuplicateRequest(valid.rider));
        }

        let index = match self.store.stop_index(&valid.stop) {
            Ok(index) => index,
            Err(_) => {
                self.store.release_rider(&valid.rider).await;
                return Err(CarpoolError::UnknownStop(valid.stop));
            }
        };

        let request = Request::new(self.store.next_request_id(), valid);
        if let Err(e) = self.store.enqueue(index, request.clone()).await {
            self.store.release_rider(&request.rider).await;
            return Err(unknown_stop(e));
        }

        info!(
            "Queued request {} from {} at {}",
            request.id,
            request.rider,
            request.stop(self.graph.hub())
        );

        let enrichment = tokio::spawn(enrich(
            self.store.clone(),
            self.identity.clone(),
            index,
            request.id,
            request.rider.clone(),
        ));

        Ok(Submission {
            request,
            enrichment,
        })
    }

    pub async fn cancel(&self, raw: &RawRequest) -> Result<Request, CarpoolError> {
        let valid = raw
            .validate(self.graph.hub())
            .map_err(CarpoolError::Validation)?;

        let index = self
            .store
            .stop_index(&valid.stop)
            .map_err(unknown_stop)?;

        let request = self
            .store
            .dequeue_matching(index, |request| request.rider == valid.rider)
            .await
            .map_err(|_| CarpoolError::NotFound {
                rider: valid.rider.clone(),
                stop: valid.stop.clone(),
            })?;

        info!("Cancelled request {} from {}", request.id, request.rider);
        Ok(request)
    }

    /// toggles the status of `user`'s request at `place`. returns the new
    /// status, or `None` when the user has nothing queued there.
    pub async fn change_status(&self, user: &str, place: &str) -> Result<Option<bool>, CarpoolError> {
        let (user, place) = (user.trim(), place.trim());
        let index = self.place_index(place)?;

        let toggled = self
            .store
            .update_matching(index, |request| request.rider == user, |request| {
                request.status = !request.status;
                request.status
            })
            .await
            .map_err(unknown_stop)?;

        match toggled {
            Some(status) => debug!("Status of {user} at {place} is now {status}"),
            None => debug!("No request from {user} at {place}, status unchanged"),
        }

        Ok(toggled)
    }

    /// a driver takes a queued rider. the request leaves its queue, storing
    /// the completed ride is up to the ride history service.
    pub async fn accept(&self, driver: &str, rider: &str, place: &str) -> Result<Request, CarpoolError> {
        let (driver, rider, place) = (driver.trim(), rider.trim(), place.trim());

        let mut invalid = Vec::new();
        if !is_rider_identifier(driver) || driver == rider {
            invalid.push("driver");
        }
        if !is_rider_identifier(rider) {
            invalid.push("rider");
        }
        if !invalid.is_empty() {
            return Err(CarpoolError::Validation(invalid));
        }

        let index = self.place_index(place)?;

        let request = self
            .store
            .dequeue_matching(index, |request| request.rider == rider)
            .await
            .map_err(|_| CarpoolError::NotFound {
                rider: rider.to_string(),
                stop: place.to_string(),
            })?;

        info!("Matched {} with driver {driver} at {place}", request.rider);
        Ok(request)
    }

    fn place_index(&self, place: &str) -> Result<usize, CarpoolError> {
        if self.graph.is_hub(place) {
            return Err(CarpoolError::Validation(vec!["place"]));
        }

        self.store
            .stop_index(place)
            .map_err(|_| CarpoolError::Validation(vec!["place"]))
    }
}

fn unknown_stop(e: QueueError) -> CarpoolError {
    match e {
        QueueError::UnknownStop(stop) | QueueError::NoMatch(stop) => CarpoolError::UnknownStop(stop),
    }
}

async fn enrich(
    store: Arc<RequestQueueStore>,
    identity: Arc<dyn IdentityProvider>,
    index: usize,
    id: u64,
    rider: String,
) {
    let lookup = identity.find_by_identifier(&rider).await;

    let updated = match lookup {
        Ok(profile) => {
            store
                .update_matching(index, |request| request.id == id, |request| {
                    request.enrich(profile)
                })
                .await
        }
        Err(e) => {
            warn!("Enrichment for {rider} failed: {e}");
            store
                .update_matching(index, |request| request.id == id, |request| {
                    request.enrichment = Enrichment::Unavailable
                })
                .await
        }
    };

    match updated {
        Ok(Some(())) => debug!("Enrichment for request {id} finished"),
        Ok(None) => debug!("Request {id} left its queue before enrichment finished"),
        Err(e) => warn!("Enrichment for request {id} failed: {e}"),
    }
}
