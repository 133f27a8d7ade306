//! # Request Queue Store
//!
//! One live queue per non-hub stop, insertion order preserved.
//!
//! ## Locking
//! - Each queue sits behind its own lock, operations only touch one stop
//! - Outstanding riders live in a separate registry with its own lock
//! - The two are never held at the same time
//! - Handles returned by [`RequestQueueStore::queue`] share the live queue,
//!   later mutations are visible through them
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{request::Request, stops::StopGraph};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("'{0}' is not a stop")]
    UnknownStop(String),
    #[error("No matching request at '{0}'")]
    NoMatch(String),
}

#[derive(Debug, Clone)]
pub struct StopQueue {
    stop: Arc<str>,
    requests: Arc<Mutex<Vec<Request>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub stop: String,
    pub requests: Vec<Request>,
}

impl StopQueue {
    fn new(stop: &str) -> Self {
        Self {
            stop: Arc::from(stop),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn stop(&self) -> &str {
        &self.stop
    }

    pub async fn len(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            stop: self.stop.to_string(),
            requests: self.requests.lock().await.clone(),
        }
    }

    /// true when both handles point at the same live queue
    pub fn shares(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.requests, &other.requests)
    }
}

#[derive(Debug)]
pub struct RequestQueueStore {
    slots: HashMap<String, usize>,
    queues: Vec<StopQueue>,
    riders: Mutex<HashSet<String>>,
    next_id: AtomicU64,
}

impl RequestQueueStore {
    pub fn new(graph: &StopGraph) -> Self {
        let queues: Vec<StopQueue> = graph
            .stops()
            .iter()
            .map(|stop| StopQueue::new(stop))
            .collect();
        let slots = graph
            .stops()
            .iter()
            .enumerate()
            .map(|(index, stop)| (stop.clone(), index))
            .collect();

        Self {
            slots,
            queues,
            riders: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// queue slot for a stop name. the hub has no queue.
    pub fn stop_index(&self, name: &str) -> Result<usize, QueueError> {
        self.slots
            .get(name)
            .copied()
            .ok_or_else(|| QueueError::UnknownStop(name.to_string()))
    }

    pub fn queue(&self, index: usize) -> Result<StopQueue, QueueError> {
        self.queues
            .get(index)
            .cloned()
            .ok_or_else(|| QueueError::UnknownStop(format!("#{index}")))
    }

    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn len(&self, index: usize) -> Result<usize, QueueError> {
        Ok(self.queue(index)?.len().await)
    }

    pub async fn enqueue(&self, index: usize, request: Request) -> Result<(), QueueError> {
        let queue = self.queue(index)?;
        queue.requests.lock().await.push(request);

        Ok(())
    }

    /// removes and returns the first request satisfying `predicate`. the
    /// rider of the removed request may submit again afterwards.
    pub async fn dequeue_matching<P>(&self, index: usize, predicate: P) -> Result<Request, QueueError>
    where
        P: Fn(&Request) -> bool,
    {
        let queue = self.queue(index)?;

        let removed = {
            let mut requests = queue.requests.lock().await;
            requests
                .iter()
                .position(|request| predicate(request))
                .map(|position| requests.remove(position))
        };

        match removed {
            Some(request) => {
                self.release_rider(&request.rider).await;
                Ok(request)
            }
            None => Err(QueueError::NoMatch(queue.stop().to_string())),
        }
    }

    pub async fn find_matching<P>(&self, index: usize, predicate: P) -> Result<Request, QueueError>
    where
        P: Fn(&Request) -> bool,
    {
        let queue = self.queue(index)?;
        let requests = queue.requests.lock().await;

        requests
            .iter()
            .find(|&request| predicate(request))
            .cloned()
            .ok_or_else(|| QueueError::NoMatch(queue.stop().to_string()))
    }

    /// applies `update` in place to the first request satisfying
    /// `predicate`, under the queue lock. `None` when nothing matched.
    pub async fn update_matching<P, F, R>(
        &self,
        index: usize,
        predicate: P,
        update: F,
    ) -> Result<Option<R>, QueueError>
    where
        P: Fn(&Request) -> bool,
        F: FnOnce(&mut Request) -> R,
    {
        let queue = self.queue(index)?;
        let mut requests = queue.requests.lock().await;

        Ok(requests.iter_mut().find(|request| predicate(&**request)).map(update))
    }

    pub async fn clear(&self, index: usize) -> Result<usize, QueueError> {
        let queue = self.queue(index)?;
        let drained: Vec<Request> = queue.requests.lock().await.drain(..).collect();

        let mut riders = self.riders.lock().await;
        for request in &drained {
            riders.remove(&request.rider);
        }

        debug!("Cleared {} requests from {}", drained.len(), queue.stop());
        Ok(drained.len())
    }

    pub async fn clear_all(&self) -> usize {
        let mut cleared = 0;
        for index in 0..self.queues.len() {
            // every index below queues.len() has a queue
            cleared += self.clear(index).await.unwrap_or_default();
        }

        cleared
    }

    /// claims the single outstanding-request slot for `rider`. false when
    /// the rider already holds it.
    pub async fn reserve_rider(&self, rider: &str) -> bool {
        self.riders.lock().await.insert(rider.to_string())
    }

    pub async fn release_rider(&self, rider: &str) {
        self.riders.lock().await.remove(rider);
    }

    pub async fn has_outstanding(&self, rider: &str) -> bool {
        self.riders.lock().await.contains(rider)
    }

    pub async fn snapshot(&self) -> Vec<QueueSnapshot> {
        let mut snapshots = Vec::with_capacity(self.queues.len());
        for queue in &self.queues {
            snapshots.push(queue.snapshot().await);
        }

        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RawRequest;

    fn store() -> RequestQueueStore {
        RequestQueueStore::new(&StopGraph::reference())
    }

    fn request(store: &RequestQueueStore, rider: &str, stop: &str) -> Request {
        let valid = RawRequest {
            rider: Some(rider.to_string()),
            origin: Some("USB".to_string()),
            destination: Some(stop.to_string()),
            ..Default::default()
        }
        .validate("USB")
        .unwrap();

        Request::new(store.next_request_id(), valid)
    }

    #[test]
    fn test_stop_index() {
        let store = store();

        assert_eq!(store.stop_index("Baruta"), Ok(0));
        assert_eq!(store.stop_index("Bellas Artes"), Ok(4));
        assert_eq!(
            store.stop_index("USB"),
            Err(QueueError::UnknownStop("USB".to_string()))
        );
        assert!(store.stop_index("Petare").is_err());
        assert!(store.stop_index("baruta").is_err());
    }

    #[tokio::test]
    async fn test_enqueue_preserves_order() {
        let store = store();
        let index = store.stop_index("Coche").unwrap();

        for rider in ["a@usb.ve", "b@usb.ve", "c@usb.ve"] {
            store.enqueue(index, request(&store, rider, "Coche")).await.unwrap();
        }

        let snapshot = store.queue(index).unwrap().snapshot().await;
        let riders: Vec<String> = snapshot.requests.into_iter().map(|r| r.rider).collect();
        assert_eq!(riders, ["a@usb.ve", "b@usb.ve", "c@usb.ve"]);
    }

    #[tokio::test]
    async fn test_dequeue_first_match() {
        let store = store();
        let index = store.stop_index("Coche").unwrap();

        let mut first = request(&store, "a@usb.ve", "Coche");
        first.comment = "same".to_string();
        let mut second = request(&store, "b@usb.ve", "Coche");
        second.comment = "same".to_string();
        store.enqueue(index, first).await.unwrap();
        store.enqueue(index, second).await.unwrap();

        let removed = store.dequeue_matching(index, |r| r.comment == "same").await.unwrap();
        assert_eq!(removed.rider, "a@usb.ve");
        assert_eq!(store.len(index).await, Ok(1));

        assert_eq!(
            store.dequeue_matching(index, |r| r.rider == "z@usb.ve").await,
            Err(QueueError::NoMatch("Coche".to_string()))
        );
    }

    #[tokio::test]
    async fn test_find_is_read_only() {
        let store = store();
        let index = store.stop_index("La Paz").unwrap();
        store.enqueue(index, request(&store, "a@usb.ve", "La Paz")).await.unwrap();

        let found = store.find_matching(index, |r| r.rider == "a@usb.ve").await.unwrap();
        assert_eq!(found.destination, "La Paz");
        assert_eq!(store.len(index).await, Ok(1));
        assert!(store.find_matching(index, |r| r.rider == "b@usb.ve").await.is_err());
    }

    #[tokio::test]
    async fn test_update_in_place() {
        let store = store();
        let index = store.stop_index("Baruta").unwrap();
        store.enqueue(index, request(&store, "a@usb.ve", "Baruta")).await.unwrap();

        let updated = store
            .update_matching(index, |r| r.rider == "a@usb.ve", |r| {
                r.status = false;
                r.status
            })
            .await
            .unwrap();
        assert_eq!(updated, Some(false));

        let missing = store
            .update_matching(index, |r| r.rider == "b@usb.ve", |r| r.status)
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_handles_share_live_queue() {
        let store = store();
        let index = store.stop_index("Baruta").unwrap();
        let handle = store.queue(index).unwrap();

        store.enqueue(index, request(&store, "a@usb.ve", "Baruta")).await.unwrap();

        assert_eq!(handle.len().await, 1);
        assert!(handle.shares(&store.queue(index).unwrap()));
        assert!(!handle.shares(&store.queue(index + 1).unwrap()));
    }

    #[tokio::test]
    async fn test_rider_registry() {
        let store = store();
        let index = store.stop_index("Baruta").unwrap();

        assert!(store.reserve_rider("a@usb.ve").await);
        assert!(!store.reserve_rider("a@usb.ve").await);
        store.enqueue(index, request(&store, "a@usb.ve", "Baruta")).await.unwrap();

        store.dequeue_matching(index, |r| r.rider == "a@usb.ve").await.unwrap();
        assert!(!store.has_outstanding("a@usb.ve").await);
        assert!(store.reserve_rider("a@usb.ve").await);
    }

    #[tokio::test]
    async fn test_clear_releases_riders() {
        let store = store();
        let riders = [("a@usb.ve", "Baruta"), ("b@usb.ve", "Coche"), ("c@usb.ve", "Coche")];
        for (rider, stop) in riders {
            let index = store.stop_index(stop).unwrap();
            assert!(store.reserve_rider(rider).await);
            store.enqueue(index, request(&store, rider, stop)).await.unwrap();
        }

        let coche = store.stop_index("Coche").unwrap();
        assert_eq!(store.clear(coche).await, Ok(2));
        assert!(!store.has_outstanding("b@usb.ve").await);
        assert!(store.has_outstanding("a@usb.ve").await);

        assert_eq!(store.clear_all().await, 1);
        assert!(!store.has_outstanding("a@usb.ve").await);
        assert!(store.snapshot().await.iter().all(|queue| queue.requests.is_empty()));
    }

    #[tokio::test]
    async fn test_request_ids_are_unique() {
        let store = store();
        let first = store.next_request_id();
        let second = store.next_request_id();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_large_queue() {
        const COUNT: usize = 30_000;

        let store = store();
        let index = store.stop_index("Chacaito").unwrap();
        for n in 0..COUNT {
            let rider = format!("rider{n}@usb.ve");
            store.enqueue(index, request(&store, &rider, "Chacaito")).await.unwrap();
        }
        assert_eq!(store.len(index).await, Ok(COUNT));

        let removed = store
            .dequeue_matching(index, |r| r.rider == "rider15000@usb.ve")
            .await
            .unwrap();
        assert_eq!(removed.rider, "rider15000@usb.ve");

        let snapshot = store.queue(index).unwrap().snapshot().await;
        assert_eq!(snapshot.requests.len(), COUNT - 1);
        assert!(snapshot.requests.windows(2).all(|pair| pair[0].id < pair[1].id));

        let unique: HashSet<&str> = snapshot.requests.iter().map(|r| r.rider.as_str()).collect();
        assert_eq!(unique.len(), COUNT - 1);
    }
}
