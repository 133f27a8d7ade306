//! # Recommendation
//!
//! Orders the stop queues a driver heading to a destination should look at.
//!
//! ## Ranking
//! 1. The destination's own queue always comes first
//! 2. Every stop sharing an edge with the destination follows, nearest first
//! 3. Stops reached only through the hub are left out, the driver already
//!    knows the direct hub trip
//! 4. Equal distances keep edge table order
//!
//! Raw edge distance stands in for route overlap, there is no road geometry.
use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    error::CarpoolError,
    queue::{QueueError, RequestQueueStore, StopQueue},
    stops::{GraphError, StopGraph},
};

#[derive(thiserror::Error, Debug)]
enum RankError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// A queue in a recommendation with its detour from the destination. The
/// destination itself sits at zero.
#[derive(Debug, Clone)]
pub struct RankedQueue {
    pub queue: StopQueue,
    pub detour: f64,
}

pub struct RecommendationEngine {
    graph: Arc<StopGraph>,
    store: Arc<RequestQueueStore>,
}

impl RecommendationEngine {
    pub fn new(graph: Arc<StopGraph>, store: Arc<RequestQueueStore>) -> Self {
        Self { graph, store }
    }

    /// live queues, destination first then detours by distance
    pub fn recommend(&self, destination: &str) -> Result<Vec<StopQueue>, CarpoolError> {
        Ok(self
            .rank(destination)?
            .into_iter()
            .map(|ranked| ranked.queue)
            .collect())
    }

    pub fn rank(&self, destination: &str) -> Result<Vec<RankedQueue>, CarpoolError> {
        let index = self
            .store
            .stop_index(destination)
            .map_err(|_| CarpoolError::UnknownDestination(destination.to_string()))?;

        self.rank_detours(index, destination).map_err(|e| {
            warn!("Recommendation for {destination} failed: {e}");
            CarpoolError::Recommendation
        })
    }

    fn rank_detours(&self, index: usize, destination: &str) -> Result<Vec<RankedQueue>, RankError> {
        let mut detours = Vec::new();
        for edge in self.graph.neighbors_excluding(destination, self.graph.hub()) {
            let stop = self.graph.other_endpoint(edge, destination);
            let distance = self.graph.distance(destination, stop)?;
            detours.push((stop, distance));
        }

        // stable, ties keep table order
        detours.sort_by(|a, b| a.1.total_cmp(&b.1));

        let mut ranked = Vec::with_capacity(detours.len() + 1);
        ranked.push(RankedQueue {
            queue: self.store.queue(index)?,
            detour: 0.0,
        });

        for (stop, distance) in detours {
            let queue = self.store.queue(self.store.stop_index(stop)?)?;
            ranked.push(RankedQueue {
                queue,
                detour: distance,
            });
        }

        debug!("Ranked {} queues for {destination}", ranked.len());
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        request::{RawRequest, Request},
        stops::Edge,
    };

    fn engine_for(graph: StopGraph) -> (RecommendationEngine, Arc<RequestQueueStore>) {
        let graph = Arc::new(graph);
        let store = Arc::new(RequestQueueStore::new(&graph));

        (RecommendationEngine::new(graph, store.clone()), store)
    }

    fn stops(queues: &[StopQueue]) -> Vec<&str> {
        queues.iter().map(|queue| queue.stop()).collect()
    }

    #[test]
    fn test_recommend_reference_order() {
        let (engine, _) = engine_for(StopGraph::reference());

        let queues = engine.recommend("Chacaito").unwrap();

        assert_eq!(
            stops(&queues),
            ["Chacaito", "Bellas Artes", "Baruta", "La Paz", "Coche"]
        );
    }

    #[test]
    fn test_recommend_every_destination() {
        let graph = StopGraph::reference();
        let (engine, _) = engine_for(graph.clone());

        for destination in graph.stops() {
            let ranked = engine.rank(destination).unwrap();

            assert_eq!(ranked[0].queue.stop(), destination);
            assert!(ranked.iter().all(|r| r.queue.stop() != graph.hub()));
            assert!(ranked[1..].windows(2).all(|pair| pair[0].detour <= pair[1].detour));
            for r in &ranked[1..] {
                assert_eq!(graph.distance(destination, r.queue.stop()), Ok(r.detour));
            }
        }
    }

    #[test]
    fn test_recommend_leaf_stop() {
        let graph = StopGraph::from_edges(
            "USB",
            vec![Edge::new("USB", "A", 1.0), Edge::new("A", "B", 2.0), Edge::new("USB", "C", 3.0)],
        )
        .unwrap();
        let (engine, _) = engine_for(graph);

        assert_eq!(stops(&engine.recommend("C").unwrap()), ["C"]);
        assert_eq!(stops(&engine.recommend("A").unwrap()), ["A", "B"]);
    }

    #[test]
    fn test_recommend_ties_keep_table_order() {
        let graph = StopGraph::from_edges(
            "Hub",
            vec![
                Edge::new("D", "Z", 4.0),
                Edge::new("D", "Y", 2.0),
                Edge::new("X", "D", 2.0),
                Edge::new("Hub", "D", 0.5),
            ],
        )
        .unwrap();
        let (engine, _) = engine_for(graph);

        assert_eq!(stops(&engine.recommend("D").unwrap()), ["D", "Y", "X", "Z"]);
    }

    #[test]
    fn test_recommend_unknown_destination() {
        let (engine, _) = engine_for(StopGraph::reference());

        assert_eq!(
            engine.recommend("Petare").unwrap_err(),
            CarpoolError::UnknownDestination("Petare".to_string())
        );
        assert_eq!(
            engine.recommend("USB").unwrap_err(),
            CarpoolError::UnknownDestination("USB".to_string())
        );
    }

    #[tokio::test]
    async fn test_recommend_returns_live_queues() {
        let (engine, store) = engine_for(StopGraph::reference());
        let queues = engine.recommend("Chacaito").unwrap();

        let valid = RawRequest {
            rider: Some("a1@usb.ve".to_string()),
            origin: Some("USB".to_string()),
            destination: Some("Baruta".to_string()),
            ..Default::default()
        }
        .validate("USB")
        .unwrap();
        let index = store.stop_index("Baruta").unwrap();
        store.enqueue(index, Request::new(1, valid)).await.unwrap();

        assert_eq!(queues[2].stop(), "Baruta");
        assert_eq!(queues[2].len().await, 1);
        assert!(queues[2].shares(&store.queue(index).unwrap()));
    }
}
