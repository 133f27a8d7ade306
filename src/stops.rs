//! # Stop Graph
//!
//! Static weighted graph between the hub and the commute stops it serves.
//!
//! ## Notes
//! - Edges are undirected, a pair may be written in either orientation
//! - The graph is sparse, not every pair of stops shares an edge
//! - Table order matters, ranking ties fall back to it
//! - Read-only once built, there are no mutation operations
use std::{collections::HashSet, fs::File, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const REFERENCE_HUB: &str = "USB";

/// Reference deployment, distances in km.
const REFERENCE_EDGES: &[(&str, &str, f64)] = &[
    ("USB", "Baruta", 6.5),
    ("USB", "Chacaito", 17.8),
    ("USB", "Coche", 19.2),
    ("USB", "La Paz", 23.6),
    ("USB", "Bellas Artes", 22.4),
    ("Chacaito", "Bellas Artes", 8.0),
    ("Chacaito", "La Paz", 11.3),
    ("Chacaito", "Coche", 13.4),
    ("Chacaito", "Baruta", 11.0),
    ("Baruta", "Coche", 9.7),
    ("Bellas Artes", "La Paz", 5.9),
    ("Coche", "La Paz", 10.1),
];

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("No edge between '{0}' and '{1}'")]
    EdgeNotFound(String, String),
    #[error("Edge ({from})-({to}) has invalid distance {distance}")]
    InvalidDistance {
        from: String,
        to: String,
        distance: f64,
    },
    #[error("Edge ({0})-({0}) loops back on itself")]
    SelfLoop(String),
    #[error("Edge ({0})-({1}) appears more than once")]
    DuplicateEdge(String, String),
    #[error("Edge table has no stops besides the hub '{0}'")]
    NoStops(String),
    #[error("Hub '{0}' is not an endpoint of any edge")]
    HubMissing(String),
    #[error("Error reading edge table '{path}': {message}")]
    Read { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub distance: f64,
}

impl Edge {
    pub fn new(from: &str, to: &str, distance: f64) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            distance,
        }
    }

    pub fn touches(&self, stop: &str) -> bool {
        self.from == stop || self.to == stop
    }

    fn joins(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    /// the endpoint that is not `known`. when `known` is neither endpoint
    /// it is handed back unchanged.
    pub fn other_endpoint<'a>(&'a self, known: &'a str) -> &'a str {
        if self.from == known {
            &self.to
        } else if self.to == known {
            &self.from
        } else {
            known
        }
    }
}

#[derive(Debug, Clone)]
pub struct StopGraph {
    hub: String,
    stops: Vec<String>,
    edges: Vec<Edge>,
}

impl StopGraph {
    pub fn reference() -> Self {
        let edges = REFERENCE_EDGES
            .iter()
            .map(|(from, to, distance)| Edge::new(from, to, *distance))
            .collect();

        // the reference table is known to be well formed
        Self::build(REFERENCE_HUB, edges)
    }

    /// builds a graph from an edge table. the stop enumeration is every
    /// endpoint other than the hub, in the order it first appears.
    pub fn from_edges(hub: &str, edges: Vec<Edge>) -> Result<Self, GraphError> {
        let mut seen: HashSet<(&str, &str)> = HashSet::new();

        for edge in &edges {
            if !edge.distance.is_finite() || edge.distance < 0.0 {
                return Err(GraphError::InvalidDistance {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    distance: edge.distance,
                });
            }

            if edge.from == edge.to {
                return Err(GraphError::SelfLoop(edge.from.clone()));
            }

            let key = if edge.from < edge.to {
                (edge.from.as_str(), edge.to.as_str())
            } else {
                (edge.to.as_str(), edge.from.as_str())
            };

            if !seen.insert(key) {
                return Err(GraphError::DuplicateEdge(
                    edge.from.clone(),
                    edge.to.clone(),
                ));
            }
        }

        let graph = Self::build(hub, edges);
        if graph.stops.is_empty() {
            return Err(GraphError::NoStops(hub.to_string()));
        }
        if !graph.edges.iter().any(|edge| edge.touches(hub)) {
            return Err(GraphError::HubMissing(hub.to_string()));
        }

        Ok(graph)
    }

    pub fn from_csv(path: &Path, hub: &str) -> Result<Self, GraphError> {
        let read_error = |message: String| GraphError::Read {
            path: path.display().to_string(),
            message,
        };

        let file = File::open(path).map_err(|e| read_error(e.to_string()))?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut edges = Vec::new();
        for result in rdr.deserialize() {
            let edge: Edge = result.map_err(|e| read_error(e.to_string()))?;
            edges.push(edge);
        }

        debug!("Read {} edges from {}", edges.len(), path.display());
        Self::from_edges(hub, edges)
    }

    fn build(hub: &str, edges: Vec<Edge>) -> Self {
        let mut stops: Vec<String> = Vec::new();
        for edge in &edges {
            for endpoint in [&edge.from, &edge.to] {
                if endpoint != hub && !stops.contains(endpoint) {
                    stops.push(endpoint.clone());
                }
            }
        }

        Self {
            hub: hub.to_string(),
            stops,
            edges,
        }
    }

    pub fn hub(&self) -> &str {
        &self.hub
    }

    pub fn is_hub(&self, name: &str) -> bool {
        self.hub == name
    }

    /// non-hub stops, each owns one request queue
    pub fn stops(&self) -> &[String] {
        &self.stops
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn distance(&self, a: &str, b: &str) -> Result<f64, GraphError> {
        self.edges
            .iter()
            .find(|edge| edge.joins(a, b))
            .map(|edge| edge.distance)
            .ok_or_else(|| GraphError::EdgeNotFound(a.to_string(), b.to_string()))
    }

    /// edges incident to `stop` whose other endpoint is not `excluded`, in
    /// table order.
    pub fn neighbors_excluding(&self, stop: &str, excluded: &str) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|edge| edge.touches(stop) && edge.other_endpoint(stop) != excluded)
            .collect()
    }

    pub fn other_endpoint<'a>(&self, edge: &'a Edge, known: &'a str) -> &'a str {
        edge.other_endpoint(known)
    }
}
