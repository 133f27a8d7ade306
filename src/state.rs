use std::sync::Arc;

use tracing::{info, warn};

use super::{
    config::Config,
    identity::{Directory, HttpDirectory, IdentityProvider, NoDirectory},
    lifecycle::RequestLifecycle,
    queue::RequestQueueStore,
    recommend::RecommendationEngine,
    stops::{StopGraph, REFERENCE_HUB},
};

pub struct AppState {
    pub config: Config,
    pub graph: Arc<StopGraph>,
    pub store: Arc<RequestQueueStore>,
    pub lifecycle: RequestLifecycle,
    pub engine: RecommendationEngine,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        let config = Config::load();

        let graph = load_graph(&config);
        let identity = load_identity(&config);

        Arc::new(Self::from_parts(config, graph, identity))
    }

    pub fn from_parts(config: Config, graph: StopGraph, identity: Arc<dyn IdentityProvider>) -> Self {
        let graph = Arc::new(graph);
        let store = Arc::new(RequestQueueStore::new(&graph));

        info!(
            "Serving {} stops around {}",
            graph.stops().len(),
            graph.hub()
        );

        Self {
            config,
            lifecycle: RequestLifecycle::new(graph.clone(), store.clone(), identity),
            engine: RecommendationEngine::new(graph.clone(), store.clone()),
            graph,
            store,
        }
    }
}

fn load_graph(config: &Config) -> StopGraph {
    match &config.edges_path {
        Some(path) => {
            info!("Loading edge table from {}", path.display());

            StopGraph::from_csv(path, &config.hub)
                .map_err(|e| {
                    warn!("Invalid edge table: {e}");
                })
                .expect("Edge table misconfigured!")
        }
        None => {
            if config.hub != REFERENCE_HUB {
                warn!(
                    "No edge table given, using the reference graph around {REFERENCE_HUB} instead of {}",
                    config.hub
                );
            }

            StopGraph::reference()
        }
    }
}

fn load_identity(config: &Config) -> Arc<dyn IdentityProvider> {
    if let Some(url) = &config.identity_url {
        info!("Enriching requests from {url}");
        return Arc::new(HttpDirectory::new(url));
    }

    match &config.directory_path {
        Some(path) => {
            let directory = Directory::from_csv(path)
                .map_err(|e| {
                    warn!("Invalid profile directory: {e}");
                })
                .expect("Profile directory misconfigured!");

            info!("Loaded {} profiles from {}", directory.len(), path.display());
            Arc::new(directory)
        }
        None => {
            info!("No identity source configured, requests stay unenriched");
            Arc::new(NoDirectory)
        }
    }
}
