use axum::extract::FromRef;

use crate::library::LibraryStore;
use crate::pipeline::ConversionPipeline;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedPipeline = Arc<ConversionPipeline>;
pub type GuardedLibraryStore = Arc<dyn LibraryStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub pipeline: GuardedPipeline,
    pub library: GuardedLibraryStore,
    pub version: &'static str,
}

impl ServerState {
    pub fn new(config: ServerConfig, pipeline: GuardedPipeline) -> ServerState {
        let library = pipeline.library().clone();
        ServerState {
            config,
            start_time: Instant::now(),
            pipeline,
            library,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

impl FromRef<ServerState> for GuardedPipeline {
    fn from_ref(input: &ServerState) -> Self {
        input.pipeline.clone()
    }
}

impl FromRef<ServerState> for GuardedLibraryStore {
    fn from_ref(input: &ServerState) -> Self {
        input.library.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
