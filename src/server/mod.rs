pub mod config;
mod http_layers;
pub mod metrics;
pub mod responses;
pub mod server;
pub mod state;
mod stream_audio;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_metrics_server, run_server};
