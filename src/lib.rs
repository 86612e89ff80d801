pub mod cli;
pub mod config;
pub mod feed;
pub mod geometry;
pub mod model;
pub mod rank;
mod server;
pub mod similar;
pub mod store;

pub use config::Opts;
pub use feed::FeedController;
pub use similar::SimilarityService;
