pub mod auth;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod pricing;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod test_utils;
pub mod utils;

pub use config::Config;
pub use server::Server;
