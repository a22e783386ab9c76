pub mod credentials;
pub mod health;
pub mod ingest;
pub mod tracking_tokens;
pub mod usage;
